//! HTTP request handlers.

use axum::{
    Json,
    extract::State,
    response::sse::{KeepAlive, KeepAliveStream, Sse},
};
use axum_extra::extract::WithRejection;
use parley_protocol::ChatRequest;
use serde::Serialize;
use tracing::debug;

use super::error::{ApiError, ApiResult, MESSAGES_REQUIRED};
use super::state::AppState;
use crate::relay::{self, RelayStream};

/// Liveness message returned by `GET /`.
pub const LIVENESS_MESSAGE: &str = "LLM API is running";

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: &'static str,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Liveness endpoint.
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: LIVENESS_MESSAGE,
    })
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Relay a conversation to the completion provider and stream fragments back.
///
/// Validation and provider setup failures are answered with a JSON error before
/// any stream bytes are written.
pub async fn chat(
    State(state): State<AppState>,
    WithRejection(Json(request), _): WithRejection<Json<ChatRequest>, ApiError>,
) -> ApiResult<Sse<KeepAliveStream<RelayStream>>> {
    if request.messages.is_empty() {
        return Err(ApiError::bad_request(MESSAGES_REQUIRED));
    }

    debug!(turns = request.messages.len(), "Chat request accepted");
    let events = relay::relay_completion(state.provider.as_ref(), &request.messages).await?;

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
