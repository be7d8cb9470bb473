//! HTTP API for the relay.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse, MESSAGES_REQUIRED, PROCESSING_FAILED};
pub use handlers::{HealthResponse, LIVENESS_MESSAGE};
pub use routes::create_router;
pub use state::AppState;
