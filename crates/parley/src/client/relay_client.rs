//! HTTP client for the relay.

use std::time::Duration;

use log::debug;
use parley_protocol::{ChatMessage, ChatRequest};
use serde::Deserialize;

use super::{ClientError, ClientResult};

/// Default relay base URL.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:3001";

/// Timeout for non-streaming calls. Chat streams have none.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
pub struct RelayStatus {
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Thin wrapper over the relay's HTTP surface.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    base_url: String,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `GET /` liveness probe.
    pub async fn status(&self) -> ClientResult<RelayStatus> {
        let response = self
            .http
            .get(self.url("/"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Start a chat completion. The returned response body is the event stream.
    pub async fn open_chat(&self, messages: &[ChatMessage]) -> ClientResult<reqwest::Response> {
        let request = ChatRequest {
            messages: messages.to_vec(),
        };
        debug!("POST {}/api/chat with {} turn(s)", self.base_url, messages.len());

        let response = self
            .http
            .post(self.url("/api/chat"))
            .header("Accept", "text/event-stream")
            .json(&request)
            .send()
            .await?;
        check_status(response).await
    }
}

async fn check_status(response: reqwest::Response) -> ClientResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    Err(ClientError::Status { status, message })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let client = RelayClient::new("http://localhost:3001/");
        assert_eq!(client.url("/api/chat"), "http://localhost:3001/api/chat");
    }
}
