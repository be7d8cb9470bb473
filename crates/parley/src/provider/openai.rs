//! OpenAI-compatible streaming chat-completions client.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource, retry};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::{CompletionChunk, CompletionRequest, CompletionTurn, DONE_SENTINEL};
use super::{CompletionProvider, FragmentStream, ProviderError, ProviderResult};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Upstream provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API root; `/chat/completions` is appended.
    pub base_url: String,
    /// Bearer token. Falls back to `OPENAI_API_KEY` when unset.
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl ProviderConfig {
    /// Key from config, else from the `OPENAI_API_KEY` environment variable.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// Streams completions from an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    config: ProviderConfig,
    api_key: Option<String>,
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig) -> Self {
        let api_key = config.resolved_api_key();
        if api_key.is_none() {
            warn!("No provider API key configured; upstream requests will be unauthenticated");
        }
        Self {
            client: reqwest::Client::new(),
            config,
            api_key,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn stream_completion(&self, turns: Vec<CompletionTurn>) -> ProviderResult<FragmentStream> {
        let url = self.completions_url();
        let body = CompletionRequest {
            model: &self.config.model,
            messages: &turns,
            temperature: self.config.temperature,
            stream: true,
        };

        let mut request_builder = self
            .client
            .post(&url)
            .header("Accept", "text/event-stream")
            .json(&body);
        if let Some(key) = &self.api_key {
            request_builder = request_builder.bearer_auth(key);
        }

        let mut es = EventSource::new(request_builder).map_err(|e| ProviderError::ConnectionFailed {
            url: url.clone(),
            message: e.to_string(),
        })?;
        es.set_retry_policy(Box::new(retry::Never));

        // Setup failures surface here, before any fragment is handed out.
        match es.next().await {
            Some(Ok(Event::Open)) => {
                debug!(model = %self.config.model, turns = turns.len(), "Provider stream opened");
            }
            Some(Ok(Event::Message(msg))) => {
                es.close();
                return Err(ProviderError::Stream(format!(
                    "message before open: {}",
                    msg.event
                )));
            }
            Some(Err(reqwest_eventsource::Error::Transport(e))) => {
                es.close();
                return Err(ProviderError::ConnectionFailed {
                    url,
                    message: e.to_string(),
                });
            }
            Some(Err(e)) => {
                es.close();
                return Err(e.into());
            }
            None => {
                return Err(ProviderError::Stream("stream closed before open".to_string()));
            }
        }

        let fragments = futures::stream::unfold(Some(es), |state| async move {
            let Some(mut es) = state else {
                return None;
            };
            loop {
                match es.next().await {
                    Some(Ok(Event::Open)) => continue,
                    Some(Ok(Event::Message(msg))) => {
                        if msg.data.trim() == DONE_SENTINEL {
                            es.close();
                            return None;
                        }
                        match serde_json::from_str::<CompletionChunk>(&msg.data) {
                            Ok(chunk) if chunk.error.is_some() => {
                                es.close();
                                let message = chunk.error_message().unwrap_or_default();
                                return Some((Err(ProviderError::Stream(message)), None));
                            }
                            Ok(chunk) => match chunk.into_fragment() {
                                Some(fragment) => return Some((Ok(fragment), Some(es))),
                                None => continue,
                            },
                            Err(e) => {
                                es.close();
                                return Some((Err(ProviderError::ParseError(e.to_string())), None));
                            }
                        }
                    }
                    // Upstream closed the connection without a sentinel.
                    Some(Err(reqwest_eventsource::Error::StreamEnded)) | None => {
                        es.close();
                        return None;
                    }
                    Some(Err(e)) => {
                        es.close();
                        return Some((Err(e.into()), None));
                    }
                }
            }
        });

        Ok(Box::pin(fragments))
    }
}
