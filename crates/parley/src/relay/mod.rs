//! Streaming relay core.
//!
//! Turns a validated chat request into provider turns, opens the upstream stream,
//! and forwards every non-empty fragment as one SSE event. The HTTP handler only
//! validates input and wraps the returned event stream.

use std::convert::Infallible;

use axum::response::sse::Event;
use futures::StreamExt;
use parley_protocol::{ChatMessage, ContentChunk, ERROR_EVENT, StreamFailure};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info};

use crate::provider::{CompletionProvider, CompletionTurn, FragmentStream, ProviderResult};

/// Capacity of the per-request forwarding channel.
const RELAY_CHANNEL_CAPACITY: usize = 32;

/// Error text carried by the terminal event after a mid-stream failure.
pub const UPSTREAM_INTERRUPTED: &str = "Upstream stream interrupted";

/// SSE events produced for one relayed completion.
pub type RelayStream = ReceiverStream<Result<Event, Infallible>>;

/// Rewrite a turn's content with its attached file inlined after the text.
pub fn inline_file(message: &ChatMessage) -> String {
    match &message.file {
        Some(file) => format!(
            "{}\n\nFile: {} ({})\nData: {}",
            message.content, file.name, file.media_type, file.data
        ),
        None => message.content.clone(),
    }
}

/// Convert request turns into provider turns, preserving order.
pub fn prepare_turns(messages: &[ChatMessage]) -> Vec<CompletionTurn> {
    messages
        .iter()
        .map(|m| CompletionTurn::new(m.role, inline_file(m)))
        .collect()
}

fn content_event(fragment: String) -> Result<Event, axum::Error> {
    Event::default().json_data(ContentChunk { content: fragment })
}

fn failure_event() -> Result<Event, axum::Error> {
    Event::default().event(ERROR_EVENT).json_data(StreamFailure {
        error: UPSTREAM_INTERRUPTED.to_string(),
    })
}

/// Open the upstream completion and start forwarding it.
///
/// Returns `Err` if the provider fails before producing its first item, so the
/// caller can still answer with an error status. After that, failures end the
/// stream with a single `error` event.
pub async fn relay_completion(
    provider: &dyn CompletionProvider,
    messages: &[ChatMessage],
) -> ProviderResult<RelayStream> {
    let turns = prepare_turns(messages);
    let mut fragments = provider.stream_completion(turns).await?;

    let first = match fragments.next().await {
        Some(Err(e)) => return Err(e),
        other => other,
    };

    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(RELAY_CHANNEL_CAPACITY);
    info!(provider = provider.name(), turns = messages.len(), "Relaying completion");
    tokio::spawn(forward_fragments(first, fragments, tx));

    Ok(ReceiverStream::new(rx))
}

async fn forward_fragments(
    first: Option<ProviderResult<String>>,
    mut fragments: FragmentStream,
    tx: mpsc::Sender<Result<Event, Infallible>>,
) {
    let mut pending = Some(first);
    let mut forwarded = 0usize;

    loop {
        let item = match pending.take() {
            Some(item) => item,
            None => tokio::select! {
                _ = tx.closed() => {
                    debug!(forwarded, "Client disconnected, dropping upstream stream");
                    return;
                }
                item = fragments.next() => item,
            },
        };

        match item {
            Some(Ok(fragment)) => {
                if fragment.is_empty() {
                    continue;
                }
                let event = match content_event(fragment) {
                    Ok(event) => event,
                    Err(e) => {
                        error!("Failed to encode fragment event: {}", e);
                        continue;
                    }
                };
                if tx.send(Ok(event)).await.is_err() {
                    debug!(forwarded, "Client disconnected, dropping upstream stream");
                    return;
                }
                forwarded += 1;
            }
            Some(Err(e)) => {
                error!(forwarded, "Upstream stream failed: {}", e);
                if let Ok(event) = failure_event() {
                    let _ = tx.send(Ok(event)).await;
                }
                return;
            }
            None => {
                debug!(forwarded, "Upstream stream finished");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;
    use async_trait::async_trait;
    use parley_protocol::{FileAttachment, Role};

    struct FixedProvider {
        items: Vec<Result<&'static str, &'static str>>,
    }

    #[async_trait]
    impl CompletionProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn stream_completion(
            &self,
            _turns: Vec<CompletionTurn>,
        ) -> ProviderResult<FragmentStream> {
            let items: Vec<ProviderResult<String>> = self
                .items
                .iter()
                .map(|item| match item {
                    Ok(s) => Ok(s.to_string()),
                    Err(e) => Err(ProviderError::Stream(e.to_string())),
                })
                .collect();
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    async fn event_count(stream: RelayStream) -> usize {
        stream.count().await
    }

    #[test]
    fn test_inline_file() {
        let message = ChatMessage::user("Summarize this").with_file(FileAttachment {
            name: "a.txt".to_string(),
            media_type: "text/plain".to_string(),
            data: "aGVsbG8=".to_string(),
        });
        assert_eq!(
            inline_file(&message),
            "Summarize this\n\nFile: a.txt (text/plain)\nData: aGVsbG8="
        );
    }

    #[test]
    fn test_prepare_turns_preserves_order() {
        let messages = vec![
            ChatMessage::user("one"),
            ChatMessage::assistant("two"),
            ChatMessage::user("three"),
        ];
        let turns = prepare_turns(&messages);
        assert_eq!(
            turns,
            vec![
                CompletionTurn::new(Role::User, "one"),
                CompletionTurn::new(Role::Assistant, "two"),
                CompletionTurn::new(Role::User, "three"),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_fragments_suppressed() {
        let provider = FixedProvider {
            items: vec![Ok("Hel"), Ok(""), Ok("lo")],
        };
        let stream = relay_completion(&provider, &[ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(event_count(stream).await, 2);
    }

    #[tokio::test]
    async fn test_failure_before_first_fragment_is_setup_error() {
        let provider = FixedProvider {
            items: vec![Err("boom"), Ok("never")],
        };
        let result = relay_completion(&provider, &[ChatMessage::user("hi")]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mid_stream_failure_ends_with_one_event() {
        let provider = FixedProvider {
            items: vec![Ok("partial"), Err("boom"), Ok("never")],
        };
        let stream = relay_completion(&provider, &[ChatMessage::user("hi")])
            .await
            .unwrap();
        // One fragment, then the terminal error event.
        assert_eq!(event_count(stream).await, 2);
    }

    #[tokio::test]
    async fn test_empty_completion_produces_no_events() {
        let provider = FixedProvider { items: vec![] };
        let stream = relay_completion(&provider, &[ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(event_count(stream).await, 0);
    }
}
