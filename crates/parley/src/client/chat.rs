//! Streaming chat consumer.
//!
//! Sending a message appends the user turn and an empty assistant placeholder to
//! the session, then grows the placeholder fragment by fragment as the relay
//! streams. Listeners observe progress through the session store's events.

use std::sync::Arc;

use dashmap::DashSet;
use futures::StreamExt;
use log::{debug, info, warn};
use parley_protocol::{ChatMessage, DATA_PREFIX, FileAttachment, StreamPayload};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::decoder::Utf8Decoder;
use super::lines::LineBuffer;
use super::relay_client::RelayClient;
use super::{ClientError, ClientResult};
use crate::sessions::{ChatSession, SessionStore};

/// Placeholder content after a transport failure.
pub const APOLOGY_MESSAGE: &str = "Sorry, there was an error processing your request.";

/// How a stream that did not fail on the wire ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The relay closed the stream normally.
    Completed,
    /// The caller cancelled; partial content is kept.
    Cancelled,
    /// The relay reported an upstream failure; partial content is kept.
    Interrupted,
}

/// What a single stream line asks the consumer to do.
#[derive(Debug, PartialEq, Eq)]
enum LineAction {
    Append(String),
    Interrupted(String),
    Ignore,
}

fn parse_line(line: &str) -> LineAction {
    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return LineAction::Ignore;
    };

    match StreamPayload::parse(data) {
        Ok(payload) => {
            if let Some(error) = payload.error {
                return LineAction::Interrupted(error);
            }
            match payload.fragment() {
                Some(fragment) => LineAction::Append(fragment.to_string()),
                None => LineAction::Ignore,
            }
        }
        Err(e) => {
            warn!("Skipping malformed stream line {:?}: {}", line, e);
            LineAction::Ignore
        }
    }
}

/// Marks a session as streaming for as long as it is alive.
struct InFlightGuard<'a> {
    in_flight: &'a DashSet<String>,
    typing: &'a watch::Sender<bool>,
    session_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let in_flight = self.in_flight;
        let session_id = &self.session_id;
        self.typing.send_if_modified(|typing| {
            in_flight.remove(session_id);
            publish_typing(typing, in_flight)
        });
    }
}

/// Set the typing flag from the in-flight set; returns whether it changed.
///
/// Only called under the typing watch's write lock, so set updates and the
/// published flag never interleave.
fn publish_typing(typing: &mut bool, in_flight: &DashSet<String>) -> bool {
    let active = !in_flight.is_empty();
    std::mem::replace(typing, active) != active
}

/// Sends user turns to the relay and streams replies into the session store.
pub struct ChatClient {
    sessions: Arc<SessionStore>,
    relay: RelayClient,
    in_flight: DashSet<String>,
    typing: watch::Sender<bool>,
}

impl ChatClient {
    pub fn new(sessions: Arc<SessionStore>, relay: RelayClient) -> Self {
        let (typing, _) = watch::channel(false);
        Self {
            sessions,
            relay,
            in_flight: DashSet::new(),
            typing,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Whether a reply is currently streaming into the session.
    pub fn is_typing(&self, session_id: &str) -> bool {
        self.in_flight.contains(session_id)
    }

    /// Typing indicator: `true` while any reply is streaming.
    pub fn subscribe_typing(&self) -> watch::Receiver<bool> {
        self.typing.subscribe()
    }

    /// Send to the current session, creating one if none exist.
    pub async fn send_to_current(
        &self,
        content: impl Into<String>,
        file: Option<FileAttachment>,
        cancel: Option<CancellationToken>,
    ) -> ClientResult<(ChatSession, StreamOutcome)> {
        let session = self.sessions.ensure_session().await?;
        let outcome = self.send(&session.id, content, file, cancel).await?;
        Ok((session, outcome))
    }

    /// Send a user turn and stream the reply into the session.
    ///
    /// On a transport failure the placeholder is overwritten with
    /// [`APOLOGY_MESSAGE`] and the error is returned.
    pub async fn send(
        &self,
        session_id: &str,
        content: impl Into<String>,
        file: Option<FileAttachment>,
        cancel: Option<CancellationToken>,
    ) -> ClientResult<StreamOutcome> {
        let content = content.into();
        if content.trim().is_empty() && file.is_none() {
            return Err(ClientError::EmptyMessage);
        }

        let session = self
            .sessions
            .get_session(session_id)
            .await
            .ok_or_else(|| ClientError::SessionNotFound(session_id.to_string()))?;

        let Some(_guard) = self.begin_stream(session_id) else {
            return Err(ClientError::SessionBusy(session_id.to_string()));
        };

        let mut user_message = ChatMessage::user(content);
        user_message.file = file;

        let mut history = session.messages;
        history.push(user_message.clone());

        if !self.sessions.append_message(session_id, user_message).await?
            || !self
                .sessions
                .append_message(session_id, ChatMessage::assistant(""))
                .await?
        {
            return Err(ClientError::SessionNotFound(session_id.to_string()));
        }

        let cancel = cancel.unwrap_or_else(CancellationToken::new);
        match self.stream_reply(session_id, &history, &cancel).await {
            Ok(outcome) => {
                info!("Reply for session {} ended: {:?}", session_id, outcome);
                Ok(outcome)
            }
            Err(e) if e.is_transport() => {
                warn!("Chat request for session {} failed: {}", session_id, e);
                self.sessions
                    .replace_last_message_content(session_id, APOLOGY_MESSAGE)
                    .await?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Mark the session as streaming, or `None` if it already is.
    fn begin_stream(&self, session_id: &str) -> Option<InFlightGuard<'_>> {
        let mut inserted = false;
        self.typing.send_if_modified(|typing| {
            inserted = self.in_flight.insert(session_id.to_string());
            publish_typing(typing, &self.in_flight)
        });

        inserted.then(|| InFlightGuard {
            in_flight: &self.in_flight,
            typing: &self.typing,
            session_id: session_id.to_string(),
        })
    }

    async fn stream_reply(
        &self,
        session_id: &str,
        history: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> ClientResult<StreamOutcome> {
        let response = tokio::select! {
            _ = cancel.cancelled() => return Ok(StreamOutcome::Cancelled),
            response = self.relay.open_chat(history) => response?,
        };

        let mut body = Box::pin(response.bytes_stream());
        let mut decoder = Utf8Decoder::new();
        let mut lines = LineBuffer::new();

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Stream for session {} cancelled", session_id);
                    return Ok(StreamOutcome::Cancelled);
                }
                chunk = body.next() => chunk,
            };

            let text = match chunk {
                Some(bytes) => decoder.decode(&bytes?),
                None => break,
            };

            for line in lines.push(&text) {
                if let Some(outcome) = self.apply_line(session_id, &line).await? {
                    return Ok(outcome);
                }
            }
        }

        let tail = decoder.finish();
        let mut rest = lines.push(&tail);
        rest.extend(lines.finish());
        for line in rest {
            if let Some(outcome) = self.apply_line(session_id, &line).await? {
                return Ok(outcome);
            }
        }

        Ok(StreamOutcome::Completed)
    }

    /// Apply one line; returns an outcome when the stream should stop.
    async fn apply_line(&self, session_id: &str, line: &str) -> ClientResult<Option<StreamOutcome>> {
        match parse_line(line) {
            LineAction::Append(fragment) => {
                self.sessions
                    .append_to_last_message(session_id, &fragment)
                    .await?;
                Ok(None)
            }
            LineAction::Interrupted(error) => {
                warn!("Relay reported a stream failure: {}", error);
                Ok(Some(StreamOutcome::Interrupted))
            }
            LineAction::Ignore => Ok(None),
        }
    }
}
