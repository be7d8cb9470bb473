//! Test utilities and common setup.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use futures::StreamExt;
use parley::api::{self, AppState};
use parley::client::{ChatClient, RelayClient};
use parley::provider::{
    CompletionProvider, CompletionTurn, FragmentStream, ProviderError, ProviderResult,
};
use parley::sessions::SessionStore;
use parley::storage::MemoryStorage;
use tokio::net::TcpListener;

/// One scripted upstream step.
#[derive(Debug, Clone)]
pub enum Step {
    Fragment(&'static str),
    /// Fail the stream at this point.
    Fail,
    /// Stop producing items without ending the stream.
    Stall,
}

/// Completion provider that plays back a fixed script and records every call.
pub struct ScriptedProvider {
    script: Vec<Step>,
    fail_setup: bool,
    calls: Mutex<Vec<Vec<CompletionTurn>>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script,
            fail_setup: false,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn fragments(fragments: &[&'static str]) -> Arc<Self> {
        Self::new(fragments.iter().copied().map(Step::Fragment).collect())
    }

    /// Provider whose stream can never be opened.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            script: Vec::new(),
            fail_setup: true,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Vec<CompletionTurn>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream_completion(&self, turns: Vec<CompletionTurn>) -> ProviderResult<FragmentStream> {
        self.calls.lock().unwrap().push(turns);

        if self.fail_setup {
            return Err(ProviderError::ConnectionFailed {
                url: "http://upstream.invalid/chat/completions".to_string(),
                message: "connection refused".to_string(),
            });
        }

        let mut items: Vec<ProviderResult<String>> = Vec::new();
        let mut stall = false;
        for step in &self.script {
            match step {
                Step::Fragment(text) => items.push(Ok(text.to_string())),
                Step::Fail => {
                    items.push(Err(ProviderError::Stream("connection reset".to_string())));
                    break;
                }
                Step::Stall => {
                    stall = true;
                    break;
                }
            }
        }

        let stream = futures::stream::iter(items);
        if stall {
            Ok(Box::pin(stream.chain(futures::stream::pending())))
        } else {
            Ok(Box::pin(stream))
        }
    }
}

/// Create the relay router backed by the given provider.
pub fn test_app(provider: Arc<ScriptedProvider>) -> Router {
    api::create_router(AppState::new(provider))
}

/// Serve the relay on an ephemeral local port.
pub async fn spawn_relay(provider: Arc<ScriptedProvider>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = test_app(provider);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Chat client with in-memory session state, pointed at a running relay.
pub async fn test_client(addr: SocketAddr) -> ChatClient {
    let sessions = SessionStore::open(Arc::new(MemoryStorage::new()))
        .await
        .unwrap();
    ChatClient::new(Arc::new(sessions), RelayClient::new(format!("http://{}", addr)))
}

/// Concatenate the `content` of every data event in an SSE body.
pub fn collect_content(body: &str) -> (String, usize) {
    let mut content = String::new();
    let mut events = 0;
    for line in body.lines() {
        if let Some(data) = line.strip_prefix("data: ") {
            let value: serde_json::Value = serde_json::from_str(data).unwrap();
            if let Some(fragment) = value["content"].as_str() {
                content.push_str(fragment);
                events += 1;
            }
        }
    }
    (content, events)
}
