//! Application state shared across handlers.

use std::sync::Arc;

use crate::provider::CompletionProvider;

/// Shared relay state. The relay keeps no per-request state.
#[derive(Clone)]
pub struct AppState {
    /// Upstream completion backend.
    pub provider: Arc<dyn CompletionProvider>,
    /// Allowed CORS origins. Empty means any origin.
    pub cors_origins: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            cors_origins: Arc::new(Vec::new()),
        }
    }

    /// Restrict cross-origin access to the given origins.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Arc::new(origins);
        self
    }
}
