//! HTTP API for chatloop
//!
//! Thin JSON + SSE boundary over the session manager. Presentation is left
//! entirely to clients; this layer only exposes transcripts, live stream
//! events, and run control.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use std::sync::Arc;

use crate::session::SessionManager;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    pub fn new(sessions: SessionManager) -> Self {
        Self {
            sessions: Arc::new(sessions),
        }
    }
}
