//! HTTP handlers next to the MCP endpoint

use std::sync::Arc;

use axum::{extract::State, Json};
use falcon_mcp_core::{branding, ServerConfig, SessionMode};
use serde_json::{json, Value};

use crate::session::FalconSessionManager;

/// Shared state of the plain HTTP routes
#[derive(Clone)]
pub(crate) struct HttpState {
    pub config: Arc<ServerConfig>,
    pub sessions: Arc<FalconSessionManager>,
}

/// `GET /health`
pub(crate) async fn health(State(state): State<HttpState>) -> Json<Value> {
    let mode = state.config.session_mode();
    let active_sessions = match mode {
        SessionMode::Stateful => state.sessions.active_sessions(),
        SessionMode::Stateless => 0,
    };

    Json(json!({
        "status": "ok",
        "server": branding::SERVER_NAME,
        "version": branding::VERSION,
        "transport": state.config.transport.as_str(),
        "session_mode": mode.as_str(),
        "active_sessions": active_sessions,
    }))
}
