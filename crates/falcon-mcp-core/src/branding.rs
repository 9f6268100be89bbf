//! Centralized branding constants
//!
//! All product naming, defaults and recognized environment variables come
//! from this module.

/// Name reported in `initialize` responses and the User-Agent product token
pub const SERVER_NAME: &str = "falcon-mcp";

/// Human readable product name
pub const DISPLAY_NAME: &str = "Falcon MCP Server";

/// Crate version, shared by every workspace member
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default Falcon API base URL (US-1 cloud)
pub const DEFAULT_BASE_URL: &str = "https://api.crowdstrike.com";

/// Default bind host for the streamable HTTP transport
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default bind port for the streamable HTTP transport
pub const DEFAULT_PORT: u16 = 8000;

/// Path of the MCP endpoint on the HTTP transport
pub const MCP_PATH: &str = "/mcp";

/// Instructions returned to clients during `initialize`
pub const INSTRUCTIONS: &str =
    "This server provides access to CrowdStrike Falcon capabilities.";

/// Environment variables recognized by the server
pub mod env {
    pub const CLIENT_ID: &str = "FALCON_CLIENT_ID";
    pub const CLIENT_SECRET: &str = "FALCON_CLIENT_SECRET";
    pub const BASE_URL: &str = "FALCON_BASE_URL";
    pub const TRANSPORT: &str = "FALCON_MCP_TRANSPORT";
    pub const HOST: &str = "FALCON_MCP_HOST";
    pub const PORT: &str = "FALCON_MCP_PORT";
    pub const STATELESS_HTTP: &str = "FALCON_MCP_STATELESS_HTTP";
    pub const USER_AGENT_COMMENT: &str = "FALCON_MCP_USER_AGENT_COMMENT";
    pub const API_KEY: &str = "FALCON_MCP_API_KEY";
    pub const MODULES: &str = "FALCON_MCP_MODULES";
    pub const DEBUG: &str = "FALCON_MCP_DEBUG";
    pub const SESSION_IDLE_TIMEOUT_SECS: &str = "FALCON_MCP_SESSION_IDLE_TIMEOUT_SECS";
    pub const TOKEN_REFRESH_MARGIN_SECS: &str = "FALCON_MCP_TOKEN_REFRESH_MARGIN_SECS";
    pub const AUTH_TIMEOUT_SECS: &str = "FALCON_MCP_AUTH_TIMEOUT_SECS";
    pub const UPSTREAM_TIMEOUT_SECS: &str = "FALCON_MCP_UPSTREAM_TIMEOUT_SECS";
    pub const LOG_DIR: &str = "FALCON_MCP_LOG_DIR";
}

/// Build the User-Agent sent on every outbound Falcon request
///
/// The deployment annotation, when present, goes in the comment section:
/// `falcon-mcp/0.3.0 (bedrock-agentcore)`.
pub fn user_agent(comment: Option<&str>) -> String {
    match comment.map(str::trim).filter(|c| !c.is_empty()) {
        Some(comment) => format!("{}/{} ({})", SERVER_NAME, VERSION, comment),
        None => format!("{}/{}", SERVER_NAME, VERSION),
    }
}
