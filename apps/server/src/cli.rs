//! Command line interface
//!
//! Every flag can also be set through its environment variable.

use std::path::PathBuf;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use falcon_mcp_core::{branding, ServerConfig, ServerConfigBuilder};

/// Falcon MCP Server: CrowdStrike Falcon tools for AI agents
#[derive(Debug, Parser)]
#[command(name = "falcon-mcp", version)]
pub struct Cli {
    /// Transport protocol: stdio or streamable-http
    #[arg(short, long, env = "FALCON_MCP_TRANSPORT", default_value = "stdio")]
    pub transport: String,

    /// Host to bind for the HTTP transport
    #[arg(long, env = "FALCON_MCP_HOST", default_value = branding::DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on for the HTTP transport
    #[arg(short, long, env = "FALCON_MCP_PORT", default_value_t = branding::DEFAULT_PORT)]
    pub port: u16,

    /// Serve every HTTP request in a fresh session (no session affinity needed)
    #[arg(
        long,
        env = "FALCON_MCP_STATELESS_HTTP",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub stateless_http: bool,

    /// Comment appended to the User-Agent of outbound requests
    #[arg(long, env = "FALCON_MCP_USER_AGENT_COMMENT")]
    pub user_agent_comment: Option<String>,

    /// Falcon API base URL
    #[arg(long, env = "FALCON_BASE_URL", default_value = branding::DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Falcon API client id
    #[arg(long, env = "FALCON_CLIENT_ID", hide_env_values = true)]
    pub client_id: Option<String>,

    /// Falcon API client secret
    #[arg(long, env = "FALCON_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// API key required in x-api-key on HTTP requests
    #[arg(long, env = "FALCON_MCP_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Comma-separated modules to enable (default: all)
    #[arg(short, long, env = "FALCON_MCP_MODULES")]
    pub modules: Option<String>,

    /// Enable debug logging
    #[arg(
        short,
        long,
        env = "FALCON_MCP_DEBUG",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub debug: bool,

    /// Seconds an idle stateful session is kept
    #[arg(long, env = "FALCON_MCP_SESSION_IDLE_TIMEOUT_SECS", default_value_t = 1800)]
    pub session_idle_timeout_secs: u64,

    /// Refresh the access token this many seconds before it expires
    #[arg(long, env = "FALCON_MCP_TOKEN_REFRESH_MARGIN_SECS", default_value_t = 60)]
    pub token_refresh_margin_secs: u64,

    /// Timeout of the token exchange, in seconds
    #[arg(long, env = "FALCON_MCP_AUTH_TIMEOUT_SECS", default_value_t = 10)]
    pub auth_timeout_secs: u64,

    /// Timeout of each Falcon API call, in seconds
    #[arg(long, env = "FALCON_MCP_UPSTREAM_TIMEOUT_SECS", default_value_t = 60)]
    pub upstream_timeout_secs: u64,

    /// Also write daily-rotated log files to this directory
    #[arg(long, env = "FALCON_MCP_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl Cli {
    pub fn into_builder(self) -> ServerConfigBuilder {
        ServerConfig::builder()
            .transport(self.transport)
            .host(self.host)
            .port(self.port)
            .stateless_http(self.stateless_http)
            .user_agent_comment(self.user_agent_comment)
            .base_url(self.base_url)
            .client_id(self.client_id.unwrap_or_default())
            .client_secret(self.client_secret.unwrap_or_default())
            .api_key(self.api_key)
            .modules(self.modules)
            .debug(self.debug)
            .session_idle_timeout(Duration::from_secs(self.session_idle_timeout_secs))
            .token_refresh_margin(Duration::from_secs(self.token_refresh_margin_secs))
            .auth_timeout(Duration::from_secs(self.auth_timeout_secs))
            .upstream_timeout(Duration::from_secs(self.upstream_timeout_secs))
            .log_dir(self.log_dir)
    }
}
