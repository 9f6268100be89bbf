//! Server configuration
//!
//! [`ServerConfig`] is built once at startup through [`ServerConfigBuilder`]
//! and then shared read-only (`Arc<ServerConfig>`) for the life of the
//! process.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;
use zeroize::Zeroizing;

use crate::branding;
use crate::error::ConfigError;

/// How the server talks to its client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Newline-delimited JSON-RPC over stdin/stdout
    #[default]
    Stdio,
    /// MCP Streamable HTTP on `host:port`
    StreamableHttp,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Stdio => "stdio",
            TransportKind::StreamableHttp => "streamable-http",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(TransportKind::Stdio),
            "streamable-http" => Ok(TransportKind::StreamableHttp),
            other => Err(ConfigError::UnknownTransport(other.to_string())),
        }
    }
}

/// Whether HTTP clients get a server-issued session id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// One session per `initialize`, addressed by `mcp-session-id`
    Stateful,
    /// Every request stands alone
    Stateless,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Stateful => "stateful",
            SessionMode::Stateless => "stateless",
        }
    }

    pub fn issues_session_ids(&self) -> bool {
        matches!(self, SessionMode::Stateful)
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Falcon API client identity used for the client-credential exchange
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    client_secret: Zeroizing<String>,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: Zeroizing::new(client_secret.into()),
        }
    }

    pub fn secret(&self) -> &str {
        self.client_secret.as_str()
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Immutable process-wide configuration
#[derive(Clone)]
pub struct ServerConfig {
    pub transport: TransportKind,
    pub host: String,
    pub port: u16,
    /// Serves HTTP without session ids (see [`SessionMode`])
    pub stateless_http: bool,
    pub user_agent_comment: Option<String>,
    /// Falcon API base URL, always with a trailing slash
    pub base_url: Url,
    pub credentials: ClientCredentials,
    /// When set, HTTP requests must carry a matching `x-api-key`
    pub api_key: Option<Zeroizing<String>>,
    /// `None` enables every available module
    pub enabled_modules: Option<Vec<String>>,
    pub debug: bool,
    pub session_idle_timeout: Duration,
    pub token_refresh_margin: Duration,
    pub auth_timeout: Duration,
    pub upstream_timeout: Duration,
    pub log_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// `host:port` for the HTTP listener
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Whether the bind host accepts connections on every interface
    pub fn binds_wildcard(&self) -> bool {
        matches!(self.host.as_str(), "0.0.0.0" | "::" | "[::]")
    }

    /// User-Agent header for outbound Falcon requests
    pub fn user_agent(&self) -> String {
        branding::user_agent(self.user_agent_comment.as_deref())
    }

    /// Resolve an API path (with or without leading slash) against the base URL
    pub fn api_url(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path.trim_start_matches('/'))
    }

    /// Stdio is always one stateful session
    pub fn session_mode(&self) -> SessionMode {
        if self.transport == TransportKind::StreamableHttp && self.stateless_http {
            SessionMode::Stateless
        } else {
            SessionMode::Stateful
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("transport", &self.transport)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("stateless_http", &self.stateless_http)
            .field("user_agent_comment", &self.user_agent_comment)
            .field("base_url", &self.base_url.as_str())
            .field("credentials", &self.credentials)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("enabled_modules", &self.enabled_modules)
            .field("debug", &self.debug)
            .field("session_idle_timeout", &self.session_idle_timeout)
            .field("token_refresh_margin", &self.token_refresh_margin)
            .field("auth_timeout", &self.auth_timeout)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("log_dir", &self.log_dir)
            .finish()
    }
}

/// Collects named options and validates them into a [`ServerConfig`]
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    transport: String,
    host: String,
    port: u16,
    stateless_http: bool,
    user_agent_comment: Option<String>,
    base_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    api_key: Option<String>,
    modules: Option<String>,
    debug: bool,
    session_idle_timeout: Duration,
    token_refresh_margin: Duration,
    auth_timeout: Duration,
    upstream_timeout: Duration,
    log_dir: Option<PathBuf>,
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self {
            transport: TransportKind::Stdio.as_str().to_string(),
            host: branding::DEFAULT_HOST.to_string(),
            port: branding::DEFAULT_PORT,
            stateless_http: false,
            user_agent_comment: None,
            base_url: branding::DEFAULT_BASE_URL.to_string(),
            client_id: None,
            client_secret: None,
            api_key: None,
            modules: None,
            debug: false,
            session_idle_timeout: Duration::from_secs(1800),
            token_refresh_margin: Duration::from_secs(60),
            auth_timeout: Duration::from_secs(10),
            upstream_timeout: Duration::from_secs(60),
            log_dir: None,
        }
    }
}

impl ServerConfigBuilder {
    pub fn transport(mut self, transport: impl Into<String>) -> Self {
        self.transport = transport.into();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn stateless_http(mut self, stateless: bool) -> Self {
        self.stateless_http = stateless;
        self
    }

    pub fn user_agent_comment(mut self, comment: Option<String>) -> Self {
        self.user_agent_comment = comment;
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Comma-separated module names; empty means all modules
    pub fn modules(mut self, modules: Option<String>) -> Self {
        self.modules = modules;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn session_idle_timeout(mut self, timeout: Duration) -> Self {
        self.session_idle_timeout = timeout;
        self
    }

    pub fn token_refresh_margin(mut self, margin: Duration) -> Self {
        self.token_refresh_margin = margin;
        self
    }

    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    pub fn upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    pub fn log_dir(mut self, log_dir: Option<PathBuf>) -> Self {
        self.log_dir = log_dir;
        self
    }

    pub fn build(self) -> Result<ServerConfig, ConfigError> {
        let transport: TransportKind = self.transport.parse()?;

        let client_id = non_empty(self.client_id)
            .ok_or(ConfigError::Missing(branding::env::CLIENT_ID))?;
        let client_secret = non_empty(self.client_secret)
            .ok_or(ConfigError::Missing(branding::env::CLIENT_SECRET))?;

        let base_url = parse_base_url(&self.base_url)?;

        let host = self.host.trim().to_string();
        if transport == TransportKind::StreamableHttp && host.is_empty() {
            return Err(ConfigError::invalid(branding::env::HOST, "host must not be empty"));
        }

        for (name, value) in [
            (branding::env::SESSION_IDLE_TIMEOUT_SECS, self.session_idle_timeout),
            (branding::env::AUTH_TIMEOUT_SECS, self.auth_timeout),
            (branding::env::UPSTREAM_TIMEOUT_SECS, self.upstream_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::invalid(name, "must be greater than zero"));
            }
        }

        let enabled_modules = self
            .modules
            .map(|raw| parse_module_list(&raw))
            .filter(|modules| !modules.is_empty());

        Ok(ServerConfig {
            transport,
            host,
            port: self.port,
            stateless_http: self.stateless_http,
            user_agent_comment: non_empty(self.user_agent_comment),
            base_url,
            credentials: ClientCredentials::new(client_id, client_secret),
            api_key: non_empty(self.api_key).map(Zeroizing::new),
            enabled_modules,
            debug: self.debug,
            session_idle_timeout: self.session_idle_timeout,
            token_refresh_margin: self.token_refresh_margin,
            auth_timeout: self.auth_timeout,
            upstream_timeout: self.upstream_timeout,
            log_dir: self.log_dir,
        })
    }
}

/// Split a comma-separated module list, dropping blanks and duplicates
pub fn parse_module_list(raw: &str) -> Vec<String> {
    let mut modules: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !modules.iter().any(|m| m == name) {
            modules.push(name.to_string());
        }
    }
    modules
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::invalid(branding::env::BASE_URL, e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(
            branding::env::BASE_URL,
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }

    // join() drops the last segment unless the path ends with '/'
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}
