//! Falcon MCP Server
//!
//! Transport Selector: serves the MCP handler over stdio or Streamable HTTP,
//! as the configuration says. Self-contained with dependency injection.

mod dependencies;
mod handlers;
pub mod logging_middleware;
mod stdio;

pub use dependencies::{DependenciesBuilder, ServerDependencies};

use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, routing::get, Router};
use falcon_mcp_core::{branding, ConfigError, ServerConfig, SessionMode, TransportKind};
use rmcp::transport::streamable_http_server::{
    session::never::NeverSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::auth::{api_key_middleware, ApiKeyAuth};
use crate::credentials::CredentialManager;
use crate::mcp::FalconMcpHandler;
use crate::session::{FalconSessionManager, InMemorySessionStore};
use handlers::HttpState;

/// Comment interval on open SSE streams
const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Reconnect delay suggested to SSE clients
const SSE_RETRY: Duration = Duration::from_secs(3);

/// MCP server over the configured transport
pub struct FalconMcpServer {
    config: Arc<ServerConfig>,
    handler: FalconMcpHandler,
    sessions: Arc<FalconSessionManager>,
    credentials: Option<CredentialManager>,
    /// Parent of the HTTP service tokens; cancelled on shutdown so open
    /// SSE streams end
    service_token: CancellationToken,
}

impl FalconMcpServer {
    /// Create a server with dependency injection
    ///
    /// Fails when the configured module list names unknown modules.
    pub fn new(config: Arc<ServerConfig>, dependencies: ServerDependencies) -> Result<Self, ConfigError> {
        let handler = FalconMcpHandler::from_config(&config, dependencies.api)?;
        let store = dependencies
            .session_store
            .unwrap_or_else(|| Arc::new(InMemorySessionStore::new()));
        let sessions = Arc::new(FalconSessionManager::new(
            store,
            handler.clone(),
            config.session_idle_timeout,
        ));

        info!(
            transport = %config.transport,
            session_mode = %config.session_mode(),
            modules = ?handler.enabled_modules(),
            "[Server] Initialized"
        );

        Ok(Self {
            config,
            handler,
            sessions,
            credentials: dependencies.credentials,
            service_token: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn handler(&self) -> &FalconMcpHandler {
        &self.handler
    }

    pub fn session_mode(&self) -> SessionMode {
        self.config.session_mode()
    }

    /// Stateful session manager; stays empty in stateless mode
    pub fn sessions(&self) -> &Arc<FalconSessionManager> {
        &self.sessions
    }

    fn http_service_config(&self, stateful_mode: bool) -> StreamableHttpServerConfig {
        StreamableHttpServerConfig {
            stateful_mode,
            sse_keep_alive: Some(SSE_KEEP_ALIVE),
            sse_retry: Some(SSE_RETRY),
            cancellation_token: self.service_token.child_token(),
            ..Default::default()
        }
    }

    /// Build the Axum router for the HTTP transport
    pub fn router(&self) -> Router {
        let handler = self.handler.clone();
        let factory = move || {
            debug!("[Server] Creating handler instance");
            Ok(handler.clone())
        };

        // The session mode is fixed here, once, by picking the manager
        let mcp = match self.session_mode() {
            SessionMode::Stateful => Router::new().nest_service(
                branding::MCP_PATH,
                StreamableHttpService::new(factory, self.sessions.clone(), self.http_service_config(true)),
            ),
            SessionMode::Stateless => Router::new().nest_service(
                branding::MCP_PATH,
                StreamableHttpService::new(
                    factory,
                    Arc::new(NeverSessionManager::default()),
                    self.http_service_config(false),
                ),
            ),
        };

        let state = HttpState {
            config: self.config.clone(),
            sessions: self.sessions.clone(),
        };
        let mut router = mcp.merge(
            Router::new()
                .route("/health", get(handlers::health))
                .with_state(state),
        );

        if let Some(api_key) = &self.config.api_key {
            router = router.layer(middleware::from_fn_with_state(
                Arc::new(ApiKeyAuth::new(api_key.as_str())),
                api_key_middleware,
            ));
        }

        router
            .layer(TraceLayer::new_for_http())
            // Request/Response logging, outermost so it sees every request
            .layer(middleware::from_fn(
                logging_middleware::http_logging_middleware,
            ))
    }

    /// Serve Streamable HTTP on an already bound listener until `shutdown`
    pub async fn serve_http(&self, listener: TcpListener, shutdown: CancellationToken) -> anyhow::Result<()> {
        let addr = listener.local_addr()?;
        info!("[Server] Listening on http://{}{}", addr, branding::MCP_PATH);

        let sweeper = (self.session_mode() == SessionMode::Stateful)
            .then(|| self.sessions.spawn_sweeper(shutdown.child_token()));

        let service_token = self.service_token.clone();
        let signal = async move {
            shutdown.cancelled().await;
            service_token.cancel();
        };

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(signal)
            .await;

        if let Some(handle) = sweeper {
            handle.abort();
        }

        result?;
        info!("[Server] HTTP listener closed");
        Ok(())
    }

    /// Serve MCP over a reader/writer pair until it closes or `shutdown`
    pub async fn serve_stdio<R, W>(&self, reader: R, writer: W, shutdown: CancellationToken) -> anyhow::Result<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        stdio::serve(self.handler.clone(), reader, writer, shutdown).await
    }

    /// Run the configured transport until shutdown
    ///
    /// Binding the HTTP listener is the only failure that stops startup;
    /// an unreachable identity endpoint is logged and retried per request.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        info!(
            "[Server] Starting {} v{} ({} transport, {} sessions)",
            branding::DISPLAY_NAME,
            branding::VERSION,
            self.config.transport,
            self.session_mode()
        );

        self.spawn_token_warm_up();

        let result = match self.config.transport {
            TransportKind::Stdio => {
                self.serve_stdio(tokio::io::stdin(), tokio::io::stdout(), shutdown.clone())
                    .await
            }
            TransportKind::StreamableHttp => {
                let addr = self.config.bind_address();
                let listener = TcpListener::bind(addr.as_str())
                    .await
                    .map_err(|source| ConfigError::Bind { addr, source })?;

                if self.session_mode().issues_session_ids() && self.config.binds_wildcard() {
                    warn!(
                        "[Server] Stateful sessions on a wildcard bind address: behind a load \
                         balancer without session affinity, set {}=true",
                        branding::env::STATELESS_HTTP
                    );
                }
                info!(
                    "[Server] API key authentication: {}",
                    if self.config.api_key.is_some() {
                        "ENABLED"
                    } else {
                        "DISABLED"
                    }
                );

                self.serve_http(listener, shutdown.clone()).await
            }
        };

        shutdown.cancel();
        info!("[Server] Stopped");
        result
    }

    /// Fetch the first token in the background
    fn spawn_token_warm_up(&self) {
        let Some(credentials) = self.credentials.clone() else {
            return;
        };

        tokio::spawn(async move {
            match credentials.get_token().await {
                Ok(_) => info!("[Credentials] Authenticated with the Falcon API"),
                Err(e) => warn!(
                    "[Credentials] Initial authentication failed, requests will retry: {}",
                    e
                ),
            }
        });
    }
}
