//! Stateful session manager for the Streamable HTTP transport
//!
//! rmcp's [`LocalSessionManager`] runs one worker per session; this manager
//! wraps it with a [`SessionStore`] so that sessions can be counted, idled
//! out and terminated, and so that an id the server did not issue (expired,
//! terminated, or minted by another instance) starts a fresh session under
//! that id instead of failing the request.

use std::sync::Arc;
use std::time::Duration;

use falcon_mcp_core::branding;
use futures::{Stream, StreamExt};
use rmcp::model::{ClientJsonRpcMessage, Implementation, ProtocolVersion, ServerJsonRpcMessage};
use rmcp::service::serve_server;
use rmcp::transport::streamable_http_server::session::{
    local::{LocalSessionManager, LocalSessionManagerError},
    ServerSseMessage, SessionId as TransportSessionId, SessionManager,
};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::store::SessionStore;
use super::types::{ActiveRequest, NegotiatedState, SessionEntry, SessionId};
use crate::mcp::FalconMcpHandler;

/// Longest pause between idle sweeps
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Worker stream boxed so it no longer borrows the worker id it was opened with
type WorkerStream = std::pin::Pin<Box<dyn Stream<Item = ServerSseMessage> + Send + Sync + 'static>>;

/// Client name recorded for sessions the server initialized itself
pub const ADOPTED_CLIENT_NAME: &str = "adopted-session";

/// Sweep interval for an idle timeout: min(timeout / 2, 30s), at least 1s
pub fn sweep_interval(idle_timeout: Duration) -> Duration {
    (idle_timeout / 2)
        .min(MAX_SWEEP_INTERVAL)
        .max(Duration::from_secs(1))
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("malformed session id")]
    MalformedId,

    #[error("session {0} is closed")]
    Closed(String),

    #[error("invalid handshake message: {0}")]
    Handshake(#[from] serde_json::Error),

    #[error(transparent)]
    Worker(#[from] LocalSessionManagerError),
}

pub struct FalconSessionManager {
    workers: LocalSessionManager,
    store: Arc<dyn SessionStore>,
    /// Serves sessions adopted without a client `initialize`
    handler: FalconMcpHandler,
    idle_timeout: Duration,
}

impl FalconSessionManager {
    pub fn new(store: Arc<dyn SessionStore>, handler: FalconMcpHandler, idle_timeout: Duration) -> Self {
        Self {
            workers: LocalSessionManager::default(),
            store,
            handler,
            idle_timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn session(&self, id: &str) -> Option<Arc<SessionEntry>> {
        self.store.lookup(id)
    }

    pub fn active_sessions(&self) -> usize {
        self.store.len()
    }

    /// The stored session for `id`, or a fresh one adopted under it
    async fn live_entry(&self, id: &TransportSessionId) -> Result<Arc<SessionEntry>, SessionError> {
        if let Some(entry) = self.store.lookup(id) {
            if !entry.is_retired() && self.workers.has_session(entry.worker_id()).await? {
                return Ok(entry);
            }
            self.discard(&entry).await;
        }

        let id = SessionId::parse(id).ok_or(SessionError::MalformedId)?;
        self.adopt(id).await
    }

    /// Start a session under a client-supplied id and run the handshake
    /// on the client's behalf
    async fn adopt(&self, id: SessionId) -> Result<Arc<SessionEntry>, SessionError> {
        warn!(
            session = %id,
            "[Session] Unknown session id, starting a fresh session under it \
             (expired, terminated, or served by another instance; enable stateless \
             mode when running behind a load balancer without session affinity)"
        );

        let (initialize, initialized) = handshake_messages()?;
        let requested = requested_state(&initialize);

        let (worker_id, transport) = self.workers.create_session().await?;
        let handler = self.handler.clone();
        let session = id.clone();
        tokio::spawn(async move {
            match serve_server(handler, transport).await {
                Ok(service) => {
                    let _ = service.waiting().await;
                }
                Err(e) => warn!(session = %session, "[Session] Adopted session failed to start: {}", e),
            }
        });

        let response = self.workers.initialize_session(&worker_id, initialize).await?;
        self.workers.accept_message(&worker_id, initialized).await?;

        let candidate = SessionEntry::new(id, worker_id.clone());
        let mut negotiated = negotiated_state(requested, &response);
        negotiated.implicit = true;
        candidate.update_negotiated(|state| *state = negotiated);

        let stored = self.store.insert(candidate.clone());
        if !Arc::ptr_eq(&stored, &candidate) {
            // Another request adopted the same id first
            self.close_worker(&worker_id).await;
        }
        Ok(stored)
    }

    /// Wait for the session's turn, adopting a fresh session if it was
    /// terminated meanwhile
    async fn begin(&self, id: &TransportSessionId) -> Result<ActiveRequest, SessionError> {
        for _ in 0..2 {
            let entry = self.live_entry(id).await?;
            if let Some(request) = entry.begin_request().await {
                return Ok(request);
            }
        }
        Err(SessionError::Closed(id.to_string()))
    }

    async fn discard(&self, entry: &Arc<SessionEntry>) {
        if self.store.evict(entry) {
            entry.retire();
            self.close_worker(entry.worker_id()).await;
        }
    }

    async fn close_worker(&self, worker_id: &TransportSessionId) {
        if let Err(e) = self.workers.close_session(worker_id).await {
            debug!(worker = %worker_id, "[Session] Worker already gone: {}", e);
        }
    }

    /// Evict every session idle past the timeout. Sessions with a request
    /// in flight are skipped. Returns how many were evicted.
    pub async fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let mut evicted = 0;

        for id in self.store.ids() {
            let Some(entry) = self.store.lookup(id.as_str()) else {
                continue;
            };
            if !entry.retire_if_idle(self.idle_timeout, now) {
                continue;
            }

            if self.store.evict(&entry) {
                evicted += 1;
                debug!(
                    session = %id,
                    requests = entry.requests_served(),
                    "[Session] Evicted after idle timeout"
                );
                self.close_worker(entry.worker_id()).await;
            }
        }

        if evicted > 0 {
            info!(
                evicted,
                remaining = self.store.len(),
                "[Session] Idle sweep complete"
            );
        }
        evicted
    }

    /// Run [`Self::evict_idle`] periodically until `shutdown` fires
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let manager = self.clone();
        let period = sweep_interval(self.idle_timeout);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        manager.evict_idle().await;
                    }
                }
            }
            debug!("[Session] Sweeper stopped");
        })
    }
}

impl SessionManager for FalconSessionManager {
    type Error = SessionError;
    type Transport = <LocalSessionManager as SessionManager>::Transport;

    async fn create_session(&self) -> Result<(TransportSessionId, Self::Transport), Self::Error> {
        let (worker_id, transport) = self.workers.create_session().await?;
        let entry = SessionEntry::new(SessionId::from(worker_id.clone()), worker_id.clone());
        self.store.insert(entry);

        debug!(session = %worker_id, "[Session] Created");
        Ok((worker_id, transport))
    }

    async fn initialize_session(
        &self,
        id: &TransportSessionId,
        message: ClientJsonRpcMessage,
    ) -> Result<ServerJsonRpcMessage, Self::Error> {
        let entry = self
            .store
            .lookup(id)
            .ok_or_else(|| SessionError::Closed(id.to_string()))?;

        let requested = requested_state(&message);
        let response = self.workers.initialize_session(entry.worker_id(), message).await?;
        let negotiated = negotiated_state(requested, &response);

        info!(
            session = %entry.id(),
            client = negotiated.client_info.as_ref().map(|c| c.name.as_str()).unwrap_or("unknown"),
            protocol_version = ?negotiated.protocol_version.as_ref().map(|v| v.to_string()),
            "[Session] Client initializing"
        );
        entry.touch();
        entry.update_negotiated(|state| *state = negotiated);
        Ok(response)
    }

    async fn has_session(&self, id: &TransportSessionId) -> Result<bool, Self::Error> {
        match self.live_entry(id).await {
            Ok(_) => Ok(true),
            Err(SessionError::MalformedId) => {
                warn!("[Session] Malformed session id presented");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn close_session(&self, id: &TransportSessionId) -> Result<(), Self::Error> {
        let Some(entry) = self.store.lookup(id) else {
            return Ok(());
        };

        if self.store.evict(&entry) {
            // Cancels in-flight tool calls before the worker goes away
            entry.retire();
            info!(
                session = %entry.id(),
                requests = entry.requests_served(),
                "[Session] Terminated"
            );
            self.close_worker(entry.worker_id()).await;
        }
        Ok(())
    }

    async fn create_stream(
        &self,
        id: &TransportSessionId,
        message: ClientJsonRpcMessage,
    ) -> Result<impl Stream<Item = ServerSseMessage> + Send + Sync + 'static, Self::Error> {
        let request = self.begin(id).await?;
        let worker_id = request.entry().worker_id().clone();
        let stream: WorkerStream = Box::pin(self.workers.create_stream(&worker_id, message).await?);

        // The session's turn ends when the response stream is dropped
        Ok(stream.map(move |event| {
            let _ = &request;
            event
        }))
    }

    async fn accept_message(
        &self,
        id: &TransportSessionId,
        message: ClientJsonRpcMessage,
    ) -> Result<(), Self::Error> {
        let entry = self.live_entry(id).await?;
        entry.touch();
        self.workers.accept_message(entry.worker_id(), message).await?;
        Ok(())
    }

    async fn create_standalone_stream(
        &self,
        id: &TransportSessionId,
    ) -> Result<impl Stream<Item = ServerSseMessage> + Send + Sync + 'static, Self::Error> {
        let entry = self.live_entry(id).await?;
        entry.touch();
        let stream: WorkerStream =
            Box::pin(self.workers.create_standalone_stream(entry.worker_id()).await?);
        Ok(stream)
    }

    async fn resume(
        &self,
        id: &TransportSessionId,
        last_event_id: String,
    ) -> Result<impl Stream<Item = ServerSseMessage> + Send + Sync + 'static, Self::Error> {
        let entry = self.live_entry(id).await?;
        entry.touch();
        let stream: WorkerStream =
            Box::pin(self.workers.resume(entry.worker_id(), last_event_id).await?);
        Ok(stream)
    }
}

/// `initialize` and `notifications/initialized` for an adopted session
fn handshake_messages() -> Result<(ClientJsonRpcMessage, ClientJsonRpcMessage), serde_json::Error> {
    let initialize = serde_json::from_value(json!({
        "jsonrpc": "2.0",
        "id": 0,
        "method": "initialize",
        "params": {
            "protocolVersion": ProtocolVersion::LATEST.to_string(),
            "capabilities": {},
            "clientInfo": {
                "name": ADOPTED_CLIENT_NAME,
                "version": branding::VERSION,
            },
        },
    }))?;
    let initialized = serde_json::from_value(json!({
        "jsonrpc": "2.0",
        "method": "notifications/initialized",
    }))?;
    Ok((initialize, initialized))
}

/// Client side of the handshake. Read from raw JSON so that capability
/// shapes we do not know yet do not matter.
fn requested_state(message: &ClientJsonRpcMessage) -> NegotiatedState {
    let params = serde_json::to_value(message)
        .ok()
        .and_then(|v| v.get("params").cloned())
        .unwrap_or(Value::Null);

    NegotiatedState {
        protocol_version: params
            .get("protocolVersion")
            .and_then(|v| serde_json::from_value(v.clone()).ok()),
        client_info: params
            .get("clientInfo")
            .and_then(|v| serde_json::from_value::<Implementation>(v.clone()).ok()),
        implicit: false,
    }
}

/// Settle the protocol version on what the server answered
fn negotiated_state(requested: NegotiatedState, response: &ServerJsonRpcMessage) -> NegotiatedState {
    let answered = serde_json::to_value(response)
        .ok()
        .and_then(|v| v.pointer("/result/protocolVersion").cloned())
        .and_then(|v| serde_json::from_value(v).ok());

    NegotiatedState {
        protocol_version: answered,
        ..requested
    }
}
