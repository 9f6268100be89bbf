//! Session entities
//!
//! A [`SessionEntry`] is the bookkeeping for one logical client
//! conversation on the HTTP transport. The protocol state itself lives in
//! the rmcp service bound to the session; the entry tracks identity,
//! activity and what was negotiated, and serializes the requests of one
//! session through [`ActiveRequest`].

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rmcp::model::{Implementation, ProtocolVersion};
use rmcp::transport::streamable_http_server::session::SessionId as TransportSessionId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Longest client-supplied session id that is adopted as-is
pub const MAX_SESSION_ID_LEN: usize = 128;

/// `in_flight` value of an entry that no longer accepts requests
const RETIRED: usize = usize::MAX;

/// Opaque session identifier (`Mcp-Session-Id`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(Arc<str>);

impl SessionId {
    /// Fresh random identifier (UUID v4)
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string().into())
    }

    /// Accept a client-supplied identifier if it is well formed:
    /// 1-128 visible ASCII characters
    pub fn parse(raw: &str) -> Option<Self> {
        let well_formed = !raw.is_empty()
            && raw.len() <= MAX_SESSION_ID_LEN
            && raw.bytes().all(|b| (0x21..=0x7e).contains(&b));
        well_formed.then(|| Self(raw.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id in the form the HTTP transport hands around
    pub fn to_transport(&self) -> TransportSessionId {
        self.0.clone()
    }
}

impl From<TransportSessionId> for SessionId {
    fn from(id: TransportSessionId) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session lifecycle: `Created -> Active -> Idle -> Evicted`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Active,
    Idle,
    Evicted,
}

/// Protocol state agreed during `initialize`
#[derive(Debug, Clone, Default)]
pub struct NegotiatedState {
    pub protocol_version: Option<ProtocolVersion>,
    pub client_info: Option<Implementation>,
    /// Handshake run by the server for an id it did not issue
    pub implicit: bool,
}

impl NegotiatedState {
    pub fn is_negotiated(&self) -> bool {
        self.protocol_version.is_some()
    }
}

/// One logical client conversation
pub struct SessionEntry {
    id: SessionId,
    /// Id of the rmcp worker serving this session; differs from `id` for
    /// adopted sessions
    worker_id: TransportSessionId,
    created_at: DateTime<Utc>,
    last_activity: Mutex<Instant>,
    negotiated: Mutex<NegotiatedState>,
    in_flight: AtomicUsize,
    requests_served: AtomicU64,
    turn: Arc<AsyncMutex<()>>,
    cancel: CancellationToken,
}

impl SessionEntry {
    pub fn new(id: SessionId, worker_id: TransportSessionId) -> Arc<Self> {
        Arc::new(Self {
            id,
            worker_id,
            created_at: Utc::now(),
            last_activity: Mutex::new(Instant::now()),
            negotiated: Mutex::new(NegotiatedState::default()),
            in_flight: AtomicUsize::new(0),
            requests_served: AtomicU64::new(0),
            turn: Arc::new(AsyncMutex::new(())),
            cancel: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn worker_id(&self) -> &TransportSessionId {
        &self.worker_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    pub fn requests_served(&self) -> u64 {
        self.requests_served.load(Ordering::Acquire)
    }

    pub fn negotiated(&self) -> NegotiatedState {
        self.negotiated.lock().clone()
    }

    pub(crate) fn update_negotiated(&self, update: impl FnOnce(&mut NegotiatedState)) {
        update(&mut self.negotiated.lock());
    }

    pub fn state(&self) -> SessionState {
        match self.in_flight.load(Ordering::Acquire) {
            RETIRED => SessionState::Evicted,
            0 if self.requests_served() == 0 => SessionState::Created,
            0 => SessionState::Idle,
            _ => SessionState::Active,
        }
    }

    /// Cancelled when the session is evicted or terminated
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_retired(&self) -> bool {
        self.in_flight.load(Ordering::Acquire) == RETIRED
    }

    pub(crate) fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Start a request on this session
    ///
    /// Waits for the previous request of the session to finish. Returns
    /// `None` once the session is retired.
    pub(crate) async fn begin_request(self: &Arc<Self>) -> Option<ActiveRequest> {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n != RETIRED).then(|| n + 1)
            })
            .ok()?;
        self.touch();

        let turn = self.turn.clone().lock_owned().await;
        // Terminated while we waited
        if self.is_retired() {
            return None;
        }
        self.requests_served.fetch_add(1, Ordering::AcqRel);

        Some(ActiveRequest {
            entry: self.clone(),
            _turn: turn,
        })
    }

    /// Retire the session if it has been idle for at least `timeout`.
    /// Fails while a request is in flight.
    pub(crate) fn retire_if_idle(&self, timeout: Duration, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_activity()) < timeout {
            return false;
        }
        let retired = self
            .in_flight
            .compare_exchange(0, RETIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if retired {
            self.cancel.cancel();
        }
        retired
    }

    /// Retire the session whatever it is doing
    pub(crate) fn retire(&self) {
        self.in_flight.store(RETIRED, Ordering::Release);
        self.cancel.cancel();
    }
}

impl fmt::Debug for SessionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEntry")
            .field("id", &self.id)
            .field("worker_id", &self.worker_id)
            .field("created_at", &self.created_at)
            .field("state", &self.state())
            .field("requests_served", &self.requests_served())
            .finish()
    }
}

/// A request in flight on a session
///
/// Holds the session's turn, so requests of one session run one after the
/// other. Dropping it marks the session idle again.
pub struct ActiveRequest {
    entry: Arc<SessionEntry>,
    _turn: OwnedMutexGuard<()>,
}

impl ActiveRequest {
    pub fn entry(&self) -> &Arc<SessionEntry> {
        &self.entry
    }
}

impl Drop for ActiveRequest {
    fn drop(&mut self) {
        self.entry.touch();
        let _ = self
            .entry
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n != RETIRED && n > 0).then(|| n - 1)
            });
    }
}

impl fmt::Debug for ActiveRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveRequest")
            .field("session", self.entry.id())
            .finish()
    }
}
