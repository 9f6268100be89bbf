//! Session Mode Controller
//!
//! The session mode is picked once, when the HTTP service is built:
//!
//! - stateful: rmcp's streamable HTTP service runs with
//!   [`FalconSessionManager`], which keeps sessions in a [`SessionStore`]
//!   until idle eviction or termination
//! - stateless: the service runs without a session manager and every
//!   request is served by a fresh handler instance, so nothing a request
//!   negotiates outlives it

mod manager;
mod store;
mod types;

pub use manager::{sweep_interval, FalconSessionManager, SessionError, ADOPTED_CLIENT_NAME};
pub use store::{InMemorySessionStore, SessionStore};
pub use types::{
    ActiveRequest, NegotiatedState, SessionEntry, SessionId, SessionState, MAX_SESSION_ID_LEN,
};
