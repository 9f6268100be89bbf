//! Credential Manager
//!
//! Acquires and caches the Falcon API access token obtained through the
//! OAuth2 client-credential exchange. The cache is process-wide and shared
//! by every session, whatever the session mode.

mod exchange;
mod manager;

pub use exchange::{FalconIdentityClient, TokenExchange};
pub use manager::CredentialManager;
