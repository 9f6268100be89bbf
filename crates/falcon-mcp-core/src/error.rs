//! Error taxonomy
//!
//! - [`ConfigError`]: fatal at startup, the process never starts serving
//! - [`AuthError`]: identity exchange failures, scoped to one request
//! - [`UpstreamError`]: proxied call failures, scoped to one request

use std::time::Duration;

use thiserror::Error;

/// Startup / configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Transport kind is not one the server knows how to run
    #[error("unsupported transport '{0}' (expected one of: stdio, streamable-http)")]
    UnknownTransport(String),

    /// A required option was not provided
    #[error("missing required option {0}")]
    Missing(&'static str),

    /// An option was provided but could not be used
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    /// One or more requested modules do not exist
    #[error("invalid modules: {unknown}. Available modules: {available}")]
    UnknownModules { unknown: String, available: String },

    /// The HTTP listener could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            name,
            reason: reason.into(),
        }
    }
}

/// Identity exchange errors
///
/// `Clone` so that the outcome of one shared refresh can be handed to every
/// caller waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Identity endpoint answered with a non-success status
    #[error("identity endpoint rejected the client credentials (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    /// Network level failure talking to the identity endpoint
    #[error("identity request failed: {0}")]
    Transport(String),

    /// Identity endpoint did not answer in time
    #[error("identity request timed out after {0:?}")]
    Timeout(Duration),

    /// Identity endpoint answered 2xx with an unusable payload
    #[error("invalid token response: {0}")]
    InvalidResponse(String),
}

/// Proxied Falcon API call errors
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// No token could be obtained for the call
    #[error("authentication with the Falcon API failed: {0}")]
    Auth(#[from] AuthError),

    /// Falcon answered with a non-success status; `body` keeps its detail
    #[error("Falcon API returned HTTP {status}")]
    Status {
        status: u16,
        body: serde_json::Value,
    },

    /// Network level failure talking to the Falcon API
    #[error("Falcon API request failed: {0}")]
    Transport(String),

    /// Falcon API did not answer in time
    #[error("Falcon API request timed out after {0:?}")]
    Timeout(Duration),

    /// Operation id is not in the catalog
    #[error("unknown Falcon API operation '{0}'")]
    UnknownOperation(String),
}

impl UpstreamError {
    /// Whether the failure came from the identity exchange
    pub fn is_auth(&self) -> bool {
        matches!(self, UpstreamError::Auth(_))
    }
}
