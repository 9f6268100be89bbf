//! # Falcon MCP Core Library
//!
//! Configuration, error taxonomy and domain types shared by the Falcon MCP
//! server crates.
//!
//! ## Modules
//!
//! - `branding` - Product naming, defaults and environment variable names
//! - `config` - Immutable process-wide server configuration
//! - `domain` - Core entities (CredentialToken)
//! - `error` - Startup, authentication and upstream error types

pub mod branding;
pub mod config;
pub mod domain;
pub mod error;

// Re-export commonly used types
pub use config::{
    ClientCredentials, ServerConfig, ServerConfigBuilder, SessionMode, TransportKind,
};
pub use domain::*;
pub use error::{AuthError, ConfigError, UpstreamError};
