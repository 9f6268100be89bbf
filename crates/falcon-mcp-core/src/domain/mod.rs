//! Domain entities

mod credential;

pub use credential::{CredentialToken, TokenResponse, DEFAULT_TOKEN_LIFETIME_SECS};
