//! Upstream access token types
//!
//! A `CredentialToken` is never mutated after creation. Refreshing installs a
//! new token, so a reader holding the old one always sees a consistent value.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifetime assumed when the identity endpoint omits `expires_in`
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 1799;

/// Cached Falcon API access token
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialToken {
    /// Bearer token for API calls
    pub access_token: String,

    /// Token type (Falcon answers "bearer")
    pub token_type: String,

    /// Absolute expiry
    pub expires_at: DateTime<Utc>,

    /// Scopes granted, space separated
    #[serde(default)]
    pub scope: Option<String>,

    /// When the token was obtained
    pub issued_at: DateTime<Utc>,
}

/// Token response from the identity endpoint
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl From<TokenResponse> for CredentialToken {
    fn from(response: TokenResponse) -> Self {
        let issued_at = Utc::now();
        let lifetime = response
            .expires_in
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)
            .max(0);

        Self {
            access_token: response.access_token,
            token_type: response.token_type.unwrap_or_else(|| "bearer".to_string()),
            expires_at: issued_at + Duration::seconds(lifetime),
            scope: response.scope,
            issued_at,
        }
    }
}

impl CredentialToken {
    /// Create a bearer token valid for `lifetime` from now
    pub fn new(access_token: impl Into<String>, lifetime: Duration) -> Self {
        let issued_at = Utc::now();
        Self {
            access_token: access_token.into(),
            token_type: "bearer".to_string(),
            expires_at: issued_at + lifetime,
            scope: None,
            issued_at,
        }
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Check if the token expires within the given safety margin
    pub fn expires_within(&self, margin: Duration) -> bool {
        Utc::now() + margin >= self.expires_at
    }

    /// Time left before expiry (zero once expired)
    pub fn remaining(&self) -> Duration {
        (self.expires_at - Utc::now()).max(Duration::zero())
    }

    /// Get the authorization header value
    pub fn authorization_header(&self) -> String {
        let scheme = if self.token_type.eq_ignore_ascii_case("bearer") {
            "Bearer"
        } else {
            self.token_type.as_str()
        };
        format!("{} {}", scheme, self.access_token)
    }

    /// Get scopes as a vector
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_ref()
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default()
    }
}

impl fmt::Debug for CredentialToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialToken")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}
