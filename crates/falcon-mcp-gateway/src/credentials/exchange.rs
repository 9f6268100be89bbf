//! Client-credential exchange against the Falcon identity endpoint

use std::time::Duration;

use async_trait::async_trait;
use falcon_mcp_core::{AuthError, ClientCredentials, ServerConfig, TokenResponse};
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

/// Longest response body kept in an [`AuthError::Rejected`]
const MAX_ERROR_BODY: usize = 2048;

/// One client-credential exchange
///
/// The seam the [`super::CredentialManager`] refreshes through; tests swap in
/// counting or failing implementations.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self) -> Result<TokenResponse, AuthError>;
}

/// `POST {base_url}/oauth2/token` with form-encoded client credentials
pub struct FalconIdentityClient {
    http_client: reqwest::Client,
    token_url: Url,
    credentials: ClientCredentials,
    user_agent: String,
    timeout: Duration,
}

impl FalconIdentityClient {
    pub fn new(
        http_client: reqwest::Client,
        token_url: Url,
        credentials: ClientCredentials,
        user_agent: String,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            token_url,
            credentials,
            user_agent,
            timeout,
        }
    }

    pub fn from_config(
        http_client: reqwest::Client,
        config: &ServerConfig,
    ) -> Result<Self, url::ParseError> {
        Ok(Self::new(
            http_client,
            config.api_url("oauth2/token")?,
            config.credentials.clone(),
            config.user_agent(),
            config.auth_timeout,
        ))
    }

    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    fn map_send_error(&self, err: reqwest::Error) -> AuthError {
        if err.is_timeout() {
            AuthError::Timeout(self.timeout)
        } else {
            AuthError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl TokenExchange for FalconIdentityClient {
    async fn exchange(&self) -> Result<TokenResponse, AuthError> {
        debug!(url = %self.token_url, "[Credentials] Requesting access token");

        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.secret()),
        ];

        let response = self
            .http_client
            .post(self.token_url.clone())
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/json")
            .timeout(self.timeout)
            .form(&params)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        // Falcon answers 201 Created on success
        if status != StatusCode::OK && status != StatusCode::CREATED {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                AuthError::Timeout(self.timeout)
            } else {
                AuthError::InvalidResponse(e.to_string())
            }
        })?;

        if token.access_token.trim().is_empty() {
            return Err(AuthError::InvalidResponse(
                "access_token is empty".to_string(),
            ));
        }

        Ok(token)
    }
}
