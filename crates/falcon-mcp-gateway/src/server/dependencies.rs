//! Dependency Injection Container
//!
//! Everything the server talks to that lives outside the process (the Falcon
//! API, the identity endpoint, a session store) is injected here, so tests
//! can swap in fakes.

use std::sync::Arc;

use falcon_mcp_core::{ConfigError, ServerConfig};

use crate::credentials::{CredentialManager, FalconIdentityClient};
use crate::session::SessionStore;
use crate::upstream::{FalconApi, FalconClient};

/// Dependency container for [`super::FalconMcpServer`]
#[derive(Clone)]
pub struct ServerDependencies {
    pub api: Arc<dyn FalconApi>,
    /// Token cache, warmed up at startup when present
    pub credentials: Option<CredentialManager>,
    /// Store for stateful sessions; in-memory when absent
    pub session_store: Option<Arc<dyn SessionStore>>,
}

impl ServerDependencies {
    /// Production wiring: reqwest client, identity exchange, token cache
    /// and Falcon API client built from `config`
    pub fn from_config(config: &ServerConfig) -> Result<Self, ConfigError> {
        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| ConfigError::invalid("http client", e.to_string()))?;

        let identity = FalconIdentityClient::from_config(http_client.clone(), config)
            .map_err(|e| ConfigError::invalid("base url", e.to_string()))?;
        let credentials = CredentialManager::new(
            Arc::new(identity),
            config.token_refresh_margin,
            config.auth_timeout,
        );
        let api = FalconClient::from_config(http_client, config, credentials.clone());

        DependenciesBuilder::new()
            .with_api(Arc::new(api))
            .with_credentials(credentials)
            .build()
    }
}

/// Builder for [`ServerDependencies`]
pub struct DependenciesBuilder {
    api: Option<Arc<dyn FalconApi>>,
    credentials: Option<CredentialManager>,
    session_store: Option<Arc<dyn SessionStore>>,
}

impl DependenciesBuilder {
    pub fn new() -> Self {
        Self {
            api: None,
            credentials: None,
            session_store: None,
        }
    }

    pub fn with_api(mut self, api: Arc<dyn FalconApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn with_credentials(mut self, credentials: CredentialManager) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    pub fn build(self) -> Result<ServerDependencies, ConfigError> {
        Ok(ServerDependencies {
            api: self.api.ok_or(ConfigError::Missing("api"))?,
            credentials: self.credentials,
            session_store: self.session_store,
        })
    }
}

impl Default for DependenciesBuilder {
    fn default() -> Self {
        Self::new()
    }
}
