//! Single-flight token cache

use std::sync::Arc;
use std::time::Duration;

use falcon_mcp_core::{AuthError, CredentialToken};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::TokenExchange;

type RefreshFuture = Shared<BoxFuture<'static, Result<Arc<CredentialToken>, AuthError>>>;

struct Inner {
    exchange: Arc<dyn TokenExchange>,
    cached: RwLock<Option<Arc<CredentialToken>>>,
    /// Pending refresh that concurrent callers attach to
    in_flight: Mutex<Option<RefreshFuture>>,
    refresh_margin: chrono::Duration,
    timeout: Duration,
}

/// Process-wide access token cache
///
/// At most one identity exchange runs at a time. Callers that find the cache
/// stale while an exchange is running await that same exchange and share its
/// outcome, success or failure.
#[derive(Clone)]
pub struct CredentialManager {
    inner: Arc<Inner>,
}

impl CredentialManager {
    pub fn new(exchange: Arc<dyn TokenExchange>, refresh_margin: Duration, timeout: Duration) -> Self {
        let refresh_margin = chrono::Duration::from_std(refresh_margin)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));

        Self {
            inner: Arc::new(Inner {
                exchange,
                cached: RwLock::new(None),
                in_flight: Mutex::new(None),
                refresh_margin,
                timeout,
            }),
        }
    }

    /// Current token, refreshing it first if it expires within the margin
    pub async fn get_token(&self) -> Result<Arc<CredentialToken>, AuthError> {
        if let Some(token) = self.fresh_cached() {
            return Ok(token);
        }

        let refresh = {
            let mut in_flight = self.inner.in_flight.lock();
            // Another caller may have finished a refresh while we waited
            if let Some(token) = self.fresh_cached() {
                return Ok(token);
            }
            match in_flight.as_ref() {
                Some(pending) => pending.clone(),
                None => {
                    let pending = self.start_refresh();
                    *in_flight = Some(pending.clone());
                    pending
                }
            }
        };

        refresh.await
    }

    /// Drop `token` from the cache after the API rejected it.
    /// A newer token installed in the meantime is kept.
    pub fn invalidate(&self, token: &CredentialToken) {
        let mut cached = self.inner.cached.write();
        if cached
            .as_ref()
            .is_some_and(|current| current.access_token == token.access_token)
        {
            *cached = None;
            info!("[Credentials] Cached token invalidated after upstream rejection");
        }
    }

    /// Cached token regardless of freshness
    pub fn cached_token(&self) -> Option<Arc<CredentialToken>> {
        self.inner.cached.read().clone()
    }

    pub fn refresh_in_flight(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    fn fresh_cached(&self) -> Option<Arc<CredentialToken>> {
        self.inner
            .cached
            .read()
            .as_ref()
            .filter(|token| !token.expires_within(self.inner.refresh_margin))
            .cloned()
    }

    fn start_refresh(&self) -> RefreshFuture {
        let inner = self.inner.clone();

        async move {
            debug!("[Credentials] Starting token refresh");

            let result = match tokio::time::timeout(inner.timeout, inner.exchange.exchange()).await {
                Ok(Ok(response)) => Ok(Arc::new(CredentialToken::from(response))),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(AuthError::Timeout(inner.timeout)),
            };

            match &result {
                Ok(token) => {
                    *inner.cached.write() = Some(token.clone());
                    info!(
                        expires_in_secs = token.remaining().num_seconds(),
                        "[Credentials] Access token refreshed"
                    );
                }
                // A still-valid cached token is left in place
                Err(e) => warn!("[Credentials] Token refresh failed: {}", e),
            }

            *inner.in_flight.lock() = None;
            result
        }
        .boxed()
        .shared()
    }
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("cached", &self.cached_token())
            .field("refresh_margin", &self.inner.refresh_margin)
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}
