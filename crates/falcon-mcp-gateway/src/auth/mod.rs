//! API-key authentication for the HTTP transport
//!
//! When an API key is configured every request except the health check must
//! carry it in `x-api-key`. Keys are compared as SHA-256 digests.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::warn;
use zeroize::Zeroizing;

use crate::logging::TraceContext;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Paths served without a key
const PUBLIC_PATHS: &[&str] = &["/health"];

/// Configured API key, kept only as its digest
pub struct ApiKeyAuth {
    digest: Zeroizing<[u8; 32]>,
}

impl ApiKeyAuth {
    pub fn new(api_key: &str) -> Self {
        Self {
            digest: Zeroizing::new(sha256(api_key.as_bytes())),
        }
    }

    /// Whether `presented` matches the configured key
    pub fn verify(&self, presented: Option<&str>) -> bool {
        let Some(presented) = presented else {
            return false;
        };
        let candidate = sha256(presented.as_bytes());

        // Full comparison, no early exit
        self.digest
            .iter()
            .zip(candidate.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl std::fmt::Debug for ApiKeyAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKeyAuth([REDACTED])")
    }
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Reject requests without a valid `x-api-key`
pub async fn api_key_middleware(
    State(auth): State<Arc<ApiKeyAuth>>,
    request: Request,
    next: Next,
) -> Response {
    if PUBLIC_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    if !auth.verify(presented) {
        let trace_id = request
            .extensions()
            .get::<TraceContext>()
            .map(|ctx| ctx.trace_id.clone())
            .unwrap_or_else(|| "??????".to_string());
        warn!(trace_id = %trace_id, "[Auth] Invalid or missing API key received.");
        return unauthorized_response();
    }

    next.run(request).await
}

fn unauthorized_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "detail": "Invalid or missing API key" })),
    )
        .into_response()
}
