use std::time::Duration;

use async_trait::async_trait;
use falcon_mcp_core::{ServerConfig, UpstreamError};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use super::operations;
use crate::credentials::CredentialManager;

/// Arguments of one API call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandRequest {
    /// Query string parameters; arrays are sent as repeated keys, nulls are skipped
    pub parameters: Map<String, Value>,
    /// JSON request body
    pub body: Option<Value>,
}

impl CommandRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamBody {
    Json(Value),
    /// Non-JSON payload, e.g. a downloaded report
    Binary(Vec<u8>),
}

/// Raw API answer: HTTP status plus body
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub status_code: u16,
    pub body: UpstreamBody,
}

impl UpstreamResponse {
    pub fn json(status_code: u16, body: Value) -> Self {
        Self {
            status_code,
            body: UpstreamBody::Json(body),
        }
    }

    pub fn binary(status_code: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status_code,
            body: UpstreamBody::Binary(body.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Body as JSON; binary bodies become a string when they are UTF-8
    pub fn json_body(&self) -> Value {
        match &self.body {
            UpstreamBody::Json(value) => value.clone(),
            UpstreamBody::Binary(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => Value::String(text.to_string()),
                Err(_) => Value::Null,
            },
        }
    }

    /// Turn a non-2xx answer into [`UpstreamError::Status`]
    pub fn error_for_status(self) -> Result<Self, UpstreamError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(UpstreamError::Status {
                status: self.status_code,
                body: self.json_body(),
            })
        }
    }
}

/// Access to the Falcon API by operation id
#[async_trait]
pub trait FalconApi: Send + Sync {
    /// Call one operation. Non-2xx answers are returned, not raised;
    /// errors are reserved for calls that never got an answer.
    async fn command(
        &self,
        operation: &str,
        request: CommandRequest,
    ) -> Result<UpstreamResponse, UpstreamError>;

    /// Whether the API currently accepts our credentials
    async fn check_connectivity(&self) -> bool;
}

/// [`FalconApi`] over HTTPS
pub struct FalconClient {
    http_client: reqwest::Client,
    base_url: Url,
    credentials: CredentialManager,
    user_agent: String,
    timeout: Duration,
}

impl FalconClient {
    pub fn new(
        http_client: reqwest::Client,
        base_url: Url,
        credentials: CredentialManager,
        user_agent: String,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            base_url,
            credentials,
            user_agent,
            timeout,
        }
    }

    pub fn from_config(
        http_client: reqwest::Client,
        config: &ServerConfig,
        credentials: CredentialManager,
    ) -> Self {
        Self::new(
            http_client,
            config.base_url.clone(),
            credentials,
            config.user_agent(),
            config.upstream_timeout,
        )
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    fn build_url(&self, path: &str, parameters: &Map<String, Value>) -> Result<Url, UpstreamError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| UpstreamError::Transport(format!("invalid API URL: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            for (key, value) in parameters {
                match value {
                    Value::Null => {}
                    Value::Array(items) => {
                        for item in items {
                            if let Some(item) = query_value(item) {
                                query.append_pair(key, &item);
                            }
                        }
                    }
                    other => {
                        if let Some(v) = query_value(other) {
                            query.append_pair(key, &v);
                        }
                    }
                }
            }
        }
        // Drop the dangling '?' when nothing was appended
        if url.query() == Some("") {
            url.set_query(None);
        }

        Ok(url)
    }

    fn map_send_error(&self, err: reqwest::Error) -> UpstreamError {
        if err.is_timeout() {
            UpstreamError::Timeout(self.timeout)
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn is_json(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.split(';').next().unwrap_or("").trim())
        .is_some_and(|mime| mime == "application/json" || mime.ends_with("+json"))
}

#[async_trait]
impl FalconApi for FalconClient {
    async fn command(
        &self,
        operation: &str,
        request: CommandRequest,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let op = operations::lookup(operation)
            .ok_or_else(|| UpstreamError::UnknownOperation(operation.to_string()))?;
        let url = self.build_url(op.path, &request.parameters)?;
        let token = self.credentials.get_token().await?;

        debug!(operation, method = ?op.method, url = %url, "[Upstream] Calling Falcon API");

        let mut builder = self
            .http_client
            .request(op.method.into(), url)
            .header(AUTHORIZATION, token.authorization_header())
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/json")
            .timeout(self.timeout);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| self.map_send_error(e))?;
        let status = response.status().as_u16();

        if status == 401 {
            warn!(operation, "[Upstream] Falcon API rejected the access token");
            self.credentials.invalidate(&token);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(|e| self.map_send_error(e))?;

        let body = if bytes.is_empty() {
            UpstreamBody::Json(Value::Null)
        } else if is_json(content_type.as_deref()) {
            match serde_json::from_slice(&bytes) {
                Ok(value) => UpstreamBody::Json(value),
                Err(_) => UpstreamBody::Binary(bytes.to_vec()),
            }
        } else {
            UpstreamBody::Binary(bytes.to_vec())
        };

        debug!(operation, status, "[Upstream] Falcon API answered");

        Ok(UpstreamResponse {
            status_code: status,
            body,
        })
    }

    async fn check_connectivity(&self) -> bool {
        match self.credentials.get_token().await {
            Ok(_) => true,
            Err(e) => {
                warn!("[Upstream] Connectivity check failed: {}", e);
                false
            }
        }
    }
}
