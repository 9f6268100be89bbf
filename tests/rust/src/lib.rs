//! Shared test utilities and fixtures for Falcon MCP integration tests.

pub use falcon_mcp_core::{AuthError, ServerConfig, ServerConfigBuilder, SessionMode, TokenResponse};
pub use falcon_mcp_gateway::{
    CommandRequest, DependenciesBuilder, FalconApi, FalconMcpServer, ServerDependencies,
    UpstreamResponse,
};

/// Mock API and token exchange implementations
pub mod mocks {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use falcon_mcp_core::{AuthError, TokenResponse, UpstreamError};
    use falcon_mcp_gateway::credentials::TokenExchange;
    use falcon_mcp_gateway::upstream::{CommandRequest, FalconApi, UpstreamResponse};
    use parking_lot::Mutex;
    use serde_json::json;

    /// [`FalconApi`] answering from canned responses and recording every call
    pub struct MockFalconApi {
        responses: Mutex<HashMap<String, UpstreamResponse>>,
        calls: Mutex<Vec<(String, CommandRequest)>>,
        connected: bool,
        delay: Duration,
    }

    impl MockFalconApi {
        pub fn new() -> Self {
            Self {
                responses: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
                connected: true,
                delay: Duration::ZERO,
            }
        }

        /// Answer `operation` with `response` from now on
        pub fn respond(self, operation: &str, response: UpstreamResponse) -> Self {
            self.responses.lock().insert(operation.to_string(), response);
            self
        }

        pub fn disconnected(mut self) -> Self {
            self.connected = false;
            self
        }

        /// Hold every command for `delay` before answering
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn calls(&self) -> Vec<(String, CommandRequest)> {
            self.calls.lock().clone()
        }

        pub fn calls_to(&self, operation: &str) -> Vec<CommandRequest> {
            self.calls
                .lock()
                .iter()
                .filter(|(op, _)| op == operation)
                .map(|(_, request)| request.clone())
                .collect()
        }
    }

    impl Default for MockFalconApi {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl FalconApi for MockFalconApi {
        async fn command(
            &self,
            operation: &str,
            request: CommandRequest,
        ) -> Result<UpstreamResponse, UpstreamError> {
            self.calls.lock().push((operation.to_string(), request));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let response = self.responses.lock().get(operation).cloned();
            Ok(response.unwrap_or_else(|| UpstreamResponse::json(200, json!({"resources": []}))))
        }

        async fn check_connectivity(&self) -> bool {
            self.connected
        }
    }

    /// [`TokenExchange`] handing out "token-1", "token-2", ...
    pub struct MockTokenExchange {
        calls: AtomicUsize,
        expires_in: i64,
        delay: Duration,
        fail: Mutex<bool>,
    }

    impl MockTokenExchange {
        pub fn new(expires_in: i64) -> Arc<Self> {
            Self::with_delay(expires_in, Duration::ZERO)
        }

        pub fn with_delay(expires_in: i64, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                expires_in,
                delay,
                fail: Mutex::new(false),
            })
        }

        pub fn set_failing(&self, fail: bool) {
            *self.fail.lock() = fail;
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenExchange for MockTokenExchange {
        async fn exchange(&self) -> Result<TokenResponse, AuthError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if *self.fail.lock() {
                return Err(AuthError::Rejected {
                    status: 401,
                    body: "access denied".to_string(),
                });
            }
            Ok(TokenResponse {
                access_token: format!("token-{}", n),
                token_type: Some("bearer".to_string()),
                expires_in: Some(self.expires_in),
                scope: None,
            })
        }
    }
}

/// Configuration fixtures
pub mod fixtures {
    use std::sync::Arc;

    use falcon_mcp_core::{ServerConfig, ServerConfigBuilder};
    use falcon_mcp_gateway::{DependenciesBuilder, FalconApi, FalconMcpServer};

    pub const CLIENT_ID: &str = "test-client-id";
    pub const CLIENT_SECRET: &str = "test-client-secret";

    /// Valid configuration with test credentials
    pub fn test_config() -> ServerConfigBuilder {
        ServerConfig::builder()
            .client_id(CLIENT_ID)
            .client_secret(CLIENT_SECRET)
    }

    /// Streamable HTTP configuration on loopback
    pub fn http_config() -> ServerConfigBuilder {
        test_config()
            .transport("streamable-http")
            .host("127.0.0.1")
            .port(0)
    }

    /// Server backed by an injected API
    pub fn server_with_api(config: ServerConfigBuilder, api: Arc<dyn FalconApi>) -> FalconMcpServer {
        let config = Arc::new(config.build().expect("test config is valid"));
        let dependencies = DependenciesBuilder::new()
            .with_api(api)
            .build()
            .expect("api is set");
        FalconMcpServer::new(config, dependencies).expect("server builds")
    }
}

/// JSON-RPC message builders
pub mod messages {
    use serde_json::{json, Value};

    /// Protocol version sent by test clients
    pub const CLIENT_PROTOCOL_VERSION: &str = "2025-03-26";

    pub fn initialize(id: i64) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "initialize",
            "params": {
                "protocolVersion": CLIENT_PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {"name": "integration-test", "version": "1.0.0"}
            }
        })
    }

    pub fn initialized() -> Value {
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"})
    }

    pub fn request(id: i64, method: &str, params: Value) -> Value {
        json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
    }

    pub fn call_tool(id: i64, name: &str, arguments: Value) -> Value {
        request(id, "tools/call", json!({"name": name, "arguments": arguments}))
    }

    /// Text of the first content item of a `tools/call` response
    pub fn tool_text(response: &Value) -> &str {
        response["result"]["content"][0]["text"]
            .as_str()
            .expect("tool result carries text content")
    }

    /// Text of a `tools/call` response parsed as JSON
    pub fn tool_json(response: &Value) -> Value {
        serde_json::from_str(tool_text(response)).expect("tool text is JSON")
    }

    pub fn tool_is_error(response: &Value) -> bool {
        response["result"]["isError"].as_bool().unwrap_or(false)
    }
}

/// HTTP server harness
pub mod http {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use falcon_mcp_gateway::FalconMcpServer;
    use serde_json::Value;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;
    use tokio_util::sync::CancellationToken;

    pub const SESSION_HEADER: &str = "mcp-session-id";
    pub const ACCEPT_JSON: &str = "application/json";
    pub const ACCEPT_BOTH: &str = "application/json, text/event-stream";

    /// A server listening on an ephemeral loopback port
    pub struct TestServer {
        pub addr: SocketAddr,
        pub server: Arc<FalconMcpServer>,
        client: reqwest::Client,
        shutdown: CancellationToken,
        handle: Option<JoinHandle<()>>,
    }

    /// Status, session header and decoded JSON-RPC messages of one POST
    #[derive(Debug)]
    pub struct Reply {
        pub status: u16,
        pub session_id: Option<String>,
        pub messages: Vec<Value>,
    }

    impl Reply {
        pub async fn read(response: reqwest::Response) -> Self {
            let status = response.status().as_u16();
            let session_id = session_header(&response);
            let is_json = response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.starts_with("application/json"));
            let body = response.text().await.expect("body is readable");

            let messages = if is_json {
                serde_json::from_str(&body).into_iter().collect()
            } else {
                sse_messages(&body)
            };
            Self {
                status,
                session_id,
                messages,
            }
        }

        /// The single JSON-RPC message the request was answered with
        pub fn message(&self) -> &Value {
            assert_eq!(self.messages.len(), 1, "one message in {:?}", self.messages);
            &self.messages[0]
        }
    }

    impl TestServer {
        pub async fn start(server: FalconMcpServer) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
            let addr = listener.local_addr().expect("local addr");
            let server = Arc::new(server);
            let shutdown = CancellationToken::new();

            let handle = tokio::spawn({
                let server = server.clone();
                let shutdown = shutdown.clone();
                async move {
                    server
                        .serve_http(listener, shutdown)
                        .await
                        .expect("http server runs");
                }
            });

            Self {
                addr,
                server,
                client: reqwest::Client::new(),
                shutdown,
                handle: Some(handle),
            }
        }

        pub fn url(&self, path: &str) -> String {
            format!("http://{}{}", self.addr, path)
        }

        pub fn client(&self) -> &reqwest::Client {
            &self.client
        }

        /// POST one JSON-RPC message to `/mcp` and read the whole answer
        pub async fn post(&self, body: &Value, session_id: Option<&str>) -> Reply {
            Reply::read(self.post_with_accept(body, session_id, ACCEPT_BOTH).await).await
        }

        pub async fn post_with_accept(
            &self,
            body: &Value,
            session_id: Option<&str>,
            accept: &str,
        ) -> reqwest::Response {
            let mut request = self
                .client
                .post(self.url("/mcp"))
                .header("accept", accept)
                .json(body);
            if let Some(id) = session_id {
                request = request.header(SESSION_HEADER, id);
            }
            request.send().await.expect("request reaches the server")
        }

        /// Run the handshake and return the issued session id
        pub async fn open_session(&self) -> String {
            let reply = self.post(&crate::messages::initialize(1), None).await;
            let session_id = reply.session_id.expect("initialize issues a session id");
            self.post(&crate::messages::initialized(), Some(&session_id))
                .await;
            session_id
        }

        /// DELETE `/mcp` with an optional session header
        pub async fn delete(&self, session_id: Option<&str>) -> reqwest::Response {
            let mut request = self.client.delete(self.url("/mcp"));
            if let Some(id) = session_id {
                request = request.header(SESSION_HEADER, id);
            }
            request.send().await.expect("request reaches the server")
        }

        pub async fn health(&self) -> Value {
            self.client
                .get(self.url("/health"))
                .send()
                .await
                .expect("request reaches the server")
                .json()
                .await
                .expect("health body is JSON")
        }

        /// Stop the listener and wait for it to close
        pub async fn stop(mut self) {
            self.shutdown.cancel();
            if let Some(handle) = self.handle.take() {
                let _ = handle.await;
            }
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            self.shutdown.cancel();
        }
    }

    pub fn session_header(response: &reqwest::Response) -> Option<String> {
        response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    }

    /// JSON data of every message event in an SSE body
    ///
    /// Priming events and comments carry no JSON and are skipped.
    pub fn sse_messages(body: &str) -> Vec<Value> {
        let mut messages = Vec::new();
        for event in body.replace("\r\n", "\n").split("\n\n") {
            let mut is_message = true;
            let mut data = String::new();
            for line in event.lines() {
                if let Some(name) = line.strip_prefix("event:") {
                    is_message = name.trim() == "message";
                } else if let Some(chunk) = line.strip_prefix("data:") {
                    data.push_str(chunk.strip_prefix(' ').unwrap_or(chunk));
                }
            }
            if !is_message || data.trim().is_empty() {
                continue;
            }
            if let Ok(message) = serde_json::from_str(&data) {
                messages.push(message);
            }
        }
        messages
    }
}

/// rmcp clients connected to a server under test
pub mod client {
    use rmcp::model::{ClientCapabilities, ClientInfo, Implementation};
    use rmcp::service::RunningService;
    use rmcp::transport::StreamableHttpClientTransport;
    use rmcp::{RoleClient, ServiceExt};

    pub const CLIENT_NAME: &str = "integration-test";

    pub fn client_info() -> ClientInfo {
        ClientInfo {
            protocol_version: Default::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: CLIENT_NAME.into(),
                version: "1.0.0".into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Connect and complete the handshake over Streamable HTTP
    pub async fn connect_http(url: String) -> RunningService<RoleClient, ClientInfo> {
        let transport = StreamableHttpClientTransport::from_uri(url);
        client_info()
            .serve(transport)
            .await
            .expect("client connects")
    }
}
