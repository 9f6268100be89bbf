//! Falcon MCP request handler
//!
//! Implements rmcp's `ServerHandler` for the core tools and the enabled
//! modules. The handler holds no per-client state: whatever a client
//! negotiated lives in the rmcp service of its session, so the same handler
//! serves stdio, stateful HTTP and stateless HTTP.

use std::collections::HashMap;
use std::sync::Arc;

use falcon_mcp_core::{branding, ConfigError, ServerConfig};
use rmcp::{
    model::*,
    service::{NotificationContext, RequestContext},
    ErrorData as McpError, RoleServer, ServerHandler,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::context::{extract_session_id, extract_trace_id};
use crate::modules::{self, base, Module, StaticResource};
use crate::upstream::FalconApi;

const CHECK_CONNECTIVITY: &str = "falcon_check_connectivity";
const LIST_ENABLED_MODULES: &str = "falcon_list_enabled_modules";
const LIST_MODULES: &str = "falcon_list_modules";

/// Entry point for every MCP request, whatever the transport
#[derive(Clone)]
pub struct FalconMcpHandler {
    api: Arc<dyn FalconApi>,
    enabled_modules: Arc<[String]>,
    tools: Arc<[Tool]>,
    /// Tool name -> module that serves it
    tool_owners: Arc<HashMap<String, Arc<dyn Module>>>,
    resources: Arc<[StaticResource]>,
}

impl FalconMcpHandler {
    pub fn new(api: Arc<dyn FalconApi>, modules: Vec<Arc<dyn Module>>) -> Self {
        let mut tools = core_tools();
        let mut tool_owners = HashMap::new();
        let mut resources = Vec::new();
        let mut enabled_modules = Vec::new();

        for module in modules {
            enabled_modules.push(module.name().to_string());

            for tool in module.tools() {
                let name = tool.name.to_string();
                if tool_owners.contains_key(&name) || is_core_tool(&name) {
                    warn!(tool = %name, module = module.name(), "[Modules] Duplicate tool name ignored");
                    continue;
                }
                tool_owners.insert(name, module.clone());
                tools.push(tool);
            }
            resources.extend(module.resources());

            debug!(module = module.name(), "[Modules] Registered");
        }

        info!(
            modules = ?enabled_modules,
            tools = tools.len(),
            resources = resources.len(),
            "[Modules] Tool registry ready"
        );

        Self {
            api,
            enabled_modules: enabled_modules.into(),
            tools: tools.into(),
            tool_owners: Arc::new(tool_owners),
            resources: resources.into(),
        }
    }

    /// Build the handler with the modules enabled in `config`
    pub fn from_config(config: &ServerConfig, api: Arc<dyn FalconApi>) -> Result<Self, ConfigError> {
        let modules = modules::build_modules(config.enabled_modules.as_deref(), api.clone())?;
        Ok(Self::new(api, modules))
    }

    pub fn enabled_modules(&self) -> &[String] {
        &self.enabled_modules
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Negotiate protocol version between client and server.
    /// The client's version if we support it, otherwise our latest.
    fn negotiate_protocol_version(&self, client_version: &str) -> ProtocolVersion {
        let our_max_version = ProtocolVersion::LATEST;
        let our_max_str = our_max_version.to_string();

        if client_version > our_max_str.as_str() {
            debug!(
                client_version = %client_version,
                our_max = %our_max_str,
                "[MCP] Client uses newer protocol, negotiating down"
            );
            our_max_version
        } else {
            serde_json::from_value(Value::String(client_version.to_string()))
                .unwrap_or(our_max_version)
        }
    }

    fn build_initialize_result(&self, protocol_version: ProtocolVersion) -> InitializeResult {
        let info = self.get_info();
        InitializeResult {
            protocol_version,
            capabilities: info.capabilities,
            server_info: info.server_info,
            instructions: info.instructions,
        }
    }

    /// Run a core or module tool
    pub async fn run_tool(&self, name: &str, arguments: JsonObject) -> Result<CallToolResult, McpError> {
        let output = match name {
            CHECK_CONNECTIVITY => json!({ "connected": self.api.check_connectivity().await }),
            LIST_ENABLED_MODULES => json!({ "modules": &*self.enabled_modules }),
            LIST_MODULES => json!({ "modules": modules::available_modules() }),
            _ => {
                let module = self.tool_owners.get(name).ok_or_else(|| {
                    McpError::invalid_params(format!("Unknown tool: {}", name), None)
                })?;
                module.call_tool(name, arguments).await?
            }
        };

        let result = tool_output(output);
        debug!(tool = %name, is_error = ?result.is_error, "[MCP] call_tool result");
        Ok(result)
    }

    pub fn resource_list(&self) -> Result<Vec<Resource>, McpError> {
        self.resources
            .iter()
            .map(|r| {
                serde_json::from_value(json!({
                    "uri": r.uri,
                    "name": r.name,
                    "description": r.description,
                    "mimeType": r.mime_type,
                }))
                .map_err(|e| McpError::internal_error(format!("Invalid resource {}: {}", r.uri, e), None))
            })
            .collect()
    }

    pub fn resource_contents(&self, uri: &str) -> Result<ReadResourceResult, McpError> {
        let resource = self
            .resources
            .iter()
            .find(|r| r.uri == uri)
            .ok_or_else(|| McpError::invalid_params(format!("Resource '{}' not found", uri), None))?;

        let contents: ResourceContents = serde_json::from_value(json!({
            "uri": resource.uri,
            "mimeType": resource.mime_type,
            "text": resource.text,
        }))
        .map_err(|e| McpError::internal_error(format!("Invalid resource {}: {}", uri, e), None))?;

        Ok(ReadResourceResult {
            contents: vec![contents],
        })
    }
}

impl ServerHandler for FalconMcpHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder()
                .enable_tools_with(ToolsCapability {
                    list_changed: Some(false),
                })
                .enable_resources_with(ResourcesCapability {
                    subscribe: Some(false),
                    list_changed: Some(false),
                })
                .build(),
            server_info: Implementation {
                name: branding::SERVER_NAME.to_string(),
                version: branding::VERSION.to_string(),
                ..Default::default()
            },
            instructions: Some(branding::INSTRUCTIONS.to_string()),
        }
    }

    async fn initialize(
        &self,
        params: InitializeRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        let client_version = params.protocol_version.to_string();
        let protocol_version = self.negotiate_protocol_version(&client_version);

        info!(
            trace_id = extract_trace_id(&context.extensions).as_deref().unwrap_or("-"),
            client = %params.client_info.name,
            protocol_version = %protocol_version,
            "[MCP] Client initializing"
        );

        // Keep the client's info on the session peer
        if context.peer.peer_info().is_none() {
            context.peer.set_peer_info(params);
        }

        Ok(self.build_initialize_result(protocol_version))
    }

    async fn on_initialized(&self, context: NotificationContext<RoleServer>) {
        debug!(
            session = extract_session_id(&context.extensions).as_deref().unwrap_or("-"),
            "[MCP] Client initialized"
        );
    }

    async fn list_tools(
        &self,
        _params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        debug!(count = self.tools.len(), "[MCP] list_tools");
        Ok(ListToolsResult::with_all_items(self.tools.to_vec()))
    }

    async fn call_tool(
        &self,
        params: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        info!(
            tool = %params.name,
            trace_id = extract_trace_id(&context.extensions).as_deref().unwrap_or("-"),
            session = extract_session_id(&context.extensions).as_deref().unwrap_or("-"),
            "[MCP] call_tool"
        );

        // Cancelled on notifications/cancelled, session termination or
        // transport shutdown
        tokio::select! {
            _ = context.ct.cancelled() => {
                warn!(tool = %params.name, "[MCP] Tool call aborted");
                Err(McpError::internal_error("Request cancelled", None))
            }
            result = self.run_tool(&params.name, params.arguments.clone().unwrap_or_default()) => result,
        }
    }

    async fn list_resources(
        &self,
        _params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult::with_all_items(self.resource_list()?))
    }

    async fn read_resource(
        &self,
        params: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        self.resource_contents(&params.uri)
    }
}

fn is_core_tool(name: &str) -> bool {
    matches!(name, CHECK_CONNECTIVITY | LIST_ENABLED_MODULES | LIST_MODULES)
}

fn core_tools() -> Vec<Tool> {
    let no_arguments = json!({ "type": "object", "properties": {} });
    vec![
        modules::tool(
            CHECK_CONNECTIVITY,
            "Check connectivity to the Falcon API.",
            no_arguments.clone(),
        ),
        modules::tool(
            LIST_ENABLED_MODULES,
            "Lists enabled modules in the falcon-mcp server. These modules are determined by \
             the --modules flag when starting the server. If no modules are specified, all \
             available modules are enabled.",
            no_arguments.clone(),
        ),
        modules::tool(
            LIST_MODULES,
            "Lists all available modules in the falcon-mcp server.",
            no_arguments,
        ),
    ]
}

/// Wrap a tool's JSON output as text content; error values mark the result failed
fn tool_output(output: Value) -> CallToolResult {
    let is_error = base::is_error(&output)
        || output
            .as_array()
            .is_some_and(|items| items.len() == 1 && base::is_error(&items[0]));

    let text = match output {
        Value::String(text) => text,
        other => serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string()),
    };

    CallToolResult {
        content: vec![Content::text(text)],
        structured_content: None,
        is_error: Some(is_error),
        meta: None,
    }
}
