//! Tool modules
//!
//! A module groups the tools and resources of one Falcon API area. Modules
//! are enabled at startup by name and talk to the API only through
//! [`FalconApi`].

pub mod base;
mod scheduled_reports;

use std::sync::Arc;

use async_trait::async_trait;
use falcon_mcp_core::ConfigError;
use rmcp::model::{JsonObject, Tool};
use rmcp::ErrorData as McpError;
use serde_json::Value;

use crate::upstream::FalconApi;

pub use scheduled_reports::ScheduledReportsModule;

/// Fixed text document exposed as an MCP resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticResource {
    pub uri: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub mime_type: &'static str,
    pub text: &'static str,
}

#[async_trait]
pub trait Module: Send + Sync {
    fn name(&self) -> &'static str;

    fn tools(&self) -> Vec<Tool>;

    fn resources(&self) -> Vec<StaticResource> {
        Vec::new()
    }

    /// Run one of this module's tools. API failures come back as error
    /// values in the output; `Err` is for malformed arguments.
    async fn call_tool(&self, name: &str, arguments: JsonObject) -> Result<Value, McpError>;
}

/// Names of every module this build ships
pub fn available_modules() -> Vec<&'static str> {
    vec![ScheduledReportsModule::NAME]
}

/// Validate requested module names; `None` selects every module
pub fn resolve_module_names(requested: Option<&[String]>) -> Result<Vec<String>, ConfigError> {
    let available = available_modules();
    let Some(requested) = requested else {
        return Ok(available.iter().map(|m| m.to_string()).collect());
    };

    let unknown: Vec<&str> = requested
        .iter()
        .map(String::as_str)
        .filter(|m| !available.contains(m))
        .collect();
    if !unknown.is_empty() {
        return Err(ConfigError::UnknownModules {
            unknown: unknown.join(", "),
            available: available.join(", "),
        });
    }

    Ok(requested.to_vec())
}

/// Instantiate the enabled modules
pub fn build_modules(
    requested: Option<&[String]>,
    api: Arc<dyn FalconApi>,
) -> Result<Vec<Arc<dyn Module>>, ConfigError> {
    resolve_module_names(requested)?
        .into_iter()
        .map(|name| match name.as_str() {
            ScheduledReportsModule::NAME => {
                Ok(Arc::new(ScheduledReportsModule::new(api.clone())) as Arc<dyn Module>)
            }
            other => Err(ConfigError::UnknownModules {
                unknown: other.to_string(),
                available: available_modules().join(", "),
            }),
        })
        .collect()
}

/// Build a tool definition from its JSON schema
pub(crate) fn tool(name: &str, description: &str, input_schema: Value) -> Tool {
    let input_schema = match input_schema {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    };
    Tool::new(name.to_string(), description.to_string(), Arc::new(input_schema))
}

/// Deserialize tool arguments, reporting problems as invalid params
pub(crate) fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool: &str,
    arguments: JsonObject,
) -> Result<T, McpError> {
    serde_json::from_value(Value::Object(arguments)).map_err(|e| {
        McpError::invalid_params(format!("Invalid arguments for {}: {}", tool, e), None)
    })
}
