//! Shared helpers for module tools
//!
//! Every helper returns a JSON value the tool can hand back as is. Failures
//! become an error value `{"error": "<message>: <detail>", "details": ...}`
//! instead of a Rust error, so the model sees what went wrong.

use falcon_mcp_core::UpstreamError;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::upstream::{CommandRequest, FalconApi, UpstreamBody, UpstreamResponse};

/// Collect parameters, leaving out the absent ones
pub fn compact_params<I, K>(params: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (K, Option<Value>)>,
    K: Into<String>,
{
    params
        .into_iter()
        .filter_map(|(key, value)| match value {
            None | Some(Value::Null) => None,
            Some(value) => Some((key.into(), value)),
        })
        .collect()
}

/// Remove null-valued entries
pub fn strip_nulls(params: Map<String, Value>) -> Map<String, Value> {
    params.into_iter().filter(|(_, v)| !v.is_null()).collect()
}

/// Whether a tool output is an error value
pub fn is_error(value: &Value) -> bool {
    value.as_object().is_some_and(|obj| obj.contains_key("error"))
}

/// Build an error value
pub fn format_error(message: &str, details: Value) -> Value {
    json!({
        "error": message,
        "details": details,
    })
}

/// Error value for a call that failed before the API answered
pub fn error_from_upstream(operation: &str, error_message: &str, err: &UpstreamError) -> Value {
    warn!(operation, "[Modules] {}: {}", error_message, err);

    let details = match err {
        UpstreamError::Status { body, .. } => body.clone(),
        _ => Value::Null,
    };
    format_error(&format!("{}: {}", error_message, err), details)
}

/// First `errors[].message` of a Falcon error body
fn upstream_error_detail(status: u16, body: &Value) -> String {
    body.get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status))
}

/// Interpret an API answer
///
/// - 2xx with non-empty `resources`: the resources
/// - 2xx with empty `resources`: `default_result`
/// - 2xx without `resources`: the whole body
/// - otherwise: an error value carrying the upstream detail
pub fn handle_api_response(
    response: UpstreamResponse,
    operation: &str,
    error_message: &str,
    default_result: Value,
) -> Value {
    let status = response.status_code;
    let body = response.json_body();

    if !response.is_success() {
        let detail = upstream_error_detail(status, &body);
        warn!(operation, status, "[Modules] {}: {}", error_message, detail);
        return format_error(&format!("{}: {}", error_message, detail), body);
    }

    match body.get("resources") {
        Some(Value::Array(resources)) if resources.is_empty() => default_result,
        Some(Value::Null) => default_result,
        Some(resources) => resources.clone(),
        None => body,
    }
}

/// Search endpoint call; absent parameters are not sent
pub async fn search(
    api: &dyn FalconApi,
    operation: &str,
    search_params: Map<String, Value>,
    error_message: &str,
    default_result: Value,
) -> Value {
    query(
        api,
        operation,
        Some(search_params),
        None,
        error_message,
        default_result,
    )
    .await
}

/// Generic call with optional query parameters and body
pub async fn query(
    api: &dyn FalconApi,
    operation: &str,
    query_params: Option<Map<String, Value>>,
    body: Option<Value>,
    error_message: &str,
    default_result: Value,
) -> Value {
    let mut request = CommandRequest::new();
    if let Some(params) = query_params {
        request = request.with_parameters(strip_nulls(params));
    }
    if let Some(body) = body {
        request = request.with_body(body);
    }

    match api.command(operation, request).await {
        Ok(response) => handle_api_response(response, operation, error_message, default_result),
        Err(e) => error_from_upstream(operation, error_message, &e),
    }
}

/// Fetch entities by id; `id_key` names the body field carrying the ids
pub async fn get_by_ids(
    api: &dyn FalconApi,
    operation: &str,
    ids: Vec<String>,
    id_key: &str,
    extra_body: Map<String, Value>,
) -> Value {
    let mut body = Map::new();
    body.insert(id_key.to_string(), json!(ids));
    body.extend(strip_nulls(extra_body));

    query(
        api,
        operation,
        None,
        Some(Value::Object(body)),
        "Failed to perform operation",
        json!([]),
    )
    .await
}

/// Download a payload and decode it as UTF-8 text
pub async fn get_binary(
    api: &dyn FalconApi,
    operation: &str,
    params: Map<String, Value>,
    error_message: &str,
) -> Value {
    let request = CommandRequest::new().with_parameters(strip_nulls(params));

    let response = match api.command(operation, request).await {
        Ok(response) => response,
        Err(e) => return error_from_upstream(operation, error_message, &e),
    };

    match response.error_for_status() {
        Ok(UpstreamResponse {
            body: UpstreamBody::Binary(bytes),
            ..
        }) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        Ok(UpstreamResponse {
            body: UpstreamBody::Json(Value::String(text)),
            ..
        }) => Value::String(text),
        Ok(UpstreamResponse {
            body: UpstreamBody::Json(value),
            ..
        }) => match value.get("resources") {
            Some(resources) => resources.clone(),
            None => value,
        },
        Err(UpstreamError::Status { status, body }) => {
            let detail = upstream_error_detail(status, &body);
            warn!(operation, status, "[Modules] {}: {}", error_message, detail);
            format_error(&format!("{}: {}", error_message, detail), body)
        }
        Err(e) => error_from_upstream(operation, error_message, &e),
    }
}
