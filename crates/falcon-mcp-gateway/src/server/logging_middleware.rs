//! HTTP Request/Response Logging Middleware
//!
//! One entry and one exit line per request, correlated by a short trace id.
//! The trace context is stored in request extensions for downstream use.

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use falcon_mcp_core::branding;
use http_body_util::BodyExt;
use tracing::{debug, warn, Instrument};

use crate::logging::{RequestSpan, TraceContext};
use crate::mcp::SESSION_ID_HEADER;

/// Largest body read for logging (1MB)
const MAX_BODY_LOG_SIZE: usize = 1024 * 1024;

/// Headers whose values are never logged
const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie", "x-api-key"];

/// Headers worth logging at DEBUG, with secrets redacted
fn redact_headers_compact(headers: &HeaderMap) -> String {
    headers
        .iter()
        .filter(|(name, _)| {
            matches!(
                name.as_str(),
                "content-type"
                    | "accept"
                    | "user-agent"
                    | "mcp-session-id"
                    | "mcp-protocol-version"
                    | "x-api-key"
                    | "authorization"
            )
        })
        .map(|(name, value)| {
            if SENSITIVE_HEADERS.contains(&name.as_str()) {
                format!("{}=[REDACTED]", name)
            } else {
                format!("{}={:?}", name, value)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Summarize a JSON-RPC response body
fn format_mcp_response(bytes: &[u8]) -> Option<String> {
    let json: serde_json::Value = serde_json::from_slice(bytes).ok()?;

    if let Some(error) = json.get("error") {
        let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown");
        return Some(format!("error: {} ({})", message, code));
    }

    let result = json.get("result")?;
    if let Some(tools) = result.get("tools").and_then(|t| t.as_array()) {
        return Some(format!("tools: {}", tools.len()));
    }
    if let Some(resources) = result.get("resources").and_then(|r| r.as_array()) {
        return Some(format!("resources: {}", resources.len()));
    }
    if let Some(content) = result.get("content").and_then(|c| c.as_array()) {
        let is_error = result
            .get("isError")
            .and_then(|e| e.as_bool())
            .unwrap_or(false);
        return Some(format!("content: {} items (isError={})", content.len(), is_error));
    }
    if let Some(version) = result.get("protocolVersion").and_then(|v| v.as_str()) {
        return Some(format!("initialized ({})", version));
    }
    match result.as_object() {
        Some(obj) if !obj.is_empty() => {
            let keys: Vec<&str> = obj.keys().map(|k| k.as_str()).collect();
            Some(format!("result: {{{}}}", keys.join(", ")))
        }
        _ => Some("ok".to_string()),
    }
}

/// Extract the JSON-RPC method of a request body
pub fn extract_mcp_method(bytes: &[u8]) -> Option<String> {
    let json: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    json.get("method")
        .and_then(|m| m.as_str())
        .map(String::from)
}

fn is_event_stream(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/event-stream"))
}

/// Logging middleware for requests and responses
pub async fn http_logging_middleware(request: Request, next: Next) -> Result<Response, StatusCode> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let session_id = request
        .headers()
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    if path != branding::MCP_PATH {
        let ctx = TraceContext::new(&method, &path);
        let span = RequestSpan::enter(&ctx);
        let mut request = request;
        request.extensions_mut().insert(ctx.clone());

        return async move {
            RequestSpan::log_entry(&ctx);
            let response = next.run(request).await;
            RequestSpan::log_exit(&ctx, response.status().as_u16(), None);
            Ok(response)
        }
        .instrument(span)
        .await;
    }

    // MCP route: read the body to learn the JSON-RPC method
    let (parts, body) = request.into_parts();
    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Failed to read request body: {}", e);
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    let mcp_method = if body_bytes.len() <= MAX_BODY_LOG_SIZE {
        extract_mcp_method(&body_bytes)
    } else {
        None
    };
    let ctx = TraceContext::new(&method, &path)
        .with_mcp_method(mcp_method.or_else(|| Some(method.clone())))
        .with_session(session_id);
    let span = RequestSpan::enter(&ctx);

    let mut request = Request::from_parts(parts, Body::from(body_bytes));
    request.extensions_mut().insert(ctx.clone());

    async move {
        RequestSpan::log_entry(&ctx);
        debug!(
            trace_id = %ctx.trace_id,
            headers = %redact_headers_compact(request.headers()),
            "MCP request"
        );

        let response = next.run(request).await;
        let status = response.status().as_u16();

        // Streams are passed through untouched; buffering them would hold
        // back keep-alives and the final event
        if is_event_stream(&response) {
            RequestSpan::log_exit(&ctx, status, Some("sse"));
            return Ok(response);
        }

        let (parts, body) = response.into_parts();
        let body_bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(trace_id = %ctx.trace_id, "Failed to read response body: {}", e);
                return Err(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        if let Some(summary) = format_mcp_response(&body_bytes) {
            debug!(
                trace_id = %ctx.trace_id,
                response = %summary,
                "MCP response"
            );
        }

        RequestSpan::log_exit(&ctx, status, None);

        Ok(Response::from_parts(parts, Body::from(body_bytes)))
    }
    .instrument(span)
    .await
}
