//! Request details carried into the handler by the HTTP transport

use rmcp::model::Extensions;

use super::SESSION_ID_HEADER;
use crate::logging::TraceContext;

/// Session id the client sent with the request
pub fn extract_session_id(extensions: &Extensions) -> Option<String> {
    extensions
        .get::<http::request::Parts>()
        .and_then(|parts| parts.headers.get(SESSION_ID_HEADER))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Trace id assigned by the logging middleware
pub fn extract_trace_id(extensions: &Extensions) -> Option<String> {
    extensions
        .get::<http::request::Parts>()
        .and_then(|parts| parts.extensions.get::<TraceContext>())
        .map(|ctx| ctx.trace_id.clone())
}
