//! Trace Context - Request correlation and structured logging

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, info_span, Span};

/// Global request counter for trace ID generation
static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a short, unique trace ID for this request
/// Format: 6 hex characters (e.g., "a1b2c3")
pub fn generate_trace_id() -> String {
    let counter = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0);

    let mixed = counter.wrapping_add(timestamp);
    format!("{:06x}", mixed & 0xFFFFFF)
}

/// Correlation data for one inbound request (HTTP request or stdio line)
#[derive(Debug, Clone)]
pub struct TraceContext {
    /// Unique trace ID (6 hex chars)
    pub trace_id: String,
    /// HTTP method, or "STDIO" for pipe messages
    pub method: String,
    /// Request path (e.g., /mcp)
    pub path: String,
    /// JSON-RPC method if applicable (e.g., tools/call)
    pub mcp_method: Option<String>,
    /// Session id presented by the client
    pub session_id: Option<String>,
    pub started_at: std::time::Instant,
}

impl TraceContext {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            trace_id: generate_trace_id(),
            method: method.to_string(),
            path: path.to_string(),
            mcp_method: None,
            session_id: None,
            started_at: std::time::Instant::now(),
        }
    }

    /// Set the MCP method (parsed from JSON-RPC body)
    pub fn with_mcp_method(mut self, method: Option<String>) -> Self {
        self.mcp_method = method;
        self
    }

    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Short session ID for logging (first 8 chars or "-")
    pub fn short_session(&self) -> &str {
        self.session_id
            .as_deref()
            .map(|s| s.get(..8).unwrap_or(s))
            .unwrap_or("-")
    }
}

/// Request span builder for structured logging
pub struct RequestSpan;

impl RequestSpan {
    /// Create a tracing span for an incoming request
    ///
    /// This span will automatically include trace_id in all child logs.
    pub fn enter(ctx: &TraceContext) -> Span {
        info_span!(
            "request",
            trace_id = %ctx.trace_id,
            method = %ctx.method,
            path = %ctx.path,
        )
    }

    /// Log request entry (single consolidated line)
    pub fn log_entry(ctx: &TraceContext) {
        match ctx.mcp_method.as_deref() {
            Some(mcp_method) => info!(
                trace_id = %ctx.trace_id,
                session = %ctx.short_session(),
                "→ MCP {} {} {}",
                ctx.method,
                ctx.path,
                mcp_method
            ),
            None => info!(
                trace_id = %ctx.trace_id,
                "→ {} {}",
                ctx.method,
                ctx.path
            ),
        }
    }

    /// Log request completion (single consolidated line)
    pub fn log_exit(ctx: &TraceContext, status: u16, detail: Option<&str>) {
        let elapsed = ctx.elapsed_ms();
        let prefix = if ctx.mcp_method.is_some() { "← MCP" } else { "←" };

        match detail {
            Some(d) => info!(
                trace_id = %ctx.trace_id,
                status,
                elapsed_ms = elapsed,
                "{} {} {} ({}ms)",
                prefix,
                status,
                d,
                elapsed
            ),
            None => info!(
                trace_id = %ctx.trace_id,
                status,
                elapsed_ms = elapsed,
                "{} {} ({}ms)",
                prefix,
                status,
                elapsed
            ),
        }
    }
}
