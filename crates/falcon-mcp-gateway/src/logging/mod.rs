//! Request correlation for logging
//!
//! Every request gets a short trace id that appears on its `→ MCP` entry
//! line, its `← MCP` exit line and every log emitted while serving it.

mod trace_context;

pub use trace_context::{generate_trace_id, RequestSpan, TraceContext};
