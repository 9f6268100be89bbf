//! MCP protocol layer
//!
//! [`FalconMcpHandler`] implements rmcp's `ServerHandler`; rmcp does the
//! JSON-RPC framing for both the stdio and the Streamable HTTP transport.

mod context;
mod handler;

pub use context::{extract_session_id, extract_trace_id};
pub use handler::FalconMcpHandler;

/// Session identifier header of the Streamable HTTP transport
pub const SESSION_ID_HEADER: &str = "mcp-session-id";
