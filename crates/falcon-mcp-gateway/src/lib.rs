//! Falcon MCP Gateway
//!
//! Serves Falcon API tools to MCP clients:
//! - Transport selection (stdio or Streamable HTTP)
//! - Stateful or stateless session handling, fixed when the HTTP service is built
//! - Single-flight OAuth2 client-credential token cache
//! - Tool modules backed by the Falcon REST API

pub mod auth;
pub mod credentials;
pub mod logging;
pub mod mcp;
pub mod modules;
pub mod server;
pub mod session;
pub mod upstream;

pub use credentials::{CredentialManager, FalconIdentityClient, TokenExchange};
pub use falcon_mcp_core::SessionMode;
pub use mcp::FalconMcpHandler;
pub use server::{DependenciesBuilder, FalconMcpServer, ServerDependencies};
pub use session::{FalconSessionManager, InMemorySessionStore, SessionEntry, SessionStore};
pub use upstream::{CommandRequest, FalconApi, FalconClient, UpstreamBody, UpstreamResponse};
