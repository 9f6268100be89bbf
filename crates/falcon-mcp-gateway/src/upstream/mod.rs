//! Falcon API client
//!
//! Tool modules call the API through [`FalconApi`] by operation id, the way
//! the Falcon SDKs address endpoints. [`FalconClient`] resolves the id in
//! [`operations`], attaches the bearer token from the Credential Manager and
//! returns the raw status and body.

mod client;
pub mod operations;

pub use client::{CommandRequest, FalconApi, FalconClient, UpstreamBody, UpstreamResponse};
pub use operations::{HttpMethod, Operation};
