//! Session mode integration tests
//!
//! The same requests run against a stateful and a stateless server
//! over Streamable HTTP.

mod stateful;
