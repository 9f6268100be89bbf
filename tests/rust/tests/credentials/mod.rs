//! Credential Manager Integration Tests
//!
//! - Client-credential exchange against a mock identity endpoint
//! - Single-flight refresh shared by concurrent callers

mod identity;
mod single_flight;
