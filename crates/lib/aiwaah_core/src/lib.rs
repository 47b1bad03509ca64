//! # aiwaah_core
//!
//! Core domain logic for AiWaah: identity federation between an external
//! identity provider and the internal CIAM issuer, identity-scoped
//! conversation memory, and the completion collaborator.

pub mod auth;
pub mod completion;
pub mod memory;
pub mod migrate;
pub mod models;
pub mod prompt;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
