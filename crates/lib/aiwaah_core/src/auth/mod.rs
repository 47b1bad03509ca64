//! Identity federation: external IdP token verification and internal
//! session-token issuance.
//!
//! The trust chain is two hops. An external token is verified against the
//! provider's published key set ([`jwks`], [`external`]); the resulting
//! identity is re-issued as a symmetrically signed session token
//! ([`session`]) which is the only credential accepted by protected
//! endpoints.

pub mod external;
pub mod jwks;
pub mod session;

use thiserror::Error;

/// Authentication errors.
///
/// The `String` payloads are diagnostic detail for logs only. The HTTP layer
/// never forwards them to callers.
#[derive(Debug, Error)]
pub enum AuthError {
    /// External IdP token is malformed or failed verification.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Session token is missing, malformed, expired or forged.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Key-set fetch failed at the transport or parse level.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Verifier or issuer was configured inconsistently.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
