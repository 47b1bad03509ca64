//! Identity and session-token domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity extracted from a verified external IdP token.
///
/// Only [`crate::auth::external::ExternalTokenVerifier`] constructs this, so
/// holding one means the token behind it passed signature, issuer and expiry
/// checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    /// Provider-assigned stable subject (`sub`). Never empty.
    pub subject: String,
    /// Email address, when the provider includes one.
    pub email: Option<String>,
    /// Upstream identity connector, `"unknown"` when the token has none.
    pub provider: String,
    /// Issued-at, when the token carries `iat`.
    pub issued_at: Option<DateTime<Utc>>,
    /// Expiry from `exp`.
    pub expires_at: DateTime<Utc>,
}

/// Claims embedded in the internally issued session token.
///
/// Field names are part of the wire contract with token consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject carried over from the external identity.
    pub sub: String,
    /// User email (serialized as `null` when unknown).
    pub email: Option<String>,
    /// Upstream identity provider.
    pub idp: String,
    /// Granted roles. Carried, not enforced.
    pub roles: Vec<String>,
    /// Whether MFA was verified upstream.
    pub mfa: bool,
    /// Issuer, always [`crate::auth::session::SESSION_ISSUER`].
    pub iss: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

impl SessionClaims {
    /// Subject identifier used to scope memory.
    pub fn subject(&self) -> &str {
        &self.sub
    }
}
