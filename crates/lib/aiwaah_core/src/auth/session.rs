//! Internal session tokens: issuance and verification.
//!
//! Session tokens are HS256 JWTs signed with a process-wide secret. They are
//! the only credential the chat endpoints accept.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::{info, warn};

use super::AuthError;
use crate::models::auth::{ExternalIdentity, SessionClaims};

/// `iss` stamped into every session token.
pub const SESSION_ISSUER: &str = "aiwaah-ciam";

/// Session token lifetime: 1 hour.
pub const SESSION_TTL_SECS: i64 = 60 * 60;

/// Role granted to every exchanged identity.
pub const DEFAULT_ROLE: &str = "user";

const SESSION_ALGORITHM: Algorithm = Algorithm::HS256;

/// Mints session tokens from verified external identities.
pub struct SessionIssuer {
    key: EncodingKey,
}

impl SessionIssuer {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: EncodingKey::from_secret(secret),
        }
    }

    /// Build the normalized claim set for `identity` as of `now`.
    pub fn claims_for(identity: &ExternalIdentity, now: DateTime<Utc>) -> SessionClaims {
        SessionClaims {
            sub: identity.subject.clone(),
            email: identity.email.clone(),
            idp: identity.provider.clone(),
            roles: vec![DEFAULT_ROLE.to_string()],
            mfa: false,
            iss: SESSION_ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(SESSION_TTL_SECS)).timestamp(),
        }
    }

    /// Sign an arbitrary claim set.
    pub fn sign(&self, claims: &SessionClaims) -> Result<String, AuthError> {
        encode(&Header::new(SESSION_ALGORITHM), claims, &self.key)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
    }

    /// Issue a session token for `identity`, valid for [`SESSION_TTL_SECS`].
    pub fn issue(&self, identity: &ExternalIdentity) -> Result<String, AuthError> {
        if identity.subject.is_empty() {
            return Err(AuthError::Internal("refusing to issue for empty subject".into()));
        }
        self.sign(&Self::claims_for(identity, Utc::now()))
    }
}

impl fmt::Debug for SessionIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionIssuer { .. }")
    }
}

/// Validates session tokens on protected calls.
pub struct SessionVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl SessionVerifier {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(SESSION_ALGORITHM);
        validation.leeway = 0;
        validation.validate_aud = false;
        validation.set_issuer(&[SESSION_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Verify a session token, returning its claims on success.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Unauthenticated("empty token".into()));
        }
        let claims = decode::<SessionClaims>(token, &self.key, &self.validation)
            .map_err(|e| AuthError::Unauthenticated(e.to_string()))?
            .claims;
        if claims.sub.is_empty() {
            return Err(AuthError::Unauthenticated("empty subject".into()));
        }
        Ok(claims)
    }
}

impl fmt::Debug for SessionVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionVerifier { .. }")
    }
}

/// Resolve the session signing secret: env var `SESSION_SECRET` →
/// `JWT_SECRET` → persisted file.
pub fn resolve_session_secret() -> String {
    for var in ["SESSION_SECRET", "JWT_SECRET"] {
        if let Ok(secret) = std::env::var(var)
            && !secret.is_empty()
        {
            return secret;
        }
    }
    resolve_session_secret_at(&session_secret_path())
}

/// Read the secret persisted at `path`, generating and persisting a new one
/// if the file is missing or empty.
pub fn resolve_session_secret_at(path: &Path) -> String {
    if let Ok(existing) = std::fs::read_to_string(path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match std::fs::write(path, &secret) {
        Ok(()) => info!(path = %path.display(), "generated new session secret"),
        Err(e) => warn!(path = %path.display(), error = %e, "could not persist session secret"),
    }
    secret
}

/// Path to the persisted session secret file.
fn session_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("aiwaah")
        .join("session-secret")
}
