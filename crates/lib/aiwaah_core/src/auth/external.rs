//! External IdP token verification.
//!
//! 1. Decode the header (unverified) to read `kid` and `alg`.
//! 2. Resolve the signing key through the [`KeySetCache`].
//! 3. Verify signature, `exp` and `iss` (and `aud` when required).
//! 4. Extract subject, email and provider metadata.
//!
//! Every failure is an [`AuthError::InvalidToken`]. A key-set outage also
//! collapses into `InvalidToken`: without keys nothing can be verified.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Validation, decode, decode_header};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::AuthError;
use super::jwks::KeySetCache;
use crate::models::auth::ExternalIdentity;

/// Provider name used when the token carries no provider metadata.
pub const UNKNOWN_PROVIDER: &str = "unknown";

/// Default JSON pointer to the provider metadata claim.
pub const DEFAULT_PROVIDER_CLAIM: &str = "/ext/idp";

/// Default clock skew tolerance for external tokens.
pub const DEFAULT_LEEWAY_SECS: u64 = 60;

/// How external tokens are validated.
#[derive(Debug, Clone)]
pub struct ExternalVerifierConfig {
    /// Exact `iss` value expected in every token.
    pub issuer: String,
    /// Accepted `aud` values, checked only when `require_audience` is set.
    pub audiences: Vec<String>,
    /// Whether `aud` is enforced.
    pub require_audience: bool,
    /// JSON pointer into the claims locating the provider name.
    pub provider_claim: String,
    /// Clock skew tolerance in seconds.
    pub leeway_secs: u64,
}

impl ExternalVerifierConfig {
    /// Config for `issuer` with audience checks off and default claim layout.
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audiences: Vec::new(),
            require_audience: false,
            provider_claim: DEFAULT_PROVIDER_CLAIM.to_string(),
            leeway_secs: DEFAULT_LEEWAY_SECS,
        }
    }
}

/// Raw claims read from an external token.
#[derive(Debug, Deserialize)]
struct ExternalClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    iat: Option<i64>,
    exp: i64,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

/// Verifies tokens issued by the external identity provider.
pub struct ExternalTokenVerifier {
    config: ExternalVerifierConfig,
    keys: Arc<KeySetCache>,
}

impl ExternalTokenVerifier {
    pub fn new(config: ExternalVerifierConfig, keys: Arc<KeySetCache>) -> Result<Self, AuthError> {
        if config.issuer.is_empty() {
            return Err(AuthError::Config("expected issuer must not be empty".into()));
        }
        if config.require_audience && config.audiences.is_empty() {
            return Err(AuthError::Config(
                "audience enforcement requires at least one audience".into(),
            ));
        }
        Ok(Self { config, keys })
    }

    pub fn config(&self) -> &ExternalVerifierConfig {
        &self.config
    }

    /// Verify an external bearer token and return the identity it asserts.
    pub async fn verify(&self, token: &str) -> Result<ExternalIdentity, AuthError> {
        let header =
            decode_header(token).map_err(|e| AuthError::InvalidToken(format!("header: {e}")))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("missing 'kid' in header".into()))?;

        let key = match self.keys.get_key(&kid).await {
            Ok(Some(key)) => key,
            Ok(None) => return Err(AuthError::InvalidToken(format!("unknown key id '{kid}'"))),
            Err(e) => {
                warn!(kid = %kid, error = %e, "signing keys unavailable");
                return Err(AuthError::InvalidToken("signing keys unavailable".into()));
            }
        };

        if header.alg != key.algorithm {
            return Err(AuthError::InvalidToken(format!(
                "algorithm {:?} does not match key '{kid}'",
                header.alg
            )));
        }

        let validation = self.validation(&key.algorithm);
        let data = decode::<ExternalClaims>(token, &key.key, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        let identity = identity_from_claims(data.claims, &self.config.provider_claim)?;
        debug!(subject = %identity.subject, provider = %identity.provider, "external token verified");
        Ok(identity)
    }

    fn validation(&self, algorithm: &jsonwebtoken::Algorithm) -> Validation {
        let mut validation = Validation::new(*algorithm);
        validation.leeway = self.config.leeway_secs;
        validation.set_issuer(&[self.config.issuer.as_str()]);
        if self.config.require_audience {
            validation.set_audience(&self.config.audiences);
            validation.set_required_spec_claims(&["exp", "iss", "sub", "aud"]);
        } else {
            validation.validate_aud = false;
            validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        }
        validation
    }
}

fn identity_from_claims(
    claims: ExternalClaims,
    provider_claim: &str,
) -> Result<ExternalIdentity, AuthError> {
    if claims.sub.trim().is_empty() {
        return Err(AuthError::InvalidToken("empty 'sub' claim".into()));
    }

    let rest = Value::Object(claims.rest);
    let provider = rest
        .pointer(provider_claim)
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
        .unwrap_or(UNKNOWN_PROVIDER)
        .to_string();

    let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0)
        .ok_or_else(|| AuthError::InvalidToken("'exp' out of range".into()))?;
    let issued_at = claims
        .iat
        .and_then(|iat| DateTime::<Utc>::from_timestamp(iat, 0));

    Ok(ExternalIdentity {
        subject: claims.sub,
        email: claims.email.filter(|e| !e.is_empty()),
        provider,
        issued_at,
        expires_at,
    })
}
