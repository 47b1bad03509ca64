//! Key-set cache for the external identity provider's signing keys.
//!
//! # Refresh policy
//!
//! - Lookups are served from the cached set, keyed by `kid`.
//! - A miss triggers exactly one fetch of the published key set, which
//!   replaces the whole cache, followed by one more lookup. A `kid` still
//!   absent after that is reported as `None`; the caller treats it as a
//!   verification failure, not a retry trigger.
//! - No lock is held across the fetch, so concurrent misses may fetch
//!   concurrently. The last completed fetch wins.
//! - Fetch failures surface as [`AuthError::UpstreamUnavailable`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

use super::AuthError;

/// Where the published key set comes from.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    /// Fetch the full published key set.
    async fn fetch(&self) -> Result<JwkSet, AuthError>;
}

/// Fetches the key set from a JWKS URL over HTTP.
pub struct HttpKeySetSource {
    http: reqwest::Client,
    url: Url,
}

impl HttpKeySetSource {
    /// Build a source with a bounded per-request timeout.
    pub fn new(url: Url, timeout: Duration) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Config(format!("jwks http client: {e}")))?;
        Ok(Self { http, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl KeySetSource for HttpKeySetSource {
    async fn fetch(&self) -> Result<JwkSet, AuthError> {
        debug!(url = %self.url, "fetching JWKS");
        let resp = self
            .http
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| AuthError::UpstreamUnavailable(format!("jwks request: {e}")))?
            .error_for_status()
            .map_err(|e| AuthError::UpstreamUnavailable(format!("jwks status: {e}")))?;
        resp.json::<JwkSet>()
            .await
            .map_err(|e| AuthError::UpstreamUnavailable(format!("jwks parse: {e}")))
    }
}

/// A pinned key set that never changes.
pub struct StaticKeySetSource {
    set: JwkSet,
}

impl StaticKeySetSource {
    pub fn new(set: JwkSet) -> Self {
        Self { set }
    }

    /// Parse a JWKS JSON document.
    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        let set = serde_json::from_str(json)
            .map_err(|e| AuthError::Config(format!("jwks json: {e}")))?;
        Ok(Self::new(set))
    }
}

#[async_trait]
impl KeySetSource for StaticKeySetSource {
    async fn fetch(&self) -> Result<JwkSet, AuthError> {
        Ok(self.set.clone())
    }
}

/// An external IdP verification key.
#[derive(Clone)]
pub struct SigningKey {
    pub key_id: String,
    pub key: DecodingKey,
    pub algorithm: Algorithm,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Cache of the provider's signing keys, keyed by `kid`.
pub struct KeySetCache {
    source: Arc<dyn KeySetSource>,
    keys: RwLock<HashMap<String, Arc<SigningKey>>>,
}

impl KeySetCache {
    /// Create an empty cache. The first lookup fetches.
    pub fn new(source: Arc<dyn KeySetSource>) -> Self {
        Self {
            source,
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a key by id, refreshing once on a miss.
    pub async fn get_key(&self, kid: &str) -> Result<Option<Arc<SigningKey>>, AuthError> {
        if let Some(key) = self.keys.read().await.get(kid) {
            return Ok(Some(Arc::clone(key)));
        }

        debug!(kid = %kid, "signing key not cached, refreshing key set");
        self.refresh().await?;
        Ok(self.keys.read().await.get(kid).cloned())
    }

    /// Fetch the published key set and replace the cache with it.
    ///
    /// Returns the number of usable keys now cached.
    pub async fn refresh(&self) -> Result<usize, AuthError> {
        let set = self.source.fetch().await?;
        let keys = signing_keys_from(&set);
        let count = keys.len();
        *self.keys.write().await = keys;
        info!(keys = count, "JWKS refreshed");
        Ok(count)
    }

    /// Number of keys currently cached.
    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.keys.read().await.is_empty()
    }
}

/// Convert every usable JWK in `set` into a [`SigningKey`].
fn signing_keys_from(set: &JwkSet) -> HashMap<String, Arc<SigningKey>> {
    let mut keys = HashMap::with_capacity(set.keys.len());
    for jwk in &set.keys {
        match signing_key_from(jwk) {
            Some(key) => {
                keys.insert(key.key_id.clone(), Arc::new(key));
            }
            None => debug!(kid = ?jwk.common.key_id, "skipping unusable JWK"),
        }
    }
    keys
}

fn signing_key_from(jwk: &Jwk) -> Option<SigningKey> {
    let key_id = jwk.common.key_id.clone().filter(|k| !k.is_empty())?;
    let algorithm = algorithm_for(jwk)?;
    let key = DecodingKey::from_jwk(jwk).ok()?;
    Some(SigningKey {
        key_id,
        key,
        algorithm,
    })
}

/// Pick the verification algorithm: the JWK's `alg` when present, otherwise
/// the conventional default for its key type. Symmetric keys are never
/// accepted from a published set.
fn algorithm_for(jwk: &Jwk) -> Option<Algorithm> {
    if let AlgorithmParameters::OctetKey(_) = jwk.algorithm {
        return None;
    }
    match jwk.common.key_algorithm {
        Some(KeyAlgorithm::RS256) => Some(Algorithm::RS256),
        Some(KeyAlgorithm::RS384) => Some(Algorithm::RS384),
        Some(KeyAlgorithm::RS512) => Some(Algorithm::RS512),
        Some(KeyAlgorithm::PS256) => Some(Algorithm::PS256),
        Some(KeyAlgorithm::PS384) => Some(Algorithm::PS384),
        Some(KeyAlgorithm::PS512) => Some(Algorithm::PS512),
        Some(KeyAlgorithm::ES256) => Some(Algorithm::ES256),
        Some(KeyAlgorithm::ES384) => Some(Algorithm::ES384),
        Some(KeyAlgorithm::EdDSA) => Some(Algorithm::EdDSA),
        Some(_) => None,
        None => match &jwk.algorithm {
            AlgorithmParameters::RSA(_) => Some(Algorithm::RS256),
            AlgorithmParameters::EllipticCurve(ec) => match ec.curve {
                EllipticCurve::P256 => Some(Algorithm::ES256),
                EllipticCurve::P384 => Some(Algorithm::ES384),
                _ => None,
            },
            AlgorithmParameters::OctetKeyPair(_) => Some(Algorithm::EdDSA),
            AlgorithmParameters::OctetKey(_) => None,
        },
    }
}

/// Derive the conventional JWKS location from an issuer URL.
pub fn jwks_url_for_issuer(issuer: &str) -> Result<Url, AuthError> {
    let base = format!("{}/", issuer.trim_end_matches('/'));
    Url::parse(&base)
        .and_then(|u| u.join(".well-known/jwks.json"))
        .map_err(|e| AuthError::Config(format!("issuer url '{issuer}': {e}")))
}
