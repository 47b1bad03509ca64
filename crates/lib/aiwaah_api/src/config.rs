//! API server configuration.

use std::fmt;
use std::time::Duration;

use aiwaah_core::auth::AuthError;
use aiwaah_core::auth::external::{
    DEFAULT_LEEWAY_SECS, DEFAULT_PROVIDER_CLAIM, ExternalVerifierConfig,
};
use aiwaah_core::auth::jwks::jwks_url_for_issuer;
use aiwaah_core::auth::session::resolve_session_secret;
use aiwaah_core::completion::OpenAiConfig;
use aiwaah_core::completion::openai::{DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL};
use aiwaah_core::memory::DEFAULT_HISTORY_LIMIT;
use aiwaah_core::prompt::SYSTEM_PROMPT;
use url::Url;

/// Origin allowed by default (the production web client).
pub const DEFAULT_CORS_ORIGIN: &str = "https://aiwaah-website.vercel.app";

/// Placeholder issuer used when `IDP_ISSUER` is unset. Nothing verifies
/// against it, so exchange stays closed until it is configured.
pub const PLACEHOLDER_ISSUER: &str = "https://idp.invalid/";

/// Configuration for the API server.
#[derive(Clone)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:8000").
    pub bind_addr: String,
    /// PostgreSQL connection URL. `None` selects the in-memory store.
    pub pg_connection_url: Option<String>,
    /// Session-token signing secret. Never logged.
    pub session_secret: String,
    /// External IdP token validation settings.
    pub idp: ExternalVerifierConfig,
    /// Explicit JWKS location; derived from the issuer when unset.
    pub jwks_url: Option<String>,
    /// Completion provider settings.
    pub openai: OpenAiConfig,
    /// System instructions prepended to every prompt.
    pub system_prompt: String,
    /// Allowed CORS origins (`*` allows any origin without credentials).
    pub cors_allowed_origins: Vec<String>,
    /// Prior turns replayed into each prompt.
    pub history_limit: usize,
    /// Timeout applied to each outbound call (JWKS, completion).
    pub outbound_timeout: Duration,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                          | Default                              |
    /// |-----------------------------------|--------------------------------------|
    /// | `BIND_ADDR`                       | `127.0.0.1:8000`                     |
    /// | `DATABASE_URL`                    | unset (in-memory store)              |
    /// | `SESSION_SECRET` / `JWT_SECRET`   | generated & persisted to file        |
    /// | `IDP_ISSUER`                      | `https://idp.invalid/`               |
    /// | `IDP_JWKS_URL`                    | `<issuer>/.well-known/jwks.json`     |
    /// | `IDP_AUDIENCE`                    | empty, comma-separated               |
    /// | `IDP_REQUIRE_AUDIENCE`            | `false`                              |
    /// | `IDP_PROVIDER_CLAIM`              | `/ext/idp`                           |
    /// | `OPENAI_API_KEY`                  | unset                                |
    /// | `OPENAI_MODEL`                    | `gpt-4.1-mini`                       |
    /// | `OPENAI_BASE_URL`                 | `https://api.openai.com/v1`          |
    /// | `CORS_ALLOWED_ORIGINS`            | `https://aiwaah-website.vercel.app`  |
    /// | `MEMORY_HISTORY_LIMIT`            | `6`                                  |
    /// | `OUTBOUND_TIMEOUT_SECS`           | `20`                                 |
    /// | `IDP_LEEWAY_SECS`                 | `60`                                 |
    ///
    /// A set but unparseable numeric or boolean value is a configuration
    /// error rather than a silent fallback to the default.
    pub fn from_env() -> Result<Self, AuthError> {
        let outbound_timeout = Duration::from_secs(env_parse("OUTBOUND_TIMEOUT_SECS", 20)?);

        let mut idp = ExternalVerifierConfig::new(env_or("IDP_ISSUER", PLACEHOLDER_ISSUER));
        idp.audiences = env_list("IDP_AUDIENCE");
        idp.require_audience = env_flag("IDP_REQUIRE_AUDIENCE", false)?;
        idp.provider_claim = env_or("IDP_PROVIDER_CLAIM", DEFAULT_PROVIDER_CLAIM);
        idp.leeway_secs = env_parse("IDP_LEEWAY_SECS", DEFAULT_LEEWAY_SECS)?;

        let cors = env_list("CORS_ALLOWED_ORIGINS");

        Ok(Self {
            bind_addr: env_or("BIND_ADDR", "127.0.0.1:8000"),
            pg_connection_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            session_secret: resolve_session_secret(),
            idp,
            jwks_url: std::env::var("IDP_JWKS_URL").ok().filter(|s| !s.is_empty()),
            openai: OpenAiConfig {
                api_key: std::env::var("OPENAI_API_KEY").ok(),
                model: env_or("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
                base_url: env_or("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
                timeout: outbound_timeout,
            },
            system_prompt: SYSTEM_PROMPT.to_string(),
            cors_allowed_origins: if cors.is_empty() {
                vec![DEFAULT_CORS_ORIGIN.to_string()]
            } else {
                cors
            },
            history_limit: env_parse("MEMORY_HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT)?,
            outbound_timeout,
        })
    }

    /// JWKS location: the explicit URL, or the issuer's well-known path.
    pub fn resolved_jwks_url(&self) -> Result<Url, AuthError> {
        match &self.jwks_url {
            Some(url) => {
                Url::parse(url).map_err(|e| AuthError::Config(format!("jwks url '{url}': {e}")))
            }
            None => jwks_url_for_issuer(&self.idp.issuer),
        }
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("pg_connection_url", &self.pg_connection_url.as_ref().map(|_| "<set>"))
            .field("session_secret", &"<redacted>")
            .field("idp", &self.idp)
            .field("jwks_url", &self.jwks_url)
            .field("openai", &self.openai)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("history_limit", &self.history_limit)
            .field("outbound_timeout", &self.outbound_timeout)
            .finish_non_exhaustive()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str, default: T) -> Result<T, AuthError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    parse_value(key, env_value(key).as_deref(), default)
}

fn env_flag(key: &str, default: bool) -> Result<bool, AuthError> {
    parse_flag(key, env_value(key).as_deref(), default)
}

fn parse_value<T>(key: &str, raw: Option<&str>, default: T) -> Result<T, AuthError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AuthError::Config(format!("{key}='{raw}': {e}"))),
    }
}

fn parse_flag(key: &str, raw: Option<&str>, default: bool) -> Result<bool, AuthError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(AuthError::Config(format!(
            "{key}='{raw}': expected true/false, 1/0, yes/no or on/off"
        ))),
    }
}

fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .map(|v| split_list(&v))
        .unwrap_or_default()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
