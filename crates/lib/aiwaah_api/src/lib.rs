//! # aiwaah_api
//!
//! HTTP API library for AiWaah.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use aiwaah_core::auth::AuthError;
use aiwaah_core::auth::external::ExternalTokenVerifier;
use aiwaah_core::auth::jwks::KeySetCache;
use aiwaah_core::auth::session::{SessionIssuer, SessionVerifier};
use aiwaah_core::completion::CompletionClient;
use aiwaah_core::memory::{MemoryGateway, MemoryStore};

use crate::config::ApiConfig;
use crate::handlers::{chat, exchange, health, history};

/// Route paths.
pub mod routes {
    pub const GET_HEALTH: &str = "/health";
    pub const POST_CIAM_EXCHANGE: &str = "/ciam/exchange";
    pub const POST_AIWAAH: &str = "/aiwaah";
    pub const GET_AIWAAH_HISTORY: &str = "/aiwaah/history";
}

/// Shared application state passed to all handlers.
///
/// Every component is created once at startup and shared by handle.
#[derive(Clone)]
pub struct AppState {
    /// API configuration.
    pub config: ApiConfig,
    /// External IdP token verifier (first hop).
    pub external: Arc<ExternalTokenVerifier>,
    /// Session token issuer (second hop).
    pub issuer: Arc<SessionIssuer>,
    /// Session token verifier guarding the chat endpoints.
    pub sessions: Arc<SessionVerifier>,
    /// Identity-scoped conversation memory.
    pub memory: MemoryGateway,
    /// LLM collaborator.
    pub completion: Arc<dyn CompletionClient>,
}

impl AppState {
    /// Wire the components from configuration and the chosen collaborators.
    pub fn new(
        config: ApiConfig,
        keys: Arc<KeySetCache>,
        store: Arc<dyn MemoryStore>,
        completion: Arc<dyn CompletionClient>,
    ) -> Result<Self, AuthError> {
        let external = ExternalTokenVerifier::new(config.idp.clone(), keys)?;
        let secret = config.session_secret.as_bytes();
        Ok(Self {
            external: Arc::new(external),
            issuer: Arc::new(SessionIssuer::new(secret)),
            sessions: Arc::new(SessionVerifier::new(secret)),
            memory: MemoryGateway::with_limit(store, config.history_limit),
            completion,
            config,
        })
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_allowed_origins);

    // Public routes (no session required)
    let public = Router::new()
        .route(routes::GET_HEALTH, get(health::health_handler))
        .route(routes::POST_CIAM_EXCHANGE, post(exchange::exchange_handler));

    // Protected routes (require a session token)
    let protected = Router::new()
        .route(routes::POST_AIWAAH, post(chat::chat_handler))
        .route(routes::GET_AIWAAH_HISTORY, get(history::history_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_session,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the configured origins. Credentials are allowed only with an
/// explicit origin list; `*` opens every origin without credentials.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}
