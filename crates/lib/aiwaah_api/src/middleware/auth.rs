// @zen-component: CIAM-SessionGate
//
//! Authentication middleware: Bearer token extraction and session-token
//! verification.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use aiwaah_core::models::auth::SessionClaims;

use crate::AppState;
use crate::error::AppError;

/// Verified session claims, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession(pub SessionClaims);

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization scheme".into()))?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::Unauthorized("Invalid authorization scheme".into()));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::Unauthorized("Missing bearer token".into()));
    }
    Ok(token)
}

/// Axum middleware: verifies the session token and injects
/// [`AuthenticatedSession`] into request extensions. Nothing behind this
/// layer runs without verified claims.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())?;
    let claims = state.sessions.verify(token)?;

    debug!(subject = %claims.sub, "session verified");
    request.extensions_mut().insert(AuthenticatedSession(claims));

    Ok(next.run(request).await)
}
