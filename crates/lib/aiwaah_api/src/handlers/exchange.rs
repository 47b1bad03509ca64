// @zen-component: CIAM-ExchangeEndpoint
//
//! Token exchange: external IdP token in, session token out.

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use tracing::info;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::bearer_token;
use crate::models::ExchangeResponse;

/// `POST /ciam/exchange`: verify the external token and mint a session token.
pub async fn exchange_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<ExchangeResponse>> {
    let external_token = bearer_token(&headers)?;
    let identity = state.external.verify(external_token).await?;
    let aiwaah_token = state.issuer.issue(&identity)?;

    info!(subject = %identity.subject, provider = %identity.provider, "session token issued");
    Ok(Json(ExchangeResponse { aiwaah_token }))
}
