//! History listing for the authenticated subject.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::{Extension, Json};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedSession;
use crate::models::{HistoryMessage, HistoryQuery, HistoryResponse};

/// Upper bound on `limit` for history listings.
pub const MAX_HISTORY_LIMIT: usize = 50;

/// `GET /aiwaah/history`: recent turns, oldest first.
pub async fn history_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedSession(claims)): Extension<AuthenticatedSession>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> AppResult<Json<HistoryResponse>> {
    let Query(query) = query?;
    let limit = query
        .limit
        .unwrap_or_else(|| state.memory.default_limit())
        .min(MAX_HISTORY_LIMIT);
    let turns = state.memory.load_recent(claims.subject(), limit).await?;
    Ok(Json(HistoryResponse {
        messages: turns.into_iter().map(HistoryMessage::from).collect(),
    }))
}
