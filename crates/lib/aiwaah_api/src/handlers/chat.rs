// @zen-component: CHAT-Handler
//
//! Chat turn: load the caller's history, ask the model, persist the turn.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::{Extension, Json};
use tracing::info;

use aiwaah_core::completion::build_prompt;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedSession;
use crate::models::{ChatRequest, ChatResponse};

/// `POST /aiwaah`: answer one message for the authenticated subject.
///
/// Memory failures never fail the request: history degrades to empty and
/// write failures are only logged.
pub async fn chat_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedSession(claims)): Extension<AuthenticatedSession>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> AppResult<Json<ChatResponse>> {
    let Json(body) = body?;
    if body.message.trim().is_empty() {
        return Err(AppError::Validation("Message must not be empty".into()));
    }
    let subject = claims.subject();

    let history = state.memory.history_for_prompt(subject).await;
    let prompt = build_prompt(&state.config.system_prompt, &history, &body.message);
    let reply = state.completion.complete(&prompt).await?;

    state
        .memory
        .record_exchange(subject, &body.message, &reply)
        .await;

    info!(subject = %subject, history = history.len(), "chat turn completed");
    Ok(Json(ChatResponse { reply }))
}
