//! Request and response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aiwaah_core::models::memory::{MemoryTurn, TurnRole};

/// Error body returned for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// `POST /ciam/exchange` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeResponse {
    pub aiwaah_token: String,
}

/// `POST /aiwaah` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// `POST /aiwaah` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
}

/// `GET /aiwaah/history` query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// One turn in a history listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessage {
    pub role: TurnRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<MemoryTurn> for HistoryMessage {
    fn from(turn: MemoryTurn) -> Self {
        Self {
            role: turn.role,
            content: turn.content,
            created_at: turn.created_at,
        }
    }
}

/// `GET /aiwaah/history` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub messages: Vec<HistoryMessage>,
}

/// `GET /health` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
