//! Completion collaborator: the LLM behind the chat endpoint.
//!
//! The core treats the model as a black box that turns an ordered,
//! role-tagged message list into reply text. [`build_prompt`] is the only
//! place that list is assembled.

pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::memory::{MemoryTurn, TurnRole};

pub use openai::{OpenAiClient, OpenAiConfig};

/// Errors from the completion collaborator.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("Completion service unavailable: {0}")]
    Unavailable(String),

    /// The service answered with a non-success status.
    #[error("Completion service returned {status}")]
    Upstream { status: u16 },

    #[error("Invalid completion response: {0}")]
    InvalidResponse(String),

    #[error("Config error: {0}")]
    Config(String),
}

/// Role of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

impl From<TurnRole> for PromptRole {
    fn from(role: TurnRole) -> Self {
        match role {
            TurnRole::User => PromptRole::User,
            TurnRole::Assistant => PromptRole::Assistant,
        }
    }
}

/// One role-tagged message submitted to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: PromptRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: PromptRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Text-completion service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Produce a reply for `messages`, submitted verbatim and in order.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, CompletionError>;
}

/// Assemble system instructions, prior turns (oldest first) and the new user
/// message. Nothing is summarized, deduplicated or trimmed.
pub fn build_prompt(system: &str, history: &[MemoryTurn], user_message: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::new(PromptRole::System, system));
    messages.extend(
        history
            .iter()
            .map(|turn| ChatMessage::new(turn.role.into(), turn.content.clone())),
    );
    messages.push(ChatMessage::new(PromptRole::User, user_message));
    messages
}
