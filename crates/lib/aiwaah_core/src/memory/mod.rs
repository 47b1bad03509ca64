//! Identity-scoped conversation memory.
//!
//! Every read and write is keyed by a verified subject. The storage
//! collaborator ([`MemoryStore`]) exposes no operation that spans subjects.
//!
//! # Failure policy
//!
//! Memory is best-effort relative to the chat reply: [`MemoryGateway::history_for_prompt`]
//! degrades to an empty history and [`MemoryGateway::record_exchange`] only
//! logs write failures.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::memory::{MemoryTurn, TurnRole};

pub use in_memory::InMemoryStore;
pub use postgres::PgMemoryStore;

/// Number of prior turns replayed into a prompt by default.
pub const DEFAULT_HISTORY_LIMIT: usize = 6;

/// Errors raised by memory storage.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Subject must not be empty")]
    InvalidSubject,

    #[error("Invalid role: {0}")]
    InvalidRole(String),
}

/// Key-scoped append/read storage for conversation turns.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Atomically append one turn for `subject`.
    async fn append(
        &self,
        subject: &str,
        role: TurnRole,
        content: &str,
    ) -> Result<MemoryTurn, MemoryError>;

    /// The most recent `limit` turns for `subject`, oldest first.
    async fn recent(&self, subject: &str, limit: usize) -> Result<Vec<MemoryTurn>, MemoryError>;
}

/// Gateway between verified identities and the memory store.
#[derive(Clone)]
pub struct MemoryGateway {
    store: Arc<dyn MemoryStore>,
    default_limit: usize,
}

impl MemoryGateway {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self::with_limit(store, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_limit(store: Arc<dyn MemoryStore>, default_limit: usize) -> Self {
        Self {
            store,
            default_limit,
        }
    }

    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    /// Recent turns for `subject`, ascending by creation. A subject without
    /// history gets an empty list.
    pub async fn load_recent(
        &self,
        subject: &str,
        limit: usize,
    ) -> Result<Vec<MemoryTurn>, MemoryError> {
        check_subject(subject)?;
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.store.recent(subject, limit).await
    }

    /// Append one turn for `subject`.
    pub async fn append(
        &self,
        subject: &str,
        role: TurnRole,
        content: &str,
    ) -> Result<(), MemoryError> {
        check_subject(subject)?;
        self.store.append(subject, role, content).await?;
        Ok(())
    }

    /// History to replay into the next prompt. Storage failures degrade to
    /// an empty history.
    pub async fn history_for_prompt(&self, subject: &str) -> Vec<MemoryTurn> {
        match self.load_recent(subject, self.default_limit).await {
            Ok(turns) => turns,
            Err(e) => {
                warn!(subject = %subject, error = %e, "history load failed, continuing without memory");
                Vec::new()
            }
        }
    }

    /// Persist a completed exchange as two independent writes.
    ///
    /// Returns how many of the two turns were stored.
    pub async fn record_exchange(&self, subject: &str, user_message: &str, reply: &str) -> usize {
        let mut stored = 0;
        for (role, content) in [(TurnRole::User, user_message), (TurnRole::Assistant, reply)] {
            match self.append(subject, role, content).await {
                Ok(()) => stored += 1,
                Err(e) => {
                    warn!(subject = %subject, role = %role, error = %e, "failed to persist turn");
                }
            }
        }
        debug!(subject = %subject, stored, "exchange recorded");
        stored
    }
}

fn check_subject(subject: &str) -> Result<(), MemoryError> {
    if subject.trim().is_empty() {
        return Err(MemoryError::InvalidSubject);
    }
    Ok(())
}
