//! Process-local memory store.
//!
//! Used when no database is configured and in tests. Contents are lost on
//! restart.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use super::{MemoryError, MemoryStore};
use crate::models::memory::{MemoryTurn, TurnRole};

/// In-memory store keyed by subject.
///
/// Appends for one subject serialize on that subject's map entry, so a turn
/// is never observed half-written and per-subject order is append order.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    turns: DashMap<String, Vec<MemoryTurn>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn append(
        &self,
        subject: &str,
        role: TurnRole,
        content: &str,
    ) -> Result<MemoryTurn, MemoryError> {
        let mut entry = self.turns.entry(subject.to_string()).or_default();
        // Keep created_at non-decreasing even if the wall clock steps back.
        let now = Utc::now();
        let created_at = entry
            .last()
            .map_or(now, |last| last.created_at.max(now));
        let turn = MemoryTurn {
            subject: subject.to_string(),
            role,
            content: content.to_string(),
            created_at,
        };
        entry.push(turn.clone());
        Ok(turn)
    }

    async fn recent(&self, subject: &str, limit: usize) -> Result<Vec<MemoryTurn>, MemoryError> {
        Ok(self
            .turns
            .get(subject)
            .map(|turns| {
                let start = turns.len().saturating_sub(limit);
                turns[start..].to_vec()
            })
            .unwrap_or_default())
    }
}
