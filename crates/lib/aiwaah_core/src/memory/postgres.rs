//! PostgreSQL-backed memory store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{MemoryError, MemoryStore};
use crate::models::memory::{MemoryTurn, TurnRole};

/// Row returned by memory queries.
#[derive(Debug, Clone, sqlx::FromRow)]
struct MemoryTurnRow {
    subject: String,
    role: String,
    content: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MemoryTurnRow> for MemoryTurn {
    type Error = MemoryError;

    fn try_from(row: MemoryTurnRow) -> Result<Self, Self::Error> {
        Ok(MemoryTurn {
            role: row.role.parse()?,
            subject: row.subject,
            content: row.content,
            created_at: row.created_at,
        })
    }
}

/// Memory store over the `memory_turns` table.
#[derive(Debug, Clone)]
pub struct PgMemoryStore {
    pool: PgPool,
}

impl PgMemoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MemoryStore for PgMemoryStore {
    async fn append(
        &self,
        subject: &str,
        role: TurnRole,
        content: &str,
    ) -> Result<MemoryTurn, MemoryError> {
        let row = sqlx::query_as::<_, MemoryTurnRow>(
            r#"
            INSERT INTO memory_turns (subject, role, content)
            VALUES ($1, $2, $3)
            RETURNING subject, role, content, created_at
            "#,
        )
        .bind(subject)
        .bind(role.as_str())
        .bind(content)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    /// Ordered by `id` so turns written within one timestamp tick keep
    /// append order.
    async fn recent(&self, subject: &str, limit: usize) -> Result<Vec<MemoryTurn>, MemoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, MemoryTurnRow>(
            r#"
            SELECT subject, role, content, created_at
            FROM (
                SELECT id, subject, role, content, created_at
                FROM memory_turns
                WHERE subject = $1
                ORDER BY id DESC
                LIMIT $2
            ) latest
            ORDER BY id ASC
            "#,
        )
        .bind(subject)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MemoryTurn::try_from).collect()
    }
}
