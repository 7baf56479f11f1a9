//! Presence Repository Implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{PresenceRecord, PresenceRepository};
use crate::shared::error::AppError;

#[derive(Debug, sqlx::FromRow)]
struct PresenceRow {
    user_id: i64,
    is_online: bool,
    last_seen: DateTime<Utc>,
}

/// PostgreSQL presence repository implementation.
pub struct PgPresenceRepository {
    pool: PgPool,
}

impl PgPresenceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PresenceRepository for PgPresenceRepository {
    async fn upsert(&self, record: &PresenceRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO user_presence (user_id, is_online, last_seen)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id)
            DO UPDATE SET is_online = EXCLUDED.is_online, last_seen = EXCLUDED.last_seen
            "#,
        )
        .bind(record.user_id)
        .bind(record.is_online)
        .bind(record.last_seen)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, user_id: i64) -> Result<Option<PresenceRecord>, AppError> {
        let row = sqlx::query_as::<_, PresenceRow>(
            "SELECT user_id, is_online, last_seen FROM user_presence WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| PresenceRecord {
            user_id: r.user_id,
            is_online: r.is_online,
            last_seen: r.last_seen,
        }))
    }
}
