//! User Directory Implementation
//!
//! Reads profiles from the `users` table owned by the identity service.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::{UserDirectory, UserProfile};
use crate::shared::error::AppError;

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
    avatar_url: Option<String>,
    is_active: bool,
}

impl From<UserRow> for UserProfile {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            avatar_url: row.avatar_url,
            is_active: row.is_active,
        }
    }
}

/// PostgreSQL user directory.
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    /// Create a new PgUserDirectory with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_id(&self, id: i64) -> Result<Option<UserProfile>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, avatar_url, is_active
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserProfile::from))
    }

    async fn search_by_email(
        &self,
        query: &str,
        exclude_id: i64,
        limit: i64,
    ) -> Result<Vec<UserProfile>, AppError> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, avatar_url, is_active
            FROM users
            WHERE email ILIKE $1 AND id <> $2 AND is_active
            ORDER BY name, id
            LIMIT $3
            "#,
        )
        .bind(format!("%{}%", escape_like(query)))
        .bind(exclude_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UserProfile::from).collect())
    }
}

/// Escape `LIKE` wildcards so user input matches literally.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
