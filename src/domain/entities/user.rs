//! User profile as seen by the chat engine.
//!
//! Accounts are owned by the identity service; this crate only reads the
//! `users` table to render participant details and to reject unknown or
//! deactivated users.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub is_active: bool,
}

impl UserProfile {
    /// Placeholder for a participant whose profile has disappeared.
    pub fn unknown(id: i64) -> Self {
        Self {
            id,
            name: format!("User {}", id),
            email: String::new(),
            avatar_url: None,
            is_active: false,
        }
    }
}

/// Read-only access to user profiles.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<UserProfile>, AppError>;

    /// Active users whose email contains `query` (case-insensitive), other
    /// than `exclude_id`, ordered by name.
    async fn search_by_email(
        &self,
        query: &str,
        exclude_id: i64,
        limit: i64,
    ) -> Result<Vec<UserProfile>, AppError>;
}
