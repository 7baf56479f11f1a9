//! Presence record and repository trait.
//!
//! Maps to the `user_presence` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Online state of one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user_id: i64,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PresenceRepository: Send + Sync {
    async fn upsert(&self, record: &PresenceRecord) -> Result<(), AppError>;

    async fn find(&self, user_id: i64) -> Result<Option<PresenceRecord>, AppError>;
}
