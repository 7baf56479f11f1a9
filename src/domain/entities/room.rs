//! Chat room and participant entities, and the room repository trait.
//!
//! Maps to the `chat_rooms` and `chat_participants` tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::DirectPair;
use crate::shared::error::AppError;

/// Room kinds. Only direct (two participant) rooms exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoomKind {
    #[default]
    Direct,
}

impl RoomKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(Self::Direct),
            _ => None,
        }
    }
}

/// A conversation between exactly two users.
///
/// Maps to `chat_rooms`:
/// - id: BIGINT PRIMARY KEY (Snowflake ID)
/// - room_type: TEXT NOT NULL ('direct')
/// - user_low / user_high: BIGINT NOT NULL, canonical participant pair
/// - created_by: BIGINT NOT NULL
/// - last_position: BIGINT NOT NULL DEFAULT 0, highest assigned message position
/// - is_active: BOOLEAN NOT NULL DEFAULT TRUE
/// - created_at / updated_at: TIMESTAMPTZ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: i64,
    pub kind: RoomKind,
    pub pair: DirectPair,
    pub created_by: i64,
    pub last_position: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatRoom {
    /// A fresh, empty direct room.
    pub fn new_direct(id: i64, pair: DirectPair, created_by: i64) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind: RoomKind::Direct,
            pair,
            created_by,
            last_position: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_member(&self, user_id: i64) -> bool {
        self.pair.contains(user_id)
    }

    pub fn other_member(&self, user_id: i64) -> Option<i64> {
        self.pair.other(user_id)
    }
}

/// A user's membership in a room, carrying their read cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub room_id: i64,
    pub user_id: i64,
    pub joined_at: DateTime<Utc>,
    /// Highest message position the user acknowledged reading (0 = none)
    pub last_read_position: i64,
    pub last_read_at: Option<DateTime<Utc>>,
}

impl Participant {
    pub fn new(room_id: i64, user_id: i64, joined_at: DateTime<Utc>) -> Self {
        Self {
            room_id,
            user_id,
            joined_at,
            last_read_position: 0,
            last_read_at: None,
        }
    }
}

/// Repository trait for room and participant data access.
#[async_trait]
pub trait RoomRepository: Send + Sync {
    /// Find a room by ID, active or not.
    async fn find_by_id(&self, id: i64) -> Result<Option<ChatRoom>, AppError>;

    /// Find the active direct room for a pair.
    async fn find_direct(&self, pair: DirectPair) -> Result<Option<ChatRoom>, AppError>;

    /// Insert a room and both participants.
    ///
    /// Returns `AppError::Conflict` if an active room already exists for the
    /// pair.
    async fn create_direct(&self, room: &ChatRoom) -> Result<ChatRoom, AppError>;

    /// Active rooms the user participates in, most recently updated first.
    async fn rooms_for_user(&self, user_id: i64) -> Result<Vec<ChatRoom>, AppError>;

    /// Move the read cursor to `position` unless it is already further.
    /// Returns the participant after the update.
    async fn advance_read_cursor(
        &self,
        room_id: i64,
        user_id: i64,
        position: i64,
    ) -> Result<Participant, AppError>;

    /// Mark a room inactive and remove its participants.
    async fn deactivate(&self, room_id: i64) -> Result<(), AppError>;
}
