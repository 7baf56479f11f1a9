//! Message entity and repository trait.
//!
//! Maps to the `chat_messages` table in the database schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Message types matching the `message_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Plain text
    #[default]
    Text,
    /// One or more images
    Image,
    /// One or more generic files
    File,
    /// A voice note
    Voice,
}

impl MessageType {
    /// Convert from database string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "file" => Some(Self::File),
            "voice" => Some(Self::Voice),
            _ => None,
        }
    }

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::Voice => "voice",
        }
    }

    /// Whether messages of this type must carry attachments.
    pub fn requires_attachments(&self) -> bool {
        !matches!(self, Self::Text)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored attachment, as referenced by a message.
///
/// Serialized field names follow the wire format of `files_data` entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentDescriptor {
    pub file_name: String,
    /// Retrievable URL in the object store
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    /// Playback length in seconds (voice notes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// Represents a message in a room.
///
/// Maps to the `chat_messages` table:
/// - id: BIGINT PRIMARY KEY (Snowflake ID)
/// - room_id: BIGINT NOT NULL REFERENCES chat_rooms(id)
/// - position: BIGINT NOT NULL, UNIQUE (room_id, position)
/// - sender_id / receiver_id: BIGINT NOT NULL
/// - message_type: TEXT NOT NULL
/// - content: TEXT NULL
/// - files_data: JSONB NULL
/// - created_at: TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// - edited_at: TIMESTAMPTZ NULL
/// - is_edited / is_read / is_deleted: BOOLEAN NOT NULL DEFAULT FALSE
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub room_id: i64,
    /// Per-room sequence position, starting at 1
    pub position: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub message_type: MessageType,
    pub content: Option<String>,
    pub attachments: Vec<AttachmentDescriptor>,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_edited: bool,
    pub is_read: bool,
    pub is_deleted: bool,
}

impl Message {
    /// The view of this message other users may see. Soft-deleted messages
    /// keep their slot in the sequence but lose their payload.
    pub fn redacted(mut self) -> Self {
        if self.is_deleted {
            self.content = None;
            self.attachments.clear();
        }
        self
    }
}

/// A message about to be appended. The store assigns its position.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: i64,
    pub room_id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub message_type: MessageType,
    pub content: Option<String>,
    pub attachments: Vec<AttachmentDescriptor>,
}

/// Repository trait for Message data access operations.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Append a message, assigning the room's next position in the same
    /// atomic step that bumps the room's `last_position`.
    async fn append(&self, message: NewMessage) -> Result<Message, AppError>;

    /// Find a message by its Snowflake ID.
    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, AppError>;

    /// Messages with `position > after`, ascending, at most `limit`.
    async fn list_after(
        &self,
        room_id: i64,
        after: i64,
        limit: i64,
    ) -> Result<Vec<Message>, AppError>;

    /// The newest `limit` messages, returned in ascending order.
    async fn list_latest(&self, room_id: i64, limit: i64) -> Result<Vec<Message>, AppError>;

    /// The newest message that is not deleted.
    async fn last_visible(&self, room_id: i64) -> Result<Option<Message>, AppError>;

    /// Replace the content of a message and mark it edited.
    async fn update_content(
        &self,
        id: i64,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<Message, AppError>;

    /// Flag a message deleted.
    async fn soft_delete(&self, id: i64) -> Result<Message, AppError>;

    /// Flag every message addressed to `reader_id` up to `position` as read.
    async fn mark_read_upto(
        &self,
        room_id: i64,
        reader_id: i64,
        position: i64,
    ) -> Result<u64, AppError>;

    /// Unread, non-deleted messages addressed to `reader_id`.
    async fn unread_count(&self, room_id: i64, reader_id: i64) -> Result<i64, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_conversion() {
        assert_eq!(MessageType::parse("text"), Some(MessageType::Text));
        assert_eq!(MessageType::parse("VOICE"), Some(MessageType::Voice));
        assert_eq!(MessageType::parse("sticker"), None);
        assert_eq!(MessageType::Image.as_str(), "image");
        assert!(MessageType::File.requires_attachments());
        assert!(!MessageType::Text.requires_attachments());
    }

    #[test]
    fn test_redacted_hides_payload_of_deleted_messages() {
        let message = Message {
            id: 1,
            room_id: 2,
            position: 3,
            sender_id: 4,
            receiver_id: 5,
            message_type: MessageType::Image,
            content: Some("caption".into()),
            attachments: vec![AttachmentDescriptor {
                file_name: "a.png".into(),
                file_path: "http://cdn/a.png".into(),
                file_size: 10,
                mime_type: "image/png".into(),
                duration: None,
            }],
            created_at: Utc::now(),
            edited_at: None,
            is_edited: false,
            is_read: false,
            is_deleted: true,
        };

        let redacted = message.clone().redacted();
        assert_eq!(redacted.position, 3);
        assert!(redacted.content.is_none());
        assert!(redacted.attachments.is_empty());

        let visible = Message {
            is_deleted: false,
            ..message
        }
        .redacted();
        assert_eq!(visible.content.as_deref(), Some("caption"));
    }
}
