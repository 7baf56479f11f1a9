//! Message Repository Implementation
//!
//! PostgreSQL implementation of the per-room message log with keyset
//! pagination on the sequence position.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::domain::{AttachmentDescriptor, Message, MessageRepository, MessageType, NewMessage};
use crate::shared::error::AppError;

/// PostgreSQL message repository implementation.
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    /// Creates a new PgMessageRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Internal row type for message queries.
#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: i64,
    room_id: i64,
    position: i64,
    sender_id: i64,
    receiver_id: i64,
    message_type: String,
    content: Option<String>,
    files_data: Option<Json<Vec<AttachmentDescriptor>>>,
    created_at: DateTime<Utc>,
    edited_at: Option<DateTime<Utc>>,
    is_edited: bool,
    is_read: bool,
    is_deleted: bool,
}

impl MessageRow {
    /// Converts database row to domain Message entity.
    fn into_message(self) -> Result<Message, AppError> {
        let message_type = MessageType::parse(&self.message_type).ok_or_else(|| {
            AppError::Internal(format!(
                "Message {} has unknown type {}",
                self.id, self.message_type
            ))
        })?;
        Ok(Message {
            id: self.id,
            room_id: self.room_id,
            position: self.position,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            message_type,
            content: self.content,
            attachments: self.files_data.map(|j| j.0).unwrap_or_default(),
            created_at: self.created_at,
            edited_at: self.edited_at,
            is_edited: self.is_edited,
            is_read: self.is_read,
            is_deleted: self.is_deleted,
        })
    }
}

const MESSAGE_COLUMNS: &str = "id, room_id, position, sender_id, receiver_id, message_type, \
                               content, files_data, created_at, edited_at, is_edited, is_read, \
                               is_deleted";

fn into_messages(rows: Vec<MessageRow>) -> Result<Vec<Message>, AppError> {
    rows.into_iter().map(MessageRow::into_message).collect()
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    /// The room row is the sequence counter: the `UPDATE ... RETURNING` takes
    /// a row lock that serializes concurrent appends to the same room across
    /// every process sharing the database.
    async fn append(&self, message: NewMessage) -> Result<Message, AppError> {
        let mut tx = self.pool.begin().await?;

        let position = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE chat_rooms
            SET last_position = last_position + 1, updated_at = NOW()
            WHERE id = $1 AND is_active
            RETURNING last_position
            "#,
        )
        .bind(message.room_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Room {} not found", message.room_id)))?;

        let files_data = if message.attachments.is_empty() {
            None
        } else {
            Some(Json(&message.attachments))
        };

        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "INSERT INTO chat_messages \
                 (id, room_id, position, sender_id, receiver_id, message_type, content, files_data) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {}",
            MESSAGE_COLUMNS
        ))
        .bind(message.id)
        .bind(message.room_id)
        .bind(position)
        .bind(message.sender_id)
        .bind(message.receiver_id)
        .bind(message.message_type.as_str())
        .bind(&message.content)
        .bind(files_data)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.into_message()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {} FROM chat_messages WHERE id = $1",
            MESSAGE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(MessageRow::into_message).transpose()
    }

    async fn list_after(
        &self,
        room_id: i64,
        after: i64,
        limit: i64,
    ) -> Result<Vec<Message>, AppError> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {} FROM chat_messages \
             WHERE room_id = $1 AND position > $2 \
             ORDER BY position ASC \
             LIMIT $3",
            MESSAGE_COLUMNS
        ))
        .bind(room_id)
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        into_messages(rows)
    }

    async fn list_latest(&self, room_id: i64, limit: i64) -> Result<Vec<Message>, AppError> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT * FROM ( \
                 SELECT {} FROM chat_messages \
                 WHERE room_id = $1 \
                 ORDER BY position DESC \
                 LIMIT $2 \
             ) newest ORDER BY position ASC",
            MESSAGE_COLUMNS
        ))
        .bind(room_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        into_messages(rows)
    }

    async fn last_visible(&self, room_id: i64) -> Result<Option<Message>, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {} FROM chat_messages \
             WHERE room_id = $1 AND NOT is_deleted \
             ORDER BY position DESC \
             LIMIT 1",
            MESSAGE_COLUMNS
        ))
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(MessageRow::into_message).transpose()
    }

    /// `created_at` is never touched; only content and the edit markers change.
    async fn update_content(
        &self,
        id: i64,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<Message, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "UPDATE chat_messages \
             SET content = $2, edited_at = $3, is_edited = TRUE \
             WHERE id = $1 \
             RETURNING {}",
            MESSAGE_COLUMNS
        ))
        .bind(id)
        .bind(content)
        .bind(edited_at)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| AppError::NotFound(format!("Message {} not found", id)))?
            .into_message()
    }

    async fn soft_delete(&self, id: i64) -> Result<Message, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "UPDATE chat_messages SET is_deleted = TRUE WHERE id = $1 RETURNING {}",
            MESSAGE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| AppError::NotFound(format!("Message {} not found", id)))?
            .into_message()
    }

    async fn mark_read_upto(
        &self,
        room_id: i64,
        reader_id: i64,
        position: i64,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE chat_messages
            SET is_read = TRUE
            WHERE room_id = $1 AND receiver_id = $2 AND position <= $3 AND NOT is_read
            "#,
        )
        .bind(room_id)
        .bind(reader_id)
        .bind(position)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn unread_count(&self, room_id: i64, reader_id: i64) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM chat_messages
            WHERE room_id = $1 AND receiver_id = $2 AND NOT is_read AND NOT is_deleted
            "#,
        )
        .bind(room_id)
        .bind(reader_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
