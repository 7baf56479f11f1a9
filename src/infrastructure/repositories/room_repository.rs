//! Room Repository Implementation
//!
//! PostgreSQL implementation of direct rooms and their participants.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{ChatRoom, DirectPair, Participant, RoomKind, RoomRepository};
use crate::infrastructure::database::is_unique_violation;
use crate::shared::error::AppError;

/// PostgreSQL room repository implementation.
pub struct PgRoomRepository {
    pool: PgPool,
}

impl PgRoomRepository {
    /// Creates a new PgRoomRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Internal row type for room queries.
#[derive(Debug, sqlx::FromRow)]
struct RoomRow {
    id: i64,
    room_type: String,
    user_low: i64,
    user_high: i64,
    created_by: i64,
    last_position: i64,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RoomRow {
    /// Converts database row to domain ChatRoom entity.
    fn into_room(self) -> Result<ChatRoom, AppError> {
        let kind = RoomKind::parse(&self.room_type).ok_or_else(|| {
            AppError::Internal(format!(
                "Room {} has unsupported type {}",
                self.id, self.room_type
            ))
        })?;
        Ok(ChatRoom {
            id: self.id,
            kind,
            pair: DirectPair::new(self.user_low, self.user_high)?,
            created_by: self.created_by,
            last_position: self.last_position,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ParticipantRow {
    room_id: i64,
    user_id: i64,
    joined_at: DateTime<Utc>,
    last_read_position: i64,
    last_read_at: Option<DateTime<Utc>>,
}

impl From<ParticipantRow> for Participant {
    fn from(row: ParticipantRow) -> Self {
        Self {
            room_id: row.room_id,
            user_id: row.user_id,
            joined_at: row.joined_at,
            last_read_position: row.last_read_position,
            last_read_at: row.last_read_at,
        }
    }
}

const ROOM_COLUMNS: &str = "id, room_type, user_low, user_high, created_by, last_position, \
                            is_active, created_at, updated_at";

#[async_trait]
impl RoomRepository for PgRoomRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<ChatRoom>, AppError> {
        let row = sqlx::query_as::<_, RoomRow>(&format!(
            "SELECT {} FROM chat_rooms WHERE id = $1",
            ROOM_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RoomRow::into_room).transpose()
    }

    async fn find_direct(&self, pair: DirectPair) -> Result<Option<ChatRoom>, AppError> {
        let row = sqlx::query_as::<_, RoomRow>(&format!(
            "SELECT {} FROM chat_rooms \
             WHERE user_low = $1 AND user_high = $2 AND room_type = 'direct' AND is_active",
            ROOM_COLUMNS
        ))
        .bind(pair.low())
        .bind(pair.high())
        .fetch_optional(&self.pool)
        .await?;

        row.map(RoomRow::into_room).transpose()
    }

    /// Inserts the room and both participants in one transaction. The partial
    /// unique index on active pairs turns a concurrent duplicate into
    /// `AppError::Conflict`.
    async fn create_direct(&self, room: &ChatRoom) -> Result<ChatRoom, AppError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, RoomRow>(&format!(
            "INSERT INTO chat_rooms \
                 (id, room_type, user_low, user_high, created_by, last_position, \
                  is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, 0, TRUE, $6, $6) \
             RETURNING {}",
            ROOM_COLUMNS
        ))
        .bind(room.id)
        .bind(room.kind.as_str())
        .bind(room.pair.low())
        .bind(room.pair.high())
        .bind(room.created_by)
        .bind(room.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("Direct room already exists".into())
            } else {
                AppError::Database(e)
            }
        })?;

        for user_id in room.pair.members() {
            sqlx::query(
                "INSERT INTO chat_participants (room_id, user_id, joined_at) VALUES ($1, $2, $3)",
            )
            .bind(room.id)
            .bind(user_id)
            .bind(room.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        inserted.into_room()
    }

    async fn rooms_for_user(&self, user_id: i64) -> Result<Vec<ChatRoom>, AppError> {
        let rows = sqlx::query_as::<_, RoomRow>(
            r#"
            SELECT r.id, r.room_type, r.user_low, r.user_high, r.created_by,
                   r.last_position, r.is_active, r.created_at, r.updated_at
            FROM chat_rooms r
            JOIN chat_participants p ON p.room_id = r.id
            WHERE p.user_id = $1 AND r.is_active
            ORDER BY r.updated_at DESC, r.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RoomRow::into_room).collect()
    }

    /// `GREATEST` keeps the cursor monotonic even when two acknowledgements
    /// race.
    async fn advance_read_cursor(
        &self,
        room_id: i64,
        user_id: i64,
        position: i64,
    ) -> Result<Participant, AppError> {
        let row = sqlx::query_as::<_, ParticipantRow>(
            r#"
            UPDATE chat_participants
            SET last_read_at = CASE WHEN $3 > last_read_position THEN NOW() ELSE last_read_at END,
                last_read_position = GREATEST(last_read_position, $3)
            WHERE room_id = $1 AND user_id = $2
            RETURNING room_id, user_id, joined_at, last_read_position, last_read_at
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .bind(position)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Participant::from).ok_or_else(|| {
            AppError::NotFound(format!("User {} is not in room {}", user_id, room_id))
        })
    }

    async fn deactivate(&self, room_id: i64) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE chat_rooms SET is_active = FALSE, updated_at = NOW() WHERE id = $1 AND is_active",
        )
        .bind(room_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Room {} not found", room_id)));
        }

        sqlx::query("DELETE FROM chat_participants WHERE room_id = $1")
            .bind(room_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
