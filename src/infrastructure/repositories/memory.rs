//! In-memory repository backend.
//!
//! Used when no database URL is configured and by the test suite. One lock
//! guards all tables so every repository operation is atomic, matching the
//! transactional behavior of the PostgreSQL implementations.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::{
    ChatRoom, DirectPair, Message, MessageRepository, NewMessage, Participant, PresenceRecord,
    PresenceRepository, RoomRepository, UserDirectory, UserProfile,
};
use crate::shared::error::AppError;

#[derive(Default)]
struct Tables {
    rooms: HashMap<i64, ChatRoom>,
    participants: HashMap<(i64, i64), Participant>,
    /// Messages per room, ordered by position
    messages: HashMap<i64, Vec<Message>>,
    /// Message ID to room ID
    message_rooms: HashMap<i64, i64>,
    presence: HashMap<i64, PresenceRecord>,
    users: HashMap<i64, UserProfile>,
}

impl Tables {
    fn message_mut(&mut self, id: i64) -> Result<&mut Message, AppError> {
        let not_found = || AppError::NotFound(format!("Message {} not found", id));
        let room_id = *self.message_rooms.get(&id).ok_or_else(not_found)?;
        self.messages
            .get_mut(&room_id)
            .and_then(|log| log.iter_mut().find(|m| m.id == id))
            .ok_or_else(not_found)
    }
}

/// All chat tables held in process memory.
#[derive(Default)]
pub struct InMemoryChatStore {
    tables: RwLock<Tables>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a user profile.
    pub fn insert_user(&self, profile: UserProfile) {
        self.tables.write().users.insert(profile.id, profile);
    }
}

#[async_trait]
impl RoomRepository for InMemoryChatStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<ChatRoom>, AppError> {
        Ok(self.tables.read().rooms.get(&id).cloned())
    }

    async fn find_direct(&self, pair: DirectPair) -> Result<Option<ChatRoom>, AppError> {
        Ok(self
            .tables
            .read()
            .rooms
            .values()
            .find(|r| r.is_active && r.pair == pair)
            .cloned())
    }

    async fn create_direct(&self, room: &ChatRoom) -> Result<ChatRoom, AppError> {
        let mut tables = self.tables.write();
        if tables
            .rooms
            .values()
            .any(|r| r.is_active && r.pair == room.pair)
        {
            return Err(AppError::Conflict("Direct room already exists".into()));
        }
        if tables.rooms.contains_key(&room.id) {
            return Err(AppError::Conflict(format!("Room {} already exists", room.id)));
        }

        let mut stored = room.clone();
        stored.last_position = 0;
        stored.is_active = true;
        for user_id in stored.pair.members() {
            tables.participants.insert(
                (stored.id, user_id),
                Participant::new(stored.id, user_id, stored.created_at),
            );
        }
        tables.rooms.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn rooms_for_user(&self, user_id: i64) -> Result<Vec<ChatRoom>, AppError> {
        let tables = self.tables.read();
        let mut rooms: Vec<ChatRoom> = tables
            .rooms
            .values()
            .filter(|r| r.is_active && tables.participants.contains_key(&(r.id, user_id)))
            .cloned()
            .collect();
        rooms.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(rooms)
    }

    async fn advance_read_cursor(
        &self,
        room_id: i64,
        user_id: i64,
        position: i64,
    ) -> Result<Participant, AppError> {
        let mut tables = self.tables.write();
        let participant = tables
            .participants
            .get_mut(&(room_id, user_id))
            .ok_or_else(|| {
                AppError::NotFound(format!("User {} is not in room {}", user_id, room_id))
            })?;
        if position > participant.last_read_position {
            participant.last_read_position = position;
            participant.last_read_at = Some(Utc::now());
        }
        Ok(participant.clone())
    }

    async fn deactivate(&self, room_id: i64) -> Result<(), AppError> {
        let mut tables = self.tables.write();
        match tables.rooms.get_mut(&room_id) {
            Some(room) if room.is_active => {
                room.is_active = false;
                room.updated_at = Utc::now();
            }
            _ => return Err(AppError::NotFound(format!("Room {} not found", room_id))),
        }
        tables.participants.retain(|(rid, _), _| *rid != room_id);
        Ok(())
    }
}

#[async_trait]
impl MessageRepository for InMemoryChatStore {
    async fn append(&self, message: NewMessage) -> Result<Message, AppError> {
        let mut tables = self.tables.write();
        if tables.message_rooms.contains_key(&message.id) {
            return Err(AppError::Conflict(format!(
                "Message {} already exists",
                message.id
            )));
        }

        let now = Utc::now();
        let room = tables
            .rooms
            .get_mut(&message.room_id)
            .filter(|r| r.is_active)
            .ok_or_else(|| AppError::NotFound(format!("Room {} not found", message.room_id)))?;
        room.last_position += 1;
        room.updated_at = now;
        let position = room.last_position;

        let stored = Message {
            id: message.id,
            room_id: message.room_id,
            position,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            message_type: message.message_type,
            content: message.content,
            attachments: message.attachments,
            created_at: now,
            edited_at: None,
            is_edited: false,
            is_read: false,
            is_deleted: false,
        };
        tables.message_rooms.insert(stored.id, stored.room_id);
        tables
            .messages
            .entry(stored.room_id)
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, AppError> {
        let tables = self.tables.read();
        Ok(tables.message_rooms.get(&id).and_then(|room_id| {
            tables
                .messages
                .get(room_id)
                .and_then(|log| log.iter().find(|m| m.id == id))
                .cloned()
        }))
    }

    async fn list_after(
        &self,
        room_id: i64,
        after: i64,
        limit: i64,
    ) -> Result<Vec<Message>, AppError> {
        let tables = self.tables.read();
        let Some(log) = tables.messages.get(&room_id) else {
            return Ok(Vec::new());
        };
        // Positions are dense and start at 1, so the index of `after + 1` is `after`.
        let start = usize::try_from(after.max(0)).unwrap_or(usize::MAX);
        let take = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(log.iter().skip(start).take(take).cloned().collect())
    }

    async fn list_latest(&self, room_id: i64, limit: i64) -> Result<Vec<Message>, AppError> {
        let tables = self.tables.read();
        let Some(log) = tables.messages.get(&room_id) else {
            return Ok(Vec::new());
        };
        let take = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        let start = log.len().saturating_sub(take);
        Ok(log[start..].to_vec())
    }

    async fn last_visible(&self, room_id: i64) -> Result<Option<Message>, AppError> {
        Ok(self
            .tables
            .read()
            .messages
            .get(&room_id)
            .and_then(|log| log.iter().rev().find(|m| !m.is_deleted))
            .cloned())
    }

    async fn update_content(
        &self,
        id: i64,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<Message, AppError> {
        let mut tables = self.tables.write();
        let message = tables.message_mut(id)?;
        message.content = Some(content.to_string());
        message.edited_at = Some(edited_at);
        message.is_edited = true;
        Ok(message.clone())
    }

    async fn soft_delete(&self, id: i64) -> Result<Message, AppError> {
        let mut tables = self.tables.write();
        let message = tables.message_mut(id)?;
        message.is_deleted = true;
        Ok(message.clone())
    }

    async fn mark_read_upto(
        &self,
        room_id: i64,
        reader_id: i64,
        position: i64,
    ) -> Result<u64, AppError> {
        let mut tables = self.tables.write();
        let mut updated = 0;
        if let Some(log) = tables.messages.get_mut(&room_id) {
            for message in log
                .iter_mut()
                .filter(|m| m.receiver_id == reader_id && m.position <= position && !m.is_read)
            {
                message.is_read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn unread_count(&self, room_id: i64, reader_id: i64) -> Result<i64, AppError> {
        let tables = self.tables.read();
        let count = tables
            .messages
            .get(&room_id)
            .map(|log| {
                log.iter()
                    .filter(|m| m.receiver_id == reader_id && !m.is_read && !m.is_deleted)
                    .count()
            })
            .unwrap_or(0);
        Ok(count as i64)
    }
}

#[async_trait]
impl PresenceRepository for InMemoryChatStore {
    async fn upsert(&self, record: &PresenceRecord) -> Result<(), AppError> {
        self.tables.write().presence.insert(record.user_id, *record);
        Ok(())
    }

    async fn find(&self, user_id: i64) -> Result<Option<PresenceRecord>, AppError> {
        Ok(self.tables.read().presence.get(&user_id).copied())
    }
}

#[async_trait]
impl UserDirectory for InMemoryChatStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<UserProfile>, AppError> {
        Ok(self.tables.read().users.get(&id).cloned())
    }

    async fn search_by_email(
        &self,
        query: &str,
        exclude_id: i64,
        limit: i64,
    ) -> Result<Vec<UserProfile>, AppError> {
        let needle = query.to_lowercase();
        let mut found: Vec<UserProfile> = self
            .tables
            .read()
            .users
            .values()
            .filter(|u| u.is_active && u.id != exclude_id)
            .filter(|u| u.email.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }
}
