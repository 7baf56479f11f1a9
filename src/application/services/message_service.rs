//! Message Store
//!
//! The ordered per-room message log: append, paging, read cursors, edits and
//! soft deletes.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::application::dto::{MessagePage, MessageView, ReadCursor};
use crate::application::services::attachment_service::{AttachmentResolver, FilePayload};
use crate::application::services::RoomService;
use crate::domain::{AttachmentDescriptor, ChatRoom, Message, MessageRepository, MessageType, NewMessage};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;
use crate::shared::snowflake::SnowflakeGenerator;

/// Longest accepted text content, in characters
pub const MAX_CONTENT_CHARS: usize = 5000;
/// Page size when the caller gives none
pub const DEFAULT_PAGE_SIZE: i64 = 50;
/// Largest page a caller may request
pub const MAX_PAGE_SIZE: i64 = 100;

/// Message content before it is stored.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub message_type: MessageType,
    pub content: Option<String>,
    pub attachments: Vec<AttachmentDescriptor>,
}

/// A send request as submitted by a client.
#[derive(Debug, Clone)]
pub struct SendRequest {
    /// Room to post into; looked up (or created) from the pair when absent
    pub room_id: Option<i64>,
    pub receiver_id: i64,
    pub message_type: MessageType,
    pub content: Option<String>,
    pub files: Vec<FilePayload>,
}

/// Clamp a requested page size to 1..=100.
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

pub struct MessageStore {
    rooms: Arc<RoomService>,
    messages: Arc<dyn MessageRepository>,
    attachments: Arc<AttachmentResolver>,
    ids: Arc<SnowflakeGenerator>,
    /// One append at a time per room
    append_locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl MessageStore {
    pub fn new(
        rooms: Arc<RoomService>,
        messages: Arc<dyn MessageRepository>,
        attachments: Arc<AttachmentResolver>,
        ids: Arc<SnowflakeGenerator>,
    ) -> Self {
        Self {
            rooms,
            messages,
            attachments,
            ids,
            append_locks: DashMap::new(),
        }
    }

    /// Validate, resolve attachments, then resolve the target room and append.
    ///
    /// Nothing is written for a request that fails validation. Attachments
    /// are stored before the room is resolved or created and before the
    /// room's append lock is taken; any later failure discards them again.
    pub async fn send(&self, sender_id: i64, request: SendRequest) -> Result<Message, AppError> {
        validate_request(&request)?;

        let SendRequest {
            room_id,
            receiver_id,
            message_type,
            content,
            files,
        } = request;

        let resolved = if files.is_empty() {
            Vec::new()
        } else {
            self.attachments.resolve_all(sender_id, files).await?
        };
        let category = resolved.first().map(|r| r.category);
        let attachments: Vec<_> = resolved.into_iter().map(|r| r.descriptor).collect();

        let result = async {
            let message_type = match category {
                None => message_type,
                // Files sent as "text" take the type of their first attachment
                Some(category) if message_type == MessageType::Text => category.message_type(),
                Some(category) if category.message_type() == message_type => message_type,
                Some(category) => {
                    return Err(AppError::Validation(format!(
                        "{} messages cannot carry {} attachments",
                        message_type,
                        category.as_str()
                    )))
                }
            };

            let room = self.target_room(sender_id, room_id, receiver_id).await?;
            let draft = MessageDraft {
                message_type,
                content,
                attachments: attachments.clone(),
            };
            self.append_to(&room, sender_id, draft).await
        }
        .await;

        if result.is_err() && !attachments.is_empty() {
            self.attachments.discard(&attachments).await;
        }
        result
    }

    async fn target_room(
        &self,
        sender_id: i64,
        room_id: Option<i64>,
        receiver_id: i64,
    ) -> Result<ChatRoom, AppError> {
        match room_id {
            Some(room_id) => {
                let room = self.rooms.require_member(room_id, sender_id).await?;
                if room.other_member(sender_id) != Some(receiver_id) {
                    return Err(AppError::Validation(
                        "Receiver is not the other member of this room".into(),
                    ));
                }
                Ok(room)
            }
            None => self.rooms.ensure_direct_room(sender_id, receiver_id).await,
        }
    }

    /// Append a message to a room the sender belongs to.
    pub async fn append(
        &self,
        room_id: i64,
        sender_id: i64,
        draft: MessageDraft,
    ) -> Result<Message, AppError> {
        let room = self.rooms.require_member(room_id, sender_id).await?;
        self.append_to(&room, sender_id, draft).await
    }

    async fn append_to(
        &self,
        room: &ChatRoom,
        sender_id: i64,
        draft: MessageDraft,
    ) -> Result<Message, AppError> {
        validate_draft(&draft)?;
        let receiver_id = room
            .other_member(sender_id)
            .ok_or_else(|| AppError::Forbidden("Not a member of this room".into()))?;

        let new_message = NewMessage {
            id: self.ids.generate(),
            room_id: room.id,
            sender_id,
            receiver_id,
            message_type: draft.message_type,
            content: draft.content,
            attachments: draft.attachments,
        };

        let lock = self
            .append_locks
            .entry(room.id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let message = {
            let _guard = lock.lock().await;
            self.messages.append(new_message).await?
        };

        metrics::record_message_appended(message.message_type.as_str());
        tracing::debug!(
            room_id = message.room_id,
            message_id = message.id,
            position = message.position,
            sender_id,
            "Message appended"
        );
        Ok(message)
    }

    /// Messages after `after`, ascending.
    pub async fn list_since(
        &self,
        room_id: i64,
        reader_id: i64,
        after: i64,
        limit: Option<i64>,
    ) -> Result<MessagePage, AppError> {
        let room = self.rooms.require_member(room_id, reader_id).await?;
        let limit = clamp_limit(limit);

        let mut messages = self
            .messages
            .list_after(room.id, after.max(0), limit + 1)
            .await?;
        let has_more = messages.len() as i64 > limit;
        messages.truncate(limit as usize);

        let next_after = messages.last().map(|m| m.position).or(Some(after.max(0)));
        Ok(MessagePage {
            messages: self.views(&room, messages).await?,
            has_more,
            next_after,
        })
    }

    /// The most recent page, still ascending.
    pub async fn latest(
        &self,
        room_id: i64,
        reader_id: i64,
        limit: Option<i64>,
    ) -> Result<MessagePage, AppError> {
        let room = self.rooms.require_member(room_id, reader_id).await?;
        let messages = self
            .messages
            .list_latest(room.id, clamp_limit(limit))
            .await?;

        let next_after = messages.last().map(|m| m.position).or(Some(0));
        Ok(MessagePage {
            messages: self.views(&room, messages).await?,
            has_more: false,
            next_after,
        })
    }

    /// Acknowledge reading up to `upto` (or the newest message).
    ///
    /// The cursor never moves backward and never passes the room's last
    /// position.
    pub async fn mark_read(
        &self,
        room_id: i64,
        reader_id: i64,
        upto: Option<i64>,
    ) -> Result<ReadCursor, AppError> {
        let room = self.rooms.require_member(room_id, reader_id).await?;
        let target = upto
            .unwrap_or(room.last_position)
            .min(room.last_position)
            .max(0);

        let participant = self
            .rooms
            .advance_read_cursor(room.id, reader_id, target)
            .await?;
        let flagged = self
            .messages
            .mark_read_upto(room.id, reader_id, participant.last_read_position)
            .await?;

        tracing::debug!(
            room_id,
            user_id = reader_id,
            position = participant.last_read_position,
            flagged,
            "Read cursor advanced"
        );

        Ok(ReadCursor {
            room_id: room.id,
            user_id: reader_id,
            position: participant.last_read_position,
            read_at: participant.last_read_at.unwrap_or_else(Utc::now),
        })
    }

    /// Replace the content of a text message. Author only.
    pub async fn edit(
        &self,
        message_id: i64,
        editor_id: i64,
        content: &str,
    ) -> Result<Message, AppError> {
        let message = self.authored(message_id, editor_id).await?;
        if message.message_type != MessageType::Text {
            return Err(AppError::Validation("Only text messages can be edited".into()));
        }
        if message.is_deleted {
            return Err(AppError::Validation("Deleted messages cannot be edited".into()));
        }
        validate_content(Some(content))?;

        let updated = self
            .messages
            .update_content(message_id, content, Utc::now())
            .await?;
        tracing::debug!(message_id, room_id = updated.room_id, "Message edited");
        Ok(updated)
    }

    /// Flag a message deleted. Author only; positions are not renumbered.
    pub async fn soft_delete(&self, message_id: i64, actor_id: i64) -> Result<Message, AppError> {
        let message = self.authored(message_id, actor_id).await?;
        if message.is_deleted {
            return Ok(message);
        }

        let deleted = self.messages.soft_delete(message_id).await?;
        tracing::debug!(message_id, room_id = deleted.room_id, "Message deleted");
        Ok(deleted)
    }

    /// Unread message count per room, rooms with nothing unread omitted.
    pub async fn unread_counts(&self, user_id: i64) -> Result<BTreeMap<i64, i64>, AppError> {
        let mut counts = BTreeMap::new();
        for room in self.rooms.rooms_for(user_id).await? {
            let count = self.messages.unread_count(room.id, user_id).await?;
            if count > 0 {
                counts.insert(room.id, count);
            }
        }
        Ok(counts)
    }

    /// Client view of one message.
    pub async fn view(
        &self,
        message: Message,
        local_temp_id: Option<serde_json::Value>,
    ) -> Result<MessageView, AppError> {
        let sender = self.rooms.profile(message.sender_id).await?;
        let receiver = self.rooms.profile(message.receiver_id).await?;
        Ok(MessageView::new(message, &sender, &receiver, local_temp_id))
    }

    /// Stop tracking a room that can no longer receive messages.
    pub fn forget_room(&self, room_id: i64) {
        self.append_locks.remove(&room_id);
    }

    async fn views(&self, room: &ChatRoom, messages: Vec<Message>) -> Result<Vec<MessageView>, AppError> {
        let [low, high] = room.pair.members();
        let low = self.rooms.profile(low).await?;
        let high = self.rooms.profile(high).await?;
        let profile = |id: i64| if id == low.id { &low } else { &high };

        Ok(messages
            .into_iter()
            .map(|m| {
                let (sender, receiver) = (profile(m.sender_id), profile(m.receiver_id));
                MessageView::new(m, sender, receiver, None)
            })
            .collect())
    }

    async fn authored(&self, message_id: i64, user_id: i64) -> Result<Message, AppError> {
        let message = self
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Message {} not found", message_id)))?;
        self.rooms.require_member(message.room_id, user_id).await?;
        if message.sender_id != user_id {
            return Err(AppError::Forbidden("Only the author can change a message".into()));
        }
        Ok(message)
    }
}

fn validate_content(content: Option<&str>) -> Result<(), AppError> {
    match content {
        Some(text) if !text.trim().is_empty() => {
            if text.chars().count() > MAX_CONTENT_CHARS {
                Err(AppError::Validation(format!(
                    "Content must be at most {} characters",
                    MAX_CONTENT_CHARS
                )))
            } else {
                Ok(())
            }
        }
        _ => Err(AppError::Validation("Content is required".into())),
    }
}

fn validate_draft(draft: &MessageDraft) -> Result<(), AppError> {
    validate_shape(
        draft.message_type,
        draft.content.as_deref(),
        draft.attachments.len(),
    )
}

/// Checks that need no I/O, run before anything is stored.
fn validate_request(request: &SendRequest) -> Result<(), AppError> {
    if request.files.is_empty() {
        validate_shape(request.message_type, request.content.as_deref(), 0)
    } else {
        validate_caption(request.content.as_deref())
    }
}

fn validate_shape(
    message_type: MessageType,
    content: Option<&str>,
    attachments: usize,
) -> Result<(), AppError> {
    if !message_type.requires_attachments() {
        return validate_content(content);
    }
    if attachments == 0 {
        return Err(AppError::Validation(format!(
            "{} messages need at least one attachment",
            message_type
        )));
    }
    validate_caption(content)
}

/// Captions are optional but bounded
fn validate_caption(caption: Option<&str>) -> Result<(), AppError> {
    match caption {
        Some(text) if text.chars().count() > MAX_CONTENT_CHARS => validate_content(Some(text)),
        _ => Ok(()),
    }
}
