//! Response DTOs
//!
//! Data structures for API response bodies and WebSocket frame payloads.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{AttachmentDescriptor, ChatRoom, Message, MessageType, UserProfile};

/// Public view of a participant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub avatar_url: Option<String>,
}

impl From<&UserProfile> for UserSummary {
    fn from(profile: &UserProfile) -> Self {
        Self {
            id: profile.id,
            name: profile.name.clone(),
            email: profile.email.clone(),
            avatar_url: profile.avatar_url.clone(),
        }
    }
}

/// A message as delivered to clients.
///
/// `local_temp_id` and `files_data` are always serialized, as `null` when
/// absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageView {
    pub id: i64,
    pub room_id: i64,
    pub position: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub message_type: MessageType,
    pub content: Option<String>,
    /// Client correlation token, echoed verbatim
    pub local_temp_id: Option<serde_json::Value>,
    pub files_data: Option<Vec<AttachmentDescriptor>>,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    pub is_deleted: bool,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub sender_details: UserSummary,
    pub receiver_details: UserSummary,
}

impl MessageView {
    pub fn new(
        message: Message,
        sender: &UserProfile,
        receiver: &UserProfile,
        local_temp_id: Option<serde_json::Value>,
    ) -> Self {
        let message = message.redacted();
        let files_data = (!message.attachments.is_empty()).then_some(message.attachments);
        Self {
            id: message.id,
            room_id: message.room_id,
            position: message.position,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            message_type: message.message_type,
            content: message.content,
            local_temp_id,
            files_data,
            created_at: message.created_at,
            is_read: message.is_read,
            is_deleted: message.is_deleted,
            is_edited: message.is_edited,
            edited_at: message.edited_at,
            sender_details: sender.into(),
            receiver_details: receiver.into(),
        }
    }
}

/// One page of a room's history, ascending by position
#[derive(Debug, Clone, Serialize)]
pub struct MessagePage {
    pub messages: Vec<MessageView>,
    pub has_more: bool,
    /// Pass as `after` to fetch the next page
    pub next_after: Option<i64>,
}

/// A participant's read position after an acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadCursor {
    pub room_id: i64,
    pub user_id: i64,
    pub position: i64,
    pub read_at: DateTime<Utc>,
}

/// The other member of a direct room
#[derive(Debug, Clone, Serialize)]
pub struct OtherUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub is_online: bool,
}

/// Preview of a room's newest visible message
#[derive(Debug, Clone, Serialize)]
pub struct LastMessage {
    pub id: i64,
    pub position: i64,
    pub content: Option<String>,
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
    pub sender_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
    pub id: i64,
    pub room_type: &'static str,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
    pub last_position: i64,
    pub other_user: Option<OtherUser>,
    pub last_message: Option<LastMessage>,
    pub unread_count: i64,
}

impl RoomSummary {
    pub fn new(
        room: &ChatRoom,
        other_user: Option<OtherUser>,
        last_message: Option<LastMessage>,
        unread_count: i64,
    ) -> Self {
        Self {
            id: room.id,
            room_type: room.kind.as_str(),
            created_by: room.created_by,
            created_at: room.created_at,
            updated_at: room.updated_at,
            is_active: room.is_active,
            last_position: room.last_position,
            other_user,
            last_message,
            unread_count,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomListResponse {
    pub rooms: Vec<RoomSummary>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnreadCountResponse {
    pub total: i64,
    /// Room ID to unread count, rooms with nothing unread omitted
    pub rooms: BTreeMap<i64, i64>,
}

impl From<BTreeMap<i64, i64>> for UnreadCountResponse {
    fn from(rooms: BTreeMap<i64, i64>) -> Self {
        Self {
            total: rooms.values().sum(),
            rooms,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSearchResult {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub is_online: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSearchResponse {
    pub users: Vec<UserSearchResult>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OnlineUsersResponse {
    pub users: Vec<i64>,
    pub total: usize,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}
