//! Room Service
//!
//! Direct room lifecycle, membership checks and room summaries.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use crate::application::dto::{LastMessage, OtherUser, RoomSummary, UserSearchResult};
use crate::application::services::PresenceTracker;
use crate::domain::{
    ChatRoom, DirectPair, MessageRepository, Participant, RoomRepository, UserDirectory,
    UserProfile,
};
use crate::shared::error::AppError;
use crate::shared::snowflake::SnowflakeGenerator;

pub struct RoomService {
    rooms: Arc<dyn RoomRepository>,
    messages: Arc<dyn MessageRepository>,
    users: Arc<dyn UserDirectory>,
    presence: Arc<PresenceTracker>,
    ids: Arc<SnowflakeGenerator>,
    /// Membership of active rooms; immutable while a room stays active
    members: DashMap<i64, DirectPair>,
}

impl RoomService {
    pub fn new(
        rooms: Arc<dyn RoomRepository>,
        messages: Arc<dyn MessageRepository>,
        users: Arc<dyn UserDirectory>,
        presence: Arc<PresenceTracker>,
        ids: Arc<SnowflakeGenerator>,
    ) -> Self {
        Self {
            rooms,
            messages,
            users,
            presence,
            ids,
            members: DashMap::new(),
        }
    }

    /// Return the active direct room for the pair, creating it if needed.
    pub async fn ensure_direct_room(&self, user_id: i64, other_id: i64) -> Result<ChatRoom, AppError> {
        let pair = DirectPair::new(user_id, other_id)?;

        match self.users.find_by_id(other_id).await? {
            Some(profile) if profile.is_active => {}
            _ => return Err(AppError::NotFound("User not found".into())),
        }

        if let Some(room) = self.rooms.find_direct(pair).await? {
            self.members.insert(room.id, room.pair);
            return Ok(room);
        }

        let candidate = ChatRoom::new_direct(self.ids.generate(), pair, user_id);
        let room = match self.rooms.create_direct(&candidate).await {
            Ok(room) => {
                tracing::info!(room_id = room.id, user_id, other_id, "Direct room created");
                room
            }
            // Lost a race with a concurrent create for the same pair
            Err(AppError::Conflict(_)) => self
                .rooms
                .find_direct(pair)
                .await?
                .ok_or_else(|| AppError::Conflict("Direct room already exists".into()))?,
            Err(e) => return Err(e),
        };

        self.members.insert(room.id, room.pair);
        Ok(room)
    }

    /// Members of an active room.
    pub async fn members_of(&self, room_id: i64) -> Result<HashSet<i64>, AppError> {
        if let Some(pair) = self.members.get(&room_id) {
            return Ok(pair.members().into_iter().collect());
        }

        let room = self.active_room(room_id).await?;
        self.members.insert(room.id, room.pair);
        Ok(room.pair.members().into_iter().collect())
    }

    /// The room, if it is active and `user_id` belongs to it.
    pub async fn require_member(&self, room_id: i64, user_id: i64) -> Result<ChatRoom, AppError> {
        let room = self.active_room(room_id).await?;
        self.members.insert(room.id, room.pair);
        if !room.has_member(user_id) {
            return Err(AppError::Forbidden("Not a member of this room".into()));
        }
        Ok(room)
    }

    /// Deactivate a room on behalf of one of its members.
    pub async fn deactivate_room(&self, room_id: i64, actor_id: i64) -> Result<ChatRoom, AppError> {
        let room = self.require_member(room_id, actor_id).await?;
        self.rooms.deactivate(room_id).await?;
        self.members.remove(&room_id);

        tracing::info!(room_id, user_id = actor_id, "Room deactivated");
        Ok(ChatRoom {
            is_active: false,
            ..room
        })
    }

    /// Move a participant's read cursor forward to `position`.
    pub async fn advance_read_cursor(
        &self,
        room_id: i64,
        user_id: i64,
        position: i64,
    ) -> Result<Participant, AppError> {
        self.rooms.advance_read_cursor(room_id, user_id, position).await
    }

    /// Active rooms of a user.
    pub async fn rooms_for(&self, user_id: i64) -> Result<Vec<ChatRoom>, AppError> {
        self.rooms.rooms_for_user(user_id).await
    }

    /// Rooms of a user with the other participant, newest message and unread count.
    pub async fn list_rooms(&self, user_id: i64) -> Result<Vec<RoomSummary>, AppError> {
        let rooms = self.rooms.rooms_for_user(user_id).await?;
        let summaries = rooms.iter().map(|room| self.summarize(room, user_id));
        futures::future::try_join_all(summaries).await
    }

    pub async fn room_summary(&self, room_id: i64, user_id: i64) -> Result<RoomSummary, AppError> {
        let room = self.require_member(room_id, user_id).await?;
        self.summarize(&room, user_id).await
    }

    pub async fn summarize(&self, room: &ChatRoom, viewer_id: i64) -> Result<RoomSummary, AppError> {
        let other_user = match room.other_member(viewer_id) {
            Some(other_id) => {
                let profile = self.profile(other_id).await?;
                Some(OtherUser {
                    id: profile.id,
                    name: profile.name,
                    email: profile.email,
                    avatar_url: profile.avatar_url,
                    is_online: self.presence.is_online(other_id),
                })
            }
            None => None,
        };

        let last_message = match self.messages.last_visible(room.id).await? {
            Some(message) => {
                let sender_name = match &other_user {
                    Some(other) if other.id == message.sender_id => other.name.clone(),
                    _ => self.profile(message.sender_id).await?.name,
                };
                Some(LastMessage {
                    id: message.id,
                    position: message.position,
                    content: message.content,
                    message_type: message.message_type,
                    created_at: message.created_at,
                    sender_name,
                })
            }
            None => None,
        };

        let unread_count = self.messages.unread_count(room.id, viewer_id).await?;
        Ok(RoomSummary::new(room, other_user, last_message, unread_count))
    }

    /// Users the caller could open a room with, by email fragment.
    pub async fn search_users(
        &self,
        caller_id: i64,
        email: &str,
        limit: i64,
    ) -> Result<Vec<UserSearchResult>, AppError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AppError::Validation("Email query is required".into()));
        }

        let users = self.users.search_by_email(email, caller_id, limit).await?;
        Ok(users
            .into_iter()
            .map(|u| UserSearchResult {
                is_online: self.presence.is_online(u.id),
                id: u.id,
                name: u.name,
                email: u.email,
                avatar_url: u.avatar_url,
            })
            .collect())
    }

    /// Profile of a participant, with a placeholder if it has disappeared.
    pub async fn profile(&self, user_id: i64) -> Result<UserProfile, AppError> {
        Ok(self
            .users
            .find_by_id(user_id)
            .await?
            .unwrap_or_else(|| UserProfile::unknown(user_id)))
    }

    async fn active_room(&self, room_id: i64) -> Result<ChatRoom, AppError> {
        match self.rooms.find_by_id(room_id).await? {
            Some(room) if room.is_active => Ok(room),
            _ => {
                self.members.remove(&room_id);
                Err(AppError::NotFound(format!("Room {} not found", room_id)))
            }
        }
    }
}
