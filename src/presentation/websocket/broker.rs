//! Room Broker
//!
//! Fans room events out to the live connections of room members.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;

use crate::application::services::{PresenceChanged, RoomService};
use crate::domain::ChatRoom;
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

use super::messages::{Outbound, ServerFrame, TypingEvent};
use super::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};
use super::typing::{TypingStopped, TypingTracker};

/// Which members of a room receive an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Everyone,
    ExceptUser(i64),
}

impl Audience {
    fn includes(&self, user_id: i64) -> bool {
        match self {
            Audience::Everyone => true,
            Audience::ExceptUser(excluded) => *excluded != user_id,
        }
    }
}

pub struct RoomBroker {
    rooms: Arc<RoomService>,
    registry: Arc<ConnectionRegistry>,
    typing: TypingTracker,
}

impl RoomBroker {
    pub fn new(rooms: Arc<RoomService>, registry: Arc<ConnectionRegistry>, typing_ttl: Duration) -> Self {
        Self {
            rooms,
            registry,
            typing: TypingTracker::new(typing_ttl),
        }
    }

    pub async fn ensure_direct_room(&self, user_id: i64, other_id: i64) -> Result<ChatRoom, AppError> {
        self.rooms.ensure_direct_room(user_id, other_id).await
    }

    pub async fn members_of(&self, room_id: i64) -> Result<HashSet<i64>, AppError> {
        self.rooms.members_of(room_id).await
    }

    pub async fn require_member(&self, room_id: i64, user_id: i64) -> Result<ChatRoom, AppError> {
        self.rooms.require_member(room_id, user_id).await
    }

    /// Deactivate a room and detach every connection that had joined it.
    pub async fn deactivate_room(&self, room_id: i64, actor_id: i64) -> Result<ChatRoom, AppError> {
        let room = self.rooms.deactivate_room(room_id, actor_id).await?;

        let left = ServerFrame::RoomLeft { room_id }.encode()?;
        for member in room.pair.members() {
            self.typing.stop(room_id, member);
            for conn in self.registry.connections_for(member) {
                if conn.current_room == Some(room_id) {
                    self.registry.set_current_room(conn.id, None);
                    self.deliver(&conn.sender, conn.id, &left);
                }
            }
        }
        Ok(room)
    }

    /// Deliver an event to the live connections of a room's members.
    ///
    /// Returns the number of connections the frame was queued on.
    pub async fn broadcast(
        &self,
        room_id: i64,
        frame: &ServerFrame,
        audience: Audience,
    ) -> Result<usize, AppError> {
        let members = self.rooms.members_of(room_id).await?;
        let payload = frame.encode()?;

        let delivered: usize = members
            .into_iter()
            .filter(|member| audience.includes(*member))
            .map(|member| self.deliver_to_user(member, &payload))
            .sum();
        Ok(delivered)
    }

    /// Tell everyone sharing an active room with the user about a presence
    /// change, once per recipient.
    pub async fn broadcast_presence(&self, change: PresenceChanged) -> Result<usize, AppError> {
        let user_id = change.user_id;
        let recipients: BTreeSet<i64> = self
            .rooms
            .rooms_for(user_id)
            .await?
            .iter()
            .filter_map(|room| room.other_member(user_id))
            .collect();
        if recipients.is_empty() {
            return Ok(0);
        }

        let payload = ServerFrame::Presence(change.into()).encode()?;
        Ok(recipients
            .into_iter()
            .map(|recipient| self.deliver_to_user(recipient, &payload))
            .sum())
    }

    /// Start or stop a typing indicator and tell the other member.
    pub async fn set_typing(
        &self,
        room_id: i64,
        user_id: i64,
        user_name: &str,
        is_typing: bool,
    ) -> Result<(), AppError> {
        if !self.rooms.members_of(room_id).await?.contains(&user_id) {
            return Err(AppError::Forbidden("Not a member of this room".into()));
        }

        if is_typing {
            self.typing.start(room_id, user_id, user_name, Instant::now());
        } else {
            self.typing.stop(room_id, user_id);
        }

        let frame = ServerFrame::Typing(TypingEvent {
            room_id,
            user_id,
            user_name: user_name.to_string(),
            is_typing,
        });
        self.broadcast(room_id, &frame, Audience::ExceptUser(user_id))
            .await?;
        Ok(())
    }

    /// Expire typing indicators at `now` and announce each one stopping.
    pub async fn sweep_typing(&self, now: Instant) -> usize {
        let expired = self.typing.expire(now);
        let count = expired.len();
        for stopped in expired {
            self.announce_stopped(stopped).await;
        }
        count
    }

    /// Clear a user's indicator in a room after leave or disconnect.
    pub async fn clear_typing_for(&self, user_id: i64, room_id: i64) {
        if let Some(stopped) = self.typing.stop(room_id, user_id) {
            self.announce_stopped(stopped).await;
        }
    }

    /// Unregister a closed connection. The user's typing indicators are
    /// cleared only once no other connection of theirs remains.
    pub async fn release_connection(&self, handle: &ConnectionHandle) {
        self.registry.unregister(handle);
        if !self.registry.is_connected(handle.user_id) {
            self.clear_all_typing_for(handle.user_id).await;
        }
    }

    /// Clear every indicator of a user.
    pub async fn clear_all_typing_for(&self, user_id: i64) {
        for stopped in self.typing.stop_user(user_id) {
            self.announce_stopped(stopped).await;
        }
    }

    pub fn is_typing(&self, room_id: i64, user_id: i64) -> bool {
        self.typing.is_typing(room_id, user_id)
    }

    async fn announce_stopped(&self, stopped: TypingStopped) {
        let frame = ServerFrame::Typing(TypingEvent {
            room_id: stopped.room_id,
            user_id: stopped.user_id,
            user_name: stopped.user_name,
            is_typing: false,
        });
        // The room may have been deactivated meanwhile
        if let Err(e) = self
            .broadcast(stopped.room_id, &frame, Audience::ExceptUser(stopped.user_id))
            .await
        {
            tracing::debug!(room_id = stopped.room_id, error = %e, "Typing stop not delivered");
        }
    }

    fn deliver_to_user(&self, user_id: i64, payload: &Utf8Bytes) -> usize {
        self.registry
            .connections_for(user_id)
            .into_iter()
            .filter(|conn| self.deliver(&conn.sender, conn.id, payload))
            .count()
    }

    fn deliver(&self, sender: &mpsc::Sender<Outbound>, connection_id: ConnectionId, payload: &Utf8Bytes) -> bool {
        match sender.try_send(Outbound::Frame(payload.clone())) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(%connection_id, "Outbound queue full, disconnecting slow consumer");
                metrics::record_fanout_drop();
                self.registry.drop_connection(connection_id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.registry.drop_connection(connection_id);
                false
            }
        }
    }
}
