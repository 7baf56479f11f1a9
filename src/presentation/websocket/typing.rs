//! Typing indicator state.
//!
//! Entries live for a fixed TTL after the last "typing" frame. Expiry is a
//! plain function of the instant passed in, driven by a periodic sweep.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct TypingEntry {
    user_name: String,
    expires_at: Instant,
}

/// A typing indicator that ended, by timeout or explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingStopped {
    pub room_id: i64,
    pub user_id: i64,
    pub user_name: String,
}

pub struct TypingTracker {
    ttl: Duration,
    entries: Mutex<HashMap<(i64, i64), TypingEntry>>,
}

impl TypingTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Start or refresh an indicator. Returns `true` if the user was not
    /// already typing in the room.
    pub fn start(&self, room_id: i64, user_id: i64, user_name: &str, now: Instant) -> bool {
        self.entries
            .lock()
            .insert(
                (room_id, user_id),
                TypingEntry {
                    user_name: user_name.to_string(),
                    expires_at: now + self.ttl,
                },
            )
            .is_none()
    }

    /// End an indicator. Returns it if it was active.
    pub fn stop(&self, room_id: i64, user_id: i64) -> Option<TypingStopped> {
        self.entries
            .lock()
            .remove(&(room_id, user_id))
            .map(|entry| TypingStopped {
                room_id,
                user_id,
                user_name: entry.user_name,
            })
    }

    /// Remove and return every indicator whose TTL has passed at `now`.
    pub fn expire(&self, now: Instant) -> Vec<TypingStopped> {
        let mut entries = self.entries.lock();
        let expired: Vec<(i64, i64)> = entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| *key)
            .collect();

        expired
            .into_iter()
            .filter_map(|(room_id, user_id)| {
                entries
                    .remove(&(room_id, user_id))
                    .map(|entry| TypingStopped {
                        room_id,
                        user_id,
                        user_name: entry.user_name,
                    })
            })
            .collect()
    }

    /// End every indicator of a user, in any room.
    pub fn stop_user(&self, user_id: i64) -> Vec<TypingStopped> {
        let mut entries = self.entries.lock();
        let rooms: Vec<i64> = entries
            .keys()
            .filter(|(_, user)| *user == user_id)
            .map(|(room, _)| *room)
            .collect();

        rooms
            .into_iter()
            .filter_map(|room_id| {
                entries
                    .remove(&(room_id, user_id))
                    .map(|entry| TypingStopped {
                        room_id,
                        user_id,
                        user_name: entry.user_name,
                    })
            })
            .collect()
    }

    pub fn is_typing(&self, room_id: i64, user_id: i64) -> bool {
        self.entries.lock().contains_key(&(room_id, user_id))
    }
}
