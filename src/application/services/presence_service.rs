//! Presence Tracker
//!
//! Per-user online state. Only real transitions are published on the
//! presence event channel; persistence is best effort.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::domain::{PresenceRecord, PresenceRepository};

const EVENT_CAPACITY: usize = 1024;

/// A user's presence as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PresenceStatus {
    pub user_id: i64,
    pub is_online: bool,
    /// `None` for users never seen by this engine
    pub last_seen: Option<DateTime<Utc>>,
}

/// Published when a user goes online or offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceChanged {
    pub user_id: i64,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
}

impl From<PresenceChanged> for PresenceStatus {
    fn from(change: PresenceChanged) -> Self {
        Self {
            user_id: change.user_id,
            is_online: change.is_online,
            last_seen: Some(change.last_seen),
        }
    }
}

pub struct PresenceTracker {
    states: DashMap<i64, PresenceRecord>,
    repo: Arc<dyn PresenceRepository>,
    events: broadcast::Sender<PresenceChanged>,
}

impl PresenceTracker {
    pub fn new(repo: Arc<dyn PresenceRepository>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            states: DashMap::new(),
            repo,
            events,
        }
    }

    /// Receive every future presence transition.
    pub fn subscribe(&self) -> broadcast::Receiver<PresenceChanged> {
        self.events.subscribe()
    }

    /// Mark a user online. Returns whether this was a transition.
    pub async fn set_online(&self, user_id: i64) -> bool {
        self.transition(user_id, true).await
    }

    /// Mark a user offline. Returns whether this was a transition.
    pub async fn set_offline(&self, user_id: i64) -> bool {
        self.transition(user_id, false).await
    }

    async fn transition(&self, user_id: i64, is_online: bool) -> bool {
        let now = Utc::now();
        let record = {
            let mut entry = self.states.entry(user_id).or_insert(PresenceRecord {
                user_id,
                is_online: !is_online,
                last_seen: now,
            });
            if entry.is_online == is_online {
                return false;
            }
            entry.is_online = is_online;
            entry.last_seen = now;
            *entry
        };

        if let Err(e) = self.repo.upsert(&record).await {
            tracing::warn!(user_id, error = %e, "Failed to persist presence");
        }

        tracing::debug!(user_id, is_online, "Presence changed");
        // No subscribers is fine
        let _ = self.events.send(PresenceChanged {
            user_id,
            is_online,
            last_seen: now,
        });
        true
    }

    /// Current presence, falling back to the persisted record.
    pub async fn status_of(&self, user_id: i64) -> PresenceStatus {
        if let Some(record) = self.states.get(&user_id) {
            return PresenceStatus {
                user_id,
                is_online: record.is_online,
                last_seen: Some(record.last_seen),
            };
        }

        match self.repo.find(user_id).await {
            // A persisted "online" without a live entry is stale: this process
            // holds every live connection.
            Ok(Some(record)) => PresenceStatus {
                user_id,
                is_online: false,
                last_seen: Some(record.last_seen),
            },
            Ok(None) => PresenceStatus {
                user_id,
                is_online: false,
                last_seen: None,
            },
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Failed to load presence");
                PresenceStatus {
                    user_id,
                    is_online: false,
                    last_seen: None,
                }
            }
        }
    }

    pub fn is_online(&self, user_id: i64) -> bool {
        self.states
            .get(&user_id)
            .map(|r| r.is_online)
            .unwrap_or(false)
    }

    pub fn online_users(&self) -> BTreeSet<i64> {
        self.states
            .iter()
            .filter(|entry| entry.is_online)
            .map(|entry| *entry.key())
            .collect()
    }
}
