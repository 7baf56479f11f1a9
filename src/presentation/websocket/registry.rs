//! Connection Registry
//!
//! Tracks every live WebSocket connection by user, and drives presence
//! from connection lifecycle.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::services::PresenceTracker;
use crate::infrastructure::metrics;

use super::messages::Outbound;

pub type ConnectionId = Uuid;

/// Identifies one registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub user_id: i64,
}

struct Connection {
    user_id: i64,
    sender: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
    current_room: Option<i64>,
}

/// Snapshot of a connection for delivery.
#[derive(Debug, Clone)]
pub struct LiveConnection {
    pub id: ConnectionId,
    pub sender: mpsc::Sender<Outbound>,
    pub current_room: Option<i64>,
}

pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Connection>,
    by_user: DashMap<i64, HashSet<ConnectionId>>,
    /// Bumped on every register and on every last-connection close; an
    /// offline timer only fires if the generation it saw is still current.
    /// Values come from `next_generation` and are never reused, so entries
    /// can be pruned once a user is offline.
    generations: DashMap<i64, u64>,
    next_generation: AtomicU64,
    /// Serializes presence transitions per user
    presence_locks: DashMap<i64, Arc<Mutex<()>>>,
    presence: Arc<PresenceTracker>,
    grace: Duration,
}

impl ConnectionRegistry {
    pub fn new(presence: Arc<PresenceTracker>, grace: Duration) -> Self {
        Self {
            connections: DashMap::new(),
            by_user: DashMap::new(),
            generations: DashMap::new(),
            next_generation: AtomicU64::new(0),
            presence_locks: DashMap::new(),
            presence,
            grace,
        }
    }

    pub async fn register(
        &self,
        user_id: i64,
        sender: mpsc::Sender<Outbound>,
        cancel: CancellationToken,
    ) -> ConnectionHandle {
        let handle = ConnectionHandle {
            id: Uuid::new_v4(),
            user_id,
        };

        let lock = self.presence_lock(user_id);
        let _guard = lock.lock().await;

        self.connections.insert(
            handle.id,
            Connection {
                user_id,
                sender,
                cancel,
                current_room: None,
            },
        );
        self.by_user.entry(user_id).or_default().insert(handle.id);
        let generation = self.bump_generation(user_id);
        metrics::set_websocket_connections(self.connections.len());

        self.presence.set_online(user_id).await;

        tracing::debug!(
            connection_id = %handle.id,
            user_id,
            generation,
            "Connection registered"
        );
        handle
    }

    /// Remove a connection. Returns `false` if it was already gone.
    ///
    /// Removing a user's last connection arms the offline timer.
    pub fn unregister(self: &Arc<Self>, handle: &ConnectionHandle) -> bool {
        if self.connections.remove(&handle.id).is_none() {
            return false;
        }
        metrics::set_websocket_connections(self.connections.len());

        if let Some(mut ids) = self.by_user.get_mut(&handle.user_id) {
            ids.remove(&handle.id);
        }
        let emptied = self
            .by_user
            .remove_if(&handle.user_id, |_, ids| ids.is_empty())
            .is_some();

        tracing::debug!(connection_id = %handle.id, user_id = handle.user_id, "Connection unregistered");

        if emptied {
            let generation = self.bump_generation(handle.user_id);
            self.arm_offline_timer(handle.user_id, generation);
        }
        true
    }

    /// Server-side close: cancel the connection's tasks and unregister it.
    pub fn drop_connection(self: &Arc<Self>, id: ConnectionId) {
        let handle = match self.connections.get(&id) {
            Some(conn) => {
                conn.cancel.cancel();
                ConnectionHandle {
                    id,
                    user_id: conn.user_id,
                }
            }
            None => return,
        };

        tracing::warn!(connection_id = %id, user_id = handle.user_id, "Dropping connection");
        self.unregister(&handle);
    }

    pub fn set_current_room(&self, id: ConnectionId, room_id: Option<i64>) {
        if let Some(mut conn) = self.connections.get_mut(&id) {
            conn.current_room = room_id;
        }
    }

    pub fn connections_for(&self, user_id: i64) -> Vec<LiveConnection> {
        let ids: Vec<ConnectionId> = match self.by_user.get(&user_id) {
            Some(ids) => ids.iter().copied().collect(),
            None => return Vec::new(),
        };

        ids.into_iter()
            .filter_map(|id| {
                self.connections.get(&id).map(|conn| LiveConnection {
                    id,
                    sender: conn.sender.clone(),
                    current_room: conn.current_room,
                })
            })
            .collect()
    }

    pub fn is_connected(&self, user_id: i64) -> bool {
        self.by_user
            .get(&user_id)
            .map(|ids| !ids.is_empty())
            .unwrap_or(false)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Cancel every connection, used on shutdown.
    pub fn cancel_all(&self) {
        for conn in self.connections.iter() {
            conn.cancel.cancel();
        }
    }

    fn presence_lock(&self, user_id: i64) -> Arc<Mutex<()>> {
        self.presence_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn bump_generation(&self, user_id: i64) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        self.generations.insert(user_id, generation);
        generation
    }

    fn generation(&self, user_id: i64) -> u64 {
        self.generations.get(&user_id).map(|g| *g).unwrap_or(0)
    }

    fn arm_offline_timer(self: &Arc<Self>, user_id: i64, generation: u64) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(registry.grace).await;

            let lock = registry.presence_lock(user_id);
            let _guard = lock.lock().await;
            if registry.generation(user_id) != generation || registry.is_connected(user_id) {
                tracing::trace!(user_id, "Reconnected within grace period");
                return;
            }
            registry.presence.set_offline(user_id).await;

            registry.generations.remove_if(&user_id, |_, g| *g == generation);
            // Held only by the map and this task when nobody is waiting
            registry
                .presence_locks
                .remove_if(&user_id, |_, lock| Arc::strong_count(lock) == 2);
        });
    }
}
