//! Registry of concurrent rooms.
//!
//! The registry map is the only state shared across rooms. It is mutated
//! when rooms are created and removed; everything else happens inside the
//! rooms themselves.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time::Instant;

use arena_core::config::MatchConfig;
use arena_core::snapshot::{PlayerView, Snapshot};

use crate::room::{MatchRoom, RoomInfo};
use crate::{Result, RoomId, ServerConfig, ServerError};

struct RoomEntry {
    room: MatchRoom,
    snapshots: broadcast::Sender<Arc<Snapshot>>,
}

struct RegistryInner {
    config: ServerConfig,
    match_config: MatchConfig,
    rooms: DashMap<RoomId, RoomEntry>,
    /// Rooms created and not yet removed, counted before insertion.
    slots: AtomicUsize,
}

impl RegistryInner {
    /// Claim a slot for a new room, or `None` at the limit.
    fn reserve(&self) -> Option<usize> {
        let max = self.config.max_rooms;
        self.slots
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| (used < max).then_some(used + 1))
            .ok()
    }

    /// Remove a room and give its slot back.
    fn forget(&self, id: RoomId) -> Option<RoomEntry> {
        let (_, entry) = self.rooms.remove(&id)?;
        self.slots.fetch_sub(1, Ordering::SeqCst);
        Some(entry)
    }
}

/// Owns every live room. Clones share the same registry.
#[derive(Clone)]
pub struct RoomRegistry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for RoomRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomRegistry")
            .field("rooms", &self.inner.rooms.len())
            .field("max_rooms", &self.inner.config.max_rooms)
            .finish()
    }
}

impl RoomRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new(config: ServerConfig, match_config: MatchConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config,
                match_config,
                rooms: DashMap::new(),
                slots: AtomicUsize::new(0),
            }),
        }
    }

    /// Server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Live room count.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.inner.rooms.len()
    }

    /// Create a room and wire its snapshots into a broadcast channel.
    pub fn create_room(&self) -> Result<MatchRoom> {
        let max = self.inner.config.max_rooms;
        if self.inner.reserve().is_none() {
            tracing::warn!(max, "room limit reached");
            return Err(ServerError::RegistryFull { max });
        }

        let room = MatchRoom::new(&self.inner.config, self.inner.match_config.clone());
        let (snapshots, _) = broadcast::channel(self.inner.config.snapshot_buffer.max(1));

        let fan_out = snapshots.clone();
        room.on_snapshot(move |snapshot| {
            // No subscribers is fine.
            let _ = fan_out.send(snapshot);
        });

        let registry: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        room.on_teardown(move |id| {
            if let Some(inner) = registry.upgrade() {
                if inner.forget(id).is_some() {
                    tracing::info!(room = %id, "room removed after teardown");
                }
            }
        });

        self.inner.rooms.insert(
            room.id(),
            RoomEntry {
                room: room.clone(),
                snapshots,
            },
        );
        tracing::info!(room = %room.id(), rooms = self.inner.rooms.len(), "room created");
        Ok(room)
    }

    /// Look up a room.
    pub fn get_room(&self, id: RoomId) -> Result<MatchRoom> {
        self.inner
            .rooms
            .get(&id)
            .map(|entry| entry.room.clone())
            .ok_or(ServerError::RoomNotFound(id))
    }

    /// Destroy and forget a room.
    pub fn remove_room(&self, id: RoomId) -> bool {
        match self.inner.forget(id) {
            Some(entry) => {
                entry.room.destroy();
                tracing::info!(room = %id, "room removed");
                true
            }
            None => false,
        }
    }

    /// Summaries of every room.
    #[must_use]
    pub fn get_room_list(&self) -> Vec<RoomInfo> {
        let rooms: Vec<MatchRoom> = self
            .inner
            .rooms
            .iter()
            .map(|entry| entry.room.clone())
            .collect();
        let mut list: Vec<RoomInfo> = rooms.iter().map(MatchRoom::get_room_info).collect();
        list.sort_by_key(|info| info.created_at);
        list
    }

    /// Receive every snapshot a room emits from now on.
    pub fn subscribe(&self, id: RoomId) -> Result<broadcast::Receiver<Arc<Snapshot>>> {
        self.inner
            .rooms
            .get(&id)
            .map(|entry| entry.snapshots.subscribe())
            .ok_or(ServerError::RoomNotFound(id))
    }

    /// Join a player to a room.
    pub fn join(&self, id: RoomId, player_id: &str, name: &str) -> Result<PlayerView> {
        self.get_room(id)?.add_player(player_id, name)
    }

    /// Record a heartbeat.
    pub fn touch(&self, id: RoomId, player_id: &str) -> Result<bool> {
        Ok(self.get_room(id)?.touch(player_id, Instant::now()))
    }

    /// Mark silent players disconnected and drop abandoned rooms.
    ///
    /// Returns the ids of removed rooms.
    pub fn sweep_heartbeats(&self, now: Instant) -> Vec<RoomId> {
        let timeout = self.inner.config.heartbeat_timeout();
        let rooms: Vec<MatchRoom> = self
            .inner
            .rooms
            .iter()
            .map(|entry| entry.room.clone())
            .collect();

        let mut removed = Vec::new();
        for room in rooms {
            room.sweep(now, timeout);
            if room.is_abandoned() && self.remove_room(room.id()) {
                removed.push(room.id());
            }
        }
        if !removed.is_empty() {
            tracing::info!(removed = removed.len(), rooms = self.room_count(), "heartbeat sweep");
        }
        removed
    }

    /// Destroy every room.
    pub fn shutdown(&self) {
        let ids: Vec<RoomId> = self.inner.rooms.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.remove_room(id);
        }
    }
}
