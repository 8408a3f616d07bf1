//! # Arena Server
//!
//! Hosts concurrent matches of the arena simulation.
//!
//! Each [`room::MatchRoom`] owns one [`arena_core::simulation::Engine`] and
//! one [`scheduler::Scheduler`]; the [`registry::RoomRegistry`] owns the set
//! of rooms, their snapshot fan-out channels and heartbeat sweeps.
//! [`protocol`] is the JSON message boundary the transport layer talks to.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use arena_core::error::GameError;

pub mod protocol;
pub mod registry;
pub mod room;
pub mod scheduler;

/// Room identifier.
pub type RoomId = uuid::Uuid;

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Server-level errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// No room with this id.
    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    /// Roster is at capacity.
    #[error("room {room} is full ({capacity} players)")]
    RoomFull {
        /// The room.
        room: RoomId,
        /// Its capacity.
        capacity: usize,
    },

    /// The sender is not on the room's roster.
    #[error("player '{player}' is not in room {room}")]
    NotInRoom {
        /// The room.
        room: RoomId,
        /// The sender.
        player: String,
    },

    /// Too many concurrent rooms.
    #[error("room limit of {max} reached")]
    RegistryFull {
        /// Configured limit.
        max: usize,
    },

    /// Engine rejected a lifecycle change.
    #[error(transparent)]
    Game(#[from] GameError),

    /// Failed to read a config file.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a config file.
    #[error("failed to parse config: {0}")]
    ConfigParse(String),
}

/// Server configuration.
///
/// Loaded from RON; missing fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port the transport layer listens on.
    pub port: u16,
    /// Scheduler rate in Hz.
    pub tick_rate: u32,
    /// Maximum concurrent rooms.
    pub max_rooms: usize,
    /// Players needed to start a match.
    pub players_per_room: usize,
    /// Delay between a full roster and the automatic start, in ms.
    pub start_grace_ms: u64,
    /// Delay between a match ending and room teardown, in ms.
    pub teardown_delay_ms: u64,
    /// Heartbeat sweep period, in ms.
    pub heartbeat_interval_ms: u64,
    /// Silence after which a player counts as disconnected, in ms.
    pub heartbeat_timeout_ms: u64,
    /// Buffered snapshots per room subscriber.
    pub snapshot_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            tick_rate: 10,
            max_rooms: 100,
            players_per_room: 2,
            start_grace_ms: 1_000,
            teardown_delay_ms: 30_000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 60_000,
            snapshot_buffer: 64,
        }
    }
}

impl ServerConfig {
    /// Parse from RON text.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        ron::from_str(source).map_err(|e| ServerError::ConfigParse(e.to_string()))
    }

    /// Read and parse a RON file.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_ron_str(&source)
    }

    /// Automatic start delay.
    #[must_use]
    pub fn start_grace(&self) -> Duration {
        Duration::from_millis(self.start_grace_ms)
    }

    /// Post-match teardown delay.
    #[must_use]
    pub fn teardown_delay(&self) -> Duration {
        Duration::from_millis(self.teardown_delay_ms)
    }

    /// Heartbeat sweep period.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Heartbeat timeout.
    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

/// Milliseconds since the Unix epoch, for snapshot and room timestamps.
#[must_use]
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_server() {
        let config = ServerConfig::default();
        assert_eq!(config.tick_rate, 10);
        assert_eq!(config.max_rooms, 100);
        assert_eq!(config.players_per_room, 2);
        assert_eq!(config.teardown_delay(), Duration::from_secs(30));
        assert_eq!(config.heartbeat_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_partial_ron() {
        let config = ServerConfig::from_ron_str("(tick_rate: 20, max_rooms: 4)").unwrap();
        assert_eq!(config.tick_rate, 20);
        assert_eq!(config.max_rooms, 4);
        assert_eq!(config.port, 3001);
    }

    #[test]
    fn test_bad_ron() {
        assert!(matches!(
            ServerConfig::from_ron_str("(tick_rate: \"fast\")"),
            Err(ServerError::ConfigParse(_))
        ));
    }
}
