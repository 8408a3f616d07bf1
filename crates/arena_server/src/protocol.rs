//! JSON wire protocol.
//!
//! Transports hand each decoded [`ClientMessage`] to [`route`] together with
//! the id of the player on that connection, and send back the returned
//! [`ServerMessage`]. Snapshots are pushed separately from
//! [`RoomRegistry::subscribe`](crate::registry::RoomRegistry::subscribe).
//!
//! # Example Session
//!
//! ```text
//! -> {"type":"CREATE_MATCH"}
//! <- {"type":"MATCH_CREATED","match_id":"5f0c..."}
//! -> {"type":"JOIN_MATCH","match_id":"5f0c...","name":"Alice"}
//! <- {"type":"JOINED","match_id":"5f0c...","player":{...}}
//! -> {"type":"DEPLOY_UNIT","match_id":"5f0c...","unit_type":"giant","row":10,"col":4}
//! <- {"type":"ACK"}
//! -> {"type":"PING"}
//! <- {"type":"PONG"}
//! ```

use serde::{Deserialize, Serialize};

use arena_core::command::PlayerAction;
use arena_core::error::CommandRejection;
use arena_core::grid::{COLS, ROWS};
use arena_core::simulation::MatchStatus;
use arena_core::snapshot::{PlayerView, Snapshot};
use arena_core::unit_kind::UnitKind;

use crate::registry::RoomRegistry;
use crate::room::{MatchRoom, RoomInfo};
use crate::{RoomId, ServerError};

/// A client message tagged with its sender, for transports that multiplex
/// several players over one stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEnvelope {
    /// Sending player.
    pub player_id: String,
    /// The message.
    #[serde(flatten)]
    pub message: ClientMessage,
}

/// Match control verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchVerb {
    /// Pause the match.
    Pause,
    /// Resume the match.
    Resume,
    /// Concede.
    Surrender,
}

/// Messages from clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Open a new room.
    CreateMatch,
    /// Join or rejoin a room.
    JoinMatch {
        /// Room.
        match_id: RoomId,
        /// Display name.
        name: String,
    },
    /// Queue a unit deployment.
    DeployUnit {
        /// Room.
        match_id: RoomId,
        /// Card.
        unit_type: UnitKind,
        /// Row.
        row: i32,
        /// Column.
        col: i32,
    },
    /// Pause, resume or surrender.
    MatchAction {
        /// Room.
        match_id: RoomId,
        /// Verb.
        action: MatchVerb,
    },
    /// Request the current snapshot.
    GetState {
        /// Room.
        match_id: RoomId,
    },
    /// List rooms.
    ListMatches,
    /// Heartbeat.
    Ping,
}

impl ClientMessage {
    /// Room this message addresses, if any.
    #[must_use]
    pub const fn match_id(&self) -> Option<RoomId> {
        match self {
            Self::JoinMatch { match_id, .. }
            | Self::DeployUnit { match_id, .. }
            | Self::MatchAction { match_id, .. }
            | Self::GetState { match_id } => Some(*match_id),
            Self::CreateMatch | Self::ListMatches | Self::Ping => None,
        }
    }
}

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No such room.
    RoomNotFound,
    /// Room or server at capacity.
    RoomFull,
    /// Malformed or disallowed request.
    InvalidAction,
    /// Deploy costs more than the player has.
    NotEnoughElixir,
    /// Deploy outside the board or the player's half.
    InvalidPosition,
    /// Match has not started.
    GameNotStarted,
    /// Match is over.
    GameEnded,
    /// Sender is not in this room.
    Unauthorized,
}

/// Messages to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Full match state.
    Snapshot {
        /// The state.
        snapshot: Box<Snapshot>,
    },
    /// A room was created.
    MatchCreated {
        /// Its id.
        match_id: RoomId,
    },
    /// Join accepted.
    Joined {
        /// Room.
        match_id: RoomId,
        /// The sender's player record.
        player: PlayerView,
    },
    /// Room listing.
    Matches {
        /// Rooms.
        rooms: Vec<RoomInfo>,
    },
    /// Request accepted.
    Ack,
    /// Heartbeat reply.
    Pong,
    /// Request failed.
    Error {
        /// Code.
        code: ErrorCode,
        /// Human-readable detail.
        message: String,
    },
}

impl ServerMessage {
    /// Error reply.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    /// Snapshot push.
    #[must_use]
    pub fn snapshot(snapshot: &Snapshot) -> Self {
        Self::Snapshot {
            snapshot: Box::new(snapshot.clone()),
        }
    }
}

impl From<&CommandRejection> for ServerMessage {
    fn from(rejection: &CommandRejection) -> Self {
        let code = match rejection {
            CommandRejection::UnknownPlayer(_) => ErrorCode::Unauthorized,
            CommandRejection::InsufficientElixir { .. } => ErrorCode::NotEnoughElixir,
            CommandRejection::IllegalCell { .. } | CommandRejection::BlockedCell { .. } => {
                ErrorCode::InvalidPosition
            }
            CommandRejection::NotRunning(MatchStatus::Ended) => ErrorCode::GameEnded,
            CommandRejection::NotRunning(_) => ErrorCode::GameNotStarted,
        };
        Self::error(code, rejection.to_string())
    }
}

impl From<&ServerError> for ServerMessage {
    fn from(error: &ServerError) -> Self {
        let code = match error {
            ServerError::RoomNotFound(_) => ErrorCode::RoomNotFound,
            ServerError::RoomFull { .. } | ServerError::RegistryFull { .. } => ErrorCode::RoomFull,
            ServerError::NotInRoom { .. } => ErrorCode::Unauthorized,
            ServerError::Game(_) | ServerError::Io(_) | ServerError::ConfigParse(_) => {
                ErrorCode::InvalidAction
            }
        };
        Self::error(code, error.to_string())
    }
}

/// Parse one JSON message.
pub fn decode(text: &str) -> Result<ClientMessage, ServerMessage> {
    serde_json::from_str(text)
        .map_err(|e| ServerMessage::error(ErrorCode::InvalidAction, format!("invalid message format: {e}")))
}

/// Parse one JSON line carrying a [`ClientEnvelope`].
pub fn decode_envelope(text: &str) -> Result<ClientEnvelope, ServerMessage> {
    serde_json::from_str(text)
        .map_err(|e| ServerMessage::error(ErrorCode::InvalidAction, format!("invalid message format: {e}")))
}

/// Serialize one message.
#[must_use]
pub fn encode(message: &ServerMessage) -> String {
    serde_json::to_string(message).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to encode server message");
        r#"{"type":"ERROR","code":"INVALID_ACTION","message":"encoding failed"}"#.to_string()
    })
}

/// Whether a cell lies on the board.
#[must_use]
pub fn in_bounds(row: i32, col: i32) -> bool {
    (0..ROWS as i32).contains(&row) && (0..COLS as i32).contains(&col)
}

/// Validate and dispatch one message on behalf of `player_id`.
pub fn route(registry: &RoomRegistry, player_id: &str, message: ClientMessage) -> ServerMessage {
    if let Some(match_id) = message.match_id() {
        // Any addressed message counts as a heartbeat.
        let _ = registry.touch(match_id, player_id);
    }

    let reply = match message {
        ClientMessage::Ping => Ok(ServerMessage::Pong),
        ClientMessage::ListMatches => Ok(ServerMessage::Matches {
            rooms: registry.get_room_list(),
        }),
        ClientMessage::CreateMatch => registry
            .create_room()
            .map(|room| ServerMessage::MatchCreated { match_id: room.id() }),
        ClientMessage::JoinMatch { match_id, name } => registry
            .join(match_id, player_id, &name)
            .map(|player| ServerMessage::Joined { match_id, player }),
        ClientMessage::GetState { match_id } => registry
            .get_room(match_id)
            .map(|room| ServerMessage::snapshot(&room.get_snapshot())),
        ClientMessage::DeployUnit {
            match_id,
            unit_type,
            row,
            col,
        } => {
            if !in_bounds(row, col) {
                return ServerMessage::error(
                    ErrorCode::InvalidPosition,
                    format!("cell ({row}, {col}) is off the board"),
                );
            }
            let action = PlayerAction::Deploy {
                kind: unit_type,
                row,
                col,
            };
            return queue(registry, match_id, player_id, action);
        }
        ClientMessage::MatchAction { match_id, action } => match action {
            MatchVerb::Surrender => return queue(registry, match_id, player_id, PlayerAction::Surrender),
            MatchVerb::Pause => member_room(registry, match_id, player_id)
                .and_then(|room| room.pause_game())
                .map(|()| ServerMessage::Ack),
            MatchVerb::Resume => member_room(registry, match_id, player_id)
                .and_then(|room| room.resume_game())
                .map(|()| ServerMessage::Ack),
        },
    };

    reply.unwrap_or_else(|error| (&error).into())
}

/// Look up a room the sender belongs to.
fn member_room(registry: &RoomRegistry, match_id: RoomId, player_id: &str) -> crate::Result<MatchRoom> {
    let room = registry.get_room(match_id)?;
    if !room.has_player(player_id) {
        return Err(ServerError::NotInRoom {
            room: match_id,
            player: player_id.to_string(),
        });
    }
    Ok(room)
}

fn queue(registry: &RoomRegistry, match_id: RoomId, player_id: &str, action: PlayerAction) -> ServerMessage {
    let room = match registry.get_room(match_id) {
        Ok(room) => room,
        Err(error) => return (&error).into(),
    };
    match room.queue_action(player_id, action) {
        Ok(()) => ServerMessage::Ack,
        Err(rejection) => (&rejection).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_core::config::MatchConfig;
    use crate::ServerConfig;

    fn registry() -> RoomRegistry {
        RoomRegistry::new(ServerConfig::default(), MatchConfig::default())
    }

    fn code(message: &ServerMessage) -> Option<ErrorCode> {
        match message {
            ServerMessage::Error { code, .. } => Some(*code),
            _ => None,
        }
    }

    #[test]
    fn test_decode_wire_names() {
        let message = decode(
            r#"{"type":"DEPLOY_UNIT","match_id":"67e55044-10b1-426f-9247-bb680e5fe0c8","unit_type":"babyDragon","row":20,"col":5}"#,
        )
        .unwrap();
        assert!(matches!(
            message,
            ClientMessage::DeployUnit {
                unit_type: UnitKind::BabyDragon,
                row: 20,
                col: 5,
                ..
            }
        ));
        assert_eq!(decode(r#"{"type":"PING"}"#).unwrap(), ClientMessage::Ping);
    }

    #[test]
    fn test_decode_envelope() {
        let envelope = decode_envelope(r#"{"player_id":"p1","type":"LIST_MATCHES"}"#).unwrap();
        assert_eq!(envelope.player_id, "p1");
        assert_eq!(envelope.message, ClientMessage::ListMatches);
        assert!(decode_envelope(r#"{"type":"PING"}"#).is_err());
    }

    #[test]
    fn test_decode_garbage_is_invalid_action() {
        let error = decode("{nope").unwrap_err();
        assert_eq!(code(&error), Some(ErrorCode::InvalidAction));
    }

    #[test]
    fn test_encode_error() {
        let text = encode(&ServerMessage::error(ErrorCode::NotEnoughElixir, "need 5"));
        assert_eq!(text, r#"{"type":"ERROR","code":"NOT_ENOUGH_ELIXIR","message":"need 5"}"#);
    }

    #[test]
    fn test_bounds() {
        assert!(in_bounds(0, 0));
        assert!(in_bounds(33, 17));
        assert!(!in_bounds(34, 0));
        assert!(!in_bounds(0, -1));
    }

    #[test]
    fn test_unknown_room() {
        let registry = registry();
        let reply = route(
            &registry,
            "p1",
            ClientMessage::GetState {
                match_id: RoomId::new_v4(),
            },
        );
        assert_eq!(code(&reply), Some(ErrorCode::RoomNotFound));
    }

    #[test]
    fn test_off_board_deploy() {
        let registry = registry();
        let room = registry.create_room().unwrap();
        let reply = route(
            &registry,
            "p1",
            ClientMessage::DeployUnit {
                match_id: room.id(),
                unit_type: UnitKind::Giant,
                row: 40,
                col: 2,
            },
        );
        assert_eq!(code(&reply), Some(ErrorCode::InvalidPosition));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deploy_before_start() {
        let registry = registry();
        let room = registry.create_room().unwrap();
        let joined = route(
            &registry,
            "p1",
            ClientMessage::JoinMatch {
                match_id: room.id(),
                name: "Alice".into(),
            },
        );
        assert!(matches!(joined, ServerMessage::Joined { .. }));

        let reply = route(
            &registry,
            "p1",
            ClientMessage::DeployUnit {
                match_id: room.id(),
                unit_type: UnitKind::Giant,
                row: 10,
                col: 2,
            },
        );
        assert_eq!(code(&reply), Some(ErrorCode::GameNotStarted));

        let reply = route(
            &registry,
            "p1",
            ClientMessage::MatchAction {
                match_id: room.id(),
                action: MatchVerb::Pause,
            },
        );
        assert_eq!(code(&reply), Some(ErrorCode::InvalidAction));
    }
}
