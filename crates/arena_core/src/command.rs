//! Player commands accepted by the engine.

use serde::{Deserialize, Serialize};

use crate::unit_kind::UnitKind;

/// What a player wants to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerAction {
    /// Play a card at a cell.
    Deploy {
        /// Card to play.
        kind: UnitKind,
        /// Target row.
        row: i32,
        /// Target column.
        col: i32,
    },
    /// Concede the match.
    Surrender,
}

/// An action attributed to a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerCommand {
    /// Issuing player.
    pub player_id: String,
    /// The action.
    pub action: PlayerAction,
}

impl PlayerCommand {
    /// Deploy command.
    #[must_use]
    pub fn deploy(player_id: impl Into<String>, kind: UnitKind, row: i32, col: i32) -> Self {
        Self {
            player_id: player_id.into(),
            action: PlayerAction::Deploy { kind, row, col },
        }
    }

    /// Surrender command.
    #[must_use]
    pub fn surrender(player_id: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            action: PlayerAction::Surrender,
        }
    }
}
