//! Error types for the match simulation.

use thiserror::Error;

use crate::components::Team;
use crate::simulation::MatchStatus;
use crate::unit_kind::UnitKind;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all match simulation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    /// A lifecycle transition was requested from the wrong state.
    #[error("Invalid transition: cannot {action} while match is {status:?}")]
    InvalidTransition {
        /// The attempted operation.
        action: &'static str,
        /// Status at the time of the request.
        status: MatchStatus,
    },

    /// Configuration data could not be parsed.
    #[error("Failed to parse match config: {0}")]
    ConfigParse(String),
}

/// Why a player command was refused.
///
/// Rejections never mutate state; the room layer drops them silently.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandRejection {
    /// No player with this id in the match.
    #[error("unknown player '{0}'")]
    UnknownPlayer(String),

    /// Not enough elixir for the requested card.
    #[error("not enough elixir for {kind:?}: need {required}, have {available}")]
    InsufficientElixir {
        /// Card that was played.
        kind: UnitKind,
        /// Elixir cost of the card.
        required: u32,
        /// Whole elixir available.
        available: u32,
    },

    /// Deploy cell outside the team's half or outside the grid.
    #[error("cell ({row}, {col}) is not a legal deploy cell for {team:?}")]
    IllegalCell {
        /// Deploying team.
        team: Team,
        /// Requested row.
        row: i32,
        /// Requested column.
        col: i32,
    },

    /// Deploy cell inside a tower footprint.
    #[error("cell ({row}, {col}) is occupied by a tower")]
    BlockedCell {
        /// Requested row.
        row: i32,
        /// Requested column.
        col: i32,
    },

    /// The match is not accepting this command right now.
    #[error("match is {0:?}")]
    NotRunning(MatchStatus),
}
