//! # Arena Core
//!
//! Deterministic simulation for a two-team tower battle arena.
//!
//! This crate contains **only** deterministic logic:
//! - No IO or networking
//! - No wall clock (time advances by supplied deltas)
//! - No floating-point math inside the simulation (uses fixed-point)
//!
//! The server crate wraps an [`simulation::Engine`] per room, drives it
//! from a fixed-rate scheduler and broadcasts [`snapshot::Snapshot`]s.
//!
//! ## Crate Structure
//!
//! - [`simulation`] - The engine and its tick
//! - [`units`] - Unit behavior state machine
//! - [`towers`] - King and Princess towers
//! - [`systems`] - Targeting and movement helpers
//! - [`grid`] - Board geometry, crossings, tower footprints
//! - [`economy`] - Players and elixir
//! - [`victory`] - Win conditions
//! - [`config`] - RON-loadable match tuning
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod command;
pub mod components;
pub mod config;
pub mod economy;
pub mod error;
pub mod grid;
pub mod math;
pub mod simulation;
pub mod snapshot;
pub mod systems;
pub mod towers;
pub mod unit_kind;
pub mod units;
pub mod victory;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::command::{PlayerAction, PlayerCommand};
    pub use crate::components::*;
    pub use crate::config::{MatchConfig, TimingConfig};
    pub use crate::economy::{ElixirConfig, Player};
    pub use crate::error::{CommandRejection, GameError, Result};
    pub use crate::grid::GridConfig;
    pub use crate::math::{Fixed, GridPos};
    pub use crate::simulation::{AttackEvent, Engine, MatchStatus, TickEvents};
    pub use crate::snapshot::Snapshot;
    pub use crate::towers::{Tower, TowerKind, TowerSlot};
    pub use crate::unit_kind::{UnitCatalog, UnitKind, UnitStats};
    pub use crate::units::Unit;
    pub use crate::victory::{EndReason, MatchOutcome, Winner};
}
