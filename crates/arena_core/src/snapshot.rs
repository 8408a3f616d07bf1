//! Client-facing match state.
//!
//! Snapshots are immutable, always complete, and use plain `f64`
//! coordinates so clients never see fixed-point bits.

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, TargetRef, Team, UnitState};
use crate::economy::Player;
use crate::simulation::MatchStatus;
use crate::towers::{Tower, TowerKind, TowerSlot};
use crate::unit_kind::UnitKind;
use crate::units::Unit;
use crate::victory::{EndReason, Winner};

/// Row/column pair in cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Row.
    pub row: f64,
    /// Column.
    pub col: f64,
}

impl From<crate::math::GridPos> for Position {
    fn from(pos: crate::math::GridPos) -> Self {
        Self {
            row: pos.row.to_num(),
            col: pos.col.to_num(),
        }
    }
}

/// A unit as clients see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitView {
    /// Entity id.
    pub id: EntityId,
    /// Unit kind.
    #[serde(rename = "type")]
    pub kind: UnitKind,
    /// Owning team.
    pub team: Team,
    /// Current position.
    pub position: Position,
    /// Destination.
    pub target_position: Position,
    /// Behavior state.
    pub state: UnitState,
    /// Current health.
    pub health: u32,
    /// Maximum health.
    pub max_health: u32,
    /// Alive flag.
    pub is_alive: bool,
    /// Attacking right now.
    pub is_in_combat: bool,
    /// Current target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetRef>,
    /// Flying unit.
    pub flying: bool,
}

impl From<&Unit> for UnitView {
    fn from(unit: &Unit) -> Self {
        Self {
            id: unit.id,
            kind: unit.kind,
            team: unit.team,
            position: unit.position.into(),
            target_position: unit.target_position.into(),
            state: unit.state,
            health: unit.health.current,
            max_health: unit.health.max,
            is_alive: unit.is_alive(),
            is_in_combat: unit.in_combat,
            target: unit.target,
            flying: unit.stats.flying,
        }
    }
}

/// A tower as clients see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TowerView {
    /// Entity id.
    pub id: EntityId,
    /// Stable label, e.g. `king_red`.
    pub label: String,
    /// Tower kind.
    #[serde(rename = "type")]
    pub kind: TowerKind,
    /// Layout slot.
    pub slot: TowerSlot,
    /// Owning team.
    pub team: Team,
    /// Position.
    pub position: Position,
    /// Current health.
    pub health: u32,
    /// Maximum health.
    pub max_health: u32,
    /// Alive flag.
    pub is_alive: bool,
    /// May shoot.
    pub active: bool,
    /// Damage per shot.
    pub damage: u32,
    /// Shots per second.
    pub attack_speed: f64,
    /// Range in cells.
    pub range: f64,
}

impl From<&Tower> for TowerView {
    fn from(tower: &Tower) -> Self {
        Self {
            id: tower.id,
            label: tower.label().to_string(),
            kind: tower.kind(),
            slot: tower.slot,
            team: tower.team,
            position: tower.position.into(),
            health: tower.health.current,
            max_health: tower.health.max,
            is_alive: tower.is_alive,
            active: tower.active,
            damage: tower.stats.damage,
            attack_speed: tower.stats.attack_speed.to_num(),
            range: tower.stats.range.to_num(),
        }
    }
}

/// A player as clients see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    /// Player id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Team.
    pub team: Team,
    /// Connection flag.
    pub is_connected: bool,
    /// Current elixir.
    pub elixir: f64,
    /// Elixir cap.
    pub max_elixir: f64,
    /// Crowns earned.
    pub crowns: u32,
    /// Match clock of the last accepted card.
    pub last_action_time: f64,
}

impl From<&Player> for PlayerView {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id.clone(),
            name: player.name.clone(),
            team: player.team,
            is_connected: player.connected,
            elixir: player.elixir.to_num(),
            max_elixir: player.max_elixir.to_num(),
            crowns: player.crowns,
            last_action_time: player.last_action.to_num(),
        }
    }
}

/// Full match state at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Wall clock in milliseconds, supplied by the caller.
    pub timestamp: u64,
    /// Tick index.
    pub tick: u64,
    /// Lifecycle state.
    pub status: MatchStatus,
    /// Match clock in seconds.
    pub game_time: f64,
    /// All units, by id.
    pub units: Vec<UnitView>,
    /// All towers, by id.
    pub towers: Vec<TowerView>,
    /// All players, by id.
    pub players: Vec<PlayerView>,
    /// Result, once decided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Winner>,
    /// Why the match ended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<EndReason>,
}

impl Snapshot {
    /// Find a tower by label.
    #[must_use]
    pub fn tower(&self, label: &str) -> Option<&TowerView> {
        self.towers.iter().find(|tower| tower.label == label)
    }

    /// Find a player by id.
    #[must_use]
    pub fn player(&self, id: &str) -> Option<&PlayerView> {
        self.players.iter().find(|player| player.id == id)
    }
}
