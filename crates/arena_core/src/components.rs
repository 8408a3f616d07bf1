//! Shared component types.
//!
//! Components are plain data. Units and towers are composed of these,
//! and the behavior modules operate on them.

use serde::{Deserialize, Serialize};

use crate::math::{option_fixed_serde, Fixed};

/// Unique identifier for units and towers within one match.
pub type EntityId = u64;

/// One of the two sides of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    /// Owns rows 0-16, king at the top of the board.
    Red,
    /// Owns rows 17-33, king at the bottom of the board.
    Blue,
}

impl Team {
    /// Both teams, Red first.
    pub const ALL: [Team; 2] = [Team::Red, Team::Blue];

    /// The other team.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Team::Red => Team::Blue,
            Team::Blue => Team::Red,
        }
    }
}

/// Health component for damageable entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Current health points.
    pub current: u32,
    /// Maximum health points.
    pub max: u32,
}

impl Health {
    /// Create new health component at full health.
    #[must_use]
    pub const fn new(max: u32) -> Self {
        Self { current: max, max }
    }

    /// Check if entity is dead (health == 0).
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.current == 0
    }

    /// Apply damage, returning actual damage dealt.
    /// Uses saturating subtraction to prevent underflow.
    pub fn apply_damage(&mut self, amount: u32) -> u32 {
        let actual = amount.min(self.current);
        self.current = self.current.saturating_sub(actual);
        actual
    }
}

/// Non-owning reference to whatever a unit is attacking.
///
/// Always re-resolved against the engine's collections before use;
/// a missing key means the target is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum TargetRef {
    /// A tower.
    Structure(EntityId),
    /// Another unit.
    Unit(EntityId),
}

impl TargetRef {
    /// The referenced entity id.
    #[must_use]
    pub const fn id(self) -> EntityId {
        match self {
            TargetRef::Structure(id) | TargetRef::Unit(id) => id,
        }
    }

    /// Whether this points at a tower.
    #[must_use]
    pub const fn is_structure(self) -> bool {
        matches!(self, TargetRef::Structure(_))
    }
}

/// Behavior state of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitState {
    /// Just deployed; waiting out the deploy delay.
    Spawning,
    /// Walking to a crossing cell before it may target anything.
    MovingToCrossing,
    /// Looking for (or walking toward) a target.
    SeekingTarget,
    /// In reach of its target and trading blows.
    Attacking,
    /// Health reached zero; removed on the next tick.
    Dead,
}

impl UnitState {
    /// Whether the unit can still act.
    #[must_use]
    pub const fn is_alive(self) -> bool {
        !matches!(self, UnitState::Dead)
    }
}

/// Cooldown tracking against the match clock.
///
/// `last` is `None` until the first attack, so the first swing is immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttackClock {
    /// Match time (seconds) of the last attack.
    #[serde(with = "option_fixed_serde")]
    pub last: Option<Fixed>,
}

impl AttackClock {
    /// Whether an attack with the given interval may fire at `now`.
    #[must_use]
    pub fn ready(&self, now: Fixed, interval: Fixed) -> bool {
        match self.last {
            None => true,
            Some(last) => now - last >= interval,
        }
    }

    /// Record an attack at `now`.
    pub fn fire(&mut self, now: Fixed) {
        self.last = Some(now);
    }
}
