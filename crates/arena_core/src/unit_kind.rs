//! Unit kinds and their behavior table.
//!
//! Every unit runs the same update function; what differs between kinds
//! is data:
//! - [`UnitKind`]: closed set of deployable cards
//! - [`UnitStats`]: base numbers and behavior flags for one kind
//! - [`UnitCatalog`]: the table mapping each kind to its stats
//!
//! The catalog is part of [`MatchConfig`](crate::config::MatchConfig) and can
//! be tuned from RON without code changes.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_decimal, Fixed};

/// A deployable unit kind.
///
/// Serialized with the client-facing names (`giant`, `babyDragon`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnitKind {
    /// Slow tank that only hits buildings.
    Giant,
    /// Flying splash dragon.
    BabyDragon,
    /// Fast heavy-hitting melee unit.
    MiniPekka,
    /// Melee spinner.
    Valkyrie,
}

impl UnitKind {
    /// All kinds in catalog order.
    pub const ALL: [UnitKind; 4] = [
        UnitKind::Giant,
        UnitKind::BabyDragon,
        UnitKind::MiniPekka,
        UnitKind::Valkyrie,
    ];

    /// Client-facing name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            UnitKind::Giant => "giant",
            UnitKind::BabyDragon => "babyDragon",
            UnitKind::MiniPekka => "miniPekka",
            UnitKind::Valkyrie => "valkyrie",
        }
    }

    /// Parse a client-facing name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base numbers for one unit kind.
///
/// # Example RON
///
/// ```ron
/// UnitStats(
///     max_health: 5092,
///     speed: 1.0,
///     damage: 287,
///     attack_speed: 1.5,
///     range: 1.2,
///     flying: false,
///     buildings_only: true,
///     cost: 5,
///     retarget_margin: 1.0,
/// )
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStats {
    /// Maximum health points.
    pub max_health: u32,
    /// Movement speed in cells per second.
    #[serde(with = "fixed_decimal")]
    pub speed: Fixed,
    /// Damage per attack.
    pub damage: u32,
    /// Attacks per second.
    #[serde(with = "fixed_decimal")]
    pub attack_speed: Fixed,
    /// Attack range in cells.
    #[serde(with = "fixed_decimal")]
    pub range: Fixed,
    /// Flying units ignore flagged cells and can be hit only by air-capable attackers.
    pub flying: bool,
    /// Only structures are valid targets.
    pub buildings_only: bool,
    /// Elixir cost to deploy.
    pub cost: u32,
    /// A new candidate must be closer than the current target by more than this.
    #[serde(with = "fixed_decimal")]
    pub retarget_margin: Fixed,
}

impl UnitStats {
    /// Seconds between attacks.
    #[must_use]
    pub fn attack_interval(&self) -> Fixed {
        crate::math::interval_of(self.attack_speed)
    }
}

/// Behavior table for every [`UnitKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitCatalog {
    /// Giant stats.
    pub giant: UnitStats,
    /// Baby Dragon stats.
    pub baby_dragon: UnitStats,
    /// Mini P.E.K.K.A stats.
    pub mini_pekka: UnitStats,
    /// Valkyrie stats.
    pub valkyrie: UnitStats,
}

impl UnitCatalog {
    /// Stats for a kind.
    #[inline]
    #[must_use]
    pub fn get(&self, kind: UnitKind) -> &UnitStats {
        match kind {
            UnitKind::Giant => &self.giant,
            UnitKind::BabyDragon => &self.baby_dragon,
            UnitKind::MiniPekka => &self.mini_pekka,
            UnitKind::Valkyrie => &self.valkyrie,
        }
    }

    /// Elixir cost of a kind.
    #[must_use]
    pub fn cost(&self, kind: UnitKind) -> u32 {
        self.get(kind).cost
    }
}

impl Default for UnitCatalog {
    fn default() -> Self {
        let one = Fixed::from_num(1);
        Self {
            giant: UnitStats {
                max_health: 5092,
                speed: one,
                damage: 287,
                attack_speed: Fixed::from_num(1.5),
                range: Fixed::from_num(1.2),
                flying: false,
                buildings_only: true,
                cost: 5,
                retarget_margin: one,
            },
            baby_dragon: UnitStats {
                max_health: 1264,
                speed: Fixed::from_num(2),
                damage: 151,
                attack_speed: Fixed::from_num(1.5),
                range: Fixed::from_num(3.5),
                flying: true,
                buildings_only: false,
                cost: 4,
                retarget_margin: one,
            },
            mini_pekka: UnitStats {
                max_health: 1361,
                speed: Fixed::from_num(2),
                damage: 718,
                attack_speed: Fixed::from_num(1.6),
                range: Fixed::from_num(1.2),
                flying: false,
                buildings_only: false,
                cost: 4,
                retarget_margin: one,
            },
            valkyrie: UnitStats {
                max_health: 2206,
                speed: Fixed::from_num(1.5),
                damage: 260,
                attack_speed: Fixed::from_num(1.5),
                range: Fixed::from_num(1.2),
                flying: false,
                buildings_only: false,
                cost: 4,
                retarget_margin: one,
            },
        }
    }
}
