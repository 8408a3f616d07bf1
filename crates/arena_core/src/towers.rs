//! Towers: the structures each team defends.
//!
//! Each team has one King and two Princess towers at fixed positions.
//! Princess towers shoot from the start. The King stays dormant until
//! fewer than two allied Princess towers are alive, then stays active
//! until destroyed.

use serde::{Deserialize, Serialize};

use crate::components::{AttackClock, EntityId, Health, Team};
use crate::grid::Footprint;
use crate::math::{fixed_decimal, Fixed, GridPos};
use crate::units::Unit;

/// Tower kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TowerKind {
    /// The King tower. Losing it loses the match.
    King,
    /// A Princess tower.
    Princess,
}

/// Where a tower sits in its team's layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TowerSlot {
    /// Centre back.
    King,
    /// Column 3 side.
    LeftPrincess,
    /// Column 14 side.
    RightPrincess,
}

impl TowerSlot {
    /// All slots in creation order.
    pub const ALL: [TowerSlot; 3] = [
        TowerSlot::King,
        TowerSlot::LeftPrincess,
        TowerSlot::RightPrincess,
    ];

    /// Kind of tower placed in this slot.
    #[must_use]
    pub const fn kind(self) -> TowerKind {
        match self {
            TowerSlot::King => TowerKind::King,
            TowerSlot::LeftPrincess | TowerSlot::RightPrincess => TowerKind::Princess,
        }
    }

    /// Fixed board cell `(row, col)` for this slot.
    #[must_use]
    pub const fn cell(self, team: Team) -> (i32, i32) {
        match (team, self) {
            (Team::Red, TowerSlot::King) => (2, 8),
            (Team::Red, TowerSlot::LeftPrincess) => (6, 3),
            (Team::Red, TowerSlot::RightPrincess) => (6, 14),
            (Team::Blue, TowerSlot::King) => (31, 8),
            (Team::Blue, TowerSlot::LeftPrincess) => (27, 3),
            (Team::Blue, TowerSlot::RightPrincess) => (27, 14),
        }
    }

    /// Client-facing label, e.g. `princess_red_left`.
    #[must_use]
    pub const fn label(self, team: Team) -> &'static str {
        match (team, self) {
            (Team::Red, TowerSlot::King) => "king_red",
            (Team::Red, TowerSlot::LeftPrincess) => "princess_red_left",
            (Team::Red, TowerSlot::RightPrincess) => "princess_red_right",
            (Team::Blue, TowerSlot::King) => "king_blue",
            (Team::Blue, TowerSlot::LeftPrincess) => "princess_blue_left",
            (Team::Blue, TowerSlot::RightPrincess) => "princess_blue_right",
        }
    }
}

/// Base numbers for one tower kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TowerStats {
    /// Maximum health points.
    pub max_health: u32,
    /// Damage per shot.
    pub damage: u32,
    /// Shots per second.
    #[serde(with = "fixed_decimal")]
    pub attack_speed: Fixed,
    /// Range in cells, measured from the tower's position.
    #[serde(with = "fixed_decimal")]
    pub range: Fixed,
    /// Distance from the tower's position to its footprint edge.
    /// Attackers add this to their own range.
    #[serde(with = "fixed_decimal")]
    pub footprint_reach: Fixed,
}

/// Stats for both tower kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TowerCatalog {
    /// King tower stats.
    pub king: TowerStats,
    /// Princess tower stats.
    pub princess: TowerStats,
}

impl TowerCatalog {
    /// Stats for a kind.
    #[must_use]
    pub const fn get(&self, kind: TowerKind) -> &TowerStats {
        match kind {
            TowerKind::King => &self.king,
            TowerKind::Princess => &self.princess,
        }
    }
}

impl Default for TowerCatalog {
    fn default() -> Self {
        Self {
            king: TowerStats {
                max_health: 4824,
                damage: 109,
                attack_speed: Fixed::from_num(1),
                range: Fixed::from_num(7),
                footprint_reach: Fixed::from_num(2),
            },
            princess: TowerStats {
                max_health: 3052,
                damage: 109,
                attack_speed: Fixed::from_num(0.8),
                range: Fixed::from_num(8.5),
                footprint_reach: Fixed::from_num(1.5),
            },
        }
    }
}

/// Result of hitting a tower.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TowerHit {
    /// Health actually removed.
    pub dealt: u32,
    /// This hit destroyed the tower.
    pub destroyed: bool,
}

/// A tower shot at a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TowerShot {
    /// Unit that was shot.
    pub target: EntityId,
    /// Damage to apply.
    pub damage: u32,
}

/// A tower on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tower {
    /// Entity id.
    pub id: EntityId,
    /// Layout slot.
    pub slot: TowerSlot,
    /// Owning team.
    pub team: Team,
    /// Fixed position.
    pub position: GridPos,
    /// Health.
    pub health: Health,
    /// Cleared when health reaches zero.
    pub is_alive: bool,
    /// Whether the tower may shoot.
    pub active: bool,
    /// Copied from the catalog at creation.
    pub stats: TowerStats,
    /// Shot cooldown.
    pub attack_clock: AttackClock,
}

impl Tower {
    /// Build the tower for `slot` with full health.
    #[must_use]
    pub fn new(id: EntityId, slot: TowerSlot, team: Team, catalog: &TowerCatalog) -> Self {
        let (row, col) = slot.cell(team);
        let stats = *catalog.get(slot.kind());
        Self {
            id,
            slot,
            team,
            position: GridPos::cell(row, col),
            health: Health::new(stats.max_health),
            is_alive: true,
            active: slot.kind() == TowerKind::Princess,
            stats,
            attack_clock: AttackClock::default(),
        }
    }

    /// Tower kind.
    #[must_use]
    pub const fn kind(&self) -> TowerKind {
        self.slot.kind()
    }

    /// Client-facing label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.slot.label(self.team)
    }

    /// Cells the tower occupies.
    ///
    /// The King covers 4x4 cells starting one up-left of its position;
    /// a Princess covers the 3x3 block centred on it.
    #[must_use]
    pub fn footprint(&self) -> Footprint {
        let (row, col) = self.position.floor_cell();
        match self.kind() {
            TowerKind::King => Footprint::around(row, col, 1, 2),
            TowerKind::Princess => Footprint::around(row, col, 1, 1),
        }
    }

    /// Apply damage. Dead towers ignore further hits.
    pub fn take_damage(&mut self, amount: u32) -> TowerHit {
        if !self.is_alive {
            return TowerHit {
                dealt: 0,
                destroyed: false,
            };
        }
        let dealt = self.health.apply_damage(amount);
        let destroyed = self.health.is_dead();
        if destroyed {
            self.is_alive = false;
            self.active = false;
        }
        TowerHit { dealt, destroyed }
    }

    /// Activate a living King once fewer than two allied Princesses remain.
    ///
    /// Returns true only on the transition.
    pub fn update_activation(&mut self, alive_allied_princesses: usize) -> bool {
        if self.kind() != TowerKind::King || !self.is_alive || self.active {
            return false;
        }
        if alive_allied_princesses < 2 {
            self.active = true;
            return true;
        }
        false
    }

    /// Nearest living enemy unit within range. Ties go to the lower id.
    pub fn acquire_target<'a>(&self, units: impl IntoIterator<Item = &'a Unit>) -> Option<EntityId> {
        let range_sq = self.stats.range.saturating_mul(self.stats.range);
        let mut best: Option<(EntityId, Fixed)> = None;
        for unit in units {
            if unit.team == self.team || !unit.is_alive() {
                continue;
            }
            let distance = self.position.distance_squared(unit.position);
            if distance > range_sq {
                continue;
            }
            match best {
                Some((best_id, best_distance))
                    if best_distance < distance || (best_distance == distance && best_id < unit.id) => {}
                _ => best = Some((unit.id, distance)),
            }
        }
        best.map(|(id, _)| id)
    }

    /// Pick a target and fire if the cooldown allows.
    pub fn step<'a>(&mut self, now: Fixed, units: impl IntoIterator<Item = &'a Unit>) -> Option<TowerShot> {
        if !self.is_alive || !self.active {
            return None;
        }
        let target = self.acquire_target(units)?;
        if !self
            .attack_clock
            .ready(now, crate::math::interval_of(self.stats.attack_speed))
        {
            return None;
        }
        self.attack_clock.fire(now);
        Some(TowerShot {
            target,
            damage: self.stats.damage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit_kind::{UnitCatalog, UnitKind};

    fn tower(slot: TowerSlot, team: Team) -> Tower {
        Tower::new(1, slot, team, &TowerCatalog::default())
    }

    #[test]
    fn test_initial_activation() {
        assert!(!tower(TowerSlot::King, Team::Red).active);
        assert!(tower(TowerSlot::LeftPrincess, Team::Red).active);
        assert!(tower(TowerSlot::RightPrincess, Team::Blue).active);
    }

    #[test]
    fn test_footprints() {
        let king = tower(TowerSlot::King, Team::Red);
        let footprint = king.footprint();
        assert_eq!((footprint.row_min, footprint.row_max), (1, 4));
        assert_eq!((footprint.col_min, footprint.col_max), (7, 10));

        let princess = tower(TowerSlot::LeftPrincess, Team::Blue);
        let footprint = princess.footprint();
        assert_eq!((footprint.row_min, footprint.row_max), (26, 28));
        assert_eq!((footprint.col_min, footprint.col_max), (2, 4));
    }

    #[test]
    fn test_destruction_deactivates() {
        let mut princess = tower(TowerSlot::LeftPrincess, Team::Red);
        let hit = princess.take_damage(10_000);
        assert_eq!(hit.dealt, 3052);
        assert!(hit.destroyed);
        assert!(!princess.is_alive);
        assert!(!princess.active);

        let again = princess.take_damage(5);
        assert_eq!(again.dealt, 0);
        assert!(!again.destroyed);
    }

    #[test]
    fn test_king_activation_is_monotonic() {
        let mut king = tower(TowerSlot::King, Team::Blue);
        assert!(!king.update_activation(2));
        assert!(king.update_activation(1));
        assert!(king.active);
        assert!(!king.update_activation(2));
        assert!(king.active);
    }

    #[test]
    fn test_tower_shoots_nearest_enemy_with_cooldown() {
        let catalog = UnitCatalog::default();
        let mut princess = tower(TowerSlot::LeftPrincess, Team::Red);
        let near = Unit::new(10, UnitKind::MiniPekka, Team::Blue, GridPos::cell(9, 3), catalog.get(UnitKind::MiniPekka), Fixed::ZERO);
        let far = Unit::new(11, UnitKind::Valkyrie, Team::Blue, GridPos::cell(12, 3), catalog.get(UnitKind::Valkyrie), Fixed::ZERO);
        let ally = Unit::new(12, UnitKind::Valkyrie, Team::Red, GridPos::cell(7, 3), catalog.get(UnitKind::Valkyrie), Fixed::ZERO);
        let units = [far, ally, near];

        let shot = princess.step(Fixed::ZERO, &units).unwrap();
        assert_eq!(shot.target, 10);
        assert_eq!(shot.damage, 109);

        // 0.8 shots per second is one every 1.25 s.
        assert!(princess.step(Fixed::from_num(1), &units).is_none());
        assert!(princess.step(Fixed::from_num(1.3), &units).is_some());
    }

    #[test]
    fn test_out_of_range_ignored() {
        let catalog = UnitCatalog::default();
        let mut king = tower(TowerSlot::King, Team::Red);
        king.active = true;
        let unit = Unit::new(10, UnitKind::Giant, Team::Blue, GridPos::cell(20, 8), catalog.get(UnitKind::Giant), Fixed::ZERO);
        assert!(king.step(Fixed::ZERO, [&unit]).is_none());
    }
}
