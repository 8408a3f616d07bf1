//! Deployed units and their behavior.
//!
//! Every kind runs the same state machine; [`UnitStats`] decides speed,
//! reach, what can be targeted and how often the unit swings.
//!
//! ```text
//! Spawning ──► MovingToCrossing ──► SeekingTarget ◄──► Attacking
//!     └──────────────────────────────────►┘               │
//!                                 Dead ◄── (any, health 0) ┘
//! ```
//!
//! A step never touches other entities. Attacks are returned as
//! [`UnitAttack`] and applied by the engine after the unit is put back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::{AttackClock, EntityId, Health, TargetRef, Team, UnitState};
use crate::grid::{FlaggedCells, GridConfig, CROSSING_ARRIVAL};
use crate::math::{fixed_serde, Fixed, GridPos};
use crate::systems::{self, Candidate, Destination};
use crate::towers::Tower;
use crate::unit_kind::{UnitKind, UnitStats};

/// A unit on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Entity id.
    pub id: EntityId,
    /// Card the unit came from.
    pub kind: UnitKind,
    /// Owning team.
    pub team: Team,
    /// Current position.
    pub position: GridPos,
    /// Where the unit is heading.
    pub target_position: GridPos,
    /// Behavior state.
    pub state: UnitState,
    /// Health.
    pub health: Health,
    /// Set while attacking.
    pub in_combat: bool,
    /// Current target, re-resolved every use.
    pub target: Option<TargetRef>,
    /// Crossing cell being walked to.
    pub crossing: Option<GridPos>,
    /// Attack cooldown.
    pub attack_clock: AttackClock,
    /// Match clock at deployment.
    #[serde(with = "fixed_serde")]
    pub spawned_at: Fixed,
    /// Copied from the catalog at deployment.
    pub stats: UnitStats,
}

/// A unit hit something.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitAttack {
    /// Attacker.
    pub attacker: EntityId,
    /// Victim.
    pub target: TargetRef,
    /// Damage to apply.
    pub damage: u32,
}

/// Result of hitting a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitHit {
    /// Health actually removed.
    pub dealt: u32,
    /// This hit killed the unit.
    pub killed: bool,
}

/// What happened during one unit step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitOutcome {
    /// Attack to apply, if the unit swung this tick.
    pub attack: Option<UnitAttack>,
    /// The unit gave up (buildings-only with nothing left to hit).
    pub expired: bool,
}

/// Everything a unit can see while it steps.
///
/// `units` does not contain the stepping unit.
pub struct UnitContext<'a> {
    /// Match clock, seconds.
    pub now: Fixed,
    /// Seconds since the previous tick.
    pub dt: Fixed,
    /// Time a fresh unit waits before acting.
    pub deploy_delay: Fixed,
    /// Board geometry.
    pub grid: &'a GridConfig,
    /// Cells ground units must avoid.
    pub flagged: &'a FlaggedCells,
    /// All towers.
    pub towers: &'a BTreeMap<EntityId, Tower>,
    /// Every other unit.
    pub units: &'a BTreeMap<EntityId, Unit>,
}

impl Unit {
    /// Create a unit in [`UnitState::Spawning`] at full health.
    #[must_use]
    pub fn new(
        id: EntityId,
        kind: UnitKind,
        team: Team,
        position: GridPos,
        stats: &UnitStats,
        spawned_at: Fixed,
    ) -> Self {
        Self {
            id,
            kind,
            team,
            position,
            target_position: position,
            state: UnitState::Spawning,
            health: Health::new(stats.max_health),
            in_combat: false,
            target: None,
            crossing: None,
            attack_clock: AttackClock::default(),
            spawned_at,
            stats: *stats,
        }
    }

    /// Alive and able to act.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state.is_alive() && !self.health.is_dead()
    }

    /// Apply damage. Dead units ignore further hits.
    pub fn take_damage(&mut self, amount: u32) -> UnitHit {
        if !self.is_alive() {
            return UnitHit {
                dealt: 0,
                killed: false,
            };
        }
        let dealt = self.health.apply_damage(amount);
        let killed = self.health.is_dead();
        if killed {
            self.die();
        }
        UnitHit { dealt, killed }
    }

    fn die(&mut self) {
        self.health.current = 0;
        self.state = UnitState::Dead;
        self.in_combat = false;
        self.target = None;
        self.crossing = None;
    }

    /// Advance this unit by one tick.
    pub fn step(&mut self, ctx: &UnitContext<'_>) -> UnitOutcome {
        match self.state {
            UnitState::Dead => UnitOutcome::default(),
            _ if !self.is_alive() => UnitOutcome::default(),
            UnitState::Spawning => {
                if ctx.now - self.spawned_at >= ctx.deploy_delay {
                    self.choose_route(ctx.grid);
                }
                UnitOutcome::default()
            }
            UnitState::MovingToCrossing => {
                self.walk_to_crossing(ctx);
                UnitOutcome::default()
            }
            UnitState::SeekingTarget => self.seek(ctx),
            UnitState::Attacking => self.attack(ctx),
        }
    }

    /// Ground units on their own half head for the nearest crossing first.
    fn choose_route(&mut self, grid: &GridConfig) {
        if !self.stats.flying && grid.needs_crossing(self.team, self.position) {
            if let Some(crossing) = grid.nearest_crossing(self.position) {
                self.crossing = Some(crossing);
                self.target_position = crossing;
                self.state = UnitState::MovingToCrossing;
                return;
            }
        }
        self.state = UnitState::SeekingTarget;
    }

    fn walk_to_crossing(&mut self, ctx: &UnitContext<'_>) {
        let Some(crossing) = self.crossing else {
            self.state = UnitState::SeekingTarget;
            return;
        };
        if ctx.grid.has_crossed(self.team, self.position) {
            self.crossing = None;
            self.state = UnitState::SeekingTarget;
            return;
        }

        let step = self.stats.speed.saturating_mul(ctx.dt);
        let moved = systems::advance(
            self.position,
            &Destination::point(crossing),
            step,
            !self.stats.flying,
            ctx.flagged,
            ctx.grid,
        );
        self.position = moved.position;

        if self.position.distance(crossing) < Fixed::from_num(CROSSING_ARRIVAL) {
            tracing::trace!(unit = self.id, "reached crossing");
            self.crossing = None;
            self.state = UnitState::SeekingTarget;
        }
    }

    /// Where to go for `target`, or `None` if it is no longer valid.
    fn resolve(&self, target: TargetRef, ctx: &UnitContext<'_>) -> Option<Destination> {
        match target {
            TargetRef::Structure(id) => {
                let tower = ctx.towers.get(&id)?;
                if tower.team == self.team || !tower.is_alive {
                    return None;
                }
                if self.stats.buildings_only && !tower.active {
                    return None;
                }
                Some(Destination::within(
                    tower.position,
                    self.stats.range + tower.stats.footprint_reach,
                    (!self.stats.flying).then(|| tower.footprint()),
                ))
            }
            TargetRef::Unit(id) => {
                let enemy = ctx.units.get(&id)?;
                if !systems::can_target_unit(self, enemy, ctx.grid) {
                    return None;
                }
                Some(Destination::within(enemy.position, self.stats.range, None))
            }
        }
    }

    fn candidate(&self, ctx: &UnitContext<'_>) -> Option<Candidate> {
        if self.stats.buildings_only {
            systems::nearest_active_structure(self, ctx.towers)
        } else {
            systems::find_closest_enemy(self, ctx.units, ctx.towers, ctx.grid)
        }
    }

    fn enemy_structures_remain(&self, ctx: &UnitContext<'_>) -> bool {
        ctx.towers
            .values()
            .any(|tower| tower.team != self.team && tower.is_alive)
    }

    fn lose_target(&mut self) {
        self.target = None;
        self.in_combat = false;
        self.state = UnitState::SeekingTarget;
    }

    fn expire(&mut self) -> UnitOutcome {
        tracing::debug!(unit = self.id, kind = %self.kind, "no enemy structures left");
        self.die();
        UnitOutcome {
            attack: None,
            expired: true,
        }
    }

    fn seek(&mut self, ctx: &UnitContext<'_>) -> UnitOutcome {
        let mut current = self
            .target
            .and_then(|target| self.resolve(target, ctx).map(|resolved| (target, resolved)));
        if current.is_none() && self.target.is_some() {
            self.lose_target();
        }

        if let Some(candidate) = self.candidate(ctx) {
            let replace = match current {
                None => true,
                Some((target, resolved)) => {
                    target != candidate.target
                        && !self.in_combat
                        && candidate.distance + self.stats.retarget_margin
                            < self.position.distance(resolved.point)
                }
            };
            if replace {
                if let Some(resolved) = self.resolve(candidate.target, ctx) {
                    tracing::trace!(unit = self.id, target = ?candidate.target, "acquired target");
                    self.target = Some(candidate.target);
                    current = Some((candidate.target, resolved));
                }
            }
        }

        let Some((_, resolved)) = current else {
            if self.stats.buildings_only && !self.enemy_structures_remain(ctx) {
                return self.expire();
            }
            return UnitOutcome::default();
        };

        self.target_position = resolved.point;
        if resolved.reached(self.position) {
            self.state = UnitState::Attacking;
            self.in_combat = true;
            return self.attack(ctx);
        }

        let step = self.stats.speed.saturating_mul(ctx.dt);
        let moved = systems::advance(
            self.position,
            &resolved,
            step,
            !self.stats.flying,
            ctx.flagged,
            ctx.grid,
        );
        self.position = moved.position;
        if moved.in_reach {
            self.state = UnitState::Attacking;
            self.in_combat = true;
        }
        UnitOutcome::default()
    }

    fn attack(&mut self, ctx: &UnitContext<'_>) -> UnitOutcome {
        let Some(target) = self.target else {
            self.lose_target();
            return UnitOutcome::default();
        };
        let Some(resolved) = self.resolve(target, ctx) else {
            self.lose_target();
            if self.stats.buildings_only && !self.enemy_structures_remain(ctx) {
                return self.expire();
            }
            return UnitOutcome::default();
        };

        self.target_position = resolved.point;
        if !resolved.reached(self.position) {
            // Keep the target and chase it.
            self.state = UnitState::SeekingTarget;
            self.in_combat = false;
            return UnitOutcome::default();
        }

        if !self.attack_clock.ready(ctx.now, self.stats.attack_interval()) {
            return UnitOutcome::default();
        }
        self.attack_clock.fire(ctx.now);
        UnitOutcome {
            attack: Some(UnitAttack {
                attacker: self.id,
                target,
                damage: self.stats.damage,
            }),
            expired: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::towers::{TowerCatalog, TowerSlot};
    use crate::unit_kind::UnitCatalog;

    struct World {
        grid: GridConfig,
        towers: BTreeMap<EntityId, Tower>,
        units: BTreeMap<EntityId, Unit>,
        flagged: FlaggedCells,
    }

    impl World {
        fn new() -> Self {
            let catalog = TowerCatalog::default();
            let mut towers = BTreeMap::new();
            let mut id = 1;
            for team in Team::ALL {
                for slot in TowerSlot::ALL {
                    towers.insert(id, Tower::new(id, slot, team, &catalog));
                    id += 1;
                }
            }
            let flagged = FlaggedCells::from_footprints(
                towers.values().map(Tower::footprint).collect::<Vec<_>>().iter(),
            );
            Self {
                grid: GridConfig::default(),
                towers,
                units: BTreeMap::new(),
                flagged,
            }
        }

        fn ctx(&self, now: f64) -> UnitContext<'_> {
            UnitContext {
                now: Fixed::from_num(now),
                dt: Fixed::from_num(0.125),
                deploy_delay: Fixed::from_num(1),
                grid: &self.grid,
                flagged: &self.flagged,
                towers: &self.towers,
                units: &self.units,
            }
        }
    }

    fn unit(kind: UnitKind, team: Team, row: f64, col: f64) -> Unit {
        let catalog = UnitCatalog::default();
        Unit::new(
            100,
            kind,
            team,
            GridPos::new(Fixed::from_num(row), Fixed::from_num(col)),
            catalog.get(kind),
            Fixed::ZERO,
        )
    }

    #[test]
    fn test_spawning_waits_for_deploy_delay() {
        let world = World::new();
        let mut giant = unit(UnitKind::Giant, Team::Red, 10.0, 4.0);

        giant.step(&world.ctx(0.5));
        assert_eq!(giant.state, UnitState::Spawning);

        giant.step(&world.ctx(1.0));
        assert_eq!(giant.state, UnitState::MovingToCrossing);
        assert_eq!(giant.crossing, Some(GridPos::cell(16, 3)));
    }

    #[test]
    fn test_flying_and_forward_units_skip_crossing() {
        let world = World::new();
        let mut dragon = unit(UnitKind::BabyDragon, Team::Red, 10.0, 4.0);
        dragon.step(&world.ctx(1.0));
        assert_eq!(dragon.state, UnitState::SeekingTarget);

        let mut pekka = unit(UnitKind::MiniPekka, Team::Red, 16.0, 4.0);
        pekka.step(&world.ctx(1.0));
        assert_eq!(pekka.state, UnitState::SeekingTarget);
    }

    #[test]
    fn test_crossing_arrival_switches_to_seeking() {
        let world = World::new();
        let mut pekka = unit(UnitKind::MiniPekka, Team::Red, 15.75, 3.0);
        pekka.step(&world.ctx(1.0));
        assert_eq!(pekka.state, UnitState::MovingToCrossing);

        pekka.step(&world.ctx(1.125));
        assert_eq!(pekka.position, GridPos::cell(16, 3));
        assert_eq!(pekka.state, UnitState::SeekingTarget);
    }

    #[test]
    fn test_unit_in_reach_of_tower_attacks_immediately() {
        let world = World::new();
        // Blue left princess sits at (27, 3); 1.2 + 1.5 reach.
        let mut pekka = unit(UnitKind::MiniPekka, Team::Red, 24.5, 3.0);
        pekka.state = UnitState::SeekingTarget;

        let outcome = pekka.step(&world.ctx(2.0));
        assert_eq!(pekka.state, UnitState::Attacking);
        assert!(pekka.in_combat);
        let attack = outcome.attack.unwrap();
        assert_eq!(attack.target, TargetRef::Structure(5));
        assert_eq!(attack.damage, 718);

        // Cooldown: 1.6 attacks per second.
        let outcome = pekka.step(&world.ctx(2.5));
        assert!(outcome.attack.is_none());
        let outcome = pekka.step(&world.ctx(2.7));
        assert!(outcome.attack.is_some());
    }

    #[test]
    fn test_seeking_moves_toward_target() {
        let world = World::new();
        let mut valk = unit(UnitKind::Valkyrie, Team::Red, 18.0, 3.0);
        valk.state = UnitState::SeekingTarget;

        valk.step(&world.ctx(2.0));
        assert_eq!(valk.target, Some(TargetRef::Structure(5)));
        assert!(valk.position.row > Fixed::from_num(18));
        assert_eq!(valk.state, UnitState::SeekingTarget);
    }

    #[test]
    fn test_attacker_returns_to_seeking_when_target_dies() {
        let mut world = World::new();
        let mut pekka = unit(UnitKind::MiniPekka, Team::Red, 24.5, 3.0);
        pekka.state = UnitState::SeekingTarget;
        pekka.step(&world.ctx(2.0));
        assert_eq!(pekka.state, UnitState::Attacking);

        world.towers.get_mut(&5).unwrap().take_damage(u32::MAX);
        let outcome = pekka.step(&world.ctx(3.0));
        assert!(outcome.attack.is_none());
        assert_eq!(pekka.state, UnitState::SeekingTarget);
        assert_eq!(pekka.target, None);
        assert!(!pekka.in_combat);
    }

    #[test]
    fn test_buildings_only_expires_without_structures() {
        let mut world = World::new();
        for tower in world.towers.values_mut() {
            if tower.team == Team::Blue {
                tower.take_damage(u32::MAX);
            }
        }
        let mut giant = unit(UnitKind::Giant, Team::Red, 20.0, 3.0);
        giant.state = UnitState::SeekingTarget;

        let outcome = giant.step(&world.ctx(2.0));
        assert!(outcome.expired);
        assert_eq!(giant.state, UnitState::Dead);
        assert_eq!(giant.health.current, 0);
    }

    #[test]
    fn test_ground_unit_ignores_air_unit() {
        let mut world = World::new();
        let dragon = Unit {
            id: 7,
            ..unit(UnitKind::BabyDragon, Team::Blue, 20.0, 3.0)
        };
        world.units.insert(7, dragon);
        let mut pekka = unit(UnitKind::MiniPekka, Team::Red, 20.5, 3.0);
        pekka.state = UnitState::SeekingTarget;

        pekka.step(&world.ctx(2.0));
        assert_eq!(pekka.target, Some(TargetRef::Structure(5)));
    }

    #[test]
    fn test_retarget_needs_margin() {
        let mut world = World::new();
        let far = Unit {
            id: 7,
            ..unit(UnitKind::Valkyrie, Team::Blue, 23.0, 10.0)
        };
        world.units.insert(7, far);
        let mut valk = unit(UnitKind::Valkyrie, Team::Red, 20.0, 10.0);
        valk.state = UnitState::SeekingTarget;
        valk.step(&world.ctx(2.0));
        assert_eq!(valk.target, Some(TargetRef::Unit(7)));

        // Slightly closer newcomer does not steal focus.
        let near = Unit {
            id: 8,
            ..unit(UnitKind::Valkyrie, Team::Blue, 22.0, 10.5)
        };
        world.units.insert(8, near);
        valk.step(&world.ctx(2.1));
        assert_eq!(valk.target, Some(TargetRef::Unit(7)));
    }

    #[test]
    fn test_take_damage_kills_once() {
        let mut pekka = unit(UnitKind::MiniPekka, Team::Red, 10.0, 3.0);
        let hit = pekka.take_damage(2000);
        assert_eq!(hit.dealt, 1361);
        assert!(hit.killed);
        assert_eq!(pekka.state, UnitState::Dead);

        let again = pekka.take_damage(10);
        assert_eq!(again.dealt, 0);
        assert!(!again.killed);
    }
}
