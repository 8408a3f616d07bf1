//! Authoritative match simulation.
//!
//! One [`Engine`] owns every unit, tower and player of a single match and
//! advances them when the room's scheduler calls [`Engine::update`].
//!
//! # Determinism
//!
//! - All math is fixed-point (see [`crate::math`])
//! - The match clock is the sum of supplied deltas, never the wall clock
//! - Units and towers are processed in ascending id order
//!
//! The same sequence of deltas and commands always yields the same
//! [`Engine::state_hash`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use arena_core::prelude::*;
//!
//! let mut engine = Engine::new(MatchConfig::default());
//! engine.add_player("p1", "Alice", Team::Red);
//! engine.add_player("p2", "Bob", Team::Blue);
//! engine.start_game().unwrap();
//!
//! let unit = engine.play_card("p1", UnitKind::Giant, 10, 4).unwrap();
//! assert_eq!(unit.state, UnitState::Spawning);
//!
//! engine.update(Duration::from_millis(100), 1);
//! assert_eq!(engine.tick(), 1);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::{PlayerAction, PlayerCommand};
use crate::components::{EntityId, TargetRef, Team};
use crate::config::MatchConfig;
use crate::economy::Player;
use crate::error::{CommandRejection, GameError, Result};
use crate::grid::FlaggedCells;
use crate::math::{seconds, Fixed, GridPos};
use crate::snapshot::Snapshot;
use crate::systems::{self, Candidate};
use crate::towers::{Tower, TowerHit, TowerKind, TowerSlot};
use crate::unit_kind::UnitKind;
use crate::units::{Unit, UnitContext, UnitHit};
use crate::victory::{self, EndReason, MatchOutcome, Winner};

/// Match lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    /// Created, waiting for players.
    Waiting,
    /// Running.
    InProgress,
    /// Clock stopped.
    Paused,
    /// Finished. Terminal until reset.
    Ended,
}

/// A hit that landed this tick.
///
/// Attacker and target are both entity keys; towers appear as
/// [`TargetRef::Structure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackEvent {
    /// Who swung.
    pub attacker: TargetRef,
    /// Who was hit.
    pub target: TargetRef,
    /// Health actually removed.
    pub damage: u32,
}

/// Everything notable that happened during one [`Engine::update`].
///
/// Damage dealt through the public damage methods between ticks is
/// reported with the next tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickEvents {
    /// Hits from units and towers.
    pub attacks: Vec<AttackEvent>,
    /// Units that died.
    pub deaths: Vec<EntityId>,
    /// Dead units removed from the board.
    pub removed: Vec<EntityId>,
    /// Towers destroyed.
    pub destroyed_towers: Vec<EntityId>,
    /// King towers that became active.
    pub activated_kings: Vec<EntityId>,
    /// Set on the tick the match ended.
    pub match_end: Option<MatchOutcome>,
}

/// Simulation state of one match.
///
/// # Tick order
///
/// 1. Elixir regeneration for connected players
/// 2. Removal of units that died on an earlier tick
/// 3. Unit behavior, in id order
/// 4. Tower behavior, in id order
/// 5. Win conditions
#[derive(Debug, Clone)]
pub struct Engine {
    config: MatchConfig,
    status: MatchStatus,
    tick: u64,
    clock: Fixed,
    next_id: EntityId,
    units: BTreeMap<EntityId, Unit>,
    towers: BTreeMap<EntityId, Tower>,
    players: BTreeMap<String, Player>,
    flagged: FlaggedCells,
    outcome: Option<MatchOutcome>,
    events: TickEvents,
}

impl Engine {
    /// Create a match in [`MatchStatus::Waiting`] with all six towers.
    #[must_use]
    pub fn new(config: MatchConfig) -> Self {
        let mut engine = Self {
            config,
            status: MatchStatus::Waiting,
            tick: 0,
            clock: Fixed::ZERO,
            next_id: 1,
            units: BTreeMap::new(),
            towers: BTreeMap::new(),
            players: BTreeMap::new(),
            flagged: FlaggedCells::default(),
            outcome: None,
            events: TickEvents::default(),
        };
        engine.place_towers();
        engine
    }

    fn place_towers(&mut self) {
        for team in Team::ALL {
            for slot in TowerSlot::ALL {
                let id = self.allocate_id();
                self.towers
                    .insert(id, Tower::new(id, slot, team, &self.config.towers));
            }
        }
        self.refresh_flagged();
    }

    fn allocate_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn refresh_flagged(&mut self) {
        let footprints: Vec<_> = self
            .towers
            .values()
            .filter(|tower| tower.is_alive)
            .map(Tower::footprint)
            .collect();
        self.flagged = FlaggedCells::from_footprints(&footprints);
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Match configuration.
    #[must_use]
    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn status(&self) -> MatchStatus {
        self.status
    }

    /// Last tick index passed to [`update`](Self::update).
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Match clock in seconds.
    #[must_use]
    pub const fn elapsed(&self) -> Fixed {
        self.clock
    }

    /// Winner, once the match has ended.
    #[must_use]
    pub fn winner(&self) -> Option<Winner> {
        self.outcome.map(|outcome| outcome.winner)
    }

    /// Winner and reason, once the match has ended.
    #[must_use]
    pub const fn outcome(&self) -> Option<MatchOutcome> {
        self.outcome
    }

    /// All units by id.
    #[must_use]
    pub fn units(&self) -> &BTreeMap<EntityId, Unit> {
        &self.units
    }

    /// All towers by id.
    #[must_use]
    pub fn towers(&self) -> &BTreeMap<EntityId, Tower> {
        &self.towers
    }

    /// All players by id.
    #[must_use]
    pub fn players(&self) -> &BTreeMap<String, Player> {
        &self.players
    }

    /// Look up a unit.
    #[must_use]
    pub fn unit(&self, id: EntityId) -> Option<&Unit> {
        self.units.get(&id)
    }

    /// Look up a tower.
    #[must_use]
    pub fn tower(&self, id: EntityId) -> Option<&Tower> {
        self.towers.get(&id)
    }

    /// Look up a tower by team and slot.
    #[must_use]
    pub fn tower_at(&self, team: Team, slot: TowerSlot) -> Option<&Tower> {
        self.towers
            .values()
            .find(|tower| tower.team == team && tower.slot == slot)
    }

    /// Look up a player.
    #[must_use]
    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.get(id)
    }

    /// Cells ground units currently avoid.
    #[must_use]
    pub fn flagged_cells(&self) -> &FlaggedCells {
        &self.flagged
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Begin the match.
    pub fn start_game(&mut self) -> Result<()> {
        if self.status != MatchStatus::Waiting {
            return Err(GameError::InvalidTransition {
                action: "start",
                status: self.status,
            });
        }
        self.status = MatchStatus::InProgress;
        self.tick = 0;
        self.clock = Fixed::ZERO;
        tracing::info!(players = self.players.len(), "match started");
        Ok(())
    }

    /// Stop the clock.
    pub fn pause(&mut self) -> Result<()> {
        if self.status != MatchStatus::InProgress {
            return Err(GameError::InvalidTransition {
                action: "pause",
                status: self.status,
            });
        }
        self.status = MatchStatus::Paused;
        tracing::info!(tick = self.tick, "match paused");
        Ok(())
    }

    /// Restart the clock.
    pub fn resume(&mut self) -> Result<()> {
        if self.status != MatchStatus::Paused {
            return Err(GameError::InvalidTransition {
                action: "resume",
                status: self.status,
            });
        }
        self.status = MatchStatus::InProgress;
        tracing::info!(tick = self.tick, "match resumed");
        Ok(())
    }

    /// Back to [`MatchStatus::Waiting`] with fresh towers and no units or players.
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
        tracing::debug!("match reset");
    }

    fn end_match(&mut self, outcome: MatchOutcome) {
        if self.status == MatchStatus::Ended {
            return;
        }
        self.status = MatchStatus::Ended;
        self.outcome = Some(outcome);
        self.events.match_end = Some(outcome);
        tracing::info!(
            winner = ?outcome.winner,
            reason = ?outcome.reason,
            tick = self.tick,
            "match ended"
        );
    }

    // ------------------------------------------------------------------
    // Players
    // ------------------------------------------------------------------

    /// Add a player, or reconnect one already present.
    ///
    /// A known id keeps its team, elixir and crowns; only the name and
    /// connection flag are refreshed.
    pub fn add_player(&mut self, id: &str, name: &str, team: Team) -> &Player {
        let elixir = self.config.elixir;
        let player = self
            .players
            .entry(id.to_string())
            .and_modify(|player| {
                player.name = name.to_string();
                player.connected = true;
            })
            .or_insert_with(|| Player::new(id, name, team, &elixir));
        tracing::debug!(player = id, team = ?player.team, "player added");
        player
    }

    /// Mark a player disconnected. Returns false for unknown ids.
    pub fn remove_player(&mut self, id: &str) -> bool {
        match self.players.get_mut(id) {
            Some(player) => {
                player.connected = false;
                tracing::debug!(player = id, "player disconnected");
                true
            }
            None => false,
        }
    }

    /// Concede on behalf of a player; the other team wins.
    pub fn surrender(&mut self, player_id: &str) -> std::result::Result<MatchOutcome, CommandRejection> {
        if !matches!(self.status, MatchStatus::InProgress | MatchStatus::Paused) {
            return Err(CommandRejection::NotRunning(self.status));
        }
        let team = self
            .players
            .get(player_id)
            .map(|player| player.team)
            .ok_or_else(|| CommandRejection::UnknownPlayer(player_id.to_string()))?;
        let outcome = MatchOutcome {
            winner: team.opponent().into(),
            reason: EndReason::Surrender,
        };
        tracing::info!(player = player_id, team = ?team, "player surrendered");
        self.end_match(outcome);
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Elixir pre-check used when commands are queued.
    #[must_use]
    pub fn can_play_card(&self, player_id: &str, kind: UnitKind) -> bool {
        self.players
            .get(player_id)
            .is_some_and(|player| player.can_afford(self.config.units.cost(kind)))
    }

    /// Whether `team` may deploy at `(row, col)`.
    ///
    /// The cell must be on the board, on the team's half and not inside a
    /// tower footprint.
    pub fn check_deploy_cell(&self, team: Team, row: i32, col: i32) -> std::result::Result<(), CommandRejection> {
        if !self.config.grid.is_legal_deploy(team, row, col) {
            return Err(CommandRejection::IllegalCell { team, row, col });
        }
        if self.flagged.is_flagged(row, col) {
            return Err(CommandRejection::BlockedCell { row, col });
        }
        Ok(())
    }

    /// Pay for and deploy a card.
    ///
    /// Rejections leave elixir and units untouched.
    pub fn play_card(
        &mut self,
        player_id: &str,
        kind: UnitKind,
        row: i32,
        col: i32,
    ) -> std::result::Result<Unit, CommandRejection> {
        if self.status != MatchStatus::InProgress {
            return Err(CommandRejection::NotRunning(self.status));
        }
        let cost = self.config.units.cost(kind);
        let player = self
            .players
            .get(player_id)
            .ok_or_else(|| CommandRejection::UnknownPlayer(player_id.to_string()))?;
        if !player.can_afford(cost) {
            return Err(CommandRejection::InsufficientElixir {
                kind,
                required: cost,
                available: player.whole_elixir(),
            });
        }
        let team = player.team;
        self.check_deploy_cell(team, row, col)?;

        let now = self.clock;
        if let Some(player) = self.players.get_mut(player_id) {
            player.spend(cost, now);
        }
        Ok(self.spawn_unit(kind, team, row, col))
    }

    /// Apply a queued command.
    pub fn apply_command(&mut self, command: &PlayerCommand) -> std::result::Result<(), CommandRejection> {
        match command.action {
            PlayerAction::Deploy { kind, row, col } => {
                self.play_card(&command.player_id, kind, row, col).map(|_| ())
            }
            PlayerAction::Surrender => self.surrender(&command.player_id).map(|_| ()),
        }
    }

    /// Place a unit without any checks. Returns a copy of the new unit.
    pub fn spawn_unit(&mut self, kind: UnitKind, team: Team, row: i32, col: i32) -> Unit {
        let id = self.allocate_id();
        let position = self.config.grid.clamp(GridPos::cell(row, col));
        let unit = Unit::new(id, kind, team, position, self.config.units.get(kind), self.clock);
        tracing::debug!(unit = id, kind = %kind, team = ?team, row, col, "unit spawned");
        self.units.insert(id, unit.clone());
        unit
    }

    // ------------------------------------------------------------------
    // Damage
    // ------------------------------------------------------------------

    /// Damage a tower and do the destruction bookkeeping.
    ///
    /// Unknown or already destroyed towers are ignored.
    pub fn deal_damage_to_structure(&mut self, id: EntityId, amount: u32) -> Option<TowerHit> {
        let tower = self.towers.get_mut(&id)?;
        if !tower.is_alive {
            return None;
        }
        let hit = tower.take_damage(amount);
        if !hit.destroyed {
            return Some(hit);
        }

        let team = tower.team;
        let kind = tower.kind();
        tracing::info!(tower = id, label = tower.label(), "tower destroyed");
        self.events.destroyed_towers.push(id);
        self.refresh_flagged();

        for player in self.players.values_mut().filter(|player| player.team != team) {
            player.crowns += 1;
        }

        match kind {
            TowerKind::Princess => self.check_king_activation(team),
            TowerKind::King => {
                if let Some(outcome) = victory::king_verdict(&self.towers) {
                    self.end_match(outcome);
                }
            }
        }
        Some(hit)
    }

    /// Damage a unit. Unknown or dead units are ignored.
    pub fn deal_damage_to_unit(&mut self, id: EntityId, amount: u32) -> Option<UnitHit> {
        let unit = self.units.get_mut(&id)?;
        if !unit.is_alive() {
            return None;
        }
        let hit = unit.take_damage(amount);
        if hit.killed {
            tracing::debug!(unit = id, kind = %unit.kind, "unit killed");
            self.events.deaths.push(id);
        }
        Some(hit)
    }

    fn check_king_activation(&mut self, team: Team) {
        let alive_princesses = self
            .towers
            .values()
            .filter(|tower| tower.team == team && tower.kind() == TowerKind::Princess && tower.is_alive)
            .count();
        for king in self
            .towers
            .values_mut()
            .filter(|tower| tower.team == team && tower.kind() == TowerKind::King)
        {
            if king.update_activation(alive_princesses) {
                tracing::info!(tower = king.id, team = ?team, "king tower activated");
                self.events.activated_kings.push(king.id);
            }
        }
    }

    /// Nearest enemy for the given unit under the normal targeting rules.
    #[must_use]
    pub fn find_closest_enemy(&self, unit_id: EntityId) -> Option<Candidate> {
        let unit = self.units.get(&unit_id)?;
        if !unit.is_alive() {
            return None;
        }
        systems::find_closest_enemy(unit, &self.units, &self.towers, &self.config.grid)
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance the match by `delta`.
    ///
    /// Does nothing unless the match is in progress, apart from handing
    /// back events recorded since the last call.
    pub fn update(&mut self, delta: Duration, tick: u64) -> TickEvents {
        if self.status != MatchStatus::InProgress {
            return std::mem::take(&mut self.events);
        }

        self.tick = tick;
        let dt = seconds(delta);
        self.clock = self.clock.saturating_add(dt);

        self.regenerate_elixir(dt);
        self.remove_dead_units();
        self.run_units(dt);
        self.run_towers();

        if self.status == MatchStatus::InProgress {
            if let Some(outcome) = victory::evaluate(&self.towers, self.clock, &self.config.timing) {
                self.end_match(outcome);
            }
        }

        #[cfg(feature = "debug-validation")]
        self.validate();

        tracing::trace!(tick, state_hash = self.state_hash(), "tick complete");
        std::mem::take(&mut self.events)
    }

    fn regenerate_elixir(&mut self, dt: Fixed) {
        let elixir = &self.config.elixir;
        let rate = if self.clock >= self.config.timing.normal_duration {
            elixir.regen_rate.saturating_mul(elixir.overtime_multiplier)
        } else {
            elixir.regen_rate
        };
        for player in self.players.values_mut().filter(|player| player.connected) {
            player.regenerate(rate, dt);
        }
    }

    fn remove_dead_units(&mut self) {
        let dead: Vec<EntityId> = self
            .units
            .values()
            .filter(|unit| !unit.is_alive())
            .map(|unit| unit.id)
            .collect();
        for id in dead {
            self.units.remove(&id);
            self.events.removed.push(id);
        }
    }

    fn run_units(&mut self, dt: Fixed) {
        let ids: Vec<EntityId> = self.units.keys().copied().collect();
        for id in ids {
            if self.status != MatchStatus::InProgress {
                break;
            }
            let Some(mut unit) = self.units.remove(&id) else {
                continue;
            };
            let outcome = {
                let ctx = UnitContext {
                    now: self.clock,
                    dt,
                    deploy_delay: self.config.timing.deploy_delay,
                    grid: &self.config.grid,
                    flagged: &self.flagged,
                    towers: &self.towers,
                    units: &self.units,
                };
                unit.step(&ctx)
            };
            self.units.insert(id, unit);

            if outcome.expired {
                self.events.deaths.push(id);
            }
            if let Some(attack) = outcome.attack {
                let dealt = match attack.target {
                    TargetRef::Structure(target) => self
                        .deal_damage_to_structure(target, attack.damage)
                        .map(|hit| hit.dealt),
                    TargetRef::Unit(target) => self
                        .deal_damage_to_unit(target, attack.damage)
                        .map(|hit| hit.dealt),
                };
                if let Some(damage) = dealt {
                    tracing::debug!(unit = id, target = ?attack.target, damage, "unit attack");
                    self.events.attacks.push(AttackEvent {
                        attacker: TargetRef::Unit(attack.attacker),
                        target: attack.target,
                        damage,
                    });
                }
            }
        }
    }

    fn run_towers(&mut self) {
        for team in Team::ALL {
            self.check_king_activation(team);
        }

        let ids: Vec<EntityId> = self.towers.keys().copied().collect();
        for id in ids {
            if self.status != MatchStatus::InProgress {
                break;
            }
            let shot = match self.towers.get_mut(&id) {
                Some(tower) => tower.step(self.clock, self.units.values()),
                None => continue,
            };
            let Some(shot) = shot else {
                continue;
            };
            if let Some(hit) = self.deal_damage_to_unit(shot.target, shot.damage) {
                tracing::debug!(tower = id, unit = shot.target, damage = hit.dealt, "tower attack");
                self.events.attacks.push(AttackEvent {
                    attacker: TargetRef::Structure(id),
                    target: TargetRef::Unit(shot.target),
                    damage: hit.dealt,
                });
            }
        }
    }

    #[cfg(feature = "debug-validation")]
    fn validate(&self) {
        for unit in self.units.values() {
            debug_assert!(unit.health.current <= unit.health.max);
            debug_assert_eq!(unit.health.is_dead(), !unit.state.is_alive());
            debug_assert_eq!(self.config.grid.clamp(unit.position), unit.position);
        }
        for player in self.players.values() {
            debug_assert!(player.elixir >= Fixed::ZERO && player.elixir <= player.max_elixir);
        }
        for team in Team::ALL {
            let alive = self
                .towers
                .values()
                .filter(|t| t.team == team && t.kind() == TowerKind::Princess && t.is_alive)
                .count();
            if let Some(king) = self.tower_at(team, TowerSlot::King) {
                if king.is_alive {
                    debug_assert_eq!(king.active, alive < 2);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    /// Immutable copy of the full match state.
    #[must_use]
    pub fn snapshot(&self, timestamp_ms: u64) -> Snapshot {
        Snapshot {
            timestamp: timestamp_ms,
            tick: self.tick,
            status: self.status,
            game_time: self.clock.to_num(),
            units: self.units.values().map(Into::into).collect(),
            towers: self.towers.values().map(Into::into).collect(),
            players: self.players.values().map(Into::into).collect(),
            winner: self.winner(),
            end_reason: self.outcome.map(|outcome| outcome.reason),
        }
    }

    /// Hash of the simulation state.
    ///
    /// Two engines fed the same config, commands and deltas produce the
    /// same hash.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.tick.hash(&mut hasher);
        self.clock.to_bits().hash(&mut hasher);
        self.status.hash(&mut hasher);

        self.units.len().hash(&mut hasher);
        for unit in self.units.values() {
            unit.id.hash(&mut hasher);
            unit.kind.hash(&mut hasher);
            unit.team.hash(&mut hasher);
            unit.position.row.to_bits().hash(&mut hasher);
            unit.position.col.to_bits().hash(&mut hasher);
            unit.health.current.hash(&mut hasher);
            unit.state.hash(&mut hasher);
            unit.target.hash(&mut hasher);
        }

        for tower in self.towers.values() {
            tower.id.hash(&mut hasher);
            tower.health.current.hash(&mut hasher);
            tower.is_alive.hash(&mut hasher);
            tower.active.hash(&mut hasher);
        }

        for player in self.players.values() {
            player.id.hash(&mut hasher);
            player.elixir.to_bits().hash(&mut hasher);
            player.crowns.hash(&mut hasher);
        }

        hasher.finish()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(MatchConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::UnitState;

    const TICK: Duration = Duration::from_millis(100);

    fn running() -> Engine {
        let mut engine = Engine::default();
        engine.add_player("red", "Red", Team::Red);
        engine.add_player("blue", "Blue", Team::Blue);
        engine.start_game().unwrap();
        engine
    }

    fn tower_id(engine: &Engine, team: Team, slot: TowerSlot) -> EntityId {
        engine.tower_at(team, slot).unwrap().id
    }

    #[test]
    fn test_new_engine_has_six_towers() {
        let engine = Engine::default();
        assert_eq!(engine.status(), MatchStatus::Waiting);
        assert_eq!(engine.towers().len(), 6);
        assert!(engine.units().is_empty());
        assert_eq!(engine.flagged_cells().len(), 2 * (16 + 9 + 9));
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut engine = Engine::default();
        assert!(engine.pause().is_err());
        engine.start_game().unwrap();
        assert!(matches!(
            engine.start_game(),
            Err(GameError::InvalidTransition { action: "start", .. })
        ));
        engine.pause().unwrap();
        assert!(engine.pause().is_err());
        engine.resume().unwrap();
        assert_eq!(engine.status(), MatchStatus::InProgress);
    }

    #[test]
    fn test_update_is_noop_unless_running() {
        let mut engine = Engine::default();
        engine.add_player("red", "Red", Team::Red);
        let before = engine.state_hash();
        engine.update(TICK, 1);
        assert_eq!(engine.state_hash(), before);
        assert_eq!(engine.elapsed(), Fixed::ZERO);
    }

    #[test]
    fn test_elixir_regenerates_only_while_running() {
        let mut engine = running();
        for tick in 1..=28 {
            engine.update(TICK, tick);
        }
        let elixir = engine.player("red").unwrap().elixir;
        assert!(elixir > Fixed::from_num(5.99) && elixir <= Fixed::from_num(6.01));

        engine.pause().unwrap();
        engine.update(TICK, 29);
        assert_eq!(engine.player("red").unwrap().elixir, elixir);
    }

    #[test]
    fn test_disconnected_player_does_not_regenerate() {
        let mut engine = running();
        engine.remove_player("blue");
        engine.update(TICK, 1);
        assert_eq!(engine.player("blue").unwrap().elixir, Fixed::from_num(5));
        assert!(!engine.player("blue").unwrap().connected);
    }

    #[test]
    fn test_add_player_is_idempotent() {
        let mut engine = Engine::default();
        engine.add_player("p1", "Alice", Team::Red);
        engine.remove_player("p1");
        let player = engine.add_player("p1", "Alicia", Team::Blue);
        assert_eq!(player.name, "Alicia");
        assert_eq!(player.team, Team::Red);
        assert!(player.connected);
        assert_eq!(engine.players().len(), 1);
    }

    #[test]
    fn test_play_card_rejections_do_not_mutate() {
        let mut engine = running();
        let before = engine.state_hash();

        assert!(matches!(
            engine.play_card("red", UnitKind::Giant, 20, 4),
            Err(CommandRejection::IllegalCell { .. })
        ));
        assert!(matches!(
            engine.play_card("ghost", UnitKind::Giant, 10, 4),
            Err(CommandRejection::UnknownPlayer(_))
        ));
        engine.play_card("red", UnitKind::Giant, 10, 4).unwrap();
        assert!(matches!(
            engine.play_card("red", UnitKind::Valkyrie, 10, 4),
            Err(CommandRejection::InsufficientElixir { required: 4, available: 0, .. })
        ));
        assert_eq!(engine.units().len(), 1);
        assert_ne!(engine.state_hash(), before);
    }

    #[test]
    fn test_play_card_requires_running_match() {
        let mut engine = Engine::default();
        engine.add_player("red", "Red", Team::Red);
        assert!(matches!(
            engine.play_card("red", UnitKind::Giant, 10, 4),
            Err(CommandRejection::NotRunning(MatchStatus::Waiting))
        ));
    }

    #[test]
    fn test_dead_unit_removed_next_tick() {
        let mut engine = running();
        let unit = engine.spawn_unit(UnitKind::MiniPekka, Team::Red, 10, 9);
        let hit = engine.deal_damage_to_unit(unit.id, 5000).unwrap();
        assert!(hit.killed);
        assert_eq!(engine.unit(unit.id).unwrap().state, UnitState::Dead);

        let events = engine.update(TICK, 1);
        assert!(events.deaths.contains(&unit.id));
        assert!(events.removed.contains(&unit.id));
        assert!(engine.unit(unit.id).is_none());
    }

    #[test]
    fn test_damage_to_unknown_ids_is_noop() {
        let mut engine = running();
        assert!(engine.deal_damage_to_unit(999, 10).is_none());
        assert!(engine.deal_damage_to_structure(999, 10).is_none());
    }

    #[test]
    fn test_princess_destruction_awards_crown_and_wakes_king() {
        let mut engine = running();
        let princess = tower_id(&engine, Team::Blue, TowerSlot::LeftPrincess);
        let flagged_before = engine.flagged_cells().len();

        let hit = engine.deal_damage_to_structure(princess, 10_000).unwrap();
        assert!(hit.destroyed);
        assert!(engine.tower_at(Team::Blue, TowerSlot::King).unwrap().active);
        assert_eq!(engine.player("red").unwrap().crowns, 1);
        assert_eq!(engine.player("blue").unwrap().crowns, 0);
        assert_eq!(engine.flagged_cells().len(), flagged_before - 9);

        let events = engine.update(TICK, 1);
        assert_eq!(events.destroyed_towers, vec![princess]);
        assert_eq!(events.activated_kings.len(), 1);
    }

    #[test]
    fn test_king_death_ends_match_immediately() {
        let mut engine = running();
        let king = tower_id(&engine, Team::Blue, TowerSlot::King);
        engine.deal_damage_to_structure(king, u32::MAX);
        assert_eq!(engine.status(), MatchStatus::Ended);
        assert_eq!(engine.winner(), Some(Winner::Red));

        // A later king death does not change the verdict.
        let red_king = tower_id(&engine, Team::Red, TowerSlot::King);
        engine.deal_damage_to_structure(red_king, u32::MAX);
        assert_eq!(engine.winner(), Some(Winner::Red));
    }

    #[test]
    fn test_surrender() {
        let mut engine = running();
        let outcome = engine.surrender("red").unwrap();
        assert_eq!(outcome.winner, Winner::Blue);
        assert_eq!(outcome.reason, EndReason::Surrender);
        assert_eq!(engine.status(), MatchStatus::Ended);
        assert!(engine.surrender("blue").is_err());
    }

    #[test]
    fn test_apply_command_dispatches() {
        let mut engine = running();
        engine
            .apply_command(&PlayerCommand::deploy("blue", UnitKind::BabyDragon, 25, 9))
            .unwrap();
        assert_eq!(engine.units().len(), 1);
        engine.apply_command(&PlayerCommand::surrender("blue")).unwrap();
        assert_eq!(engine.winner(), Some(Winner::Red));

        let events = engine.update(TICK, 1);
        assert_eq!(events.match_end.map(|outcome| outcome.reason), Some(EndReason::Surrender));
        assert!(engine.update(TICK, 2).match_end.is_none());
    }

    #[test]
    fn test_reset_restores_fresh_match() {
        let mut engine = running();
        engine.spawn_unit(UnitKind::Giant, Team::Red, 10, 4);
        engine.update(TICK, 1);
        engine.reset();
        assert_eq!(engine.status(), MatchStatus::Waiting);
        assert!(engine.units().is_empty());
        assert!(engine.players().is_empty());
        assert_eq!(engine.towers().len(), 6);
        assert_eq!(engine.elapsed(), Fixed::ZERO);
    }

    #[test]
    fn test_snapshot_contents() {
        let mut engine = running();
        engine.spawn_unit(UnitKind::Valkyrie, Team::Blue, 20, 5);
        engine.update(TICK, 1);
        let snapshot = engine.snapshot(1234);
        assert_eq!(snapshot.timestamp, 1234);
        assert_eq!(snapshot.tick, 1);
        assert_eq!(snapshot.units.len(), 1);
        assert_eq!(snapshot.towers.len(), 6);
        assert_eq!(snapshot.players.len(), 2);
        assert!(snapshot.winner.is_none());
        assert!(snapshot.tower("king_blue").is_some());
        assert!((snapshot.game_time - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_deterministic_hash() {
        let mut a = running();
        let mut b = running();
        for engine in [&mut a, &mut b] {
            engine.play_card("red", UnitKind::MiniPekka, 12, 4).unwrap();
            engine.play_card("blue", UnitKind::BabyDragon, 22, 12).unwrap();
        }
        for tick in 1..=200 {
            a.update(TICK, tick);
            b.update(TICK, tick);
        }
        assert_eq!(a.state_hash(), b.state_hash());
    }
}
