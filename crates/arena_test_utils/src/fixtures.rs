//! Test fixtures and helpers.
//!
//! Pre-built matches and board manipulations for consistent testing.

use std::time::Duration;

use arena_core::components::{EntityId, Team};
use arena_core::config::MatchConfig;
use arena_core::math::Fixed;
use arena_core::simulation::{Engine, TickEvents};
use arena_core::towers::TowerSlot;

/// Player id used for the Red side in fixtures.
pub const RED: &str = "red";

/// Player id used for the Blue side in fixtures.
pub const BLUE: &str = "blue";

/// The default 10 Hz tick.
pub const TICK: Duration = Duration::from_millis(100);

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> Fixed {
    Fixed::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> Fixed {
    Fixed::from_num(n)
}

/// A waiting match with one player per team.
#[must_use]
pub fn engine_with_players(config: MatchConfig) -> Engine {
    let mut engine = Engine::new(config);
    engine.add_player(RED, "Red", Team::Red);
    engine.add_player(BLUE, "Blue", Team::Blue);
    engine
}

/// A running match with default tuning and one player per team.
///
/// # Panics
///
/// Never in practice; a fresh engine always starts.
#[must_use]
pub fn running_engine() -> Engine {
    running_engine_with(MatchConfig::default())
}

/// A running match with the given tuning.
///
/// # Panics
///
/// Never in practice; a fresh engine always starts.
#[must_use]
pub fn running_engine_with(config: MatchConfig) -> Engine {
    let mut engine = engine_with_players(config);
    engine.start_game().expect("fresh engine starts");
    engine
}

/// Tuning with no deploy delay, so units act on their first tick.
#[must_use]
pub fn instant_deploy() -> MatchConfig {
    let mut config = MatchConfig::default();
    config.timing.deploy_delay = Fixed::ZERO;
    config
}

/// Id of the tower in a slot.
///
/// # Panics
///
/// Panics if the engine has no such tower.
#[must_use]
pub fn tower_id(engine: &Engine, team: Team, slot: TowerSlot) -> EntityId {
    engine
        .tower_at(team, slot)
        .map(|tower| tower.id)
        .expect("every slot has a tower")
}

/// Destroy a tower outright.
pub fn destroy_tower(engine: &mut Engine, team: Team, slot: TowerSlot) {
    let id = tower_id(engine, team, slot);
    engine.deal_damage_to_structure(id, u32::MAX);
}

/// Run `ticks` 100 ms ticks, continuing the engine's tick numbering.
pub fn advance(engine: &mut Engine, ticks: u64) -> Vec<TickEvents> {
    let start = engine.tick();
    (1..=ticks)
        .map(|offset| engine.update(TICK, start + offset))
        .collect()
}

/// Run ticks until the match ends or `max_ticks` pass. Returns ticks run.
pub fn run_until_end(engine: &mut Engine, max_ticks: u64) -> u64 {
    let start = engine.tick();
    let mut ran = 0;
    while ran < max_ticks && engine.winner().is_none() {
        ran += 1;
        engine.update(TICK, start + ran);
    }
    ran
}
