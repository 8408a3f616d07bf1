//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the engine produces identical
//! results given identical inputs.
//!
//! # Testing Strategy
//!
//! The engine is authoritative, and its tests must be reproducible.
//! Sources of non-determinism include:
//!
//! - **Floating-point math**: We use fixed-point arithmetic via
//!   [`arena_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Units, towers and players live in
//!   `BTreeMap`s keyed by id.
//!
//! - **Wall clock**: The match clock is the sum of supplied deltas.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual behaviors (movement, targeting, combat)
//! 2. **Property tests**: Random command scripts still replay identically
//! 3. **Parallel tests**: Running N engines on N threads all match

use std::thread;

use arena_core::command::PlayerCommand;
use arena_core::simulation::Engine;

use crate::fixtures::TICK;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic engine).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the runs matched, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Engine is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// A command applied at the start of a given tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedCommand {
    /// Tick before which the command is applied.
    pub tick: u64,
    /// The command.
    pub command: PlayerCommand,
}

/// Run a state machine multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `ticks` - Number of steps per run
/// * `setup` - Function to create initial state
/// * `step` - Function to advance by one step
/// * `hash` - Function to compute state hash
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S, u64),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for tick in 1..=ticks {
            step(&mut state, tick);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Apply the script entries for `tick`, then advance the engine one tick.
///
/// Rejected commands are ignored, as the room does.
pub fn step_with_script(engine: &mut Engine, script: &[ScriptedCommand], tick: u64) {
    for entry in script.iter().filter(|entry| entry.tick == tick) {
        let _ = engine.apply_command(&entry.command);
    }
    engine.update(TICK, tick);
}

/// Replay a script on fresh engines `runs` times and compare final hashes.
pub fn verify_script_determinism<F>(setup_fn: F, script: &[ScriptedCommand], runs: usize, ticks: u64) -> DeterminismResult
where
    F: Fn() -> Engine,
{
    verify_determinism(
        runs,
        ticks,
        setup_fn,
        |engine, tick| step_with_script(engine, script, tick),
        Engine::state_hash,
    )
}

/// Compare two runs tick-by-tick, finding the first divergence.
///
/// # Returns
///
/// `None` if the runs match throughout, `Some(tick)` at the first tick
/// where they differ.
pub fn find_first_divergence<F>(setup_fn: F, script: &[ScriptedCommand], num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Engine,
{
    let mut first = setup_fn();
    let mut second = setup_fn();

    if first.state_hash() != second.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        step_with_script(&mut first, script, tick);
        step_with_script(&mut second, script, tick);

        if first.state_hash() != second.state_hash() {
            return Some(tick);
        }
    }

    None
}

/// Run N engines on scoped threads and collect their final hashes.
///
/// # Panics
///
/// Panics if a worker thread panics.
pub fn run_parallel_scoped<F>(setup_fn: F, script: &[ScriptedCommand], num_sims: usize, num_ticks: u64) -> DeterminismResult
where
    F: Fn() -> Engine + Sync,
{
    let hashes: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut engine = setup_fn();
                    for tick in 1..=num_ticks {
                        step_with_script(&mut engine, script, tick);
                    }
                    engine.state_hash()
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
        hashes,
        ticks: num_ticks,
    }
}

/// Proptest strategies for engine testing.
///
/// These generate random but reproducible inputs for property-based tests.
pub mod strategies {
    use proptest::prelude::*;

    use arena_core::command::{PlayerAction, PlayerCommand};
    use arena_core::components::Team;
    use arena_core::grid::{COLS, FRONTIER_ROW, ROWS};
    use arena_core::unit_kind::UnitKind;

    use super::ScriptedCommand;
    use crate::fixtures::{BLUE, RED};

    /// Any unit kind.
    pub fn arb_unit_kind() -> impl Strategy<Value = UnitKind> {
        prop::sample::select(UnitKind::ALL.to_vec())
    }

    /// Either team.
    pub fn arb_team() -> impl Strategy<Value = Team> {
        prop_oneof![Just(Team::Red), Just(Team::Blue)]
    }

    /// Any cell on the board, legal or not.
    pub fn arb_cell() -> impl Strategy<Value = (i32, i32)> {
        (0..ROWS as i32, 0..COLS as i32)
    }

    /// A cell on the team's own half.
    pub fn arb_legal_cell(team: Team) -> impl Strategy<Value = (i32, i32)> {
        let rows = match team {
            Team::Red => 0..FRONTIER_ROW + 1,
            Team::Blue => FRONTIER_ROW + 1..ROWS as i32,
        };
        (rows, 0..COLS as i32)
    }

    /// A deploy by either fixture player on any cell.
    pub fn arb_deploy() -> impl Strategy<Value = PlayerCommand> {
        (arb_team(), arb_unit_kind(), arb_cell()).prop_map(|(team, kind, (row, col))| {
            let player = match team {
                Team::Red => RED,
                Team::Blue => BLUE,
            };
            PlayerCommand {
                player_id: player.to_string(),
                action: PlayerAction::Deploy { kind, row, col },
            }
        })
    }

    /// A script of deploys spread over the first `max_tick` ticks.
    pub fn arb_script(max_len: usize, max_tick: u64) -> impl Strategy<Value = Vec<ScriptedCommand>> {
        proptest::collection::vec((1..=max_tick, arb_deploy()), 0..max_len).prop_map(|entries| {
            entries
                .into_iter()
                .map(|(tick, command)| ScriptedCommand { tick, command })
                .collect()
        })
    }

    /// Damage values (1-6000).
    pub fn arb_damage() -> impl Strategy<Value = u32> {
        1u32..6000u32
    }
}
