//! Match rooms.
//!
//! A [`MatchRoom`] wraps one engine, one scheduler, a player roster and a
//! FIFO command queue. Commands are validated when queued and applied at
//! the start of the next tick.
//!
//! Locks are always taken in the order state, then scheduler.

use std::collections::BTreeMap;
use std::iter;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use arena_core::command::{PlayerAction, PlayerCommand};
use arena_core::components::Team;
use arena_core::config::MatchConfig;
use arena_core::error::CommandRejection;
use arena_core::simulation::{Engine, MatchStatus};
use arena_core::snapshot::{PlayerView, Snapshot};

use crate::scheduler::{Scheduler, TickError};
use crate::{unix_millis, Result, RoomId, ServerConfig, ServerError};

/// Receives every snapshot a room emits.
pub type SnapshotSink = Arc<dyn Fn(Arc<Snapshot>) + Send + Sync>;

type TeardownHook = Box<dyn Fn(RoomId) + Send + Sync>;

/// A roster entry in [`RoomInfo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    /// Player id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Team.
    pub team: Team,
    /// Connection flag.
    pub is_connected: bool,
}

/// Summary of a room for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    /// Room id.
    pub id: RoomId,
    /// Players in the roster.
    pub player_count: usize,
    /// Roster capacity.
    pub max_players: usize,
    /// Match state.
    pub status: MatchStatus,
    /// Creation time, ms since epoch.
    pub created_at: u64,
    /// Start time, ms since epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    /// Roster.
    pub players: Vec<RosterEntry>,
}

struct RoomState {
    engine: Engine,
    /// Player id to last heartbeat.
    roster: BTreeMap<String, Instant>,
    started_at: Option<u64>,
    start_pending: bool,
    ended: bool,
    destroyed: bool,
}

struct RoomShared {
    id: RoomId,
    capacity: usize,
    tick_rate: u32,
    start_grace: Duration,
    teardown_delay: Duration,
    created_at: u64,
    state: Mutex<RoomState>,
    scheduler: Mutex<Scheduler>,
    commands: mpsc::UnboundedSender<PlayerCommand>,
    inbox: Mutex<mpsc::UnboundedReceiver<PlayerCommand>>,
    sink: Mutex<Option<SnapshotSink>>,
    teardown_hook: Mutex<Option<TeardownHook>>,
}

/// Handle to one match. Clones share the same room.
#[derive(Clone)]
pub struct MatchRoom {
    shared: Arc<RoomShared>,
}

impl std::fmt::Debug for MatchRoom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchRoom")
            .field("id", &self.shared.id)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MatchRoom {
    /// Create an empty room in [`MatchStatus::Waiting`].
    #[must_use]
    pub fn new(config: &ServerConfig, match_config: MatchConfig) -> Self {
        let (commands, inbox) = mpsc::unbounded_channel();
        let shared = Arc::new_cyclic(|weak: &Weak<RoomShared>| {
            let mut scheduler = Scheduler::new(config.tick_rate);
            let owner = weak.clone();
            scheduler.add_callback(move |delta, tick| {
                let shared = owner.upgrade().ok_or(TickError::OwnerDropped)?;
                MatchRoom { shared }.process_tick(delta, tick);
                Ok(())
            });
            RoomShared {
                id: RoomId::new_v4(),
                capacity: config.players_per_room.max(1),
                tick_rate: config.tick_rate,
                start_grace: config.start_grace(),
                teardown_delay: config.teardown_delay(),
                created_at: unix_millis(),
                state: Mutex::new(RoomState {
                    engine: Engine::new(match_config),
                    roster: BTreeMap::new(),
                    started_at: None,
                    start_pending: false,
                    ended: false,
                    destroyed: false,
                }),
                scheduler: Mutex::new(scheduler),
                commands,
                inbox: Mutex::new(inbox),
                sink: Mutex::new(None),
                teardown_hook: Mutex::new(None),
            }
        });
        tracing::debug!(room = %shared.id, "room created");
        Self { shared }
    }

    /// Room id.
    #[must_use]
    pub fn id(&self) -> RoomId {
        self.shared.id
    }

    /// Match state.
    #[must_use]
    pub fn status(&self) -> MatchStatus {
        lock(&self.shared.state).engine.status()
    }

    /// Players in the roster.
    #[must_use]
    pub fn player_count(&self) -> usize {
        lock(&self.shared.state).roster.len()
    }

    /// Roster at capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.player_count() >= self.shared.capacity
    }

    /// No players in the roster.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.player_count() == 0
    }

    /// Scheduler tick index.
    #[must_use]
    pub fn current_tick(&self) -> u64 {
        lock(&self.shared.scheduler).current_tick()
    }

    /// Whether the scheduler is firing.
    #[must_use]
    pub fn is_ticking(&self) -> bool {
        lock(&self.shared.scheduler).is_active()
    }

    /// Run a closure against the engine under the room lock.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut Engine) -> R) -> R {
        f(&mut lock(&self.shared.state).engine)
    }

    // ------------------------------------------------------------------
    // Roster
    // ------------------------------------------------------------------

    /// Join the room, or reconnect a player already in it.
    ///
    /// New players go to the team with fewer members, Red on ties. When
    /// the roster fills up the match starts after the configured grace
    /// delay, so this must run inside a Tokio runtime.
    pub fn add_player(&self, player_id: &str, name: &str) -> Result<PlayerView> {
        let (view, start) = {
            let mut guard = lock(&self.shared.state);
            let state = &mut *guard;
            if state.destroyed {
                return Err(ServerError::RoomNotFound(self.shared.id));
            }

            if let Some(seen) = state.roster.get_mut(player_id) {
                *seen = Instant::now();
                let team = state
                    .engine
                    .player(player_id)
                    .map_or(Team::Red, |player| player.team);
                let view = PlayerView::from(state.engine.add_player(player_id, name, team));
                tracing::debug!(room = %self.shared.id, player = player_id, "player rejoined");
                return Ok(view);
            }

            if state.roster.len() >= self.shared.capacity {
                tracing::debug!(room = %self.shared.id, player = player_id, "room full");
                return Err(ServerError::RoomFull {
                    room: self.shared.id,
                    capacity: self.shared.capacity,
                });
            }

            let red = state
                .roster
                .keys()
                .filter_map(|id| state.engine.player(id))
                .filter(|player| player.team == Team::Red)
                .count();
            let team = if red <= state.roster.len() - red {
                Team::Red
            } else {
                Team::Blue
            };

            state.roster.insert(player_id.to_string(), Instant::now());
            let view = PlayerView::from(state.engine.add_player(player_id, name, team));
            tracing::info!(
                room = %self.shared.id,
                player = player_id,
                team = ?view.team,
                players = state.roster.len(),
                capacity = self.shared.capacity,
                "player joined"
            );

            let start = state.roster.len() == self.shared.capacity
                && state.engine.status() == MatchStatus::Waiting
                && !state.start_pending;
            if start {
                state.start_pending = true;
            }
            (view, start)
        };

        if start {
            self.schedule_start();
        }
        Ok(view)
    }

    /// Drop a player from the roster.
    ///
    /// A running match that falls below capacity is paused.
    pub fn remove_player(&self, player_id: &str) -> bool {
        let mut state = lock(&self.shared.state);
        if state.roster.remove(player_id).is_none() {
            return false;
        }
        state.engine.remove_player(player_id);
        tracing::info!(room = %self.shared.id, player = player_id, "player left");

        if state.roster.len() < self.shared.capacity
            && state.engine.status() == MatchStatus::InProgress
            && state.engine.pause().is_ok()
        {
            lock(&self.shared.scheduler).pause();
            tracing::info!(room = %self.shared.id, "match paused, roster below capacity");
        }
        true
    }

    /// Whether the player is on the roster.
    #[must_use]
    pub fn has_player(&self, player_id: &str) -> bool {
        lock(&self.shared.state).roster.contains_key(player_id)
    }

    /// Record a heartbeat from a player.
    pub fn touch(&self, player_id: &str, now: Instant) -> bool {
        match lock(&self.shared.state).roster.get_mut(player_id) {
            Some(seen) => {
                *seen = now;
                true
            }
            None => false,
        }
    }

    /// Mark players silent for longer than `timeout` as disconnected.
    ///
    /// Returns the ids newly marked.
    pub fn sweep(&self, now: Instant, timeout: Duration) -> Vec<String> {
        let mut guard = lock(&self.shared.state);
        let state = &mut *guard;
        let silent: Vec<String> = state
            .roster
            .iter()
            .filter(|(_, seen)| now.saturating_duration_since(**seen) > timeout)
            .map(|(id, _)| id.clone())
            .filter(|id| state.engine.player(id).is_some_and(|player| player.connected))
            .collect();
        for id in &silent {
            state.engine.remove_player(id);
            tracing::info!(room = %self.shared.id, player = %id, "player timed out");
        }
        silent
    }

    /// Every rostered player is disconnected.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        let state = lock(&self.shared.state);
        !state.roster.is_empty()
            && state
                .roster
                .keys()
                .all(|id| state.engine.player(id).map_or(true, |player| !player.connected))
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Queue an action for the next tick.
    ///
    /// Checks membership, lifecycle and, for deploys, elixir and the cell.
    /// Deploys are checked again when the command is applied.
    pub fn queue_action(&self, player_id: &str, action: PlayerAction) -> std::result::Result<(), CommandRejection> {
        let verdict = {
            let state = lock(&self.shared.state);
            validate(&state, player_id, &action)
        };
        if let Err(rejection) = &verdict {
            tracing::debug!(room = %self.shared.id, player = player_id, %rejection, "action dropped");
            return verdict;
        }

        let command = PlayerCommand {
            player_id: player_id.to_string(),
            action,
        };
        if self.shared.commands.send(command).is_err() {
            tracing::debug!(room = %self.shared.id, "command queue closed");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start the match and the scheduler.
    pub fn start_game(&self) -> Result<()> {
        let mut state = lock(&self.shared.state);
        state.start_pending = false;
        if state.destroyed {
            return Err(ServerError::RoomNotFound(self.shared.id));
        }
        if let Err(error) = state.engine.start_game() {
            tracing::warn!(room = %self.shared.id, %error, "start rejected");
            return Err(error.into());
        }
        state.started_at = Some(unix_millis());
        lock(&self.shared.scheduler).start();
        tracing::info!(room = %self.shared.id, "game started");
        Ok(())
    }

    /// Pause the match and the scheduler.
    pub fn pause_game(&self) -> Result<()> {
        let mut state = lock(&self.shared.state);
        if let Err(error) = state.engine.pause() {
            tracing::warn!(room = %self.shared.id, %error, "pause rejected");
            return Err(error.into());
        }
        lock(&self.shared.scheduler).pause();
        tracing::info!(room = %self.shared.id, "game paused");
        Ok(())
    }

    /// Resume a paused match.
    pub fn resume_game(&self) -> Result<()> {
        let mut state = lock(&self.shared.state);
        if let Err(error) = state.engine.resume() {
            tracing::warn!(room = %self.shared.id, %error, "resume rejected");
            return Err(error.into());
        }
        lock(&self.shared.scheduler).resume();
        tracing::info!(room = %self.shared.id, "game resumed");
        Ok(())
    }

    /// Stop everything and clear the room.
    pub fn destroy(&self) {
        // Swap the scheduler out so clearing callbacks never waits on an
        // in-flight tick while holding the scheduler lock.
        let mut scheduler = {
            let mut guard = lock(&self.shared.scheduler);
            guard.stop();
            std::mem::replace(&mut *guard, Scheduler::new(self.shared.tick_rate))
        };
        scheduler.destroy();

        {
            let mut state = lock(&self.shared.state);
            state.engine.reset();
            state.roster.clear();
            state.destroyed = true;
        }
        {
            let mut inbox = lock(&self.shared.inbox);
            while inbox.try_recv().is_ok() {}
        }
        *lock(&self.shared.sink) = None;
        tracing::info!(room = %self.shared.id, "room destroyed");
    }

    /// Whether [`destroy`](Self::destroy) has run.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        lock(&self.shared.state).destroyed
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    /// Current full state.
    #[must_use]
    pub fn get_snapshot(&self) -> Snapshot {
        lock(&self.shared.state).engine.snapshot(unix_millis())
    }

    /// Listing summary.
    #[must_use]
    pub fn get_room_info(&self) -> RoomInfo {
        let state = lock(&self.shared.state);
        let players = state
            .roster
            .keys()
            .filter_map(|id| state.engine.player(id))
            .map(|player| RosterEntry {
                id: player.id.clone(),
                name: player.name.clone(),
                team: player.team,
                is_connected: player.connected,
            })
            .collect();
        RoomInfo {
            id: self.shared.id,
            player_count: state.roster.len(),
            max_players: self.shared.capacity,
            status: state.engine.status(),
            created_at: self.shared.created_at,
            started_at: state.started_at,
            players,
        }
    }

    /// Set the snapshot sink, replacing any previous one.
    pub fn on_snapshot<F>(&self, sink: F)
    where
        F: Fn(Arc<Snapshot>) + Send + Sync + 'static,
    {
        *lock(&self.shared.sink) = Some(Arc::new(sink));
    }

    pub(crate) fn on_teardown<F>(&self, hook: F)
    where
        F: Fn(RoomId) + Send + Sync + 'static,
    {
        *lock(&self.shared.teardown_hook) = Some(Box::new(hook));
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    fn process_tick(&self, delta: Duration, tick: u64) {
        let commands: Vec<PlayerCommand> = {
            let mut inbox = lock(&self.shared.inbox);
            iter::from_fn(|| inbox.try_recv().ok()).collect()
        };

        let (snapshot, ended) = {
            let mut state = lock(&self.shared.state);
            if state.destroyed {
                return;
            }
            for command in &commands {
                if let Err(rejection) = state.engine.apply_command(command) {
                    tracing::debug!(
                        room = %self.shared.id,
                        player = %command.player_id,
                        %rejection,
                        "command rejected at apply"
                    );
                }
            }

            let events = state.engine.update(delta, tick);
            tracing::trace!(
                room = %self.shared.id,
                tick,
                attacks = events.attacks.len(),
                deaths = events.deaths.len(),
                "tick"
            );

            let ended = state.engine.status() == MatchStatus::Ended && !state.ended;
            if ended {
                state.ended = true;
            }
            (Arc::new(state.engine.snapshot(unix_millis())), ended)
        };

        self.emit(snapshot);
        if ended {
            self.handle_end();
        }
    }

    fn emit(&self, snapshot: Arc<Snapshot>) {
        let sink = lock(&self.shared.sink).clone();
        if let Some(sink) = sink {
            sink(snapshot);
        }
    }

    fn handle_end(&self) {
        lock(&self.shared.scheduler).stop();
        let snapshot = self.get_snapshot();
        tracing::info!(
            room = %self.shared.id,
            winner = ?snapshot.winner,
            reason = ?snapshot.end_reason,
            "game ended"
        );
        self.emit(Arc::new(snapshot));
        self.schedule_teardown();
    }

    fn schedule_start(&self) {
        let room = Arc::downgrade(&self.shared);
        let grace = self.shared.start_grace;
        tokio::spawn(async move {
            time::sleep(grace).await;
            if let Some(shared) = room.upgrade() {
                let room = MatchRoom { shared };
                if let Err(error) = room.start_game() {
                    tracing::debug!(room = %room.id(), %error, "automatic start skipped");
                }
            }
        });
    }

    fn schedule_teardown(&self) {
        let room = Arc::downgrade(&self.shared);
        let delay = self.shared.teardown_delay;
        tracing::debug!(room = %self.shared.id, delay_ms = delay.as_millis() as u64, "teardown scheduled");
        tokio::spawn(async move {
            time::sleep(delay).await;
            if let Some(shared) = room.upgrade() {
                let room = MatchRoom { shared };
                room.destroy();
                let hook = lock(&room.shared.teardown_hook).take();
                if let Some(hook) = hook {
                    hook(room.id());
                }
            }
        });
    }
}

fn validate(state: &RoomState, player_id: &str, action: &PlayerAction) -> std::result::Result<(), CommandRejection> {
    if !state.roster.contains_key(player_id) {
        return Err(CommandRejection::UnknownPlayer(player_id.to_string()));
    }
    let status = state.engine.status();
    if !matches!(status, MatchStatus::InProgress | MatchStatus::Paused) {
        return Err(CommandRejection::NotRunning(status));
    }
    if let PlayerAction::Deploy { kind, row, col } = *action {
        if !state.engine.can_play_card(player_id, kind) {
            return Err(CommandRejection::InsufficientElixir {
                kind,
                required: state.engine.config().units.cost(kind),
                available: state
                    .engine
                    .player(player_id)
                    .map_or(0, |player| player.whole_elixir()),
            });
        }
        if let Some(player) = state.engine.player(player_id) {
            state.engine.check_deploy_cell(player.team, row, col)?;
        }
    }
    Ok(())
}
