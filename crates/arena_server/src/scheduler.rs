//! Fixed-rate tick scheduler.
//!
//! The scheduler is the only source of forward time for a match. Each firing
//! hands every registered callback the real time elapsed since the previous
//! firing and a tick index that increases by one per firing.
//!
//! Firing runs on a Tokio task, so [`Scheduler::start`] and
//! [`Scheduler::resume`] must be called from within a runtime.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Failure reported by a tick callback. Logged, never fatal.
#[derive(Debug, Error)]
pub enum TickError {
    /// The owner of the callback no longer exists.
    #[error("callback owner dropped")]
    OwnerDropped,

    /// Any other failure.
    #[error("{0}")]
    Failed(String),
}

/// A registered tick callback: `(delta, tick)`.
pub type TickCallback = Box<dyn FnMut(Duration, u64) -> Result<(), TickError> + Send>;

/// Handle returned by [`Scheduler::add_callback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

type Callbacks = Arc<Mutex<Vec<(CallbackId, TickCallback)>>>;

/// Fires callbacks at a fixed rate on a Tokio task.
pub struct Scheduler {
    tick_rate: u32,
    period: Duration,
    callbacks: Callbacks,
    next_callback: u64,
    tick: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tick_rate", &self.tick_rate)
            .field("tick", &self.current_tick())
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Create a stopped scheduler firing `tick_rate` times per second.
    ///
    /// A rate of zero is treated as one.
    #[must_use]
    pub fn new(tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            tick_rate,
            period: Duration::from_secs(1) / tick_rate,
            callbacks: Arc::new(Mutex::new(Vec::new())),
            next_callback: 0,
            tick: Arc::new(AtomicU64::new(0)),
            task: None,
        }
    }

    /// Register a callback. Callbacks fire in registration order.
    pub fn add_callback<F>(&mut self, callback: F) -> CallbackId
    where
        F: FnMut(Duration, u64) -> Result<(), TickError> + Send + 'static,
    {
        let id = CallbackId(self.next_callback);
        self.next_callback += 1;
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Box::new(callback)));
        id
    }

    /// Unregister a callback. Returns `false` if it was already gone.
    ///
    /// Waits for an in-flight firing to finish, so it must not be called
    /// from inside a callback.
    pub fn remove_callback(&mut self, id: CallbackId) -> bool {
        let mut callbacks = self.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
        let before = callbacks.len();
        callbacks.retain(|(registered, _)| *registered != id);
        callbacks.len() != before
    }

    /// Begin firing from tick zero.
    pub fn start(&mut self) {
        if self.is_active() {
            tracing::warn!("scheduler already running");
            return;
        }
        self.tick.store(0, Ordering::SeqCst);
        self.spawn();
        tracing::debug!(tick_rate = self.tick_rate, period_ms = self.period.as_millis() as u64, "scheduler started");
    }

    /// Stop firing. Callbacks and the tick index are kept.
    pub fn pause(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!(tick = self.current_tick(), "scheduler paused");
        }
    }

    /// Continue firing after [`pause`](Self::pause).
    ///
    /// The first delta after resuming is measured from the resume, not
    /// from the last firing before the pause.
    pub fn resume(&mut self) {
        if self.is_active() {
            return;
        }
        self.spawn();
        tracing::debug!(tick = self.current_tick(), "scheduler resumed");
    }

    /// Stop firing and reset the tick index.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.tick.store(0, Ordering::SeqCst);
        tracing::debug!("scheduler stopped");
    }

    /// Stop and drop every callback.
    ///
    /// Must not be called from inside a callback.
    pub fn destroy(&mut self) {
        self.stop();
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Whether the firing task is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Index of the most recent firing.
    #[must_use]
    pub fn current_tick(&self) -> u64 {
        self.tick.load(Ordering::SeqCst)
    }

    /// Firings per second.
    #[must_use]
    pub const fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    /// Time between firings.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    fn spawn(&mut self) {
        let period = self.period;
        let callbacks = Arc::clone(&self.callbacks);
        let tick = Arc::clone(&self.tick);
        self.task = Some(tokio::spawn(run(period, callbacks, tick)));
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(period: Duration, callbacks: Callbacks, tick: Arc<AtomicU64>) {
    let mut last = Instant::now();
    let mut interval = time::interval_at(last + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        let now = Instant::now();
        let delta = now.duration_since(last);
        last = now;
        let index = tick.fetch_add(1, Ordering::SeqCst) + 1;
        fire(&callbacks, delta, index);
    }
}

fn fire(callbacks: &Callbacks, delta: Duration, index: u64) {
    let mut callbacks = callbacks.lock().unwrap_or_else(PoisonError::into_inner);
    for (slot, (_, callback)) in callbacks.iter_mut().enumerate() {
        match panic::catch_unwind(AssertUnwindSafe(|| callback(delta, index))) {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                tracing::error!(slot, tick = index, %error, "tick callback failed");
            }
            Err(_) => {
                tracing::error!(slot, tick = index, "tick callback panicked");
            }
        }
    }
}
