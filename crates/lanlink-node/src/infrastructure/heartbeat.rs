//! Restartable periodic timer shared by the datagram and stream channels.
//!
//! A [`HeartbeatScheduler`] owns at most one Tokio task.  The task waits for
//! the initial delay, then invokes the tick callback once per period.  When a
//! tick overruns, the missed ticks fire back-to-back instead.
//!
//! Every tick runs under the scheduler's tick gate.  Aborting a task cannot
//! interrupt a callback that is already executing, so after a restart the new
//! task's first tick waits on the gate until the old tick returns.
//!
//! The callback is synchronous.  Anything that needs I/O from a tick spawns
//! its own task (datagram sends) or queues work on a channel (stream writes).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::sync::lock;

/// Smallest accepted period.  `tokio::time::interval` rejects zero.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Tick body invoked by the scheduler.
pub type TickCallback = Arc<dyn Fn() + Send + Sync>;

/// Error type for heartbeat scheduler operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeartbeatError {
    /// The callback can only be replaced while the scheduler is stopped.
    #[error("heartbeat `{0}` is running; stop it before replacing the callback")]
    Running(String),
}

/// A restartable fixed-period timer.
pub struct HeartbeatScheduler {
    name: String,
    callback: Mutex<Option<TickCallback>>,
    task: Mutex<Option<JoinHandle<()>>>,
    /// Held for the duration of every tick, across restarts.
    gate: Arc<Mutex<()>>,
}

impl HeartbeatScheduler {
    /// Creates a stopped scheduler with no callback.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            callback: Mutex::new(None),
            task: Mutex::new(None),
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Creates a stopped scheduler with `callback` installed.
    pub fn with_callback(name: impl Into<String>, callback: TickCallback) -> Self {
        let scheduler = Self::new(name);
        *lock(&scheduler.callback) = Some(callback);
        scheduler
    }

    /// Replaces the tick callback.
    ///
    /// # Errors
    ///
    /// Returns [`HeartbeatError::Running`] if a schedule is pending; the
    /// previous callback stays in place.
    pub fn set_callback(&self, callback: TickCallback) -> Result<(), HeartbeatError> {
        let task = lock(&self.task);
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(HeartbeatError::Running(self.name.clone()));
        }
        *lock(&self.callback) = Some(callback);
        Ok(())
    }

    /// Starts ticking after `initial_delay`, then every `period`.
    ///
    /// A pending schedule is replaced.  Without a callback, or outside a Tokio
    /// runtime, this logs a warning and does nothing.
    pub fn start(&self, initial_delay: Duration, period: Duration) {
        let mut task = lock(&self.task);
        if let Some(previous) = task.take() {
            previous.abort();
        }

        let Some(callback) = lock(&self.callback).clone() else {
            warn!("heartbeat `{}` started without a callback; ignoring", self.name);
            return;
        };
        let Ok(handle) = Handle::try_current() else {
            warn!("heartbeat `{}` started outside a Tokio runtime; ignoring", self.name);
            return;
        };

        let Some(first_tick) = Instant::now().checked_add(initial_delay) else {
            warn!(
                "heartbeat `{}` initial delay {:?} is out of range; ignoring",
                self.name, initial_delay
            );
            return;
        };
        let period = period.max(MIN_PERIOD);
        debug!(
            "heartbeat `{}` scheduled: delay {:?}, period {:?}",
            self.name, initial_delay, period
        );
        let gate = Arc::clone(&self.gate);
        *task = Some(handle.spawn(async move {
            let mut interval = time::interval_at(first_tick, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                interval.tick().await;
                let _tick = lock(&gate);
                callback();
            }
        }));
    }

    /// Cancels pending and future ticks.  Safe to call at any time.
    pub fn stop(&self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
            debug!("heartbeat `{}` stopped", self.name);
        }
    }

    /// `true` while a schedule is pending.
    pub fn is_running(&self) -> bool {
        lock(&self.task).as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for HeartbeatScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for HeartbeatScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatScheduler")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
