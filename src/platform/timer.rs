use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::platform::clock::{ManualClock, MonotonicClock};
use crate::platform::runtime;

pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// Runs a callback once, after a delay.
///
/// There is no cancellation. Callbacks are expected to re-check whatever state they act on
/// when they fire.
pub trait DeferredTimer: Send + Sync {
    fn schedule(&self, delay: Duration, task: TimerTask);
}

/// Timer backed by the background tokio runtime.
#[derive(Clone, Copy, Debug, Default)]
pub struct RuntimeTimer;

impl DeferredTimer for RuntimeTimer {
    fn schedule(&self, delay: Duration, task: TimerTask) {
        runtime::spawn_detached(async move {
            runtime::sleep(delay).await;
            task();
        });
    }
}

/// Timer whose callbacks only fire from [`ManualTimer::run_due`], measured against a
/// [`ManualClock`].
pub struct ManualTimer {
    clock: Arc<ManualClock>,
    pending: Mutex<Vec<(Duration, TimerTask)>>,
}

impl ManualTimer {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Number of callbacks that have not fired yet.
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Fires every callback whose deadline has been reached, in deadline order, and returns
    /// how many ran. Callbacks run outside the internal lock, so they may schedule again.
    pub fn run_due(&self) -> usize {
        let now = self.clock.now();
        let mut due = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            let (ready, waiting): (Vec<_>, Vec<_>) =
                pending.drain(..).partition(|(deadline, _)| *deadline <= now);
            *pending = waiting;
            ready
        };
        due.sort_by_key(|(deadline, _)| *deadline);
        let count = due.len();
        for (_, task) in due {
            task();
        }
        count
    }

    /// Advances the clock and fires everything that became due.
    pub fn advance(&self, delta: Duration) -> usize {
        self.clock.advance(delta);
        self.run_due()
    }
}

impl DeferredTimer for ManualTimer {
    fn schedule(&self, delay: Duration, task: TimerTask) {
        let deadline = self.clock.now().saturating_add(delay);
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((deadline, task));
    }
}

impl fmt::Debug for ManualTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualTimer")
            .field("now", &self.clock.now())
            .field("pending", &self.pending())
            .finish()
    }
}
