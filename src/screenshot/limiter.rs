use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::platform::clock::MonotonicClock;

/// Length of the rolling window in which at most one capture is granted.
pub const SCREENSHOT_WINDOW: Duration = Duration::from_millis(1000);

const NEVER_GRANTED: u64 = u64::MAX;

/// Process-wide gate allowing at most one screenshot per rolling window.
///
/// The last grant time lives in a single atomic; the check and the update happen in one
/// compare-and-swap, so of two simultaneous requests inside a window exactly one wins.
/// Denied requests are dropped, never queued.
pub struct ScreenshotLimiter {
    clock: Arc<dyn MonotonicClock>,
    window_ms: u64,
    last_granted_ms: AtomicU64,
}

impl ScreenshotLimiter {
    pub fn new(clock: Arc<dyn MonotonicClock>) -> Self {
        Self::with_window(clock, SCREENSHOT_WINDOW)
    }

    pub fn with_window(clock: Arc<dyn MonotonicClock>, window: Duration) -> Self {
        Self {
            clock,
            window_ms: u64::try_from(window.as_millis()).unwrap_or(u64::MAX),
            last_granted_ms: AtomicU64::new(NEVER_GRANTED),
        }
    }

    /// Returns `true` and records the grant if nothing was granted in the preceding window.
    pub fn request_capture(&self) -> bool {
        let now_ms = u64::try_from(self.clock.now().as_millis()).unwrap_or(u64::MAX - 1);
        let mut last = self.last_granted_ms.load(Ordering::Acquire);
        loop {
            if last != NEVER_GRANTED && now_ms.saturating_sub(last) < self.window_ms {
                return false;
            }
            match self.last_granted_ms.compare_exchange_weak(
                last,
                now_ms,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => last = observed,
            }
        }
    }
}

impl fmt::Debug for ScreenshotLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = self.last_granted_ms.load(Ordering::Relaxed);
        f.debug_struct("ScreenshotLimiter")
            .field("window_ms", &self.window_ms)
            .field("last_granted_ms", &(last != NEVER_GRANTED).then_some(last))
            .finish()
    }
}
