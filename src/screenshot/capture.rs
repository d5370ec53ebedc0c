use std::fmt;
use std::sync::Arc;

use crate::logger::sdk_debug;
use crate::screenshot::error::{unavailable, ScreenshotResult};
use crate::screenshot::limiter::ScreenshotLimiter;

/// Opaque handle to a captured image, owned by the capture collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScreenshotHandle(pub String);

/// Host-side collaborator that renders the actual screenshot.
///
/// Called only after the limiter has granted a request, from whichever thread triggered
/// it (a caller thread for log events, a timer thread for late moments). Implementations
/// should hand the work off rather than block.
pub trait ScreenshotCapture: Send + Sync {
    fn capture(&self) -> ScreenshotResult<ScreenshotHandle>;
}

/// Capture collaborator used when the host did not provide one.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledCapture;

impl ScreenshotCapture for DisabledCapture {
    fn capture(&self) -> ScreenshotResult<ScreenshotHandle> {
        Err(unavailable("no screenshot capture configured"))
    }
}

/// Why a screenshot was asked for; only used for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureReason<'a> {
    LateMoment { name: &'a str, identifier: &'a str },
    LogEvent { name: &'a str },
}

/// Limiter plus capture collaborator, shared by the moment registry and the event logger.
#[derive(Clone)]
pub struct ScreenshotService {
    limiter: Arc<ScreenshotLimiter>,
    capture: Arc<dyn ScreenshotCapture>,
    enabled: bool,
}

impl ScreenshotService {
    pub fn new(limiter: Arc<ScreenshotLimiter>, capture: Arc<dyn ScreenshotCapture>) -> Self {
        Self {
            limiter,
            capture,
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn limiter(&self) -> &Arc<ScreenshotLimiter> {
        &self.limiter
    }

    /// Asks the limiter for a slot and captures if granted. Returns whether an image was
    /// actually produced; denial and capture failure are both silent.
    pub fn request(&self, reason: CaptureReason<'_>) -> bool {
        if !self.enabled {
            return false;
        }
        if !self.limiter.request_capture() {
            sdk_debug!("screenshot rate-limited: {reason:?}");
            return false;
        }
        match self.capture.capture() {
            Ok(handle) => {
                sdk_debug!("screenshot {} captured: {reason:?}", handle.0);
                true
            }
            Err(err) => {
                sdk_debug!("screenshot capture failed ({reason:?}): {err}");
                false
            }
        }
    }
}

impl fmt::Debug for ScreenshotService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScreenshotService")
            .field("limiter", &self.limiter)
            .field("enabled", &self.enabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::clock::ManualClock;
    use crate::screenshot::error::capture_failed;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingCapture {
        calls: AtomicUsize,
    }

    impl ScreenshotCapture for CountingCapture {
        fn capture(&self) -> ScreenshotResult<ScreenshotHandle> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ScreenshotHandle(format!("shot-{n}")))
        }
    }

    struct FailingCapture;

    impl ScreenshotCapture for FailingCapture {
        fn capture(&self) -> ScreenshotResult<ScreenshotHandle> {
            Err(capture_failed("window not visible"))
        }
    }

    const REASON: CaptureReason<'static> = CaptureReason::LogEvent { name: "checkout" };

    #[test]
    fn capture_only_runs_when_granted() {
        let clock = Arc::new(ManualClock::new());
        let capture = Arc::new(CountingCapture::default());
        let service = ScreenshotService::new(
            Arc::new(ScreenshotLimiter::new(clock.clone())),
            capture.clone(),
        );

        assert!(service.request(REASON));
        assert!(!service.request(REASON));
        clock.advance(Duration::from_secs(1));
        assert!(service.request(REASON));
        assert_eq!(capture.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_capture_is_absorbed() {
        let clock = Arc::new(ManualClock::new());
        let service = ScreenshotService::new(
            Arc::new(ScreenshotLimiter::new(clock)),
            Arc::new(FailingCapture),
        );
        assert!(!service.request(REASON));
    }

    #[test]
    fn disabled_service_never_consumes_the_window() {
        let clock = Arc::new(ManualClock::new());
        let limiter = Arc::new(ScreenshotLimiter::new(clock));
        let service = ScreenshotService::new(limiter.clone(), Arc::new(DisabledCapture)).disabled();

        assert!(!service.request(REASON));
        assert!(limiter.request_capture());
    }
}
