use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::logger::sdk_debug;
use crate::moments::constants::{DEFAULT_LATE_THRESHOLD, REGISTRY_SHARDS};
use crate::platform::clock::MonotonicClock;
use crate::platform::timer::DeferredTimer;
use crate::properties::PropertyBag;
use crate::screenshot::{CaptureReason, ScreenshotService};

/// Identity of an active moment. The empty identifier is the anonymous one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MomentKey {
    pub name: String,
    pub identifier: String,
}

impl MomentKey {
    pub fn new(name: impl Into<String>, identifier: Option<&str>) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.unwrap_or_default().to_string(),
        }
    }
}

/// Optional parameters of [`MomentRegistry::start`].
#[derive(Clone, Debug, PartialEq)]
pub struct MomentOptions {
    pub identifier: Option<String>,
    /// Take a screenshot if the moment turns out late. Defaults to `true`.
    pub allow_screenshot: bool,
    pub properties: PropertyBag,
    /// Overrides the registry's late threshold for this moment.
    pub late_threshold: Option<Duration>,
}

impl Default for MomentOptions {
    fn default() -> Self {
        Self {
            identifier: None,
            allow_screenshot: true,
            properties: PropertyBag::new(),
            late_threshold: None,
        }
    }
}

impl MomentOptions {
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_properties(mut self, properties: PropertyBag) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_screenshot(mut self, allow: bool) -> Self {
        self.allow_screenshot = allow;
        self
    }

    pub fn with_late_threshold(mut self, threshold: Duration) -> Self {
        self.late_threshold = Some(threshold);
        self
    }
}

/// What is left of a moment once it has been ended.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletedMoment {
    pub name: String,
    pub identifier: String,
    pub duration: Duration,
    pub properties: PropertyBag,
}

struct Moment {
    started: Duration,
    allow_screenshot: bool,
    properties: PropertyBag,
    generation: u64,
}

type Shard = Mutex<HashMap<MomentKey, Moment>>;

/// Concurrent store of in-flight moments keyed by (name, identifier).
///
/// The key space is split across independently locked shards, so moments with different
/// keys never contend on the same lock, while every mutation of a given key is serialized
/// by its shard. A moment is fully built before it is inserted and is read only under the
/// lock, which keeps `end` and the lateness check from ever seeing a partial entry.
///
/// Starting a key that is already active replaces the old entry outright ("last start
/// wins"): the replaced moment is never reported. Ending an unknown key does nothing.
#[derive(Clone)]
pub struct MomentRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    shards: Box<[Shard]>,
    hasher: RandomState,
    clock: Arc<dyn MonotonicClock>,
    timer: Arc<dyn DeferredTimer>,
    screenshots: ScreenshotService,
    late_threshold: Duration,
    generations: AtomicU64,
}

impl MomentRegistry {
    pub fn new(
        clock: Arc<dyn MonotonicClock>,
        timer: Arc<dyn DeferredTimer>,
        screenshots: ScreenshotService,
    ) -> Self {
        Self::with_late_threshold(clock, timer, screenshots, DEFAULT_LATE_THRESHOLD)
    }

    pub fn with_late_threshold(
        clock: Arc<dyn MonotonicClock>,
        timer: Arc<dyn DeferredTimer>,
        screenshots: ScreenshotService,
        late_threshold: Duration,
    ) -> Self {
        let shards = (0..REGISTRY_SHARDS)
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Self {
            inner: Arc::new(RegistryInner {
                shards,
                hasher: RandomState::new(),
                clock,
                timer,
                screenshots,
                late_threshold,
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// Starts (or restarts) the moment `name` and arms its lateness check.
    pub fn start(&self, name: &str, options: MomentOptions) {
        if name.trim().is_empty() {
            sdk_debug!("ignoring moment start with an empty name");
            return;
        }
        let key = MomentKey::new(name, options.identifier.as_deref());
        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed);
        let threshold = options.late_threshold.unwrap_or(self.inner.late_threshold);
        let moment = Moment {
            started: self.inner.clock.now(),
            allow_screenshot: options.allow_screenshot,
            properties: options.properties,
            generation,
        };

        let replaced = self.inner.shard(&key).insert(key.clone(), moment).is_some();
        if replaced {
            sdk_debug!(
                "moment {:?} (identifier {:?}) restarted before it ended",
                key.name,
                key.identifier
            );
        }
        self.arm_lateness_check(key, generation, threshold);
    }

    /// Ends the moment and hands back its final attributes, or `None` if no such moment is
    /// active.
    pub fn end(&self, name: &str, identifier: Option<&str>) -> Option<CompletedMoment> {
        let key = MomentKey::new(name, identifier);
        let Some(moment) = self.inner.shard(&key).remove(&key) else {
            sdk_debug!(
                "no active moment {:?} (identifier {:?}) to end",
                key.name,
                key.identifier
            );
            return None;
        };
        let duration = self.inner.clock.now().saturating_sub(moment.started);
        Some(CompletedMoment {
            name: key.name,
            identifier: key.identifier,
            duration,
            properties: moment.properties,
        })
    }

    pub fn contains(&self, name: &str, identifier: Option<&str>) -> bool {
        let key = MomentKey::new(name, identifier);
        self.inner.shard(&key).contains_key(&key)
    }

    /// Number of active moments. Not a snapshot: shards are counted one at a time.
    pub fn len(&self) -> usize {
        self.inner
            .shards
            .iter()
            .map(|shard| lock_shard(shard).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn arm_lateness_check(&self, key: MomentKey, generation: u64, threshold: Duration) {
        let registry = Arc::downgrade(&self.inner);
        self.inner.timer.schedule(
            threshold,
            Box::new(move || {
                if let Some(inner) = registry.upgrade() {
                    inner.check_lateness(&key, generation);
                }
            }),
        );
    }
}

impl RegistryInner {
    fn shard(&self, key: &MomentKey) -> MutexGuard<'_, HashMap<MomentKey, Moment>> {
        let index = (self.hasher.hash_one(key) % self.shards.len() as u64) as usize;
        lock_shard(&self.shards[index])
    }

    /// Fires for one specific start of `key`. A moment that was ended, or replaced by a
    /// newer start, no longer matches `generation` and is left alone.
    fn check_lateness(&self, key: &MomentKey, generation: u64) {
        let late = self
            .shard(key)
            .get(key)
            .is_some_and(|moment| moment.generation == generation && moment.allow_screenshot);
        if late {
            self.screenshots.request(CaptureReason::LateMoment {
                name: &key.name,
                identifier: &key.identifier,
            });
        }
    }
}

fn lock_shard(shard: &Shard) -> MutexGuard<'_, HashMap<MomentKey, Moment>> {
    shard.lock().unwrap_or_else(PoisonError::into_inner)
}

impl fmt::Debug for MomentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MomentRegistry")
            .field("active", &self.len())
            .field("late_threshold", &self.inner.late_threshold)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::clock::{ManualClock, SystemClock};
    use crate::platform::timer::{ManualTimer, RuntimeTimer};
    use crate::screenshot::{
        ScreenshotCapture, ScreenshotHandle, ScreenshotLimiter, ScreenshotResult,
    };
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[derive(Default)]
    struct CountingCapture {
        calls: AtomicUsize,
    }

    impl CountingCapture {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ScreenshotCapture for CountingCapture {
        fn capture(&self) -> ScreenshotResult<ScreenshotHandle> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ScreenshotHandle("late".into()))
        }
    }

    struct Harness {
        clock: Arc<ManualClock>,
        timer: Arc<ManualTimer>,
        capture: Arc<CountingCapture>,
        registry: MomentRegistry,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new());
        let timer = Arc::new(ManualTimer::new(clock.clone()));
        let capture = Arc::new(CountingCapture::default());
        let screenshots = ScreenshotService::new(
            Arc::new(ScreenshotLimiter::new(clock.clone())),
            capture.clone(),
        );
        let registry = MomentRegistry::new(clock.clone(), timer.clone(), screenshots);
        Harness {
            clock,
            timer,
            capture,
            registry,
        }
    }

    #[test]
    fn end_reports_duration_and_removes_moment() {
        let h = harness();
        h.registry.start(
            "load_feed",
            MomentOptions::default().with_properties(PropertyBag::new().with("tab", "home")),
        );
        assert!(h.registry.contains("load_feed", None));

        h.clock.advance(Duration::from_millis(320));
        let completed = h.registry.end("load_feed", None).unwrap();

        assert_eq!(completed.name, "load_feed");
        assert_eq!(completed.identifier, "");
        assert_eq!(completed.duration, Duration::from_millis(320));
        assert_eq!(completed.properties.len(), 1);
        assert!(h.registry.is_empty());
    }

    #[test]
    fn end_without_start_is_a_no_op() {
        let h = harness();
        h.registry.start("checkout", MomentOptions::default().with_identifier("a"));

        assert_eq!(h.registry.end("never_started", None), None);
        assert_eq!(h.registry.end("checkout", None), None);
        assert_eq!(h.registry.end("checkout", Some("b")), None);
        assert_eq!(h.registry.len(), 1);

        assert!(h.registry.end("checkout", Some("a")).is_some());
        assert_eq!(h.registry.end("checkout", Some("a")), None);
    }

    #[test]
    fn empty_identifier_is_the_anonymous_key() {
        let h = harness();
        h.registry.start("sync", MomentOptions::default().with_identifier(""));
        assert!(h.registry.end("sync", None).is_some());
    }

    #[test]
    fn restart_replaces_earlier_moment() {
        let h = harness();
        h.registry.start("image", MomentOptions::default().with_identifier("42"));
        h.clock.advance(Duration::from_millis(400));
        h.registry.start(
            "image",
            MomentOptions::default()
                .with_identifier("42")
                .with_properties(PropertyBag::new().with("attempt", 2)),
        );
        h.clock.advance(Duration::from_millis(100));

        let completed = h.registry.end("image", Some("42")).unwrap();
        assert_eq!(completed.duration, Duration::from_millis(100));
        assert_eq!(completed.properties.get("attempt"), Some(&2.into()));
        assert_eq!(h.registry.len(), 0);
    }

    #[test]
    fn late_moment_requests_screenshot() {
        let h = harness();
        h.registry.start("render", MomentOptions::default());

        assert_eq!(h.timer.advance(DEFAULT_LATE_THRESHOLD - Duration::from_millis(1)), 0);
        assert_eq!(h.capture.calls(), 0);
        assert_eq!(h.timer.advance(Duration::from_millis(1)), 1);
        assert_eq!(h.capture.calls(), 1);

        // The check does not end or flag the moment.
        assert!(h.registry.end("render", None).is_some());
    }

    #[test]
    fn lateness_check_is_inert_after_end() {
        let h = harness();
        h.registry.start("render", MomentOptions::default());
        h.clock.advance(Duration::from_secs(1));
        h.registry.end("render", None);

        h.timer.advance(DEFAULT_LATE_THRESHOLD);
        assert_eq!(h.capture.calls(), 0);
    }

    #[test]
    fn lateness_check_of_replaced_moment_is_inert() {
        let h = harness();
        h.registry.start("upload", MomentOptions::default());
        h.clock.advance(Duration::from_secs(3));
        h.registry.start("upload", MomentOptions::default());

        // First start's check fires at 5s while the second start is only 2s old.
        h.timer.advance(Duration::from_secs(2));
        assert_eq!(h.capture.calls(), 0);

        h.timer.advance(Duration::from_secs(3));
        assert_eq!(h.capture.calls(), 1);
    }

    #[test]
    fn screenshot_opt_out_and_custom_threshold() {
        let h = harness();
        h.registry.start(
            "quiet",
            MomentOptions::default().with_screenshot(false),
        );
        h.registry.start(
            "fast",
            MomentOptions::default().with_late_threshold(Duration::from_millis(200)),
        );

        assert_eq!(h.timer.advance(Duration::from_millis(200)), 1);
        assert_eq!(h.capture.calls(), 1);

        h.clock.advance(Duration::from_secs(2));
        h.timer.advance(DEFAULT_LATE_THRESHOLD);
        assert_eq!(h.capture.calls(), 1);
    }

    #[test]
    fn late_screenshots_share_the_rate_limit() {
        let h = harness();
        h.registry.start("a", MomentOptions::default());
        h.registry.start("b", MomentOptions::default());

        assert_eq!(h.timer.advance(DEFAULT_LATE_THRESHOLD), 2);
        assert_eq!(h.capture.calls(), 1);
    }

    #[test]
    fn empty_name_is_ignored() {
        let h = harness();
        h.registry.start("   ", MomentOptions::default());
        assert!(h.registry.is_empty());
        assert_eq!(h.timer.pending(), 0);
    }

    #[test]
    fn concurrent_start_end_on_same_key() {
        let clock = Arc::new(SystemClock::new());
        let screenshots = ScreenshotService::new(
            Arc::new(ScreenshotLimiter::new(clock.clone())),
            Arc::new(CountingCapture::default()),
        );
        let registry = MomentRegistry::with_late_threshold(
            clock,
            Arc::new(RuntimeTimer),
            screenshots,
            Duration::from_secs(3600),
        );

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let registry = registry.clone();
                thread::spawn(move || {
                    let mut ended = 0usize;
                    for i in 0..1000 {
                        if (i + worker) % 2 == 0 {
                            registry.start("shared", MomentOptions::default());
                        } else if let Some(done) = registry.end("shared", None) {
                            assert_eq!(done.name, "shared");
                            assert!(done.duration < Duration::from_secs(60));
                            ended += 1;
                        }
                    }
                    ended
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(registry.len() <= 1);
    }

    #[test]
    fn distinct_keys_are_independent() {
        let h = harness();
        for i in 0..100 {
            h.registry
                .start("download", MomentOptions::default().with_identifier(i.to_string()));
        }
        assert_eq!(h.registry.len(), 100);
        h.clock.advance(Duration::from_millis(5));
        for i in (0..100).step_by(2) {
            assert!(h.registry.end("download", Some(&i.to_string())).is_some());
        }
        assert_eq!(h.registry.len(), 50);
        assert!(h.registry.contains("download", Some("1")));
        assert!(!h.registry.contains("download", Some("0")));
    }
}
