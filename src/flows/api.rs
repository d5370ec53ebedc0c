use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::events::{EventLogger, LogOptions, Severity};
use crate::flows::constants::MAX_FINISHED_FLOWS;
use crate::flows::kind::{
    FlowDetails, FlowKind, PurchaseDetails, RegistrationDetails, SubscriptionPurchaseDetails,
};
use crate::logger::sdk_debug;
use crate::moments::{MomentOptions, MomentRegistry};
use crate::properties::{PropertyBag, PropertyValue};
use crate::transport::Reporter;

/// Opaque handle to one flow instance, returned by [`FlowEngine::start`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FlowToken(String);

impl FlowToken {
    fn generate() -> Self {
        use rand::distributions::Alphanumeric;
        use rand::Rng;

        FlowToken(
            rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .map(char::from)
                .take(24)
                .collect(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlowToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `Idle -> Started -> {Completed, Failed}`. The last two are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowState {
    Idle,
    Started,
    Completed,
    Failed,
}

struct FlowInstance {
    kind: FlowKind,
    state: FlowState,
    properties: PropertyBag,
    sequence: u64,
}

#[derive(Default)]
struct FlowTable {
    instances: HashMap<FlowToken, FlowInstance>,
    finished: VecDeque<FlowToken>,
    next_sequence: u64,
}

impl FlowTable {
    /// Moves a started flow to its terminal state; any other state is rejected.
    fn finish(&mut self, token: &FlowToken, outcome: FlowState) -> Option<(FlowKind, PropertyBag)> {
        let instance = self.instances.get_mut(token)?;
        if instance.state != FlowState::Started {
            return None;
        }
        instance.state = outcome;
        let finished = (instance.kind, instance.properties.clone());

        self.finished.push_back(token.clone());
        while self.finished.len() > MAX_FINISHED_FLOWS {
            if let Some(evicted) = self.finished.pop_front() {
                self.instances.remove(&evicted);
            }
        }
        Some(finished)
    }

    fn latest_started(&self, kind: FlowKind) -> Option<FlowToken> {
        self.instances
            .iter()
            .filter(|(_, instance)| instance.kind == kind && instance.state == FlowState::Started)
            .max_by_key(|(_, instance)| instance.sequence)
            .map(|(token, _)| token.clone())
    }
}

/// Start/complete/fail lifecycle for business flows, built from one moment per flow plus
/// a terminal log event.
///
/// Each `start` mints a fresh token that doubles as the moment identifier, so concurrent
/// flows of the same kind never collide. The state transition is decided under the
/// table lock, so of two racing `complete`/`fail` calls on one token exactly one wins.
#[derive(Clone)]
pub struct FlowEngine {
    inner: Arc<FlowEngineInner>,
}

struct FlowEngineInner {
    registry: MomentRegistry,
    events: EventLogger,
    reporter: Reporter,
    table: Mutex<FlowTable>,
}

impl FlowEngine {
    pub fn new(registry: MomentRegistry, events: EventLogger, reporter: Reporter) -> Self {
        Self {
            inner: Arc::new(FlowEngineInner {
                registry,
                events,
                reporter,
                table: Mutex::new(FlowTable::default()),
            }),
        }
    }

    /// Starts a flow. Implicit domain properties are kept ahead of `properties` under the
    /// shared property cap.
    pub fn start(&self, details: impl Into<FlowDetails>, properties: PropertyBag) -> FlowToken {
        let details = details.into();
        let kind = details.kind();
        let merged = PropertyBag::merged(details.implicit_properties(), properties);
        let token = FlowToken::generate();

        // The moment goes in before the flow is visible as Started, so any flow a
        // terminal call can observe already has a moment to end.
        self.inner.registry.start(
            kind.moment_name(),
            MomentOptions::default()
                .with_identifier(token.as_str())
                .with_properties(merged.clone()),
        );

        let mut table = self.table();
        if table.latest_started(kind).is_some() {
            sdk_debug!("starting a {kind} flow while another one is in progress");
        }
        let sequence = table.next_sequence;
        table.next_sequence += 1;
        table.instances.insert(
            token.clone(),
            FlowInstance {
                kind,
                state: FlowState::Started,
                properties: merged,
                sequence,
            },
        );
        token
    }

    pub fn start_purchase(&self, details: PurchaseDetails, properties: PropertyBag) -> FlowToken {
        self.start(details, properties)
    }

    pub fn start_subscription_purchase(
        &self,
        details: SubscriptionPurchaseDetails,
        properties: PropertyBag,
    ) -> FlowToken {
        self.start(details, properties)
    }

    pub fn start_registration(
        &self,
        details: RegistrationDetails,
        properties: PropertyBag,
    ) -> FlowToken {
        self.start(details, properties)
    }

    /// Ends a started flow successfully. Returns `false`, with no side effects, if the
    /// token is unknown or the flow is not in `Started`.
    pub fn complete(&self, token: &FlowToken) -> bool {
        let Some((kind, properties)) = self.table().finish(token, FlowState::Completed) else {
            sdk_debug!("cannot complete flow {token}: not in progress");
            return false;
        };
        self.end_moment(kind, token);
        self.inner.events.log(
            &kind.completed_event_name(),
            Severity::Info,
            LogOptions::default().with_properties(properties),
        );
        true
    }

    /// Ends a started flow as failed, attaching `message` ahead of the flow's properties.
    /// Same rejection rules as [`FlowEngine::complete`].
    pub fn fail(&self, token: &FlowToken, message: Option<&str>) -> bool {
        let Some((kind, properties)) = self.table().finish(token, FlowState::Failed) else {
            sdk_debug!("cannot fail flow {token}: not in progress");
            return false;
        };
        self.end_moment(kind, token);
        let implicit = message.map(|message| ("message", PropertyValue::from(message)));
        self.inner.events.log(
            &kind.failed_event_name(),
            Severity::Error,
            LogOptions::default().with_properties(PropertyBag::merged(implicit, properties)),
        );
        true
    }

    /// Completes the most recently started in-progress flow of `kind`, for callers that
    /// keep a single flow per kind and discard tokens.
    pub fn complete_latest(&self, kind: FlowKind) -> bool {
        match self.latest_started(kind) {
            Some(token) => self.complete(&token),
            None => {
                sdk_debug!("no {kind} flow in progress to complete");
                false
            }
        }
    }

    pub fn fail_latest(&self, kind: FlowKind, message: Option<&str>) -> bool {
        match self.latest_started(kind) {
            Some(token) => self.fail(&token, message),
            None => {
                sdk_debug!("no {kind} flow in progress to fail");
                false
            }
        }
    }

    /// Current state of a flow. Unknown tokens, and finished flows old enough to have
    /// been forgotten, read as `Idle`.
    pub fn state(&self, token: &FlowToken) -> FlowState {
        self.table()
            .instances
            .get(token)
            .map_or(FlowState::Idle, |instance| instance.state)
    }

    fn latest_started(&self, kind: FlowKind) -> Option<FlowToken> {
        self.table().latest_started(kind)
    }

    fn end_moment(&self, kind: FlowKind, token: &FlowToken) {
        if let Some(completed) = self
            .inner
            .registry
            .end(kind.moment_name(), Some(token.as_str()))
        {
            self.inner.reporter.moment(completed);
        }
    }

    fn table(&self) -> MutexGuard<'_, FlowTable> {
        self.inner
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for FlowEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table();
        let in_progress = table
            .instances
            .values()
            .filter(|instance| instance.state == FlowState::Started)
            .count();
        f.debug_struct("FlowEngine")
            .field("in_progress", &in_progress)
            .field("finished", &table.finished.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::UserIdentity;
    use crate::platform::{DeferredTimer, ManualClock, ManualTimer, MonotonicClock};
    use crate::screenshot::{DisabledCapture, ScreenshotLimiter, ScreenshotService};
    use crate::transport::RecordingTransport;
    use std::thread;
    use std::time::Duration;

    struct Harness {
        clock: Arc<ManualClock>,
        registry: MomentRegistry,
        transport: Arc<RecordingTransport>,
        flows: FlowEngine,
    }

    fn engine(
        clock: Arc<dyn MonotonicClock>,
        timer: Arc<dyn DeferredTimer>,
    ) -> (MomentRegistry, Arc<RecordingTransport>, FlowEngine) {
        let screenshots = ScreenshotService::new(
            Arc::new(ScreenshotLimiter::new(clock.clone())),
            Arc::new(DisabledCapture),
        );
        let transport = Arc::new(RecordingTransport::new());
        let reporter = Reporter::new(transport.clone(), Arc::new(UserIdentity::new()));
        let registry = MomentRegistry::new(clock, timer, screenshots.clone());
        let events = EventLogger::new(screenshots, reporter.clone());
        let flows = FlowEngine::new(registry.clone(), events, reporter);
        (registry, transport, flows)
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new());
        let timer = Arc::new(ManualTimer::new(clock.clone()));
        let (registry, transport, flows) = engine(clock.clone(), timer);
        Harness {
            clock,
            registry,
            transport,
            flows,
        }
    }

    type Hook = Box<dyn FnOnce() + Send>;

    /// Manual clock that runs a one-shot hook on the next read.
    struct HookClock {
        inner: ManualClock,
        hook: Mutex<Option<Hook>>,
    }

    impl HookClock {
        fn new() -> Self {
            Self {
                inner: ManualClock::new(),
                hook: Mutex::new(None),
            }
        }

        fn on_next_read(&self, hook: Hook) {
            *self.hook.lock().unwrap() = Some(hook);
        }
    }

    impl MonotonicClock for HookClock {
        fn now(&self) -> Duration {
            let hook = self.hook.lock().unwrap().take();
            if let Some(hook) = hook {
                hook();
            }
            self.inner.now()
        }
    }

    fn purchase() -> PurchaseDetails {
        PurchaseDetails {
            order_id: Some("order-9".into()),
            amount: Some(42.0),
            ..Default::default()
        }
    }

    #[test]
    fn complete_ends_moment_and_logs_info() {
        let h = harness();
        let token = h.flows.start_purchase(purchase(), PropertyBag::new().with("coupon", "SPRING"));
        assert_eq!(h.flows.state(&token), FlowState::Started);
        assert!(h.registry.contains("_purchase", Some(token.as_str())));

        h.clock.advance(Duration::from_millis(750));
        assert!(h.flows.complete(&token));
        assert_eq!(h.flows.state(&token), FlowState::Completed);
        assert!(h.registry.is_empty());

        let moments = h.transport.moments();
        assert_eq!(moments.len(), 1);
        assert_eq!(moments[0].name, "_purchase");
        assert_eq!(moments[0].identifier, token.as_str());
        assert_eq!(moments[0].duration, Duration::from_millis(750));
        let keys: Vec<&str> = moments[0].properties.keys().collect();
        assert_eq!(keys, vec!["order_id", "amount", "coupon"]);

        let events = h.transport.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "purchase completed");
        assert_eq!(events[0].severity, Severity::Info);
    }

    #[test]
    fn fail_logs_error_with_message() {
        let h = harness();
        let token = h.flows.start_subscription_purchase(
            SubscriptionPurchaseDetails {
                subscription_type: Some("annual".into()),
                ..Default::default()
            },
            PropertyBag::new(),
        );

        assert!(h.flows.fail(&token, Some("card declined")));
        assert_eq!(h.flows.state(&token), FlowState::Failed);

        let event = &h.transport.events()[0];
        assert_eq!(event.name, "subscription purchase failed");
        assert_eq!(event.severity, Severity::Error);
        assert_eq!(event.properties.get("message"), Some(&PropertyValue::from("card declined")));
        assert_eq!(event.properties.get("subscription_type"), Some(&PropertyValue::from("annual")));
        assert_eq!(h.transport.moments().len(), 1);
    }

    #[test]
    fn complete_before_start_is_rejected_without_reports() {
        let h = harness();
        let stray = FlowToken("never-started".into());
        assert!(!h.flows.complete(&stray));
        assert!(!h.flows.fail(&stray, None));
        assert_eq!(h.flows.state(&stray), FlowState::Idle);
        assert!(h.transport.reports().is_empty());
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let h = harness();
        let completed = h.flows.start_registration(RegistrationDetails::default(), PropertyBag::new());
        assert!(h.flows.complete(&completed));
        assert!(!h.flows.complete(&completed));
        assert!(!h.flows.fail(&completed, Some("late")));

        let failed = h.flows.start_registration(RegistrationDetails::default(), PropertyBag::new());
        assert!(h.flows.fail(&failed, None));
        assert!(!h.flows.complete(&failed));

        assert_eq!(h.transport.moments().len(), 2);
        assert_eq!(h.transport.events().len(), 2);
    }

    #[test]
    fn concurrent_flows_of_same_kind_are_independent() {
        let h = harness();
        let first = h.flows.start_purchase(purchase(), PropertyBag::new());
        let second = h.flows.start_purchase(purchase(), PropertyBag::new());
        assert_ne!(first, second);
        assert_eq!(h.registry.len(), 2);

        assert!(h.flows.fail(&second, None));
        assert_eq!(h.flows.state(&first), FlowState::Started);
        assert!(h.flows.complete(&first));
    }

    #[test]
    fn latest_helpers_target_most_recent_flow() {
        let h = harness();
        let older = h.flows.start_purchase(purchase(), PropertyBag::new());
        let newer = h.flows.start_purchase(purchase(), PropertyBag::new());

        assert!(h.flows.complete_latest(FlowKind::Purchase));
        assert_eq!(h.flows.state(&newer), FlowState::Completed);
        assert!(h.flows.fail_latest(FlowKind::Purchase, None));
        assert_eq!(h.flows.state(&older), FlowState::Failed);
        assert!(!h.flows.complete_latest(FlowKind::Purchase));
        assert!(!h.flows.fail_latest(FlowKind::Registration, None));
    }

    #[test]
    fn finished_flows_are_forgotten_past_retention() {
        let h = harness();
        let first = h.flows.start_registration(RegistrationDetails::default(), PropertyBag::new());
        assert!(h.flows.complete(&first));
        for _ in 0..MAX_FINISHED_FLOWS {
            let token = h.flows.start_registration(RegistrationDetails::default(), PropertyBag::new());
            h.flows.complete(&token);
        }
        assert_eq!(h.flows.state(&first), FlowState::Idle);
        assert!(!h.flows.complete(&first));
    }

    #[test]
    fn racing_completions_have_a_single_winner() {
        let h = harness();
        let token = h.flows.start_purchase(purchase(), PropertyBag::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let flows = h.flows.clone();
                let token = token.clone();
                thread::spawn(move || {
                    if i % 2 == 0 {
                        flows.complete(&token)
                    } else {
                        flows.fail(&token, Some("raced"))
                    }
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(h.transport.moments().len(), 1);
        assert_eq!(h.transport.events().len(), 1);
    }

    #[test]
    fn latest_helpers_never_observe_a_flow_before_its_moment() {
        let clock = Arc::new(HookClock::new());
        let timer = Arc::new(ManualTimer::new(Arc::new(ManualClock::new())));
        let (registry, transport, flows) = engine(clock.clone(), timer);

        // the registry reads the clock while recording the moment's start
        let observed = Arc::new(Mutex::new(None));
        {
            let flows = flows.clone();
            let observed = observed.clone();
            clock.on_next_read(Box::new(move || {
                *observed.lock().unwrap() = Some(flows.complete_latest(FlowKind::Purchase));
            }));
        }
        let token = flows.start_purchase(purchase(), PropertyBag::new());

        assert_eq!(*observed.lock().unwrap(), Some(false));
        assert_eq!(flows.state(&token), FlowState::Started);
        assert!(registry.contains("_purchase", Some(token.as_str())));
        assert!(transport.reports().is_empty());

        assert!(flows.complete_latest(FlowKind::Purchase));
        assert!(registry.is_empty());
        assert_eq!(transport.moments().len(), 1);
        assert_eq!(transport.events().len(), 1);
    }

    #[test]
    fn concurrent_starts_and_latest_completions_stay_paired() {
        let h = harness();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let flows = h.flows.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        flows.start_purchase(purchase(), PropertyBag::new());
                        flows.fail_latest(FlowKind::Purchase, None);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        while h.flows.fail_latest(FlowKind::Purchase, None) {}

        assert!(h.registry.is_empty());
        assert_eq!(h.transport.moments().len(), 800);
        assert_eq!(h.transport.events().len(), 800);
    }
}
