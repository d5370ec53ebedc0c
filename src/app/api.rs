use std::error::Error;
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use crate::app::error::{invalid_argument, SdkError, SdkResult};
use crate::app::settings::{SdkOptions, SdkSettings};
use crate::events::{EventLogger, LogOptions, Severity};
use crate::flows::{
    FlowEngine, FlowKind, FlowToken, PurchaseDetails, RegistrationDetails,
    SubscriptionPurchaseDetails,
};
use crate::identity::UserIdentity;
use crate::logger::{self, sdk_debug};
use crate::moments::{MomentOptions, MomentRegistry, STARTUP_MOMENT_NAME};
use crate::platform::{DeferredTimer, MonotonicClock, RuntimeTimer, SystemClock};
use crate::properties::PropertyBag;
use crate::screenshot::{DisabledCapture, ScreenshotCapture, ScreenshotLimiter, ScreenshotService};
use crate::transport::{LogUploader, QueuedTransport, Reporter, Transport};

pub static SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

static SHARED_SDK: LazyLock<Mutex<Option<Sdk>>> = LazyLock::new(|| Mutex::new(None));

/// Builds an SDK instance and registers it as the process-wide shared instance.
///
/// Fails with `sdk/invalid-argument` for a blank API key and with
/// `sdk/already-initialized` when a shared instance already exists. Use [`Sdk::new`]
/// for an instance that is not shared.
pub fn initialize_sdk(options: SdkOptions, settings: Option<SdkSettings>) -> SdkResult<Sdk> {
    let mut shared = SHARED_SDK.lock().unwrap_or_else(PoisonError::into_inner);
    if shared.is_some() {
        return Err(SdkError::AlreadyInitialized);
    }
    let sdk = Sdk::new(options, settings)?;
    *shared = Some(sdk.clone());
    Ok(sdk)
}

/// The instance registered by [`initialize_sdk`], if any.
pub fn shared_sdk() -> Option<Sdk> {
    SHARED_SDK
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

#[cfg(test)]
pub(crate) fn clear_shared_sdk_for_tests() {
    *SHARED_SDK.lock().unwrap_or_else(PoisonError::into_inner) = None;
}

/// Entry point for hosts: moments, log events, flows and user identity behind one handle.
///
/// Every operation is safe to call unconditionally. When the SDK is disabled through
/// [`SdkSettings::enabled`] they all return immediately, flow starts yield `None` and flow
/// terminations yield `false`.
#[derive(Clone)]
pub struct Sdk {
    inner: Arc<SdkInner>,
}

struct SdkInner {
    settings: SdkSettings,
    identity: Arc<UserIdentity>,
    registry: MomentRegistry,
    events: EventLogger,
    flows: FlowEngine,
    reporter: Reporter,
}

impl Sdk {
    /// Builds a standalone instance. Environment overrides are applied on top of
    /// `settings` (or the defaults).
    pub fn new(options: SdkOptions, settings: Option<SdkSettings>) -> SdkResult<Self> {
        if options.api_key.trim().is_empty() {
            return Err(invalid_argument("API key must not be empty"));
        }
        let settings = settings.unwrap_or_default().apply_env_overrides();
        if settings.debug_logging {
            logger::set_debugging_enabled(true);
        }

        let clock: Arc<dyn MonotonicClock> =
            options.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let timer: Arc<dyn DeferredTimer> = options.timer.unwrap_or_else(|| Arc::new(RuntimeTimer));
        let transport: Arc<dyn Transport> = match options.transport {
            Some(transport) => transport,
            None => QueuedTransport::new(Arc::new(LogUploader), options.transport_options),
        };
        let capture: Arc<dyn ScreenshotCapture> = options
            .screenshot_capture
            .unwrap_or_else(|| Arc::new(DisabledCapture));

        let mut screenshots =
            ScreenshotService::new(Arc::new(ScreenshotLimiter::new(clock.clone())), capture);
        if !settings.screenshots_enabled {
            screenshots = screenshots.disabled();
        }

        let identity = Arc::new(UserIdentity::new());
        let reporter = Reporter::new(transport, identity.clone());
        let registry = MomentRegistry::with_late_threshold(
            clock,
            timer,
            screenshots.clone(),
            settings.late_threshold(),
        );
        let events = EventLogger::new(screenshots, reporter.clone())
            .with_stack_traces(settings.capture_stack_traces);
        let flows = FlowEngine::new(registry.clone(), events.clone(), reporter.clone());

        let sdk = Self {
            inner: Arc::new(SdkInner {
                settings,
                identity,
                registry,
                events,
                flows,
                reporter,
            }),
        };
        if sdk.is_enabled() && sdk.inner.settings.track_app_startup {
            sdk.inner
                .registry
                .start(STARTUP_MOMENT_NAME, MomentOptions::default());
        }
        sdk_debug!(
            "moments SDK {SDK_VERSION} initialized (session {})",
            sdk.inner.identity.session_id()
        );
        Ok(sdk)
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.settings.enabled
    }

    pub fn settings(&self) -> &SdkSettings {
        &self.inner.settings
    }

    pub fn session_id(&self) -> &str {
        self.inner.identity.session_id()
    }

    pub fn registry(&self) -> &MomentRegistry {
        &self.inner.registry
    }

    pub fn flows(&self) -> &FlowEngine {
        &self.inner.flows
    }

    pub fn events(&self) -> &EventLogger {
        &self.inner.events
    }

    pub fn start_moment(&self, name: &str, options: MomentOptions) {
        if self.is_enabled() {
            self.inner.registry.start(name, options);
        }
    }

    /// Ends a moment and reports it. Unknown moments are ignored.
    pub fn end_moment(&self, name: &str, identifier: Option<&str>) {
        if !self.is_enabled() {
            return;
        }
        if let Some(completed) = self.inner.registry.end(name, identifier) {
            self.inner.reporter.moment(completed);
        }
    }

    /// Ends the `_startup` moment started during initialization.
    pub fn end_app_startup(&self) {
        self.end_moment(STARTUP_MOMENT_NAME, None);
    }

    pub fn log_message(&self, name: &str, severity: Severity, options: LogOptions) {
        if self.is_enabled() {
            self.inner.events.log(name, severity, options);
        }
    }

    pub fn log_breadcrumb(&self, message: &str) {
        if self.is_enabled() {
            self.inner.events.breadcrumb(message);
        }
    }

    pub fn log_handled_error(&self, error: &(dyn Error + 'static), options: LogOptions) {
        if self.is_enabled() {
            self.inner.events.log_handled_error(error, options);
        }
    }

    pub fn start_purchase(
        &self,
        details: PurchaseDetails,
        properties: PropertyBag,
    ) -> Option<FlowToken> {
        self.is_enabled()
            .then(|| self.inner.flows.start_purchase(details, properties))
    }

    pub fn start_subscription_purchase(
        &self,
        details: SubscriptionPurchaseDetails,
        properties: PropertyBag,
    ) -> Option<FlowToken> {
        self.is_enabled()
            .then(|| self.inner.flows.start_subscription_purchase(details, properties))
    }

    pub fn start_registration(
        &self,
        details: RegistrationDetails,
        properties: PropertyBag,
    ) -> Option<FlowToken> {
        self.is_enabled()
            .then(|| self.inner.flows.start_registration(details, properties))
    }

    pub fn complete_flow(&self, token: &FlowToken) -> bool {
        self.is_enabled() && self.inner.flows.complete(token)
    }

    pub fn fail_flow(&self, token: &FlowToken, message: Option<&str>) -> bool {
        self.is_enabled() && self.inner.flows.fail(token, message)
    }

    pub fn complete_latest(&self, kind: FlowKind) -> bool {
        self.is_enabled() && self.inner.flows.complete_latest(kind)
    }

    pub fn fail_latest(&self, kind: FlowKind, message: Option<&str>) -> bool {
        self.is_enabled() && self.inner.flows.fail_latest(kind, message)
    }

    pub fn set_user_identifier(&self, user_id: impl Into<String>) {
        if self.is_enabled() {
            self.inner.identity.set_user_identifier(user_id);
        }
    }

    pub fn clear_user_identifier(&self) {
        if self.is_enabled() {
            self.inner.identity.clear_user_identifier();
        }
    }

    pub fn set_username(&self, username: impl Into<String>) {
        if self.is_enabled() {
            self.inner.identity.set_username(username);
        }
    }

    pub fn clear_username(&self) {
        if self.is_enabled() {
            self.inner.identity.clear_username();
        }
    }

    pub fn set_user_email(&self, email: impl Into<String>) {
        if self.is_enabled() {
            self.inner.identity.set_user_email(email);
        }
    }

    pub fn clear_user_email(&self) {
        if self.is_enabled() {
            self.inner.identity.clear_user_email();
        }
    }

    pub fn set_user_as_payer(&self) {
        if self.is_enabled() {
            self.inner.identity.set_user_as_payer();
        }
    }

    pub fn clear_user_as_payer(&self) {
        if self.is_enabled() {
            self.inner.identity.clear_user_as_payer();
        }
    }

    pub fn set_user_persona(&self, persona: impl Into<String>) {
        if self.is_enabled() {
            self.inner.identity.set_user_persona(persona);
        }
    }

    pub fn clear_user_persona(&self, persona: &str) {
        if self.is_enabled() {
            self.inner.identity.clear_user_persona(persona);
        }
    }

    /// Switches SDK diagnostics between debug and warning level, process-wide.
    pub fn set_debugging_enabled(&self, enabled: bool) {
        logger::set_debugging_enabled(enabled);
    }
}

impl fmt::Debug for Sdk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sdk")
            .field("session_id", &self.session_id())
            .field("settings", &self.inner.settings)
            .field("registry", &self.inner.registry)
            .field("flows", &self.inner.flows)
            .finish()
    }
}
