//! Host-facing configuration of an [`Sdk`](crate::app::Sdk) instance.

use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::error::{internal_error, invalid_argument, SdkResult};
use crate::moments::DEFAULT_LATE_THRESHOLD;
use crate::platform::{DeferredTimer, MonotonicClock};
use crate::screenshot::ScreenshotCapture;
use crate::transport::{Transport, TransportOptions};

const ENV_DISABLED: &str = "MOMENTS_SDK_DISABLED";
const ENV_LATE_THRESHOLD_MS: &str = "MOMENTS_SDK_LATE_THRESHOLD_MS";

/// Behaviour switches. Every field has a default, so a partial JSON document is valid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkSettings {
    /// When off, every SDK operation is a no-op.
    pub enabled: bool,
    pub late_threshold_ms: u64,
    pub screenshots_enabled: bool,
    pub capture_stack_traces: bool,
    /// Start the `_startup` moment during initialization.
    pub track_app_startup: bool,
    pub debug_logging: bool,
}

impl Default for SdkSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            late_threshold_ms: DEFAULT_LATE_THRESHOLD.as_millis() as u64,
            screenshots_enabled: true,
            capture_stack_traces: true,
            track_app_startup: true,
            debug_logging: false,
        }
    }
}

impl SdkSettings {
    pub fn from_json(raw: &str) -> SdkResult<Self> {
        serde_json::from_str(raw)
            .map_err(|err| invalid_argument(format!("Invalid SDK settings: {err}")))
    }

    pub fn from_path(path: impl AsRef<Path>) -> SdkResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            invalid_argument(format!("Cannot read SDK settings at {}: {err}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn to_json(&self) -> SdkResult<String> {
        serde_json::to_string(self)
            .map_err(|err| internal_error(format!("Failed to serialize SDK settings: {err}")))
    }

    /// Applies `MOMENTS_SDK_DISABLED` and `MOMENTS_SDK_LATE_THRESHOLD_MS`.
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|name| env::var(name).ok())
    }

    /// Same as [`SdkSettings::apply_env_overrides`] with a custom variable lookup.
    /// Unparseable values are ignored.
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(ENV_DISABLED) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.enabled = false,
                "0" | "false" | "no" => self.enabled = true,
                _ => {}
            }
        }
        if let Some(ms) = lookup(ENV_LATE_THRESHOLD_MS).and_then(|raw| raw.trim().parse().ok()) {
            self.late_threshold_ms = ms;
        }
        self
    }

    pub fn late_threshold(&self) -> Duration {
        Duration::from_millis(self.late_threshold_ms)
    }
}

/// Identity of the host application plus optional collaborators. Anything left unset
/// gets its production default at initialization.
#[derive(Clone, Default)]
pub struct SdkOptions {
    pub api_key: String,
    pub transport: Option<Arc<dyn Transport>>,
    pub transport_options: TransportOptions,
    pub screenshot_capture: Option<Arc<dyn ScreenshotCapture>>,
    pub clock: Option<Arc<dyn MonotonicClock>>,
    pub timer: Option<Arc<dyn DeferredTimer>>,
}

impl SdkOptions {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Options for the default queued transport; ignored when a transport is supplied.
    pub fn with_transport_options(mut self, options: TransportOptions) -> Self {
        self.transport_options = options;
        self
    }

    pub fn with_screenshot_capture(mut self, capture: Arc<dyn ScreenshotCapture>) -> Self {
        self.screenshot_capture = Some(capture);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn MonotonicClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_timer(mut self, timer: Arc<dyn DeferredTimer>) -> Self {
        self.timer = Some(timer);
        self
    }
}

impl fmt::Debug for SdkOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkOptions")
            .field("api_key", &"<redacted>")
            .field("custom_transport", &self.transport.is_some())
            .field("transport_options", &self.transport_options)
            .field("screenshot_capture", &self.screenshot_capture.is_some())
            .field("custom_clock", &self.clock.is_some())
            .field("custom_timer", &self.timer.is_some())
            .finish()
    }
}
