use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::properties::{PropertyBag, PropertyValue};
use crate::screenshot::{CaptureReason, ScreenshotService};
use crate::transport::Reporter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }

    /// Only warnings and errors may carry a screenshot.
    pub fn allows_screenshot(self) -> bool {
        matches!(self, Severity::Warning | Severity::Error)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Call stack captured when an error event is logged.
///
/// Only the raw frames are recorded at capture time. Symbols are resolved when the trace
/// is first rendered, which happens on the transport side during serialization.
#[derive(Clone)]
pub struct StackTrace(Arc<Backtrace>);

impl StackTrace {
    pub fn capture() -> Self {
        StackTrace(Arc::new(Backtrace::force_capture()))
    }

    pub fn status(&self) -> BacktraceStatus {
        self.0.status()
    }
}

impl PartialEq for StackTrace {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StackTrace").field(&self.status()).finish()
    }
}

impl Serialize for StackTrace {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Optional parameters of [`EventLogger::log`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LogOptions {
    pub properties: PropertyBag,
    /// Ask for a screenshot. Honoured for warnings and errors only, and subject to the
    /// shared rate limit. Defaults to `false`.
    pub take_screenshot: bool,
}

impl LogOptions {
    pub fn with_properties(mut self, properties: PropertyBag) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_screenshot(mut self, take: bool) -> Self {
        self.take_screenshot = take;
        self
    }
}

/// Emits one-shot, severity-tagged events. Holds no state of its own.
#[derive(Clone, Debug)]
pub struct EventLogger {
    screenshots: ScreenshotService,
    reporter: Reporter,
    capture_stack_traces: bool,
}

impl EventLogger {
    pub fn new(screenshots: ScreenshotService, reporter: Reporter) -> Self {
        Self {
            screenshots,
            reporter,
            capture_stack_traces: true,
        }
    }

    pub fn with_stack_traces(mut self, capture: bool) -> Self {
        self.capture_stack_traces = capture;
        self
    }

    pub fn log(&self, name: &str, severity: Severity, options: LogOptions) {
        let screenshot_taken = options.take_screenshot
            && severity.allows_screenshot()
            && self.screenshots.request(CaptureReason::LogEvent { name });
        let stack_trace = self.stack_trace(severity);
        self.reporter
            .event(name, severity, options.properties, stack_trace, screenshot_taken);
    }

    pub fn info(&self, name: &str, properties: PropertyBag) {
        self.log(name, Severity::Info, LogOptions::default().with_properties(properties));
    }

    pub fn error(&self, name: &str, properties: PropertyBag) {
        self.log(name, Severity::Error, LogOptions::default().with_properties(properties));
    }

    /// Logs a handled error as an error event named after its display text. The
    /// description and, when present, the underlying source are added ahead of the
    /// caller's properties.
    pub fn log_handled_error(&self, error: &(dyn Error + 'static), options: LogOptions) {
        let description = error.to_string();
        let mut implicit = vec![(
            "error_description".to_string(),
            PropertyValue::from(description.as_str()),
        )];
        if let Some(source) = error.source() {
            implicit.push(("error_source".to_string(), source.to_string().into()));
        }
        let properties = PropertyBag::merged(implicit, options.properties);
        self.log(
            &description,
            Severity::Error,
            LogOptions {
                properties,
                take_screenshot: options.take_screenshot,
            },
        );
    }

    /// Records a session timeline note.
    pub fn breadcrumb(&self, message: &str) {
        if message.trim().is_empty() {
            return;
        }
        self.reporter.breadcrumb(message);
    }

    fn stack_trace(&self, severity: Severity) -> Option<StackTrace> {
        (self.capture_stack_traces && severity == Severity::Error).then(StackTrace::capture)
    }
}
