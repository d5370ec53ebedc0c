use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::events::{Severity, StackTrace};
use crate::identity::{SessionContext, SessionContextProvider};
use crate::moments::CompletedMoment;
use crate::properties::PropertyBag;

/// A finished moment, ready for delivery.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MomentReport {
    pub name: String,
    pub identifier: String,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub properties: PropertyBag,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub session: SessionContext,
}

/// A one-shot log event.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EventReport {
    pub name: String,
    pub severity: Severity,
    pub properties: PropertyBag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<StackTrace>,
    pub screenshot_taken: bool,
    pub timestamp: DateTime<Utc>,
    pub session: SessionContext,
}

/// A session timeline note. Never triggers a screenshot.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BreadcrumbReport {
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub session: SessionContext,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Report {
    Moment(MomentReport),
    Event(EventReport),
    Breadcrumb(BreadcrumbReport),
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Delivery collaborator. Every call is fire-and-forget: implementations must return
/// promptly and own any retry, batching or persistence themselves.
pub trait Transport: Send + Sync {
    fn report_moment(&self, report: MomentReport);

    fn report_event(&self, report: EventReport);

    fn report_breadcrumb(&self, _report: BreadcrumbReport) {}
}

/// Turns engine results into reports, tagging each with the session context current at
/// report time.
#[derive(Clone)]
pub struct Reporter {
    transport: Arc<dyn Transport>,
    identity: Arc<dyn SessionContextProvider>,
}

impl Reporter {
    pub fn new(transport: Arc<dyn Transport>, identity: Arc<dyn SessionContextProvider>) -> Self {
        Self {
            transport,
            identity,
        }
    }

    pub fn moment(&self, moment: CompletedMoment) {
        let ended_at = Utc::now();
        let started_at = chrono::Duration::from_std(moment.duration)
            .ok()
            .and_then(|elapsed| ended_at.checked_sub_signed(elapsed))
            .unwrap_or(ended_at);
        self.transport.report_moment(MomentReport {
            name: moment.name,
            identifier: moment.identifier,
            duration: moment.duration,
            properties: moment.properties,
            started_at,
            ended_at,
            session: self.identity.current_context(),
        });
    }

    pub fn event(
        &self,
        name: &str,
        severity: Severity,
        properties: PropertyBag,
        stack_trace: Option<StackTrace>,
        screenshot_taken: bool,
    ) {
        self.transport.report_event(EventReport {
            name: name.to_string(),
            severity,
            properties,
            stack_trace,
            screenshot_taken,
            timestamp: Utc::now(),
            session: self.identity.current_context(),
        });
    }

    pub fn breadcrumb(&self, message: &str) {
        self.transport.report_breadcrumb(BreadcrumbReport {
            message: message.to_string(),
            timestamp: Utc::now(),
            session: self.identity.current_context(),
        });
    }
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter").finish_non_exhaustive()
    }
}

/// Transport that keeps every report in memory, in delivery order.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    reports: Mutex<Vec<Report>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.lock().clone()
    }

    pub fn moments(&self) -> Vec<MomentReport> {
        self.lock()
            .iter()
            .filter_map(|report| match report {
                Report::Moment(moment) => Some(moment.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn events(&self) -> Vec<EventReport> {
        self.lock()
            .iter()
            .filter_map(|report| match report {
                Report::Event(event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn breadcrumbs(&self) -> Vec<BreadcrumbReport> {
        self.lock()
            .iter()
            .filter_map(|report| match report {
                Report::Breadcrumb(breadcrumb) => Some(breadcrumb.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Report>> {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for RecordingTransport {
    fn report_moment(&self, report: MomentReport) {
        self.lock().push(Report::Moment(report));
    }

    fn report_event(&self, report: EventReport) {
        self.lock().push(Report::Event(report));
    }

    fn report_breadcrumb(&self, report: BreadcrumbReport) {
        self.lock().push(Report::Breadcrumb(report));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::UserIdentity;
    use serde_json::json;

    fn reporter() -> (Reporter, Arc<RecordingTransport>, Arc<UserIdentity>) {
        let transport = Arc::new(RecordingTransport::new());
        let identity = Arc::new(UserIdentity::with_session_id("session-a"));
        (
            Reporter::new(transport.clone(), identity.clone()),
            transport,
            identity,
        )
    }

    #[test]
    fn moment_report_carries_duration_and_context() {
        let (reporter, transport, identity) = reporter();
        identity.set_user_identifier("uid-1");

        reporter.moment(CompletedMoment {
            name: "load_feed".into(),
            identifier: String::new(),
            duration: Duration::from_millis(1500),
            properties: PropertyBag::new().with("tab", "home"),
        });

        let moments = transport.moments();
        assert_eq!(moments.len(), 1);
        let report = &moments[0];
        assert_eq!(report.duration, Duration::from_millis(1500));
        assert_eq!(report.ended_at - report.started_at, chrono::Duration::milliseconds(1500));
        assert_eq!(report.session.user_id.as_deref(), Some("uid-1"));
    }

    #[test]
    fn context_is_read_at_report_time() {
        let (reporter, transport, identity) = reporter();
        reporter.breadcrumb("opened cart");
        identity.set_username("ada");
        reporter.event("tap", Severity::Info, PropertyBag::new(), None, false);

        assert_eq!(transport.breadcrumbs()[0].session.username, None);
        assert_eq!(transport.events()[0].session.username.as_deref(), Some("ada"));
        assert_eq!(transport.reports().len(), 2);
    }

    #[test]
    fn reports_serialize_with_type_tag() {
        let report = Report::Moment(MomentReport {
            name: "boot".into(),
            identifier: "cold".into(),
            duration: Duration::from_millis(42),
            properties: PropertyBag::new(),
            started_at: DateTime::<Utc>::UNIX_EPOCH,
            ended_at: DateTime::<Utc>::UNIX_EPOCH,
            session: SessionContext::default(),
        });
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["type"], json!("moment"));
        assert_eq!(value["duration_ms"], json!(42));
        assert_eq!(value["identifier"], json!("cold"));
    }
}
