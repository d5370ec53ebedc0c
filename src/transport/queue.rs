use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_channel::{Receiver, Sender, TrySendError};
use async_lock::Mutex;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::SDK_VERSION;
use crate::logger::{sdk_debug, sdk_warn};
use crate::platform::runtime;
use crate::transport::api::{BreadcrumbReport, EventReport, MomentReport, Report, Transport};
use crate::transport::backoff;
use crate::transport::error::{queue_full, serialization_error, TransportResult};

const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_BATCH_SIZE: usize = 25;
const DEFAULT_QUEUE_CAPACITY: usize = 1_000;

#[derive(Clone, Debug)]
pub struct TransportOptions {
    pub flush_interval: Option<Duration>,
    pub max_batch_size: Option<usize>,
    pub queue_capacity: Option<usize>,
    /// Flush on a background task. When off, the host drives [`QueuedTransport::flush_once`].
    pub background: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            flush_interval: None,
            max_batch_size: None,
            queue_capacity: None,
            background: true,
        }
    }
}

/// One upload unit.
#[derive(Clone, Debug, Serialize)]
pub struct ReportBatch {
    pub sent_at: DateTime<Utc>,
    pub sdk_version: String,
    pub reports: Vec<Report>,
}

impl ReportBatch {
    pub fn new(reports: Vec<Report>) -> Self {
        Self {
            sent_at: Utc::now(),
            sdk_version: SDK_VERSION.to_string(),
            reports,
        }
    }
}

/// Sends a batch somewhere. Failing batches are requeued by [`QueuedTransport`].
#[async_trait]
pub trait ReportUploader: Send + Sync {
    async fn upload(&self, batch: &ReportBatch) -> TransportResult<()>;
}

/// Uploader that writes each batch as a JSON line to the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogUploader;

#[async_trait]
impl ReportUploader for LogUploader {
    async fn upload(&self, batch: &ReportBatch) -> TransportResult<()> {
        let payload =
            serde_json::to_string(batch).map_err(|err| serialization_error(err.to_string()))?;
        log::info!(target: "moments_sdk::upload", "{payload}");
        Ok(())
    }
}

/// Transport that buffers reports in a bounded queue and uploads them in batches.
///
/// Enqueueing never blocks: when the queue is full the report is dropped.
pub struct QueuedTransport {
    sender: Sender<Report>,
    receiver: Receiver<Report>,
    uploader: Arc<dyn ReportUploader>,
    options: TransportOptions,
    flush_lock: Mutex<()>,
    consecutive_failures: AtomicU32,
}

impl QueuedTransport {
    pub fn new(uploader: Arc<dyn ReportUploader>, options: TransportOptions) -> Arc<Self> {
        let capacity = options
            .queue_capacity
            .unwrap_or(DEFAULT_QUEUE_CAPACITY)
            .max(1);
        let (sender, receiver) = async_channel::bounded(capacity);
        let transport = Arc::new(Self {
            sender,
            receiver,
            uploader,
            options,
            flush_lock: Mutex::new(()),
            consecutive_failures: AtomicU32::new(0),
        });
        if transport.options.background {
            Self::spawn(Arc::downgrade(&transport));
        }
        transport
    }

    fn spawn(this: Weak<Self>) {
        runtime::spawn_detached(async move {
            loop {
                let delay = match this.upgrade() {
                    Some(transport) => transport.next_delay(),
                    None => break,
                };
                runtime::sleep(delay).await;
                let Some(transport) = this.upgrade() else {
                    break;
                };
                if let Err(err) = transport.flush_once().await {
                    sdk_warn!("report upload failed: {err}");
                }
            }
        });
    }

    fn next_delay(&self) -> Duration {
        match self.consecutive_failures.load(Ordering::SeqCst) {
            0 => self.options.flush_interval.unwrap_or(DEFAULT_FLUSH_INTERVAL),
            failures => backoff::retry_delay(failures),
        }
    }

    fn batch_size(&self) -> usize {
        self.options
            .max_batch_size
            .unwrap_or(DEFAULT_BATCH_SIZE)
            .max(1)
    }

    /// Number of reports waiting for upload.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Uploads at most one batch and returns how many reports it carried.
    ///
    /// On failure the batch goes back on the queue (space permitting) and the error is
    /// returned.
    pub async fn flush_once(&self) -> TransportResult<usize> {
        let _guard = self.flush_lock.lock().await;
        let mut reports = Vec::new();
        while reports.len() < self.batch_size() {
            match self.receiver.try_recv() {
                Ok(report) => reports.push(report),
                Err(_) => break,
            }
        }
        if reports.is_empty() {
            return Ok(0);
        }

        let batch = ReportBatch::new(reports);
        match self.uploader.upload(&batch).await {
            Ok(()) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                Ok(batch.reports.len())
            }
            Err(err) => {
                self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
                for report in batch.reports {
                    self.enqueue(report);
                }
                Err(err)
            }
        }
    }

    fn enqueue(&self, report: Report) {
        if let Err(TrySendError::Full(_)) = self.sender.try_send(report) {
            sdk_debug!("{}", queue_full("report queue is full; dropping report"));
        }
    }
}

impl Transport for QueuedTransport {
    fn report_moment(&self, report: MomentReport) {
        self.enqueue(Report::Moment(report));
    }

    fn report_event(&self, report: EventReport) {
        self.enqueue(Report::Event(report));
    }

    fn report_breadcrumb(&self, report: BreadcrumbReport) {
        self.enqueue(Report::Breadcrumb(report));
    }
}

impl fmt::Debug for QueuedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedTransport")
            .field("pending", &self.pending())
            .field("options", &self.options)
            .finish()
    }
}
