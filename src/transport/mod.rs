mod api;
mod backoff;
mod error;
mod queue;

#[doc(inline)]
pub use api::{
    BreadcrumbReport, EventReport, MomentReport, RecordingTransport, Report, Reporter, Transport,
};

#[doc(inline)]
pub use backoff::retry_delay;

#[doc(inline)]
pub use error::{
    queue_full, serialization_error, upload_failed, TransportError, TransportErrorCode,
    TransportResult,
};

#[doc(inline)]
pub use queue::{LogUploader, QueuedTransport, ReportBatch, ReportUploader, TransportOptions};
