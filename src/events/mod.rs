mod api;

#[doc(inline)]
pub use api::{EventLogger, LogOptions, Severity, StackTrace};
