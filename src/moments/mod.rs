mod api;
mod constants;

#[doc(inline)]
pub use api::{CompletedMoment, MomentKey, MomentOptions, MomentRegistry};

#[doc(inline)]
pub use constants::{DEFAULT_LATE_THRESHOLD, REGISTRY_SHARDS, STARTUP_MOMENT_NAME};
