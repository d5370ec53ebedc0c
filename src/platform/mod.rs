pub mod clock;
pub mod runtime;
pub mod timer;

pub use clock::{ManualClock, MonotonicClock, SystemClock};
pub use timer::{DeferredTimer, ManualTimer, RuntimeTimer, TimerTask};
