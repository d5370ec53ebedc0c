mod capture;
mod error;
mod limiter;

#[doc(inline)]
pub use capture::{
    CaptureReason, DisabledCapture, ScreenshotCapture, ScreenshotHandle, ScreenshotService,
};

#[doc(inline)]
pub use error::{
    capture_failed, unavailable, ScreenshotError, ScreenshotErrorCode, ScreenshotResult,
};

#[doc(inline)]
pub use limiter::{ScreenshotLimiter, SCREENSHOT_WINDOW};
