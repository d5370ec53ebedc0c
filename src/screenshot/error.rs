use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScreenshotErrorCode {
    Unavailable,
    CaptureFailed,
}

impl ScreenshotErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScreenshotErrorCode::Unavailable => "screenshot/unavailable",
            ScreenshotErrorCode::CaptureFailed => "screenshot/capture-failed",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ScreenshotError {
    pub code: ScreenshotErrorCode,
    message: String,
}

impl ScreenshotError {
    pub fn new(code: ScreenshotErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }
}

impl Display for ScreenshotError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl std::error::Error for ScreenshotError {}

pub type ScreenshotResult<T> = Result<T, ScreenshotError>;

pub fn unavailable(message: impl Into<String>) -> ScreenshotError {
    ScreenshotError::new(ScreenshotErrorCode::Unavailable, message)
}

pub fn capture_failed(message: impl Into<String>) -> ScreenshotError {
    ScreenshotError::new(ScreenshotErrorCode::CaptureFailed, message)
}
