use std::fmt;

pub type SdkResult<T> = Result<T, SdkError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdkError {
    InvalidArgument { message: String },
    AlreadyInitialized,
    Internal { message: String },
}

impl SdkError {
    pub fn code(&self) -> &'static str {
        match self {
            SdkError::InvalidArgument { .. } => "sdk/invalid-argument",
            SdkError::AlreadyInitialized => "sdk/already-initialized",
            SdkError::Internal { .. } => "sdk/internal",
        }
    }
}

impl fmt::Display for SdkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdkError::InvalidArgument { message } => write!(f, "{message} ({})", self.code()),
            SdkError::AlreadyInitialized => write!(
                f,
                "The shared SDK instance has already been initialized ({})",
                self.code()
            ),
            SdkError::Internal { message } => write!(f, "{message} ({})", self.code()),
        }
    }
}

impl std::error::Error for SdkError {}

pub fn invalid_argument(message: impl Into<String>) -> SdkError {
    SdkError::InvalidArgument {
        message: message.into(),
    }
}

pub fn internal_error(message: impl Into<String>) -> SdkError {
    SdkError::Internal {
        message: message.into(),
    }
}
