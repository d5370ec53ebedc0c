use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportErrorCode {
    UploadFailed,
    QueueFull,
    Serialization,
}

impl TransportErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportErrorCode::UploadFailed => "transport/upload-failed",
            TransportErrorCode::QueueFull => "transport/queue-full",
            TransportErrorCode::Serialization => "transport/serialization",
        }
    }
}

#[derive(Clone, Debug)]
pub struct TransportError {
    pub code: TransportErrorCode,
    message: String,
}

impl TransportError {
    pub fn new(code: TransportErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl std::error::Error for TransportError {}

pub type TransportResult<T> = Result<T, TransportError>;

pub fn upload_failed(message: impl Into<String>) -> TransportError {
    TransportError::new(TransportErrorCode::UploadFailed, message)
}

pub fn queue_full(message: impl Into<String>) -> TransportError {
    TransportError::new(TransportErrorCode::QueueFull, message)
}

pub fn serialization_error(message: impl Into<String>) -> TransportError {
    TransportError::new(TransportErrorCode::Serialization, message)
}
