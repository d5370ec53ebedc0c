//! SDK-side log gate.
//!
//! Diagnostics are forwarded to the [`log`] facade under the `moments_sdk` target, but
//! only when they meet the SDK's own level. The level is process-wide, like the engine's
//! screenshot window. Hosts flip it with [`set_debugging_enabled`] while integrating
//! and leave it at the default ([`LogLevel::Warning`]) in production.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

static SDK_LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Warning as u8);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LogLevel {
    /// Nothing is emitted.
    None = 0,
    Debug = 1,
    Info = 2,
    Warning = 3,
    Error = 4,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::None => "none",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => LogLevel::Debug,
            2 => LogLevel::Info,
            3 => LogLevel::Warning,
            4 => LogLevel::Error,
            _ => LogLevel::None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidLogLevel(pub String);

impl fmt::Display for InvalidLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid log level: {}", self.0)
    }
}

impl std::error::Error for InvalidLogLevel {}

impl FromStr for LogLevel {
    type Err = InvalidLogLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "silent" => Ok(LogLevel::None),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(InvalidLogLevel(other.to_string())),
        }
    }
}

pub fn log_level() -> LogLevel {
    LogLevel::from_u8(SDK_LOG_LEVEL.load(Ordering::SeqCst))
}

pub fn set_log_level(level: LogLevel) {
    SDK_LOG_LEVEL.store(level as u8, Ordering::SeqCst);
}

/// `true` lowers the gate to [`LogLevel::Debug`]; `false` restores [`LogLevel::Warning`].
pub fn set_debugging_enabled(enabled: bool) {
    set_log_level(if enabled {
        LogLevel::Debug
    } else {
        LogLevel::Warning
    });
}

pub fn enabled(level: LogLevel) -> bool {
    let current = log_level();
    level != LogLevel::None && current != LogLevel::None && level >= current
}

#[doc(hidden)]
pub fn emit(level: LogLevel, args: fmt::Arguments<'_>) {
    if !enabled(level) {
        return;
    }
    match level {
        LogLevel::Debug => log::debug!(target: "moments_sdk", "{args}"),
        LogLevel::Info => log::info!(target: "moments_sdk", "{args}"),
        LogLevel::Warning => log::warn!(target: "moments_sdk", "{args}"),
        LogLevel::Error => log::error!(target: "moments_sdk", "{args}"),
        LogLevel::None => {}
    }
}

macro_rules! sdk_debug {
    ($($arg:tt)+) => {
        $crate::logger::emit($crate::logger::LogLevel::Debug, format_args!($($arg)+))
    };
}

macro_rules! sdk_warn {
    ($($arg:tt)+) => {
        $crate::logger::emit($crate::logger::LogLevel::Warning, format_args!($($arg)+))
    };
}

pub(crate) use sdk_debug;
pub(crate) use sdk_warn;
