use std::time::Duration;

/// How long a moment may stay open before it counts as late.
pub const DEFAULT_LATE_THRESHOLD: Duration = Duration::from_secs(5);

/// Number of independently locked shards in the registry.
pub const REGISTRY_SHARDS: usize = 16;

/// Moment opened by the SDK itself at initialization and closed by `end_app_startup`.
pub const STARTUP_MOMENT_NAME: &str = "_startup";
