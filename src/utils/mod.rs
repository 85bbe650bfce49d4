//! Shared utilities
//!
//! Small helpers used across the registry and loader: wall-clock
//! timestamps, environment lookups, retry with backoff, timeouts and
//! logging initialisation.

pub mod logging;
pub mod retry;
pub mod timeout;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current unix timestamp in seconds
pub fn current_timestamp() -> u64 {
    current_timestamp_duration().as_secs()
}

/// Current time since the unix epoch
pub fn current_timestamp_duration() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
}

/// Read an environment variable if it is set and non-empty
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Read and parse an environment variable, ignoring unparsable values
pub fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_opt(key).and_then(|v| v.trim().parse().ok())
}
