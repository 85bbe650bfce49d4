//! Logging initialisation
//!
//! Filter precedence: `RUST_LOG`, then the configured filter, then `info`.
//! Every initialiser uses `try_init`, so calling one twice (tests, embedding
//! applications with their own subscriber) is harmless.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

const DEFAULT_FILTER: &str = "info";

fn build_filter(filter: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter.unwrap_or(DEFAULT_FILTER)))
}

fn ansi_enabled() -> bool {
    std::env::var_os("NO_COLOR").is_none()
}

/// Initialise human-readable logging
pub fn init_logging(filter: Option<&str>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(filter))
        .with_ansi(ansi_enabled())
        .with_target(true)
        .try_init();
}

/// Initialise JSON logging (for log aggregation systems)
#[cfg(feature = "json-logging")]
pub fn init_json_logging(filter: Option<&str>) {
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(build_filter(filter))
        .try_init();
}

/// Initialise logging from configuration
///
/// A disabled config installs no subscriber at all. `None` behaves like
/// the default config.
pub fn init_logging_from_config(config: Option<&LoggingConfig>) {
    let Some(config) = config else {
        init_logging(None);
        return;
    };

    if !config.enabled {
        return;
    }

    #[cfg(feature = "json-logging")]
    if config.json_format {
        init_json_logging(config.filter.as_deref());
        return;
    }

    #[cfg(not(feature = "json-logging"))]
    if config.json_format {
        eprintln!("JSON logging requested but the json-logging feature is disabled");
    }

    init_logging(config.filter.as_deref());
}
