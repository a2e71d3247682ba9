//! Logging initialization
//!
//! `RUST_LOG` always wins. Otherwise the filter comes from config, and
//! finally defaults to `info`. Initialization is idempotent: a second call
//! (or a subscriber already installed by a test harness or embedding
//! program) leaves the existing subscriber in place.
//!
//! ```rust
//! use netrunner::utils::init_logging;
//!
//! init_logging(None);
//! init_logging(Some("netrunner=debug"));
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LoggingConfig, NetworkConfig};

const DEFAULT_FILTER: &str = "info";

fn resolve_filter(filter: Option<&str>) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }
    EnvFilter::new(filter.unwrap_or(DEFAULT_FILTER))
}

/// Install a human-readable subscriber on stderr.
///
/// Returns `false` if a global subscriber was already set.
pub fn init_logging(filter: Option<&str>) -> bool {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()),
        )
        .with(resolve_filter(filter))
        .try_init()
        .is_ok()
}

/// Install a JSON-lines subscriber, including span context on every event
#[cfg(feature = "json-logging")]
pub fn init_json_logging(filter: Option<&str>) -> bool {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_span_list(true),
        )
        .with(resolve_filter(filter))
        .try_init()
        .is_ok()
}

/// Initialize logging from a [`LoggingConfig`].
///
/// `json_format` needs the `json-logging` feature; without it output stays
/// human-readable.
pub fn init_logging_from_config(config: Option<&LoggingConfig>) -> bool {
    let filter = config.and_then(|c| c.filter.as_deref());

    if config.map(|c| c.json_format).unwrap_or(false) {
        #[cfg(feature = "json-logging")]
        {
            return init_json_logging(filter);
        }
    }
    init_logging(filter)
}

/// Initialize logging at the level named by a network config's `log_level`
pub fn init_network_logging(config: &NetworkConfig) -> bool {
    init_logging(Some(config.log_filter()))
}
