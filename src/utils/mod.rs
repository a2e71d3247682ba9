//! Shared utilities

pub mod logging;

pub use logging::{init_logging, init_logging_from_config, init_network_logging};
#[cfg(feature = "json-logging")]
pub use logging::init_json_logging;
