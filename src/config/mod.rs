//! Configuration for a local network
//!
//! Handles the network/node configuration tree consumed by [`Network::new`],
//! its validation, and the optional staking material carried by each node.
//!
//! [`Network::new`]: crate::network::Network::new

pub mod staking;
pub mod validation;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use staking::{NodeId, StakingMaterial};
pub use validation::{ConfigValidator, NodeConfigError, ValidationError};

/// Network configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Human-readable network name (used for log spans)
    #[serde(default)]
    pub name: String,

    /// Log level for the network (e.g. "INFO", "DEBUG")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Node configurations, in start order. May be empty.
    #[serde(default)]
    pub node_configs: Vec<NodeConfig>,

    /// Health polling configuration
    #[serde(default)]
    pub health: HealthCheckConfig,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl NetworkConfig {
    /// Map the configured log level onto a tracing filter directive.
    ///
    /// Unknown levels fall back to `info`.
    pub fn log_filter(&self) -> &'static str {
        match self.log_level.to_ascii_uppercase().as_str() {
            "OFF" => "off",
            "FATAL" | "ERROR" => "error",
            "WARN" | "WARNING" => "warn",
            "DEBUG" => "debug",
            "TRACE" | "VERBO" | "VERBOSE" => "trace",
            _ => "info",
        }
    }
}

/// Configuration of a single node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node name; a unique name is generated when left blank
    #[serde(default)]
    pub name: String,

    /// Whether this node is a bootstrap entry point for the network
    #[serde(default)]
    pub is_beacon: bool,

    /// Genesis file contents (required)
    #[serde(default, with = "serde_bytes")]
    pub genesis_file: Vec<u8>,

    /// Node config file contents (required, JSON)
    #[serde(default, with = "serde_bytes")]
    pub config_file: Vec<u8>,

    /// C-Chain config file contents (optional)
    #[serde(default, with = "serde_bytes")]
    pub c_chain_config_file: Vec<u8>,

    /// PEM staking certificate (optional, paired with `staking_key`)
    #[serde(default, with = "serde_bytes")]
    pub staking_cert: Vec<u8>,

    /// PEM staking private key (optional, paired with `staking_cert`)
    #[serde(default, with = "serde_bytes")]
    pub staking_key: Vec<u8>,

    /// Execution-environment-specific settings.
    ///
    /// Must deserialize into the shape the process spawner expects
    /// (see [`LocalNodeConfig`](crate::process::local::LocalNodeConfig));
    /// anything else is rejected at validation time.
    #[serde(default)]
    pub impl_specific_config: Option<serde_json::Value>,
}

impl NodeConfig {
    /// Whether both staking cert and key are supplied
    pub fn has_staking_material(&self) -> bool {
        !self.staking_cert.is_empty() && !self.staking_key.is_empty()
    }

    /// HTTP port the node serves its API on.
    ///
    /// Read from the `http-port` key of the JSON config file; defaults to
    /// [`DEFAULT_HTTP_PORT`] when absent or unreadable.
    pub fn http_port(&self) -> u16 {
        serde_json::from_slice::<serde_json::Value>(&self.config_file)
            .ok()
            .and_then(|v| v.get("http-port").and_then(|p| p.as_u64()))
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(DEFAULT_HTTP_PORT)
    }
}

/// Default node API port
pub const DEFAULT_HTTP_PORT: u16 = 9650;

/// Health polling configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Delay between health polls of one node (milliseconds)
    #[serde(default = "default_poll_interval_millis")]
    pub poll_interval_millis: u64,

    /// Upper bound on a whole `Healthy` check (seconds)
    #[serde(default = "default_health_timeout_secs")]
    pub timeout_secs: u64,

    /// Per-request timeout handed to the API client factory (seconds)
    #[serde(default = "default_api_request_timeout_secs")]
    pub api_request_timeout_secs: u64,

    /// Consecutive failed polls after which a node counts as unhealthy.
    /// 0 means polling is bounded only by `timeout_secs`.
    #[serde(default)]
    pub max_attempts: u32,
}

fn default_poll_interval_millis() -> u64 {
    1000
}

fn default_health_timeout_secs() -> u64 {
    120 // 2 minutes
}

fn default_api_request_timeout_secs() -> u64 {
    10
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            poll_interval_millis: default_poll_interval_millis(),
            timeout_secs: default_health_timeout_secs(),
            api_request_timeout_secs: default_api_request_timeout_secs(),
            max_attempts: 0,
        }
    }
}

impl HealthCheckConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn api_request_timeout(&self) -> Duration {
        Duration::from_secs(self.api_request_timeout_secs)
    }

    /// Validate health configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_millis == 0 {
            anyhow::bail!("poll_interval_millis must be greater than 0");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be greater than 0");
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (e.g. "info", "netrunner=debug"). `RUST_LOG` takes precedence.
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json_format: bool,
}
