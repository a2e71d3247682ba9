//! Netrunner - local multi-node network orchestrator
//!
//! Brings up a set of node processes from a declarative [`NetworkConfig`],
//! lets callers add and remove nodes while the network runs, reports when
//! every node is healthy, and tears the whole network down exactly once.
//!
//! ## Layout
//!
//! - [`config`]: network/node configuration and validation
//! - [`process`]: node process abstraction and the local OS-process backend
//! - [`api`]: node API clients used for health checks
//! - [`network`]: the network manager and health monitor
//! - [`utils`]: logging setup
//!
//! Process creation and API clients are injected through
//! [`NodeProcessSpawner`] and [`ApiClientFactory`], so the manager runs
//! against test doubles as easily as against real binaries.

pub mod api;
pub mod config;
pub mod network;
pub mod process;
pub mod utils;

pub use api::{ApiClient, ApiClientFactory, ApiError, HttpApiClient, HttpApiClientFactory};
pub use config::{
    ConfigValidator, HealthCheckConfig, LoggingConfig, NetworkConfig, NodeConfig,
    NodeConfigError, NodeId, ValidationError,
};
pub use network::{HealthError, HealthSignal, Network, NetworkError, Node};
pub use process::{
    LocalNodeConfig, LocalNodeProcess, LocalProcessSpawner, NodeProcess, NodeProcessSpawner,
    ProcessError,
};
