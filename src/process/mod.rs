//! Node process abstraction
//!
//! A node process is anything that can be started, waited on and stopped.
//! The network manager never launches OS processes itself: it asks an
//! injected [`NodeProcessSpawner`] for a [`NodeProcess`], which keeps the
//! manager testable with in-memory doubles.

pub mod local;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::NodeConfig;

pub use local::{LocalNodeConfig, LocalNodeProcess, LocalProcessSpawner, OutputSink};

/// Node process errors
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("node binary not found: {0}")]
    BinaryNotFound(String),

    #[error("invalid implementation-specific config: {0}")]
    InvalidConfig(String),

    #[error("failed to prepare node files: {0}")]
    Setup(String),

    #[error("failed to spawn node process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("process already started")]
    AlreadyStarted,

    #[error("process not started")]
    NotStarted,

    #[error("process exited abnormally: {0}")]
    Exited(std::process::ExitStatus),

    #[error("process I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reported by a non-OS process implementation
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for ProcessError {
    fn from(e: anyhow::Error) -> Self {
        ProcessError::Setup(format!("{:#}", e))
    }
}

/// One supervised node
#[async_trait]
pub trait NodeProcess: Send + Sync {
    /// Begin execution. Called exactly once per instance.
    async fn start(&mut self) -> Result<(), ProcessError>;

    /// Wait until the process exits; abnormal exit is an error.
    async fn wait(&mut self) -> Result<(), ProcessError>;

    /// Request termination.
    async fn stop(&mut self) -> Result<(), ProcessError>;
}

/// Creates node processes from node configs.
///
/// Any `Fn(&NodeConfig, &[String]) -> Result<Box<dyn NodeProcess>, ProcessError>`
/// closure is a spawner.
pub trait NodeProcessSpawner: Send + Sync {
    /// Build (but do not start) the process for `config`.
    /// `extra_args` are appended to the process command line.
    fn spawn(
        &self,
        config: &NodeConfig,
        extra_args: &[String],
    ) -> Result<Box<dyn NodeProcess>, ProcessError>;
}

impl<F> NodeProcessSpawner for F
where
    F: Fn(&NodeConfig, &[String]) -> Result<Box<dyn NodeProcess>, ProcessError> + Send + Sync,
{
    fn spawn(
        &self,
        config: &NodeConfig,
        extra_args: &[String],
    ) -> Result<Box<dyn NodeProcess>, ProcessError> {
        self(config, extra_args)
    }
}
