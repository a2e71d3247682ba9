//! Network manager errors

use thiserror::Error;

use crate::config::ValidationError;
use crate::network::health::HealthError;
use crate::process::ProcessError;

/// Network operation errors
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("invalid network config: {0}")]
    Validation(#[from] ValidationError),

    /// Every operation on a stopped network fails with this variant.
    #[error("network stopped")]
    Stopped,

    #[error("node {0:?} not found")]
    NodeNotFound(String),

    #[error("node {node}: {source}")]
    Process {
        node: String,
        #[source]
        source: ProcessError,
    },

    #[error("network unhealthy: {0}")]
    Health(#[from] HealthError),

    #[error("stop cancelled before all nodes were stopped")]
    Cancelled,
}

impl NetworkError {
    pub(crate) fn process(node: &str, source: ProcessError) -> Self {
        NetworkError::Process {
            node: node.to_string(),
            source,
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, NetworkError::Stopped)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, NetworkError::NodeNotFound(_))
    }
}
