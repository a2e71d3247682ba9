//! Runtime record of one node in the network

use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::api::ApiClient;
use crate::config::{NodeConfig, NodeId, StakingMaterial};
use crate::process::{NodeProcess, ProcessError};

/// A running node: its resolved config, process handle and API client
pub struct Node {
    config: NodeConfig,
    node_id: Option<NodeId>,
    api_client: Arc<dyn ApiClient>,
    process: Mutex<Box<dyn NodeProcess>>,
}

impl Node {
    pub(crate) fn new(
        config: NodeConfig,
        process: Box<dyn NodeProcess>,
        api_client: Arc<dyn ApiClient>,
    ) -> Self {
        // Staking material was validated before the node was started
        let node_id = if config.has_staking_material() {
            StakingMaterial::parse(&config.staking_cert, &config.staking_key)
                .ok()
                .map(|m| m.node_id())
        } else {
            None
        };

        Self {
            config,
            node_id,
            api_client,
            process: Mutex::new(process),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Resolved config the node was started with
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Identity derived from the staking cert; `None` when the node
    /// generates its own credentials
    pub fn node_id(&self) -> Option<NodeId> {
        self.node_id
    }

    pub fn api_client(&self) -> &Arc<dyn ApiClient> {
        &self.api_client
    }

    pub(crate) async fn stop_process(&self) -> Result<(), ProcessError> {
        self.process.lock().await.stop().await
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.config.name)
            .field("is_beacon", &self.config.is_beacon)
            .field("node_id", &self.node_id)
            .finish_non_exhaustive()
    }
}
