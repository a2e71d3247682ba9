//! Network manager
//!
//! Owns the registry of running nodes and its lifecycle: a network is
//! created running from a validated config, nodes are added and removed
//! while it runs, and `stop` tears everything down exactly once. After
//! that every operation fails with [`NetworkError::Stopped`].
//!
//! Registry bookkeeping and the stopped flag change together under one lock,
//! so operations are linearizable with respect to `stop`. Process start and
//! stop calls run outside the lock: a node being added is reserved by name
//! while it starts and is only registered if the network is still running.

pub mod error;
pub mod health;
pub mod node;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::api::{ApiClientFactory, HttpApiClientFactory};
use crate::config::validation::NameAllocator;
use crate::config::{ConfigValidator, NetworkConfig, NodeConfig};
use crate::process::{LocalProcessSpawner, NodeProcessSpawner};

pub use error::NetworkError;
pub use health::{HealthError, HealthMonitor, HealthSignal};
pub use node::Node;

/// Host the node APIs are reached on
pub const LOCAL_HOST: &str = "127.0.0.1";

/// Registry state guarded by the network lock
struct Registry {
    nodes: HashMap<String, Arc<Node>>,
    /// Names of nodes whose process is still starting
    pending: HashSet<String>,
    stopped: bool,
    names: NameAllocator,
}

/// A set of supervised nodes with a shared lifecycle
pub struct Network {
    name: String,
    registry: Mutex<Registry>,
    validator: ConfigValidator,
    spawner: Arc<dyn NodeProcessSpawner>,
    api_clients: Arc<dyn ApiClientFactory>,
    health_monitor: HealthMonitor,
    api_request_timeout: Duration,
    span: Span,
}

impl Network {
    /// Validate `config` and start one node per node config.
    ///
    /// Nothing is spawned if validation fails. If a node fails to spawn or
    /// start, every node started so far is stopped before the error is
    /// returned.
    pub async fn new<A, S>(
        config: NetworkConfig,
        api_clients: A,
        spawner: S,
    ) -> Result<Self, NetworkError>
    where
        A: ApiClientFactory + 'static,
        S: NodeProcessSpawner + 'static,
    {
        let span = info_span!("network", name = %config.name);
        let validator = ConfigValidator::new();
        let mut names = NameAllocator::new();
        let config = validator.validate_network(&config, &HashSet::new(), &mut names)?;

        let network = Self {
            name: config.name.clone(),
            registry: Mutex::new(Registry {
                nodes: HashMap::new(),
                pending: HashSet::new(),
                stopped: false,
                names,
            }),
            validator,
            spawner: Arc::new(spawner),
            api_clients: Arc::new(api_clients),
            health_monitor: HealthMonitor::new(&config.health),
            api_request_timeout: config.health.api_request_timeout(),
            span,
        };

        network
            .start_all(config.node_configs)
            .instrument(network.span.clone())
            .await?;
        Ok(network)
    }

    /// Network of local OS processes rooted in a fresh temp directory,
    /// health-checked over HTTP
    pub async fn local(config: NetworkConfig) -> Result<Self, NetworkError> {
        Self::new(
            config,
            HttpApiClientFactory,
            LocalProcessSpawner::with_temp_root(),
        )
        .await
    }

    async fn start_all(&self, node_configs: Vec<NodeConfig>) -> Result<(), NetworkError> {
        info!("Starting network with {} nodes", node_configs.len());
        let mut registry = self.registry.lock().await;

        for config in node_configs {
            match self.start_node(config, &[]).await {
                Ok(node) => {
                    registry.nodes.insert(node.name().to_string(), node);
                }
                Err(e) => {
                    error!("Network construction failed: {}", e);
                    let started: Vec<Arc<Node>> =
                        registry.nodes.drain().map(|(_, node)| node).collect();
                    Self::teardown(started).await;
                    return Err(e);
                }
            }
        }

        info!("Network started");
        Ok(())
    }

    /// Stop `nodes`, logging failures
    async fn teardown(nodes: Vec<Arc<Node>>) {
        for node in nodes {
            if let Err(e) = node.stop_process().await {
                warn!("Error stopping node {} during teardown: {}", node.name(), e);
            }
        }
    }

    async fn start_node(
        &self,
        config: NodeConfig,
        extra_args: &[String],
    ) -> Result<Arc<Node>, NetworkError> {
        debug!("Spawning node {} (beacon: {})", config.name, config.is_beacon);
        let mut process = self
            .spawner
            .spawn(&config, extra_args)
            .map_err(|e| NetworkError::process(&config.name, e))?;
        process
            .start()
            .await
            .map_err(|e| NetworkError::process(&config.name, e))?;

        let api_client =
            self.api_clients
                .new_client(LOCAL_HOST, config.http_port(), self.api_request_timeout);
        Ok(Arc::new(Node::new(config, process, api_client)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validate `config` against the current nodes, start it and register it
    pub async fn add_node(&self, config: NodeConfig) -> Result<Arc<Node>, NetworkError> {
        self.add_node_with_args(config, &[]).await
    }

    /// Like [`add_node`](Self::add_node), passing `extra_args` to the spawner
    pub async fn add_node_with_args(
        &self,
        config: NodeConfig,
        extra_args: &[String],
    ) -> Result<Arc<Node>, NetworkError> {
        let config = {
            let mut registry = self.registry.lock().await;
            if registry.stopped {
                return Err(NetworkError::Stopped);
            }

            let taken: HashSet<String> = registry
                .nodes
                .keys()
                .chain(registry.pending.iter())
                .cloned()
                .collect();
            let config = self
                .validator
                .validate_added_node(&config, &taken, &mut registry.names)?;
            registry.pending.insert(config.name.clone());
            config
        };

        let name = config.name.clone();
        let started = self.start_node(config, extra_args).await;

        let mut registry = self.registry.lock().await;
        registry.pending.remove(&name);
        let node = started?;
        if registry.stopped {
            drop(registry);
            warn!("Network {} stopped while node {} was starting", self.name, name);
            Self::teardown(vec![node]).await;
            return Err(NetworkError::Stopped);
        }

        registry.nodes.insert(name, Arc::clone(&node));
        info!("Network {}: added node {}", self.name, node.name());
        Ok(node)
    }

    /// Stop the named node and evict it.
    ///
    /// The node is evicted even when stopping its process fails.
    pub async fn remove_node(&self, name: &str) -> Result<(), NetworkError> {
        let node = {
            let mut registry = self.registry.lock().await;
            if registry.stopped {
                return Err(NetworkError::Stopped);
            }
            registry
                .nodes
                .remove(name)
                .ok_or_else(|| NetworkError::NodeNotFound(name.to_string()))?
        };

        node.stop_process()
            .await
            .map_err(|e| NetworkError::process(name, e))?;
        info!("Network {}: removed node {}", self.name, name);
        Ok(())
    }

    pub async fn get_node(&self, name: &str) -> Result<Arc<Node>, NetworkError> {
        let registry = self.registry.lock().await;
        if registry.stopped {
            return Err(NetworkError::Stopped);
        }
        registry
            .nodes
            .get(name)
            .cloned()
            .ok_or_else(|| NetworkError::NodeNotFound(name.to_string()))
    }

    /// Names of all current nodes, in no particular order
    pub async fn get_node_names(&self) -> Result<Vec<String>, NetworkError> {
        let registry = self.registry.lock().await;
        if registry.stopped {
            return Err(NetworkError::Stopped);
        }
        Ok(registry.nodes.keys().cloned().collect())
    }

    /// Stop every node and move the network to its terminal stopped state.
    ///
    /// Returns the first process stop error, if any. If `cancel` fires
    /// before all nodes are stopped, the remaining ones are stopped by a
    /// background task and [`NetworkError::Cancelled`] is returned. The
    /// network is stopped in every case.
    pub async fn stop(&self, cancel: CancellationToken) -> Result<(), NetworkError> {
        let nodes: Vec<Arc<Node>> = {
            let mut registry = self.registry.lock().await;
            if registry.stopped {
                return Err(NetworkError::Stopped);
            }
            registry.stopped = true;
            registry.nodes.drain().map(|(_, node)| node).collect()
        };
        info!("Stopping network {} ({} nodes)", self.name, nodes.len());

        let mut first_error = None;
        let mut remaining = nodes.into_iter();
        while let Some(node) = remaining.next() {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = node.stop_process() => Some(result),
            };
            let Some(result) = outcome else {
                let rest: Vec<Arc<Node>> = std::iter::once(node).chain(remaining).collect();
                warn!(
                    "Network {} stop cancelled, stopping {} nodes in the background",
                    self.name,
                    rest.len()
                );
                tokio::spawn(Self::teardown(rest).instrument(self.span.clone()));
                return Err(NetworkError::Cancelled);
            };

            if let Err(e) = result {
                error!("Failed to stop node {}: {}", node.name(), e);
                if first_error.is_none() {
                    first_error = Some(NetworkError::process(node.name(), e));
                }
            }
        }

        info!("Network {} stopped", self.name);
        first_error.map_or(Ok(()), Err)
    }

    /// Check all current nodes' health in the background.
    ///
    /// The returned signal completes with `Ok(())` once every node reports
    /// healthy, or with the failure (timeout, `cancel`, persistent
    /// unhealthiness). Nodes still starting are not included. On a stopped
    /// network it fails immediately with
    /// [`NetworkError::Stopped`].
    pub async fn healthy(&self, cancel: CancellationToken) -> HealthSignal {
        let nodes: Vec<Arc<Node>> = {
            let registry = self.registry.lock().await;
            if registry.stopped {
                return HealthSignal::failed(NetworkError::Stopped);
            }
            registry.nodes.values().cloned().collect()
        };

        let (mut tx, signal) = HealthSignal::channel();
        let monitor = self.health_monitor.clone();
        tokio::spawn(
            async move {
                let outcome = tokio::select! {
                    _ = tx.closed() => {
                        debug!("Health signal dropped, stopping polls");
                        None
                    }
                    result = monitor.await_healthy(nodes, cancel) => Some(result),
                };
                if let Some(verdict) = outcome {
                    let _ = tx.send(verdict.map_err(NetworkError::Health));
                }
            }
            .instrument(self.span.clone()),
        );
        signal
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
