//! Network health monitoring
//!
//! Polls every node's API client until all report healthy, the check times
//! out, or the caller cancels. The verdict is delivered through a single-shot
//! [`HealthSignal`].

use futures::future::try_join_all;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::HealthCheckConfig;
use crate::network::error::NetworkError;
use crate::network::node::Node;

/// Health check failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HealthError {
    #[error("health check timed out after {0:?}")]
    Timeout(Duration),

    #[error("health check cancelled")]
    Cancelled,

    #[error("node {node} still unhealthy after {attempts} attempts")]
    Unhealthy { node: String, attempts: u32 },

    /// The node's API could not be queried on the last allowed attempt
    #[error("node {node} health query failed: {message}")]
    Client { node: String, message: String },

    /// The check ended without a verdict (e.g. the polling task panicked)
    #[error("health check aborted")]
    Aborted,
}

/// Aggregates per-node health into one verdict
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    poll_interval: Duration,
    timeout: Duration,
    max_attempts: u32,
}

impl HealthMonitor {
    pub fn new(config: &HealthCheckConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            timeout: config.timeout(),
            max_attempts: config.max_attempts,
        }
    }

    /// Resolve once every node in `nodes` is healthy.
    ///
    /// The first failing node, the monitor's own timeout or `cancel`
    /// short-circuits the check.
    pub async fn await_healthy(
        &self,
        nodes: Vec<Arc<Node>>,
        cancel: CancellationToken,
    ) -> Result<(), HealthError> {
        info!("Waiting for {} nodes to report healthy", nodes.len());

        let polls = try_join_all(nodes.into_iter().map(|node| self.poll_node(node)));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Health check cancelled");
                Err(HealthError::Cancelled)
            }
            result = tokio::time::timeout(self.timeout, polls) => match result {
                Ok(Ok(_)) => {
                    info!("All nodes healthy");
                    Ok(())
                }
                Ok(Err(e)) => {
                    warn!("Health check failed: {}", e);
                    Err(e)
                }
                Err(_) => {
                    warn!("Health check timed out after {:?}", self.timeout);
                    Err(HealthError::Timeout(self.timeout))
                }
            },
        }
    }

    async fn poll_node(&self, node: Arc<Node>) -> Result<(), HealthError> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let client_error = match node.api_client().health().await {
                Ok(true) => {
                    debug!("Node {} healthy after {} attempts", node.name(), attempts);
                    return Ok(());
                }
                Ok(false) => {
                    debug!("Node {} not healthy yet", node.name());
                    None
                }
                Err(e) => {
                    debug!("Node {} health query failed: {}", node.name(), e);
                    Some(e.to_string())
                }
            };

            if self.max_attempts > 0 && attempts >= self.max_attempts {
                let node = node.name().to_string();
                return Err(match client_error {
                    Some(message) => HealthError::Client { node, message },
                    None => HealthError::Unhealthy { node, attempts },
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Single-shot health verdict.
///
/// Completes with the verdict sent by the polling task. If that task goes
/// away without sending one, the signal fails with [`HealthError::Aborted`].
/// Dropping the signal stops the background polling behind it.
#[derive(Debug)]
pub struct HealthSignal {
    rx: oneshot::Receiver<Result<(), NetworkError>>,
}

pub(crate) type HealthSender = oneshot::Sender<Result<(), NetworkError>>;

impl HealthSignal {
    pub(crate) fn channel() -> (HealthSender, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// A signal that has already failed
    pub(crate) fn failed(err: NetworkError) -> Self {
        let (tx, signal) = Self::channel();
        let _ = tx.send(Err(err));
        signal
    }
}

impl Future for HealthSignal {
    type Output = Result<(), NetworkError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(verdict)) => Poll::Ready(verdict),
            Poll::Ready(Err(_)) => Poll::Ready(Err(NetworkError::Health(HealthError::Aborted))),
            Poll::Pending => Poll::Pending,
        }
    }
}
