#![allow(dead_code)]

use async_trait::async_trait;
use netrunner::api::{ApiClient, ApiClientFactory, ApiError};
use netrunner::config::{HealthCheckConfig, NetworkConfig, NodeConfig};
use netrunner::process::{NodeProcess, NodeProcessSpawner, ProcessError};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the mock processes of one spawner were asked to do
#[derive(Debug, Default)]
pub struct ProcessLog {
    pub spawned: Vec<(NodeConfig, Vec<String>)>,
    pub started: Vec<String>,
    pub stopped: Vec<String>,
}

pub type SharedLog = Arc<Mutex<ProcessLog>>;

pub struct MockProcess {
    name: String,
    log: SharedLog,
    fail_start: bool,
    block_start: bool,
    started: bool,
}

#[async_trait]
impl NodeProcess for MockProcess {
    async fn start(&mut self) -> Result<(), ProcessError> {
        if self.block_start {
            std::future::pending::<()>().await;
        }
        if self.fail_start {
            return Err(ProcessError::Other(format!("{} refused to start", self.name)));
        }
        if self.started {
            return Err(ProcessError::AlreadyStarted);
        }
        self.started = true;
        self.log.lock().unwrap().started.push(self.name.clone());
        Ok(())
    }

    async fn wait(&mut self) -> Result<(), ProcessError> {
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ProcessError> {
        if !self.started {
            return Err(ProcessError::NotStarted);
        }
        self.log.lock().unwrap().stopped.push(self.name.clone());
        Ok(())
    }
}

/// Spawner handing out [`MockProcess`]es that share one [`ProcessLog`]
#[derive(Clone, Default)]
pub struct MockSpawner {
    pub log: SharedLog,
    fail_start: Option<String>,
    block_start: Option<String>,
}

impl MockSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes for the node named `name` fail to start
    pub fn failing_start(name: &str) -> Self {
        Self {
            fail_start: Some(name.to_string()),
            ..Self::default()
        }
    }

    /// Processes for the node named `name` never finish starting
    pub fn blocking_start(name: &str) -> Self {
        Self {
            block_start: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn started(&self) -> Vec<String> {
        self.log.lock().unwrap().started.clone()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.log.lock().unwrap().stopped.clone()
    }

    pub fn spawned(&self) -> Vec<(NodeConfig, Vec<String>)> {
        self.log.lock().unwrap().spawned.clone()
    }
}

impl NodeProcessSpawner for MockSpawner {
    fn spawn(
        &self,
        config: &NodeConfig,
        extra_args: &[String],
    ) -> Result<Box<dyn NodeProcess>, ProcessError> {
        self.log
            .lock()
            .unwrap()
            .spawned
            .push((config.clone(), extra_args.to_vec()));
        Ok(Box::new(MockProcess {
            name: config.name.clone(),
            log: Arc::clone(&self.log),
            fail_start: self.fail_start.as_deref() == Some(config.name.as_str()),
            block_start: self.block_start.as_deref() == Some(config.name.as_str()),
            started: false,
        }))
    }
}

/// Spawner that must never be reached
pub fn unreachable_spawner(
    _config: &NodeConfig,
    _extra_args: &[String],
) -> Result<Box<dyn NodeProcess>, ProcessError> {
    panic!("spawner called")
}

/// How every client of a [`MockApiFactory`] answers health queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Health {
    Healthy,
    #[default]
    NeverHealthy,
    /// Every query fails with an API error
    Unreachable,
    /// Every query panics
    Panics,
}

pub struct MockApiClient {
    health: Health,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ApiClient for MockApiClient {
    async fn health(&self) -> Result<bool, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.health {
            Health::Healthy => Ok(true),
            Health::NeverHealthy => Ok(false),
            Health::Unreachable => Err(ApiError::Request("connection refused".to_string())),
            Health::Panics => panic!("health client blew up"),
        }
    }
}

/// Factory whose clients all report the same health
#[derive(Clone, Default)]
pub struct MockApiFactory {
    health: Health,
    pub calls: Arc<AtomicUsize>,
    pub endpoints: Arc<Mutex<Vec<(String, u16, Duration)>>>,
}

impl MockApiFactory {
    pub fn with_health(health: Health) -> Self {
        Self {
            health,
            ..Self::default()
        }
    }

    pub fn healthy() -> Self {
        Self::with_health(Health::Healthy)
    }

    pub fn never_healthy() -> Self {
        Self::with_health(Health::NeverHealthy)
    }

    pub fn health_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ApiClientFactory for MockApiFactory {
    fn new_client(&self, host: &str, port: u16, request_timeout: Duration) -> Arc<dyn ApiClient> {
        self.endpoints
            .lock()
            .unwrap()
            .push((host.to_string(), port, request_timeout));
        Arc::new(MockApiClient {
            health: self.health,
            calls: Arc::clone(&self.calls),
        })
    }
}

/// Poll `condition` every 10ms for up to a second
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub fn impl_config() -> serde_json::Value {
    json!({ "binary_path": "pepito" })
}

pub fn node_config(name: &str, is_beacon: bool) -> NodeConfig {
    NodeConfig {
        name: name.to_string(),
        is_beacon,
        genesis_file: b"genesis".to_vec(),
        config_file: br#"{"http-port": 9650}"#.to_vec(),
        impl_specific_config: Some(impl_config()),
        ..Default::default()
    }
}

/// Fast health polling so never-healthy checks finish quickly
pub fn fast_health() -> HealthCheckConfig {
    HealthCheckConfig {
        poll_interval_millis: 10,
        timeout_secs: 1,
        api_request_timeout_secs: 3,
        max_attempts: 0,
    }
}

/// Six nodes `node1`..`node6`, the first one a beacon
pub fn default_network_config() -> NetworkConfig {
    NetworkConfig {
        name: "test-network".to_string(),
        log_level: "DEBUG".to_string(),
        node_configs: (1..=6)
            .map(|i| node_config(&format!("node{}", i), i == 1))
            .collect(),
        health: fast_health(),
    }
}

pub fn empty_network_config() -> NetworkConfig {
    NetworkConfig {
        name: "empty".to_string(),
        health: fast_health(),
        ..Default::default()
    }
}

pub fn sorted(mut names: Vec<String>) -> Vec<String> {
    names.sort();
    names
}
