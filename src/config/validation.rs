//! Network configuration validation
//!
//! Validates a network/node configuration tree before any process is spawned
//! and resolves blank node names. Validation never partially applies: either
//! every node config is accepted or nothing is started.

use std::collections::HashSet;
use std::path::{Component, Path};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::staking::StakingMaterial;
use crate::config::{NetworkConfig, NodeConfig};
use crate::process::local::LocalNodeConfig;

/// Prefix of generated node names
pub const GENERATED_NAME_PREFIX: &str = "node-";

/// Why a single node config was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeConfigError {
    #[error("implementation-specific config is missing")]
    MissingImplConfig,

    #[error("implementation-specific config has the wrong shape: {0}")]
    InvalidImplConfig(String),

    #[error("config file is missing")]
    MissingConfigFile,

    #[error("genesis file is missing")]
    MissingGenesisFile,

    #[error("staking key provided without staking cert")]
    StakingKeyWithoutCert,

    #[error("staking cert provided without staking key")]
    StakingCertWithoutKey,

    #[error("invalid staking cert/key: {0}")]
    InvalidStaking(String),

    #[error("node name {0:?} is already in use")]
    DuplicateName(String),

    /// The name cannot be used as a directory name under the network root
    #[error("node name {0:?} is not a plain file name")]
    InvalidName(String),
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A node config is invalid. `index` is its position in the validated
    /// batch (`AddNode` validates a batch of one).
    #[error("node config {index}: {kind}")]
    Node { index: usize, kind: NodeConfigError },

    #[error("network has nodes but none is marked as beacon")]
    NoBeacon,

    #[error("invalid health check config: {0}")]
    HealthConfig(String),
}

impl ValidationError {
    fn node(index: usize, kind: NodeConfigError) -> Self {
        ValidationError::Node { index, kind }
    }

    /// The rejected node kind, if the error concerns a single node
    pub fn node_kind(&self) -> Option<&NodeConfigError> {
        match self {
            ValidationError::Node { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

/// Whether `name` is usable as a single directory component.
///
/// Blank names are accepted here; they are resolved to generated names.
pub fn is_valid_node_name(name: &str) -> bool {
    if name.is_empty() {
        return true;
    }
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Hands out unique `node-<n>` names.
///
/// The suffix only ever grows, so a name is never generated twice by the
/// same allocator even after the node holding it was removed.
#[derive(Debug, Clone)]
pub struct NameAllocator {
    next_suffix: u64,
}

impl NameAllocator {
    pub fn new() -> Self {
        Self { next_suffix: 1 }
    }

    /// Next generated name not present in `taken`
    pub fn next_name(&mut self, taken: &HashSet<String>) -> String {
        loop {
            let name = format!("{}{}", GENERATED_NAME_PREFIX, self.next_suffix);
            self.next_suffix += 1;
            if !taken.contains(&name) {
                return name;
            }
        }
    }
}

impl Default for NameAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Network config validator
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a whole network config and return a normalized copy with
    /// every blank node name resolved.
    ///
    /// `existing` holds names that are already taken (empty at construction).
    pub fn validate_network(
        &self,
        config: &NetworkConfig,
        existing: &HashSet<String>,
        names: &mut NameAllocator,
    ) -> Result<NetworkConfig, ValidationError> {
        config
            .health
            .validate()
            .map_err(|e| ValidationError::HealthConfig(e.to_string()))?;

        let nodes = self.validate_batch(&config.node_configs, existing, names)?;

        if !nodes.is_empty() && !nodes.iter().any(|n| n.is_beacon) {
            warn!("Network config {:?} has no beacon node", config.name);
            return Err(ValidationError::NoBeacon);
        }

        debug!(
            "Network config {:?} validated with {} nodes",
            config.name,
            nodes.len()
        );
        Ok(NetworkConfig {
            node_configs: nodes,
            ..config.clone()
        })
    }

    /// Validate a single node config being added to a running network.
    ///
    /// No beacon requirement applies; the network may grow from empty.
    pub fn validate_added_node(
        &self,
        config: &NodeConfig,
        existing: &HashSet<String>,
        names: &mut NameAllocator,
    ) -> Result<NodeConfig, ValidationError> {
        let mut nodes = self.validate_batch(std::slice::from_ref(config), existing, names)?;
        Ok(nodes.remove(0))
    }

    /// Structural checks on one node config, independent of its siblings
    pub fn validate_node(&self, config: &NodeConfig) -> Result<(), NodeConfigError> {
        if !is_valid_node_name(&config.name) {
            return Err(NodeConfigError::InvalidName(config.name.clone()));
        }

        let impl_config = config
            .impl_specific_config
            .as_ref()
            .ok_or(NodeConfigError::MissingImplConfig)?;
        LocalNodeConfig::from_value(impl_config).map_err(NodeConfigError::InvalidImplConfig)?;

        if config.config_file.is_empty() {
            return Err(NodeConfigError::MissingConfigFile);
        }
        if config.genesis_file.is_empty() {
            return Err(NodeConfigError::MissingGenesisFile);
        }

        match (config.staking_cert.is_empty(), config.staking_key.is_empty()) {
            (true, false) => return Err(NodeConfigError::StakingKeyWithoutCert),
            (false, true) => return Err(NodeConfigError::StakingCertWithoutKey),
            (false, false) => {
                StakingMaterial::parse(&config.staking_cert, &config.staking_key)
                    .map_err(|e| NodeConfigError::InvalidStaking(e.to_string()))?;
            }
            (true, true) => {}
        }

        Ok(())
    }

    fn validate_batch(
        &self,
        configs: &[NodeConfig],
        existing: &HashSet<String>,
        names: &mut NameAllocator,
    ) -> Result<Vec<NodeConfig>, ValidationError> {
        for (index, config) in configs.iter().enumerate() {
            self.validate_node(config)
                .map_err(|kind| ValidationError::node(index, kind))?;
        }

        // Explicit names are reserved first so generated ones never collide
        // with a name appearing later in the list.
        let mut taken = existing.clone();
        for (index, config) in configs.iter().enumerate() {
            if config.name.is_empty() {
                continue;
            }
            if !taken.insert(config.name.clone()) {
                return Err(ValidationError::node(
                    index,
                    NodeConfigError::DuplicateName(config.name.clone()),
                ));
            }
        }

        let mut resolved = Vec::with_capacity(configs.len());
        for config in configs {
            let mut config = config.clone();
            if config.name.is_empty() {
                config.name = names.next_name(&taken);
                taken.insert(config.name.clone());
            }
            resolved.push(config);
        }
        Ok(resolved)
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}
