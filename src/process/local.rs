//! Local OS-process node launcher
//!
//! Stages a node's files into its own directory and runs the node binary as
//! a child process of the runner.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::validation::is_valid_node_name;
use crate::config::NodeConfig;
use crate::process::{NodeProcess, NodeProcessSpawner, ProcessError};

/// Where a node's stdout/stderr goes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputSink {
    /// Share the runner's stream
    #[default]
    Inherit,
    /// Discard
    Null,
    /// Append to a file
    File(PathBuf),
}

impl OutputSink {
    fn stdio(&self) -> std::io::Result<Stdio> {
        Ok(match self {
            OutputSink::Inherit => Stdio::inherit(),
            OutputSink::Null => Stdio::null(),
            OutputSink::File(path) => Stdio::from(
                OpenOptions::new().create(true).append(true).open(path)?,
            ),
        })
    }
}

/// Implementation-specific config understood by the local launcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalNodeConfig {
    /// Node binary to execute
    pub binary_path: PathBuf,
    #[serde(default)]
    pub stdout: OutputSink,
    #[serde(default)]
    pub stderr: OutputSink,
    /// Arguments appended after the generated flags
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl LocalNodeConfig {
    pub fn new<P: AsRef<Path>>(binary_path: P) -> Self {
        Self {
            binary_path: binary_path.as_ref().to_path_buf(),
            stdout: OutputSink::default(),
            stderr: OutputSink::default(),
            extra_args: Vec::new(),
        }
    }

    /// Parse from a node's `impl_specific_config` value
    pub fn from_value(value: &serde_json::Value) -> Result<Self, String> {
        let config: LocalNodeConfig =
            serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
        if config.binary_path.as_os_str().is_empty() {
            return Err("binary_path cannot be empty".to_string());
        }
        Ok(config)
    }

    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Root directory created by the spawner itself, removed on drop
#[derive(Debug)]
struct OwnedRoot(PathBuf);

impl Drop for OwnedRoot {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.0) {
            Ok(()) => debug!("Removed network root {:?}", self.0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove network root {:?}: {}", self.0, e),
        }
    }
}

/// Spawns [`LocalNodeProcess`]es, one directory per node under `root_dir`
#[derive(Debug, Clone)]
pub struct LocalProcessSpawner {
    root_dir: PathBuf,
    owned_root: Option<Arc<OwnedRoot>>,
}

impl LocalProcessSpawner {
    /// Spawner staging into `root_dir`, which is left in place afterwards
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Self {
        Self {
            root_dir: root_dir.as_ref().to_path_buf(),
            owned_root: None,
        }
    }

    /// Spawner rooted in a fresh `netrunner-<uuid>` directory under the
    /// system temp dir. The directory is removed once the spawner and all
    /// its clones are dropped.
    pub fn with_temp_root() -> Self {
        let root_dir =
            std::env::temp_dir().join(format!("netrunner-{}", uuid::Uuid::new_v4()));
        Self {
            owned_root: Some(Arc::new(OwnedRoot(root_dir.clone()))),
            root_dir,
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Write the node's files and return the generated command line flags
    fn stage_files(&self, config: &NodeConfig, node_dir: &Path) -> anyhow::Result<Vec<String>> {
        fs::create_dir_all(node_dir)
            .with_context(|| format!("creating node directory {:?}", node_dir))?;

        let mut args = Vec::new();

        let config_path = node_dir.join("config.json");
        fs::write(&config_path, &config.config_file)
            .with_context(|| format!("writing {:?}", config_path))?;
        args.push(format!("--config-file={}", config_path.display()));

        let genesis_path = node_dir.join("genesis.json");
        fs::write(&genesis_path, &config.genesis_file)
            .with_context(|| format!("writing {:?}", genesis_path))?;
        args.push(format!("--genesis={}", genesis_path.display()));

        if !config.c_chain_config_file.is_empty() {
            let chain_config_dir = node_dir.join("chainConfigs");
            let c_chain_dir = chain_config_dir.join("C");
            fs::create_dir_all(&c_chain_dir)
                .with_context(|| format!("creating {:?}", c_chain_dir))?;
            fs::write(c_chain_dir.join("config.json"), &config.c_chain_config_file)
                .context("writing C-Chain config")?;
            args.push(format!("--chain-config-dir={}", chain_config_dir.display()));
        }

        if config.has_staking_material() {
            let cert_path = node_dir.join("staking.crt");
            let key_path = node_dir.join("staking.key");
            fs::write(&cert_path, &config.staking_cert).context("writing staking cert")?;
            fs::write(&key_path, &config.staking_key).context("writing staking key")?;
            args.push(format!("--staking-tls-cert-file={}", cert_path.display()));
            args.push(format!("--staking-tls-key-file={}", key_path.display()));
        }

        Ok(args)
    }
}

impl NodeProcessSpawner for LocalProcessSpawner {
    fn spawn(
        &self,
        config: &NodeConfig,
        extra_args: &[String],
    ) -> Result<Box<dyn NodeProcess>, ProcessError> {
        if config.name.is_empty() || !is_valid_node_name(&config.name) {
            return Err(ProcessError::InvalidConfig(format!(
                "node name {:?} cannot be used as a directory name",
                config.name
            )));
        }

        let value = config
            .impl_specific_config
            .as_ref()
            .ok_or_else(|| ProcessError::InvalidConfig("missing".to_string()))?;
        let local = LocalNodeConfig::from_value(value).map_err(ProcessError::InvalidConfig)?;

        if !local.binary_path.exists() {
            return Err(ProcessError::BinaryNotFound(
                local.binary_path.display().to_string(),
            ));
        }

        let node_dir = self.root_dir.join(&config.name);
        let mut args = self.stage_files(config, &node_dir)?;
        args.extend(local.extra_args.iter().cloned());
        args.extend(extra_args.iter().cloned());

        debug!(
            "Prepared node {} in {:?}: {:?} {:?}",
            config.name, node_dir, local.binary_path, args
        );

        Ok(Box::new(LocalNodeProcess {
            name: config.name.clone(),
            binary_path: local.binary_path,
            args,
            stdout: local.stdout,
            stderr: local.stderr,
            node_dir,
            child: None,
        }))
    }
}

/// Node running as a child OS process
#[derive(Debug)]
pub struct LocalNodeProcess {
    name: String,
    binary_path: PathBuf,
    args: Vec<String>,
    stdout: OutputSink,
    stderr: OutputSink,
    node_dir: PathBuf,
    /// Killed on drop
    child: Option<Child>,
}

#[async_trait::async_trait]
impl NodeProcess for LocalNodeProcess {
    async fn start(&mut self) -> Result<(), ProcessError> {
        if self.child.is_some() {
            return Err(ProcessError::AlreadyStarted);
        }

        let mut command = Command::new(&self.binary_path);
        command
            .args(&self.args)
            .current_dir(&self.node_dir)
            .stdin(Stdio::null())
            .stdout(self.stdout.stdio()?)
            .stderr(self.stderr.stdio()?)
            .kill_on_drop(true);

        let child = command.spawn().map_err(ProcessError::Spawn)?;
        info!("Started node {} (pid {:?})", self.name, child.id());
        self.child = Some(child);
        Ok(())
    }

    async fn wait(&mut self) -> Result<(), ProcessError> {
        let child = self.child.as_mut().ok_or(ProcessError::NotStarted)?;
        let status = child.wait().await?;
        if status.success() {
            debug!("Node {} exited normally", self.name);
            Ok(())
        } else {
            warn!("Node {} exited with {}", self.name, status);
            Err(ProcessError::Exited(status))
        }
    }

    async fn stop(&mut self) -> Result<(), ProcessError> {
        let child = self.child.as_mut().ok_or(ProcessError::NotStarted)?;
        if child.try_wait()?.is_some() {
            debug!("Node {} already exited", self.name);
            return Ok(());
        }

        debug!("Killing node process: {}", self.name);
        if let Err(e) = child.kill().await {
            warn!("Failed to kill node process {}: {}", self.name, e);
            return Err(ProcessError::Io(e));
        }
        info!("Stopped node {}", self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn node_config(name: &str, binary: &Path) -> NodeConfig {
        NodeConfig {
            name: name.to_string(),
            is_beacon: true,
            genesis_file: b"{\"genesis\": true}".to_vec(),
            config_file: b"{\"http-port\": 9650}".to_vec(),
            impl_specific_config: Some(json!({
                "binary_path": binary,
                "stdout": "null",
                "stderr": "null",
            })),
            ..Default::default()
        }
    }

    /// A file that exists, standing in for a node binary
    fn fake_binary(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("fake-node");
        fs::write(&path, b"").unwrap();
        path
    }

    #[test]
    fn test_local_config_shapes() {
        assert!(LocalNodeConfig::from_value(&json!("should not be string")).is_err());
        assert!(LocalNodeConfig::from_value(&json!({ "binary_path": "" })).is_err());
        assert!(LocalNodeConfig::from_value(&json!({ "binary_path": "x", "bogus": 1 })).is_err());

        let parsed = LocalNodeConfig::from_value(&json!({
            "binary_path": "pepito",
            "stdout": { "file": "/tmp/out.log" },
        }))
        .unwrap();
        assert_eq!(parsed.stdout, OutputSink::File(PathBuf::from("/tmp/out.log")));
        assert_eq!(parsed.stderr, OutputSink::Inherit);
        assert_eq!(LocalNodeConfig::from_value(&parsed.to_value().unwrap()).unwrap(), parsed);
    }

    #[test]
    fn test_spawn_missing_binary() {
        let root = TempDir::new().unwrap();
        let spawner = LocalProcessSpawner::new(root.path());
        let config = node_config("n1", Path::new("/definitely/not/here"));
        let err = spawner.spawn(&config, &[]).err().unwrap();
        assert!(matches!(err, ProcessError::BinaryNotFound(_)));
    }

    #[test]
    fn test_spawn_stages_files_and_flags() {
        let root = TempDir::new().unwrap();
        let binary = fake_binary(&root);
        let spawner = LocalProcessSpawner::new(root.path().join("net"));
        let mut config = node_config("n1", &binary);
        config.c_chain_config_file = b"{}".to_vec();

        // Build directly to inspect the concrete type
        let value = config.impl_specific_config.clone().unwrap();
        let local = LocalNodeConfig::from_value(&value).unwrap();
        let node_dir = spawner.root_dir().join("n1");
        let args = spawner.stage_files(&config, &node_dir).unwrap();

        assert!(local.binary_path.exists());
        assert_eq!(fs::read(node_dir.join("config.json")).unwrap(), config.config_file);
        assert_eq!(fs::read(node_dir.join("genesis.json")).unwrap(), config.genesis_file);
        assert!(node_dir.join("chainConfigs/C/config.json").exists());
        assert!(!node_dir.join("staking.crt").exists());
        assert_eq!(args.len(), 3);
        assert!(args[0].starts_with("--config-file="));
        assert!(args[1].starts_with("--genesis="));
        assert!(args[2].starts_with("--chain-config-dir="));

        assert!(spawner.spawn(&config, &["--extra".to_string()]).is_ok());
    }

    #[test]
    fn test_spawn_rejects_path_like_names() {
        let root = TempDir::new().unwrap();
        let binary = fake_binary(&root);
        let spawner = LocalProcessSpawner::new(root.path().join("net"));
        for name in ["../escape", "/abs", ""] {
            let err = spawner.spawn(&node_config(name, &binary), &[]).err().unwrap();
            assert!(matches!(err, ProcessError::InvalidConfig(_)), "name {:?}", name);
        }
        assert!(!root.path().join("escape").exists());
    }

    #[test]
    fn test_temp_root_removed_on_drop() {
        let bin_dir = TempDir::new().unwrap();
        let binary = fake_binary(&bin_dir);

        let spawner = LocalProcessSpawner::with_temp_root();
        let root = spawner.root_dir().to_path_buf();
        let clone = spawner.clone();
        spawner.spawn(&node_config("n1", &binary), &[]).unwrap();
        assert!(root.join("n1").join("config.json").exists());

        drop(spawner);
        assert!(root.exists());
        drop(clone);
        assert!(!root.exists());
    }

    #[test]
    fn test_explicit_root_kept_on_drop() {
        let root = TempDir::new().unwrap();
        let binary = fake_binary(&root);
        let spawner = LocalProcessSpawner::new(root.path().join("net"));
        spawner.spawn(&node_config("n1", &binary), &[]).unwrap();
        drop(spawner);
        assert!(root.path().join("net").join("n1").exists());
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let root = TempDir::new().unwrap();
        let binary = fake_binary(&root);
        let spawner = LocalProcessSpawner::new(root.path());
        let mut process = spawner.spawn(&node_config("n1", &binary), &[]).unwrap();
        assert!(matches!(process.stop().await, Err(ProcessError::NotStarted)));
        assert!(matches!(process.wait().await, Err(ProcessError::NotStarted)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_wait_exit_status() {
        let root = TempDir::new().unwrap();
        let spawner = LocalProcessSpawner::new(root.path());

        // `true` ignores its arguments and exits 0
        let true_bin = Path::new("/bin/true");
        if true_bin.exists() {
            let mut process = spawner.spawn(&node_config("ok", true_bin), &[]).unwrap();
            process.start().await.unwrap();
            assert!(matches!(process.start().await, Err(ProcessError::AlreadyStarted)));
            process.wait().await.unwrap();
            process.stop().await.unwrap();
        }

        // `sh` rejects the generated flags and exits non-zero
        let sh_bin = Path::new("/bin/sh");
        if sh_bin.exists() {
            let mut process = spawner.spawn(&node_config("bad", sh_bin), &[]).unwrap();
            process.start().await.unwrap();
            assert!(matches!(process.wait().await, Err(ProcessError::Exited(_))));
        }
    }
}
