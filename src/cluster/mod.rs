//! Engine cluster lifecycle and instance addressing
//!
//! Wraps the engine's control binary (clean/install/start/stop) and the port
//! and path arithmetic for multi-instance, multi-shard clusters. Offsets let
//! several clusters run side by side on one machine; on CI the
//! `EXECUTOR_NUMBER` environment variable spreads clusters across a wider
//! port range per executor.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Handle for the engine cluster under test
#[derive(Debug, Clone)]
pub struct EngineCluster {
    offset: u32,
    path: PathBuf,
    control_bin: String,
    num_instances: u32,
    num_shards: u32,
    base_port: u16,
}

impl EngineCluster {
    /// Create a cluster handle
    ///
    /// `port` is the base HTTP port before offset arithmetic is applied.
    /// Fails when the computed offset pushes the base port past the port
    /// range.
    pub fn new(
        offset: u32,
        path: impl Into<PathBuf>,
        control_bin: impl Into<String>,
        num_instances: u32,
        num_shards: u32,
        port: u16,
    ) -> Result<Self> {
        let port_offset: u64 = match std::env::var("EXECUTOR_NUMBER")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
        {
            Some(executor) => u64::from(executor) * 100 + u64::from(offset),
            None => u64::from(offset) * 10,
        };

        let base_port = u16::try_from(u64::from(port) + port_offset).map_err(|_| {
            Error::config(format!(
                "port offset {port_offset} pushes base port {port} past the port range"
            ))
        })?;

        Ok(Self {
            offset,
            path: path.into(),
            control_bin: control_bin.into(),
            num_instances,
            num_shards,
            base_port,
        })
    }

    /// Cluster offset, used to namespace report identifiers
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Number of shards in this cluster
    pub fn num_shards(&self) -> u32 {
        self.num_shards
    }

    /// Host id of the first instance that answers spider-queue queries
    ///
    /// With mirrors present, the first `num_shards` hosts are query-only and
    /// the spidering hosts start after them.
    pub fn spider_host_offset(&self) -> u32 {
        if self.num_instances == self.num_shards {
            0
        } else {
            self.num_shards
        }
    }

    /// Filesystem path of one instance's working directory
    pub fn instance_path(&self, host_id: u32) -> PathBuf {
        self.path
            .join(format!("instances{:02}", self.num_instances))
            .join(format!("{host_id:03}"))
    }

    /// HTTP port of one instance
    pub fn instance_port(&self, host_id: u32) -> u16 {
        self.base_port + host_id as u16
    }

    /// Working directory for control-binary invocations
    pub fn control_dir(&self) -> PathBuf {
        self.instance_path(0)
    }

    /// Remove data left over from a previous run
    pub async fn clean(&self) -> Result<()> {
        self.control(&["dsh2", "make cleantest"], true).await
    }

    /// Install one already-copied config file across the cluster
    pub async fn install_file(&self, filename: &str) -> Result<()> {
        self.control(&["installfile", filename], false).await
    }

    /// Start all instances
    pub async fn start(&self) -> Result<()> {
        self.control(&["start"], true).await
    }

    /// Stop all instances
    pub async fn stop(&self) -> Result<()> {
        self.control(&["stop"], true).await
    }

    async fn control(&self, args: &[&str], quiet: bool) -> Result<()> {
        let cwd = self.control_dir();
        debug!(bin = %self.control_bin, args = ?args, cwd = %cwd.display(), "Running engine control command");

        let mut command = Command::new(&self.control_bin);
        command.args(args).current_dir(&cwd);
        if quiet {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let status = command.status().await.map_err(|e| {
            Error::lifecycle(format!(
                "failed to run {} {}: {e}",
                self.control_bin,
                args.join(" ")
            ))
        })?;

        if !status.success() {
            warn!(args = ?args, status = %status, "Engine control command exited nonzero");
            return Err(Error::lifecycle(format!(
                "{} {} exited with {status}",
                self.control_bin,
                args.join(" ")
            )));
        }

        Ok(())
    }

    /// Copy a test-case config file into the control directory, expanding
    /// fixture placeholders line by line
    pub async fn stage_config_file(
        &self,
        source: &Path,
        env: &crate::config::TargetEnv,
    ) -> Result<String> {
        let filename = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::lifecycle(format!("bad config filename: {}", source.display())))?
            .to_string();

        let content = tokio::fs::read_to_string(source).await?;
        let expanded: String = content
            .lines()
            .map(|line| env.expand(line) + "\n")
            .collect();

        let dest = self.control_dir().join(&filename);
        tokio::fs::write(&dest, expanded).await?;

        Ok(filename)
    }
}
