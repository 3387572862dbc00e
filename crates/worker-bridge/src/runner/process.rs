//! Subprocess-backed pool runner.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::{timeout, Instant};

use crate::config::PoolConfig;
use crate::error::BridgeError;

use super::{DestroyOutcome, PoolBuild, PoolRunner, WorkerProcess};

/// Mode value workers receive in `BRIDGE_MODE`.
const WORKFLOW_MODE: &str = "workflow";

/// Report a worker command prints on `--describe`.
#[derive(Debug, Deserialize)]
struct DescribeReport {
    workflows: Vec<String>,
}

/// Pool runner that spawns the configured worker command as subprocesses.
///
/// Capability discovery runs the command once with `--describe` and parses a
/// JSON report from its stdout before any pool process is spawned.
#[derive(Debug, Default)]
pub struct ProcessPoolRunner;

impl ProcessPoolRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self
    }

    fn base_command(config: &PoolConfig) -> Command {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args);
        for (k, v) in &config.env {
            cmd.env(k, v);
        }
        cmd.env("BRIDGE_MODE", WORKFLOW_MODE);
        cmd.env("BRIDGE_TASK_QUEUE", &config.task_queue);
        cmd
    }

    /// Run the describe handshake and collect the declared workflow names.
    async fn discover(&self, config: &PoolConfig) -> Result<Vec<String>, BridgeError> {
        let mut cmd = Self::base_command(config);
        cmd.arg("--describe")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            BridgeError::PoolBuildFailed(format!(
                "failed to spawn '{}' for describe: {}",
                config.command, e
            ))
        })?;

        // Dropping the future on timeout kills the child (kill_on_drop).
        let output = match timeout(config.describe_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(BridgeError::PoolBuildFailed(format!(
                    "describe handshake failed: {}",
                    e
                )))
            }
            Err(_) => {
                return Err(BridgeError::PoolBuildFailed(format!(
                    "describe handshake timed out after {:?}",
                    config.describe_timeout
                )))
            }
        };

        if !output.status.success() {
            return Err(BridgeError::PoolBuildFailed(format!(
                "describe handshake exited with {}",
                output.status
            )));
        }

        let report: DescribeReport = serde_json::from_slice(&output.stdout).map_err(|e| {
            BridgeError::PoolBuildFailed(format!("invalid describe report: {}", e))
        })?;

        Ok(report.workflows)
    }
}

#[async_trait]
impl PoolRunner for ProcessPoolRunner {
    async fn build(&self, config: &PoolConfig) -> Result<PoolBuild, BridgeError> {
        let workflows = self.discover(config).await?;

        tracing::debug!(
            command = %config.command,
            workflows = ?workflows,
            "Capability discovery complete"
        );

        let mut processes = Vec::with_capacity(config.workers);
        for _ in 0..config.workers {
            let mut cmd = Self::base_command(config);
            cmd.stdin(Stdio::null()).kill_on_drop(true);

            let child = cmd.spawn().map_err(|e| {
                BridgeError::PoolBuildFailed(format!(
                    "failed to spawn worker '{}': {}",
                    config.command, e
                ))
            })?;

            let pid = child.id();
            processes.push(WorkerProcess::new(pid, Some(child)));
        }

        tracing::info!(
            workers = processes.len(),
            task_queue = %config.task_queue,
            "Worker pool spawned"
        );

        Ok(PoolBuild {
            processes,
            workflows,
        })
    }

    async fn destroy(&self, processes: Vec<WorkerProcess>, grace: Duration) -> DestroyOutcome {
        let deadline = Instant::now() + grace;
        let mut forced = false;

        for process in processes {
            let Some(mut child) = process.take_child().await else {
                continue;
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!(pid = ?process.pid(), status = %status, "Worker exited");
                }
                Ok(Err(e)) => {
                    tracing::warn!(pid = ?process.pid(), error = %e, "Worker wait failed");
                }
                Err(_) => {
                    forced = true;
                    if let Err(e) = child.kill().await {
                        tracing::warn!(pid = ?process.pid(), error = %e, "Worker kill failed");
                    }
                    tracing::warn!(pid = ?process.pid(), "Worker killed after grace period");
                }
            }
        }

        DestroyOutcome { forced }
    }
}
