//! Bridge configuration.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;

/// Worker-pool section of the configuration.
///
/// Opaque to the connection supervisor and the pool manager's swap protocol;
/// forwarded unchanged to the pool runner.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Task queue the pool services.
    pub task_queue: String,

    /// Worker command to spawn.
    pub command: String,

    /// Arguments passed to the worker command.
    pub args: Vec<String>,

    /// Environment variables set on worker processes.
    pub env: HashMap<String, String>,

    /// Number of worker processes in the pool.
    pub workers: usize,

    /// Grace period granted to in-flight work before forced release.
    pub grace_period: Duration,

    /// Timeout for the capability-discovery handshake.
    pub describe_timeout: Duration,
}

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Workflow engine address (host:port).
    pub address: String,

    /// Engine namespace.
    pub namespace: String,

    /// Worker-pool configuration.
    pub pool: PoolConfig,

    /// Window the host waits on the serve error channel before treating
    /// startup as successful.
    pub readiness_window: Duration,
}

impl BridgeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let address = std::env::var("BRIDGE_ADDRESS")
            .unwrap_or_else(|_| "localhost:7233".to_string());

        let namespace = std::env::var("BRIDGE_NAMESPACE")
            .unwrap_or_else(|_| "default".to_string());

        let task_queue = std::env::var("BRIDGE_TASK_QUEUE")
            .unwrap_or_else(|_| "default".to_string());

        let command = std::env::var("BRIDGE_WORKER_COMMAND")
            .unwrap_or_else(|_| "taskbridge-worker".to_string());

        let args = std::env::var("BRIDGE_WORKER_ARGS")
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let workers: usize = std::env::var("BRIDGE_POOL_WORKERS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);

        let grace_secs: u64 = std::env::var("BRIDGE_GRACE_PERIOD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let describe_secs: u64 = std::env::var("BRIDGE_DESCRIBE_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let readiness_secs: u64 = std::env::var("BRIDGE_READINESS_WINDOW")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(2);

        Ok(Self {
            address,
            namespace,
            pool: PoolConfig {
                task_queue,
                command,
                args,
                env: HashMap::new(),
                workers,
                grace_period: Duration::from_secs(grace_secs),
                describe_timeout: Duration::from_secs(describe_secs),
            },
            readiness_window: Duration::from_secs(readiness_secs),
        })
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            address: "localhost:7233".to_string(),
            namespace: "default".to_string(),
            pool: PoolConfig::default(),
            readiness_window: Duration::from_secs(2),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            task_queue: "default".to_string(),
            command: "taskbridge-worker".to_string(),
            args: Vec::new(),
            env: HashMap::new(),
            workers: 1,
            grace_period: Duration::from_secs(30),
            describe_timeout: Duration::from_secs(10),
        }
    }
}
