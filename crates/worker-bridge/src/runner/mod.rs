//! Worker-pool execution engine boundary.
//!
//! The pool manager talks to the execution engine through [`PoolRunner`]:
//! `build` spawns worker processes and reports the workflow names they
//! declare, `destroy` releases them within a grace period. The production
//! implementation is [`ProcessPoolRunner`]; tests substitute their own.

mod process;

pub use process::ProcessPoolRunner;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::process::Child;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::PoolConfig;
use crate::error::BridgeError;

/// One worker process owned by a pool.
///
/// Clones share the underlying child handle; supervision callers read the
/// identity fields only.
#[derive(Debug, Clone)]
pub struct WorkerProcess {
    id: Uuid,
    pid: Option<u32>,
    spawned_at: DateTime<Utc>,
    child: Arc<Mutex<Option<Child>>>,
}

impl WorkerProcess {
    /// Wrap a spawned child process.
    pub fn new(pid: Option<u32>, child: Option<Child>) -> Self {
        Self {
            id: Uuid::new_v4(),
            pid,
            spawned_at: Utc::now(),
            child: Arc::new(Mutex::new(child)),
        }
    }

    /// Stable identity of this worker process.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// OS pid, when the process is backed by a real child.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// When the process was spawned.
    pub fn spawned_at(&self) -> DateTime<Utc> {
        self.spawned_at
    }

    /// Take ownership of the child handle, if any remains.
    pub(crate) async fn take_child(&self) -> Option<Child> {
        self.child.lock().await.take()
    }
}

/// Result of building a pool.
pub struct PoolBuild {
    /// Spawned worker processes.
    pub processes: Vec<WorkerProcess>,

    /// Workflow names the pool declared during capability discovery.
    pub workflows: Vec<String>,
}

/// Result of destroying a pool's processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestroyOutcome {
    /// True when the grace period elapsed and processes were killed.
    pub forced: bool,
}

/// Capability to build and release worker-process pools.
#[async_trait]
pub trait PoolRunner: Send + Sync {
    /// Spawn a pool per `config` and report its declared workflow names.
    async fn build(&self, config: &PoolConfig) -> Result<PoolBuild, BridgeError>;

    /// Release `processes`, waiting up to `grace` for in-flight work before
    /// escalating to a forced kill. Never fails; escalation is reported in
    /// the outcome.
    async fn destroy(&self, processes: Vec<WorkerProcess>, grace: Duration) -> DestroyOutcome;
}
