//! Task-queue worker handles.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::client::ClientHandle;
use crate::error::EngineError;

/// Options for a task-queue worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerOptions {
    /// Worker identity reported to the engine. Generated when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,

    /// Maximum tasks the worker services concurrently.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_tasks: usize,
}

fn default_max_concurrent() -> usize {
    4
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            identity: None,
            max_concurrent_tasks: default_max_concurrent(),
        }
    }
}

/// Capability to service one named task queue on behalf of a session.
///
/// Issued by [`ClientHandle::new_worker`]. Validity is strictly bounded by
/// the parent session: once the session closes, every operation through this
/// handle fails with [`EngineError::InvalidHandle`].
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    client: ClientHandle,
    task_queue: String,
    options: WorkerOptions,
}

impl WorkerHandle {
    pub(crate) fn new(client: ClientHandle, task_queue: &str, options: WorkerOptions) -> Self {
        let identity = options
            .identity
            .unwrap_or_else(|| format!("worker-{}", Uuid::new_v4()));

        Self {
            client,
            task_queue: task_queue.to_string(),
            options: WorkerOptions {
                identity: Some(identity),
                ..options
            },
        }
    }

    /// Task queue this handle services.
    pub fn task_queue(&self) -> &str {
        &self.task_queue
    }

    /// Options this handle was created with.
    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    /// Whether the parent session is still open.
    pub fn is_valid(&self) -> bool {
        !self.client.is_closed()
    }

    /// Fail with [`EngineError::InvalidHandle`] if the parent session closed.
    pub fn ensure_valid(&self) -> Result<(), EngineError> {
        if !self.is_valid() {
            return Err(EngineError::InvalidHandle);
        }
        Ok(())
    }

    /// Session this handle was issued from.
    pub fn client(&self) -> &ClientHandle {
        &self.client
    }
}
