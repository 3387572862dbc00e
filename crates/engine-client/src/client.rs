//! Workflow engine client handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::error::EngineError;
use crate::worker::{WorkerHandle, WorkerOptions};

/// Default timeout applied to individual engine calls.
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct ClientInner {
    http: reqwest::Client,
    base_url: String,
    address: String,
    namespace: String,
    closed: AtomicBool,
}

/// Handle to one session with the workflow engine.
///
/// Cloning is cheap; all clones share the same session. The session is
/// established lazily: [`ClientHandle::connect`] performs no engine RPC, so a
/// handle can be created before the engine is reachable. Every engine call is
/// fallible and fails fast once the handle has been closed.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    inner: Arc<ClientInner>,
}

#[derive(Deserialize)]
struct StartWorkflowResponse {
    run_id: String,
}

impl ClientHandle {
    /// Open a session against the engine at `address` (host:port) within
    /// `namespace`.
    ///
    /// Validates the address and builds the transport; no engine RPC is
    /// issued. Transport failures surface on the first engine call instead.
    pub fn connect(address: &str, namespace: &str) -> Result<Self, EngineError> {
        let address = address.trim().trim_end_matches('/');
        if address.is_empty() {
            return Err(EngineError::ConnectFailed("empty engine address".to_string()));
        }
        if address.contains(char::is_whitespace) || address.contains("://") {
            return Err(EngineError::ConnectFailed(format!(
                "engine address must be host:port, got '{}'",
                address
            )));
        }

        let namespace = namespace.trim();
        if namespace.is_empty() {
            return Err(EngineError::ConnectFailed("empty namespace".to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .map_err(|e| EngineError::ConnectFailed(e.to_string()))?;

        tracing::debug!(address = %address, namespace = %namespace, "Engine session opened");

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                base_url: format!("http://{}", address),
                address: address.to_string(),
                namespace: namespace.to_string(),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Engine address this handle was opened against.
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// Namespace this handle operates in.
    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Whether the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Close the session. Idempotent; outstanding clones observe the closed
    /// state on their next call.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(address = %self.inner.address, "Engine session closed");
        }
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.is_closed() {
            return Err(EngineError::InvalidHandle);
        }
        Ok(())
    }

    /// Create a worker handle bound to `task_queue`.
    ///
    /// Pure factory: no engine RPC is performed. The returned handle is valid
    /// only while this session stays open.
    pub fn new_worker(
        &self,
        task_queue: &str,
        options: WorkerOptions,
    ) -> Result<WorkerHandle, EngineError> {
        self.ensure_open()?;

        let task_queue = task_queue.trim();
        if task_queue.is_empty() {
            return Err(EngineError::InvalidTaskQueue("empty name".to_string()));
        }

        Ok(WorkerHandle::new(self.clone(), task_queue, options))
    }

    /// Probe engine liveness.
    pub async fn health_check(&self) -> Result<(), EngineError> {
        self.ensure_open()?;

        let response = self
            .inner
            .http
            .get(format!("{}/api/v1/health", self.inner.base_url))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EngineError::Rejected(format!(
                "health check returned {}",
                response.status()
            )));
        }

        Ok(())
    }

    /// Start a workflow execution on the engine, returning its run id.
    pub async fn start_workflow(
        &self,
        workflow: &str,
        task_queue: &str,
        input: serde_json::Value,
    ) -> Result<String, EngineError> {
        self.ensure_open()?;

        let response = self
            .inner
            .http
            .post(format!(
                "{}/api/v1/namespaces/{}/workflows",
                self.inner.base_url, self.inner.namespace
            ))
            .json(&serde_json::json!({
                "workflow": workflow,
                "task_queue": task_queue,
                "input": input,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Rejected(body));
        }

        let started: StartWorkflowResponse = response.json().await?;
        Ok(started.run_id)
    }

    /// Deliver a signal to a running workflow execution.
    pub async fn signal_workflow(
        &self,
        run_id: &str,
        signal: &str,
        payload: serde_json::Value,
    ) -> Result<(), EngineError> {
        self.ensure_open()?;

        let response = self
            .inner
            .http
            .post(format!(
                "{}/api/v1/namespaces/{}/workflows/{}/signal",
                self.inner.base_url, self.inner.namespace, run_id
            ))
            .json(&serde_json::json!({
                "signal": signal,
                "payload": payload,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Rejected(body));
        }

        Ok(())
    }
}
