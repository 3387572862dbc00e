//! Engine connection supervisor.

use std::sync::Arc;

use async_trait::async_trait;
use engine_client::{ClientHandle, WorkerHandle, WorkerOptions};
use tokio::sync::{mpsc, RwLock};

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::events::{BridgeEvent, EventBroadcaster};
use crate::service::Service;

/// Connection lifecycle. There is no failure transition out of `Connecting`;
/// a failed serve attempt is terminal and the host owns restart policy.
#[derive(Debug)]
enum ConnectionState {
    Unstarted,
    Connecting,
    Connected(ClientHandle),
    Stopped { last: Option<ClientHandle> },
}

/// Owns the single live connection to the workflow engine.
///
/// All other components share the client handle read-only; only the
/// supervisor replaces or closes it. Worker handles are issued on demand and
/// are valid only while the connection they were issued from lives.
pub struct ConnectionSupervisor {
    config: BridgeConfig,
    events: Arc<EventBroadcaster>,
    state: RwLock<ConnectionState>,
}

impl ConnectionSupervisor {
    /// Service identifier.
    pub const NAME: &'static str = "connection";

    /// Create a supervisor for `config`.
    pub fn new(config: BridgeConfig, events: Arc<EventBroadcaster>) -> Self {
        Self {
            config,
            events,
            state: RwLock::new(ConnectionState::Unstarted),
        }
    }

    /// Attempt to establish the engine connection.
    ///
    /// Returns immediately with a channel of buffered capacity 1. A connect
    /// failure is signaled exactly once on the channel; on success the
    /// channel is never written. The supervisor does not retry.
    pub async fn serve(&self) -> mpsc::Receiver<BridgeError> {
        let (tx, rx) = mpsc::channel(1);

        let mut state = self.state.write().await;

        // A replaced connection is closed first; at most one lives at a time.
        if let ConnectionState::Connected(previous) = &*state {
            previous.close();
            self.events.emit(BridgeEvent::ConnectionClosed {
                address: previous.address().to_string(),
            });
        }
        *state = ConnectionState::Connecting;

        match ClientHandle::connect(&self.config.address, &self.config.namespace) {
            Ok(client) => {
                tracing::debug!(
                    address = %self.config.address,
                    namespace = %self.config.namespace,
                    "Connected to workflow engine"
                );
                self.events.emit(BridgeEvent::ConnectionEstablished {
                    address: self.config.address.clone(),
                    namespace: self.config.namespace.clone(),
                });
                *state = ConnectionState::Connected(client);
            }
            Err(e) => {
                tracing::error!(
                    address = %self.config.address,
                    error = %e,
                    "Engine connect failed"
                );
                let _ = tx.try_send(BridgeError::from(e));
            }
        }

        rx
    }

    /// Close the connection if one exists. Idempotent.
    pub async fn stop(&self) -> Result<(), BridgeError> {
        let mut state = self.state.write().await;

        let last = match std::mem::replace(&mut *state, ConnectionState::Unstarted) {
            ConnectionState::Connected(client) => {
                client.close();
                self.events.emit(BridgeEvent::ConnectionClosed {
                    address: client.address().to_string(),
                });
                Some(client)
            }
            ConnectionState::Stopped { last } => last,
            _ => None,
        };

        *state = ConnectionState::Stopped { last };
        Ok(())
    }

    /// Return the most recently established client handle.
    ///
    /// The handle is returned even after `stop`; callers must treat engine
    /// calls through it as fallible regardless. `NotConnected` only when no
    /// connection was ever established.
    pub async fn get_client(&self) -> Result<ClientHandle, BridgeError> {
        match &*self.state.read().await {
            ConnectionState::Connected(client) => Ok(client.clone()),
            ConnectionState::Stopped { last: Some(client) } => Ok(client.clone()),
            _ => Err(BridgeError::NotConnected),
        }
    }

    /// Issue a worker handle scoped to `task_queue` on the live connection.
    ///
    /// Pure factory: no engine RPC. `NotConnected` without a live connection.
    pub async fn create_worker(
        &self,
        task_queue: &str,
        options: WorkerOptions,
    ) -> Result<WorkerHandle, BridgeError> {
        match &*self.state.read().await {
            ConnectionState::Connected(client) => {
                Ok(client.new_worker(task_queue, options)?)
            }
            _ => Err(BridgeError::NotConnected),
        }
    }

    /// Loaded configuration. No side effects.
    pub fn get_config(&self) -> BridgeConfig {
        self.config.clone()
    }
}

#[async_trait]
impl Service for ConnectionSupervisor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn serve(&self) -> mpsc::Receiver<BridgeError> {
        ConnectionSupervisor::serve(self).await
    }

    async fn stop(&self) -> Result<(), BridgeError> {
        ConnectionSupervisor::stop(self).await
    }
}
