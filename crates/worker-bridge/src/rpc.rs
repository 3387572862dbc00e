//! RPC facade over the connection supervisor.

use std::sync::Arc;

use engine_client::ClientHandle;

use crate::error::BridgeError;
use crate::supervisor::ConnectionSupervisor;

/// Read-only accessor exposing the active engine client to control callers.
///
/// Pure pass-through: no caching, no retry. Failures are the supervisor's
/// own, including `NotConnected` before any connection exists.
#[derive(Clone)]
pub struct RpcFacade {
    supervisor: Arc<ConnectionSupervisor>,
}

impl RpcFacade {
    /// Build a facade for `supervisor`. Fails when no client handle is
    /// available yet.
    pub async fn for_supervisor(
        supervisor: Arc<ConnectionSupervisor>,
    ) -> Result<Self, BridgeError> {
        supervisor.get_client().await?;
        Ok(Self { supervisor })
    }

    /// Current engine client handle.
    pub async fn get_client(&self) -> Result<ClientHandle, BridgeError> {
        self.supervisor.get_client().await
    }
}
