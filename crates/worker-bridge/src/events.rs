//! Lifecycle event fan-out.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle events emitted by the supervisor and the pool manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// Engine connection established.
    ConnectionEstablished { address: String, namespace: String },

    /// Engine connection closed.
    ConnectionClosed { address: String },

    /// A pool finished building and became active.
    PoolStarted { pool_id: Uuid, workflows: Vec<String> },

    /// The active pool was replaced during a reset.
    PoolSwapped { previous: Uuid, current: Uuid },

    /// A pool's worker processes were released.
    ///
    /// `forced` is true when the grace period elapsed before in-flight work
    /// finished and the processes were killed.
    WorkersReleased { pool_id: Uuid, forced: bool },

    /// A pool was fully destroyed.
    PoolDestroyed { pool_id: Uuid },
}

impl BridgeEvent {
    /// Short name used in log fields.
    pub fn name(&self) -> &'static str {
        match self {
            BridgeEvent::ConnectionEstablished { .. } => "connection.established",
            BridgeEvent::ConnectionClosed { .. } => "connection.closed",
            BridgeEvent::PoolStarted { .. } => "pool.started",
            BridgeEvent::PoolSwapped { .. } => "pool.swapped",
            BridgeEvent::WorkersReleased { .. } => "workers.released",
            BridgeEvent::PoolDestroyed { .. } => "pool.destroyed",
        }
    }
}

/// Registered event sink.
pub type EventListener = Box<dyn Fn(&BridgeEvent) + Send + Sync>;

/// Fan-out of lifecycle events to registered listeners.
///
/// Delivery is in registration order and best-effort: a listener that panics
/// does not prevent delivery to subsequent listeners and never propagates
/// back to the emitting component. There is no removal; registrations live
/// for the process lifetime.
#[derive(Default)]
pub struct EventBroadcaster {
    listeners: Mutex<Vec<Arc<dyn Fn(&BridgeEvent) + Send + Sync>>>,
}

impl EventBroadcaster {
    /// Create an empty broadcaster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn add_listener(&self, listener: EventListener) {
        self.listeners.lock().unwrap().push(Arc::from(listener));
    }

    /// Deliver `event` to every listener registered at the time of the call.
    ///
    /// The registration lock is not held during delivery, so a listener may
    /// register further listeners or emit follow-up events without
    /// deadlocking; listeners added mid-delivery see subsequent events only.
    pub fn emit(&self, event: BridgeEvent) {
        tracing::debug!(event = event.name(), "Lifecycle event");

        let snapshot: Vec<_> = self.listeners.lock().unwrap().clone();
        for listener in &snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                tracing::warn!(event = event.name(), "Event listener panicked");
            }
        }
    }
}
