//! Lifecycle capability implemented by bridge components.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::BridgeError;

/// A component managed by the host lifecycle.
///
/// The host starts services in dependency order and stops them in reverse.
/// `serve` returns an error channel with buffered capacity 1: a startup
/// failure is signaled at most once, and silence within the host's readiness
/// window means success. `stop` is idempotent and never fails for "nothing
/// to stop".
#[async_trait]
pub trait Service: Send + Sync {
    /// Static identifier used in logs and host wiring.
    fn name(&self) -> &'static str;

    /// Start the service, returning its startup error channel.
    async fn serve(&self) -> mpsc::Receiver<BridgeError>;

    /// Stop the service, releasing its resources.
    async fn stop(&self) -> Result<(), BridgeError>;
}
