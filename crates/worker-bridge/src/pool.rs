//! Workflow pool lifecycle management.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use engine_client::{WorkerHandle, WorkerOptions};
use tokio::sync::{mpsc, Mutex, RwLock};
use uuid::Uuid;

use crate::error::BridgeError;
use crate::events::{BridgeEvent, EventBroadcaster, EventListener};
use crate::runner::{PoolRunner, WorkerProcess};
use crate::service::Service;
use crate::supervisor::ConnectionSupervisor;

/// Executable binding for one workflow name.
#[derive(Debug, Clone)]
pub struct WorkflowBinding {
    /// Workflow name, unique within a pool.
    pub name: String,

    /// Task queue dispatches for this workflow are routed through.
    pub task_queue: String,
}

/// Mapping from workflow name to its executable binding.
///
/// Populated from the pool's declared capabilities at build time; read-only
/// afterwards.
#[derive(Debug, Default)]
pub struct WorkflowRegistry {
    workflows: BTreeMap<String, WorkflowBinding>,
}

impl WorkflowRegistry {
    /// Build a registry from the names a pool declared. Duplicate names are
    /// rejected; the pool is not usable with an ambiguous registry.
    pub fn from_declared(names: Vec<String>, task_queue: &str) -> Result<Self, BridgeError> {
        let mut workflows = BTreeMap::new();
        for name in names {
            let binding = WorkflowBinding {
                name: name.clone(),
                task_queue: task_queue.to_string(),
            };
            if workflows.insert(name.clone(), binding).is_some() {
                return Err(BridgeError::PoolBuildFailed(format!(
                    "workflow '{}' declared twice",
                    name
                )));
            }
        }
        Ok(Self { workflows })
    }

    /// Registered workflow names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.workflows.keys().cloned().collect()
    }

    /// Look up the binding for `name`.
    pub fn get(&self, name: &str) -> Option<&WorkflowBinding> {
        self.workflows.get(name)
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.workflows.contains_key(name)
    }

    /// Number of registered workflows.
    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

/// A fully-built worker pool bound to a task queue.
///
/// A pool is only ever observable once its registry, worker handle, and
/// processes are all in place; partially-built pools never become active.
struct Pool {
    id: Uuid,
    registry: WorkflowRegistry,
    worker: WorkerHandle,
    processes: Vec<WorkerProcess>,
}

/// Keeps exactly one pool serving and supports replacing it without a window
/// of zero serving capacity.
///
/// Reset protocol: build the new pool first, atomically swap the active-pool
/// reference, then destroy the previous pool asynchronously. A build failure
/// leaves the previously-active pool untouched.
pub struct WorkflowPoolManager {
    supervisor: Arc<ConnectionSupervisor>,
    runner: Arc<dyn PoolRunner>,
    events: Arc<EventBroadcaster>,
    active: RwLock<Option<Arc<Pool>>>,
    // Serializes serve/reset; a reset that loses the race fails fast.
    swap_gate: Mutex<()>,
}

impl WorkflowPoolManager {
    /// Service identifier.
    pub const NAME: &'static str = "workflows";

    /// Create a manager wired to its collaborators.
    pub fn new(
        supervisor: Arc<ConnectionSupervisor>,
        runner: Arc<dyn PoolRunner>,
        events: Arc<EventBroadcaster>,
    ) -> Self {
        Self {
            supervisor,
            runner,
            events,
            active: RwLock::new(None),
            swap_gate: Mutex::new(()),
        }
    }

    /// Build a pool: worker handle, process spawn + capability discovery,
    /// registry. Any failure aborts the build with prior state untouched.
    async fn build_pool(&self) -> Result<Pool, BridgeError> {
        let config = self.supervisor.get_config().pool;
        let id = Uuid::new_v4();

        let options = WorkerOptions {
            identity: Some(format!("taskbridge-{}", id)),
            ..WorkerOptions::default()
        };
        let worker = self
            .supervisor
            .create_worker(&config.task_queue, options)
            .await?;

        let build = self.runner.build(&config).await?;
        let registry = WorkflowRegistry::from_declared(build.workflows, &config.task_queue)?;

        // The connection may have died during the spawn; a pool bound to an
        // invalid handle must fail now, not hang later.
        worker.ensure_valid()?;

        Ok(Pool {
            id,
            registry,
            worker,
            processes: build.processes,
        })
    }

    /// Make `pool` active and schedule destruction of its predecessor.
    async fn swap_in(&self, pool: Pool) {
        let workflows = pool.registry.names();
        let pool = Arc::new(pool);

        let previous = {
            let mut active = self.active.write().await;
            std::mem::replace(&mut *active, Some(pool.clone()))
        };

        self.events.emit(BridgeEvent::PoolStarted {
            pool_id: pool.id,
            workflows: workflows.clone(),
        });
        tracing::info!(
            pool_id = %pool.id,
            workflows = ?workflows,
            "Started workflow processing"
        );

        if let Some(previous) = previous {
            self.events.emit(BridgeEvent::PoolSwapped {
                previous: previous.id,
                current: pool.id,
            });

            let grace = self.supervisor.get_config().pool.grace_period;
            let runner = self.runner.clone();
            let events = self.events.clone();
            tokio::spawn(async move {
                destroy_pool(runner, events, previous, grace).await;
            });
        }
    }

    /// Build a pool and make it active.
    ///
    /// Returns the startup error channel: a build failure is signaled once
    /// and the manager stays idle; silence means the pool is serving.
    pub async fn serve(&self) -> mpsc::Receiver<BridgeError> {
        let (tx, rx) = mpsc::channel(1);

        let _gate = self.swap_gate.lock().await;
        match self.build_pool().await {
            Ok(pool) => self.swap_in(pool).await,
            Err(e) => {
                tracing::error!(error = %e, "Workflow pool start failed");
                let _ = tx.try_send(e);
            }
        }

        rx
    }

    /// Replace the active pool with a freshly-built one.
    ///
    /// Build-before-swap-before-destroy: the manager is never without a
    /// serving pool, and a build failure leaves the active pool running
    /// unchanged. Safe to call before `serve`; with no baseline pool this is
    /// simply a fresh build and there is nothing to destroy. A concurrent
    /// reset fails fast with `ResetInProgress`.
    pub async fn reset(&self) -> Result<(), BridgeError> {
        let _gate = self
            .swap_gate
            .try_lock()
            .map_err(|_| BridgeError::ResetInProgress)?;

        tracing::debug!("Reset workflow pool");
        let pool = self.build_pool().await?;
        self.swap_in(pool).await;
        Ok(())
    }

    /// Destroy the active pool if present. Idempotent.
    pub async fn stop(&self) -> Result<(), BridgeError> {
        let previous = self.active.write().await.take();

        if let Some(previous) = previous {
            let grace = self.supervisor.get_config().pool.grace_period;
            destroy_pool(self.runner.clone(), self.events.clone(), previous, grace).await;
        }

        Ok(())
    }

    /// Worker processes of the active pool, for external supervision.
    pub async fn workers(&self) -> Vec<WorkerProcess> {
        match &*self.active.read().await {
            Some(pool) => pool.processes.clone(),
            None => Vec::new(),
        }
    }

    /// Workflow names registered on the active pool.
    pub async fn workflows(&self) -> Vec<String> {
        match &*self.active.read().await {
            Some(pool) => pool.registry.names(),
            None => Vec::new(),
        }
    }

    /// Whether a pool is currently serving.
    pub async fn is_serving(&self) -> bool {
        self.active.read().await.is_some()
    }

    /// Register a lifecycle event listener.
    ///
    /// Registration is manager-scoped: listeners receive events for the
    /// current pool and every subsequently swapped-in pool.
    pub fn add_listener(&self, listener: EventListener) {
        self.events.add_listener(listener);
    }
}

/// Release a pool's processes within the grace period, then mark it
/// destroyed. Forced release is observed through events only.
async fn destroy_pool(
    runner: Arc<dyn PoolRunner>,
    events: Arc<EventBroadcaster>,
    pool: Arc<Pool>,
    grace: Duration,
) {
    let outcome = runner.destroy(pool.processes.clone(), grace).await;

    events.emit(BridgeEvent::WorkersReleased {
        pool_id: pool.id,
        forced: outcome.forced,
    });
    events.emit(BridgeEvent::PoolDestroyed { pool_id: pool.id });

    tracing::debug!(
        pool_id = %pool.id,
        task_queue = %pool.worker.task_queue(),
        forced = outcome.forced,
        "Pool destroyed"
    );
}

#[async_trait]
impl Service for WorkflowPoolManager {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn serve(&self) -> mpsc::Receiver<BridgeError> {
        WorkflowPoolManager::serve(self).await
    }

    async fn stop(&self) -> Result<(), BridgeError> {
        WorkflowPoolManager::stop(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BridgeConfig, PoolConfig};
    use crate::runner::{DestroyOutcome, PoolBuild};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Runner double: declares a fixed workflow set, tracks destroyed pools.
    struct FakeRunner {
        workflows: Vec<String>,
        fail_next_build: AtomicBool,
        build_delay: Duration,
        force_release: bool,
        destroyed: StdMutex<Vec<Uuid>>,
    }

    impl FakeRunner {
        fn declaring(workflows: &[&str]) -> Self {
            Self {
                workflows: workflows.iter().map(|s| s.to_string()).collect(),
                fail_next_build: AtomicBool::new(false),
                build_delay: Duration::ZERO,
                force_release: false,
                destroyed: StdMutex::new(Vec::new()),
            }
        }

        fn destroyed_ids(&self) -> Vec<Uuid> {
            self.destroyed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PoolRunner for FakeRunner {
        async fn build(&self, _config: &PoolConfig) -> Result<PoolBuild, BridgeError> {
            if !self.build_delay.is_zero() {
                tokio::time::sleep(self.build_delay).await;
            }
            if self.fail_next_build.swap(false, Ordering::SeqCst) {
                return Err(BridgeError::PoolBuildFailed("spawn failed".to_string()));
            }
            Ok(PoolBuild {
                processes: vec![WorkerProcess::new(None, None)],
                workflows: self.workflows.clone(),
            })
        }

        async fn destroy(
            &self,
            processes: Vec<WorkerProcess>,
            _grace: Duration,
        ) -> DestroyOutcome {
            let mut destroyed = self.destroyed.lock().unwrap();
            for process in &processes {
                destroyed.push(process.id());
            }
            DestroyOutcome {
                forced: self.force_release,
            }
        }
    }

    async fn connected_supervisor(events: Arc<EventBroadcaster>) -> Arc<ConnectionSupervisor> {
        let config = BridgeConfig {
            address: "engine:7233".to_string(),
            namespace: "default".to_string(),
            ..BridgeConfig::default()
        };
        let supervisor = Arc::new(ConnectionSupervisor::new(config, events));
        let mut rx = supervisor.serve().await;
        assert!(rx.try_recv().is_err(), "connect should be silent");
        supervisor
    }

    async fn manager_with(
        runner: Arc<FakeRunner>,
    ) -> (WorkflowPoolManager, Arc<ConnectionSupervisor>) {
        let events = Arc::new(EventBroadcaster::new());
        let supervisor = connected_supervisor(events.clone()).await;
        let manager =
            WorkflowPoolManager::new(supervisor.clone(), runner, events);
        (manager, supervisor)
    }

    #[tokio::test]
    async fn test_serve_then_reset_scenario() {
        let runner = Arc::new(FakeRunner::declaring(&["OrderFlow", "RefundFlow"]));
        let (manager, _supervisor) = manager_with(runner.clone()).await;

        let mut rx = manager.serve().await;
        assert!(rx.try_recv().is_err());
        assert_eq!(manager.workflows().await, vec!["OrderFlow", "RefundFlow"]);

        let before = manager.workers().await;
        assert_eq!(before.len(), 1);

        manager.reset().await.unwrap();

        let after = manager.workers().await;
        assert_eq!(after.len(), 1);
        assert_ne!(before[0].id(), after[0].id());

        // The old pool's processes are released once the async destroy runs.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runner.destroyed_ids(), vec![before[0].id()]);
    }

    #[tokio::test]
    async fn test_reset_before_serve_builds_fresh() {
        let runner = Arc::new(FakeRunner::declaring(&["OrderFlow"]));
        let (manager, _supervisor) = manager_with(runner.clone()).await;

        manager.reset().await.unwrap();

        assert!(manager.is_serving().await);
        assert_eq!(manager.workers().await.len(), 1);
        // No baseline pool existed, so nothing was destroyed.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(runner.destroyed_ids().is_empty());
    }

    #[tokio::test]
    async fn test_failed_reset_leaves_active_pool_untouched() {
        let runner = Arc::new(FakeRunner::declaring(&["OrderFlow"]));
        let (manager, _supervisor) = manager_with(runner.clone()).await;

        let _rx = manager.serve().await;
        let before = manager.workers().await;
        assert_eq!(before.len(), 1);

        runner.fail_next_build.store(true, Ordering::SeqCst);
        assert!(matches!(
            manager.reset().await,
            Err(BridgeError::PoolBuildFailed(_))
        ));

        let after = manager.workers().await;
        assert_eq!(after.len(), 1);
        assert_eq!(before[0].id(), after[0].id());
        assert_eq!(manager.workflows().await, vec!["OrderFlow"]);
        assert!(runner.destroyed_ids().is_empty());
    }

    #[tokio::test]
    async fn test_reset_is_idempotent_in_effect() {
        let runner = Arc::new(FakeRunner::declaring(&["OrderFlow", "RefundFlow"]));
        let (manager, _supervisor) = manager_with(runner).await;

        let _rx = manager.serve().await;
        for _ in 0..3 {
            manager.reset().await.unwrap();
            assert_eq!(manager.workflows().await, vec!["OrderFlow", "RefundFlow"]);
            assert!(manager.is_serving().await);
        }
    }

    #[tokio::test]
    async fn test_manager_never_transiently_poolless_across_resets() {
        let runner = Arc::new(FakeRunner::declaring(&["OrderFlow"]));
        let (manager, _supervisor) = manager_with(runner).await;
        let manager = Arc::new(manager);

        let _rx = manager.serve().await;

        let observer = {
            let manager = manager.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    assert!(manager.is_serving().await, "observed a null active pool");
                    tokio::task::yield_now().await;
                }
            })
        };

        for _ in 0..10 {
            manager.reset().await.unwrap();
        }

        observer.await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_reset_fails_fast() {
        let mut runner = FakeRunner::declaring(&["OrderFlow"]);
        runner.build_delay = Duration::from_millis(100);
        let runner = Arc::new(runner);

        let (manager, _supervisor) = manager_with(runner).await;
        let manager = Arc::new(manager);

        let first = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.reset().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(matches!(
            manager.reset().await,
            Err(BridgeError::ResetInProgress)
        ));
        first.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_serve_failure_stays_idle() {
        let runner = Arc::new(FakeRunner::declaring(&["OrderFlow"]));
        runner.fail_next_build.store(true, Ordering::SeqCst);
        let (manager, _supervisor) = manager_with(runner).await;

        let mut rx = manager.serve().await;
        assert!(matches!(rx.recv().await, Some(BridgeError::PoolBuildFailed(_))));
        assert!(!manager.is_serving().await);
        assert!(manager.workers().await.is_empty());
    }

    #[tokio::test]
    async fn test_serve_requires_connection() {
        let runner = Arc::new(FakeRunner::declaring(&["OrderFlow"]));
        let (manager, supervisor) = manager_with(runner).await;

        supervisor.stop().await.unwrap();

        let mut rx = manager.serve().await;
        assert!(matches!(rx.recv().await, Some(BridgeError::NotConnected)));
        assert!(!manager.is_serving().await);
    }

    #[tokio::test]
    async fn test_stop_destroys_active_pool_and_is_idempotent() {
        let runner = Arc::new(FakeRunner::declaring(&["OrderFlow"]));
        let (manager, _supervisor) = manager_with(runner.clone()).await;

        let _rx = manager.serve().await;
        let workers = manager.workers().await;

        manager.stop().await.unwrap();
        assert!(!manager.is_serving().await);
        assert_eq!(runner.destroyed_ids(), vec![workers[0].id()]);

        // Nothing left to stop; still not a fault.
        manager.stop().await.unwrap();
        assert_eq!(runner.destroyed_ids().len(), 1);
    }

    #[tokio::test]
    async fn test_listeners_survive_pool_swaps() {
        let runner = Arc::new(FakeRunner::declaring(&["OrderFlow"]));
        let (manager, _supervisor) = manager_with(runner).await;

        let started = Arc::new(StdMutex::new(Vec::new()));
        let sink = started.clone();
        manager.add_listener(Box::new(move |event| {
            if let BridgeEvent::PoolStarted { pool_id, .. } = event {
                sink.lock().unwrap().push(*pool_id);
            }
        }));

        let _rx = manager.serve().await;
        manager.reset().await.unwrap();

        let seen = started.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_ne!(seen[0], seen[1]);
    }

    #[tokio::test]
    async fn test_forced_release_emits_single_event() {
        let mut runner = FakeRunner::declaring(&["OrderFlow"]);
        runner.force_release = true;
        let runner = Arc::new(runner);
        let (manager, _supervisor) = manager_with(runner).await;

        let forced = Arc::new(StdMutex::new(0usize));
        let sink = forced.clone();
        manager.add_listener(Box::new(move |event| {
            if matches!(event, BridgeEvent::WorkersReleased { forced: true, .. }) {
                *sink.lock().unwrap() += 1;
            }
        }));

        let _rx = manager.serve().await;
        manager.stop().await.unwrap();

        assert_eq!(*forced.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_graceful_release_emits_no_forced_event() {
        let runner = Arc::new(FakeRunner::declaring(&["OrderFlow"]));
        let (manager, _supervisor) = manager_with(runner).await;

        let forced = Arc::new(StdMutex::new(0usize));
        let sink = forced.clone();
        manager.add_listener(Box::new(move |event| {
            if matches!(event, BridgeEvent::WorkersReleased { forced: true, .. }) {
                *sink.lock().unwrap() += 1;
            }
        }));

        let _rx = manager.serve().await;
        manager.stop().await.unwrap();

        assert_eq!(*forced.lock().unwrap(), 0);
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let err = WorkflowRegistry::from_declared(
            vec!["OrderFlow".to_string(), "OrderFlow".to_string()],
            "orders",
        );
        assert!(matches!(err, Err(BridgeError::PoolBuildFailed(_))));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = WorkflowRegistry::from_declared(
            vec!["RefundFlow".to_string(), "OrderFlow".to_string()],
            "orders",
        )
        .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
        assert!(registry.contains("OrderFlow"));
        assert!(!registry.contains("PaymentFlow"));
        let binding = registry.get("RefundFlow").unwrap();
        assert_eq!(binding.name, "RefundFlow");
        assert_eq!(binding.task_queue, "orders");
        // Names come back sorted regardless of declaration order.
        assert_eq!(registry.names(), vec!["OrderFlow", "RefundFlow"]);
    }
}
