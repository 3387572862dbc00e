//! Taskbridge Worker Bridge
//!
//! Bridges a local pool of worker processes to a remote workflow engine.
//!
//! This crate provides:
//! - Connection supervisor owning the single engine session
//! - Workflow pool manager with hot-swap (reset) of the serving pool
//! - Lifecycle event fan-out to registered listeners
//! - Process-pool runner that spawns and releases worker subprocesses
//! - RPC facade exposing the live engine client to control callers

pub mod config;
pub mod error;
pub mod events;
pub mod pool;
pub mod rpc;
pub mod runner;
pub mod service;
pub mod supervisor;

pub use config::{BridgeConfig, PoolConfig};
pub use error::BridgeError;
pub use events::{BridgeEvent, EventBroadcaster};
pub use pool::WorkflowPoolManager;
pub use rpc::RpcFacade;
pub use service::Service;
pub use supervisor::ConnectionSupervisor;
