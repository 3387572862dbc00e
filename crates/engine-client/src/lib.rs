//! Taskbridge Engine Client
//!
//! Client library for the workflow engine. A [`ClientHandle`] represents one
//! session with the engine; [`WorkerHandle`]s are task-queue-scoped
//! capabilities issued from a live handle.
//!
//! This crate provides:
//! - Lazy session establishment (no engine RPC until a call is made)
//! - Task-queue worker handle factory
//! - Fallible engine calls that fail fast on a closed handle

pub mod client;
pub mod error;
pub mod worker;

pub use client::ClientHandle;
pub use error::EngineError;
pub use worker::{WorkerHandle, WorkerOptions};
