// src/exec/mod.rs

//! Threads that task chains run on, plus the concrete bodies and
//! interceptors the CLI builds from configuration.
//!
//! - [`pool`] is the bounded worker pool (a tokio blocking pool).
//! - [`coordinator`] is the single-thread coordinator loop.
//! - [`process`] answers "is this the primary process?".
//! - [`command`] turns a shell command into a task body.
//! - [`confirm`] is the interactive confirmation interceptor.

pub mod command;
pub mod confirm;
pub mod coordinator;
pub mod pool;
pub mod process;

/// Unit of work posted to the pool or the coordinator.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub use coordinator::{Coordinator, CoordinatorQueue, CoordinatorRunner, coordinator_channel};
pub use pool::{PoolHandle, WorkerPool};
pub use process::{ProcessInfo, StaticProcess};
