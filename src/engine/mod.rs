// src/engine/mod.rs

//! Execution engine.
//!
//! - [`interceptor`] defines the pre-execution hook trait and the chain
//!   handle interceptors use to continue or veto a task.
//! - [`controller`] is the per-task state machine.
//! - [`record`] schedules one execution of a graph.
//! - [`executor`] is the public entry point that validates graphs and hands
//!   them to the pool.

use std::time::Duration;

use crate::errors::TaskCancelled;

pub mod controller;
pub mod executor;
pub mod interceptor;
pub(crate) mod record;

/// How an execution finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphOutcome {
    Completed { elapsed: Duration },
    Canceled(TaskCancelled),
}

impl GraphOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, GraphOutcome::Completed { .. })
    }
}

pub use controller::{ChainPhase, ControllerOwner, TaskController};
pub use executor::{ExecutionHandle, TaskGraphExecutor};
pub use interceptor::{FnInterceptor, InterceptorChain, TaskInterceptor, interceptor_fn};
