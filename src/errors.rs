// src/errors.rs

//! Crate-wide error types.
//!
//! [`TaskGraphError`] covers everything that is rejected synchronously:
//! bad configuration, malformed graphs, pool start-up failures.
//! Cancellation is a separate type ([`TaskCancelled`]): it is an outcome of
//! an execution, reported to graph listeners.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskGraphError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Cycle detected in task graph '{graph}':\n{dot}")]
    GraphCycle { graph: String, dot: String },

    #[error("Vertex not present in graph: {0}")]
    MissingVertex(String),

    #[error("Task '{0}' has no body")]
    MissingBody(String),

    #[error("Worker pool error: {0}")]
    Pool(String),

    #[error("Execution of '{0}' ended without an outcome")]
    Abandoned(String),

    #[error("Waiting for '{0}' on the coordinator thread would deadlock it")]
    CoordinatorBlocked(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskGraphError>;

/// Why a task controller stopped its chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    /// An interceptor (named here) called `cancel()`.
    Interceptor(String),
    /// The thread blocked in the chain wait was interrupted.
    ThreadInterrupted,
    /// The task body returned an error or panicked.
    BodyFailed(String),
}

/// Structured cancellation signal raised by a task controller and
/// propagated to the graph-level cancel listeners.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{task} canceled, because {}", describe(.reason))]
pub struct TaskCancelled {
    /// Name of the task whose chain was canceled.
    pub task: String,
    pub reason: CancelReason,
    /// `true` when the cancellation came from an interruption rather than
    /// an explicit `cancel()` call.
    pub interrupted: bool,
}

impl TaskCancelled {
    pub fn by_interceptor(task: impl Into<String>, interceptor: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            reason: CancelReason::Interceptor(interceptor.into()),
            interrupted: false,
        }
    }

    pub fn interrupted(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            reason: CancelReason::ThreadInterrupted,
            interrupted: true,
        }
    }

    pub fn body_failed(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            reason: CancelReason::BodyFailed(message.into()),
            interrupted: true,
        }
    }
}

fn describe(reason: &CancelReason) -> String {
    match reason {
        CancelReason::Interceptor(name) => format!("{name} cancel"),
        CancelReason::ThreadInterrupted => "thread interrupted".to_string(),
        CancelReason::BodyFailed(msg) => format!("task body failed: {msg}"),
    }
}
