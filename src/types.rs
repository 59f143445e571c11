use std::str::FromStr;
use serde::Deserialize;

/// Which thread a task's chain runs on.
///
/// - `Worker`: any thread of the worker pool; a paused interceptor step
///   blocks that worker until `proceed()` / `cancel()`.
/// - `Coordinator`: the single coordinator thread; paused steps never
///   block it, continuations are re-posted instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Affinity {
    Worker,
    Coordinator,
}

impl Default for Affinity {
    fn default() -> Self {
        Affinity::Worker
    }
}

impl FromStr for Affinity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "worker" => Ok(Affinity::Worker),
            "coordinator" | "main" => Ok(Affinity::Coordinator),
            other => Err(format!(
                "invalid affinity: {other} (expected \"worker\" or \"coordinator\")"
            )),
        }
    }
}

/// Which processes a task applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessScope {
    /// Only the designated primary process runs this task.
    Primary,
    /// Every process runs this task.
    Any,
}

impl Default for ProcessScope {
    fn default() -> Self {
        ProcessScope::Primary
    }
}

impl FromStr for ProcessScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "primary" => Ok(ProcessScope::Primary),
            "any" => Ok(ProcessScope::Any),
            other => Err(format!(
                "invalid process scope: {other} (expected \"primary\" or \"any\")"
            )),
        }
    }
}
