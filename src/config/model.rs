// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::types::{Affinity, ProcessScope};

/// Configuration as read from TOML, before validation.
///
/// ```toml
/// [executor]
/// core_pool_size = 4
///
/// [graph]
/// name = "startup"
/// first = "init"
///
/// [task.init]
/// cmd = "echo init"
///
/// [task.A]
/// cmd = "sleep 1"
/// after = ["B"]
/// affinity = "coordinator"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub graph: GraphSection,

    /// `[task.<name>]` tables keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// Validated configuration. Only obtainable through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub executor: ExecutorConfig,
    pub graph: GraphSection,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        executor: ExecutorConfig,
        graph: GraphSection,
        task: BTreeMap<String, TaskConfig>,
    ) -> Self {
        Self {
            executor,
            graph,
            task,
        }
    }

    /// Tasks other than the `first` / `last` barriers.
    pub fn regular_tasks(&self) -> impl Iterator<Item = (&String, &TaskConfig)> {
        self.task.iter().filter(move |(name, _)| {
            Some(name.as_str()) != self.graph.first.as_deref()
                && Some(name.as_str()) != self.graph.last.as_deref()
        })
    }
}

/// `[executor]` section; also the programmatic executor configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Core threads of the pool runtime. These host bookkeeping (job
    /// watchers, timers), not task chains; chain concurrency is bounded by
    /// `max_pool_size` alone. Default: `max(2 * parallelism, 4)`.
    pub core_pool_size: usize,

    /// Upper bound on concurrently running worker chains. Threads are
    /// started on demand up to this many.
    /// Default: `max(core_pool_size, 2 * parallelism)`.
    pub max_pool_size: Option<usize>,

    /// Idle pool threads are reclaimed after this many seconds.
    pub keep_alive_secs: u64,

    /// Run each task body inside a tracing span.
    pub enable_trace: bool,

    /// Log the resolved graph as DOT when an execution is prepared.
    pub log_graphviz: bool,

    /// Whether this process is the primary one.
    pub primary_process: bool,
}

impl ExecutorConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn effective_max_pool_size(&self) -> usize {
        self.max_pool_size
            .unwrap_or_else(|| self.core_pool_size.max(2 * parallelism()))
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            core_pool_size: (2 * parallelism()).max(4),
            max_pool_size: None,
            keep_alive_secs: 30,
            enable_trace: false,
            log_graphviz: false,
            primary_process: true,
        }
    }
}

fn parallelism() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

/// `[graph]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphSection {
    pub name: String,

    /// Task that runs before every other task.
    pub first: Option<String>,

    /// Task that runs after every other task.
    pub last: Option<String>,
}

impl Default for GraphSection {
    fn default() -> Self {
        Self {
            name: "taskgraph".to_string(),
            first: None,
            last: None,
        }
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Shell command run as the task body.
    pub cmd: String,

    /// Names of tasks this one waits for.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub affinity: Affinity,

    #[serde(default)]
    pub process: ProcessScope,

    /// Higher runs first among tasks that are ready together.
    #[serde(default)]
    pub priority: i32,

    /// Ask on the terminal before running.
    #[serde(default)]
    pub confirm: bool,
}
