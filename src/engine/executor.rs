// src/engine/executor.rs

use std::sync::{Arc, OnceLock};

use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::config::model::ExecutorConfig;
use crate::dag::graph_controller::GraphController;
use crate::dag::task::Task;
use crate::dag::task_graph::TaskGraph;
use crate::engine::GraphOutcome;
use crate::engine::record::TaskGraphRecord;
use crate::errors::{Result, TaskGraphError};
use crate::exec::coordinator::Coordinator;
use crate::exec::pool::WorkerPool;
use crate::exec::process::{ProcessInfo, StaticProcess};

static DEFAULT_EXECUTOR: OnceLock<TaskGraphExecutor> = OnceLock::new();

/// Runs task graphs on a worker pool plus a coordinator.
///
/// Each [`execute`](Self::execute) call is an independent execution with its
/// own controllers; one executor can run many graphs at once.
pub struct TaskGraphExecutor {
    config: ExecutorConfig,
    pool: WorkerPool,
    coordinator: Arc<dyn Coordinator>,
    process: Arc<dyn ProcessInfo>,
}

impl TaskGraphExecutor {
    pub fn new(
        config: ExecutorConfig,
        coordinator: Arc<dyn Coordinator>,
        process: Arc<dyn ProcessInfo>,
    ) -> Result<Self> {
        let pool = WorkerPool::new(&config)?;
        Ok(Self {
            config,
            pool,
            coordinator,
            process,
        })
    }

    /// Default configuration, running as the primary process.
    pub fn with_coordinator(coordinator: Arc<dyn Coordinator>) -> Result<Self> {
        Self::new(
            ExecutorConfig::default(),
            coordinator,
            Arc::new(StaticProcess::primary()),
        )
    }

    /// Install the process-wide executor. Only the first install wins.
    pub fn install_default(executor: TaskGraphExecutor) -> Result<&'static Self> {
        if DEFAULT_EXECUTOR.set(executor).is_err() {
            return Err(TaskGraphError::Config(
                "a default executor is already installed".to_string(),
            ));
        }
        DEFAULT_EXECUTOR
            .get()
            .ok_or_else(|| TaskGraphError::Config("default executor not installed".to_string()))
    }

    pub fn default_instance() -> Option<&'static Self> {
        DEFAULT_EXECUTOR.get()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Resolve `graph` for this process without running it.
    pub fn prepare(&self, graph: impl Into<Arc<TaskGraph>>) -> GraphController {
        GraphController::new(graph.into(), self.process.as_ref(), &self.config)
    }

    /// Start executing `graph`.
    ///
    /// The dependency graph is resolved and checked for cycles before
    /// anything runs; a cyclic graph is rejected with
    /// [`TaskGraphError::GraphCycle`] and no task body is invoked.
    pub fn execute(&self, graph: impl Into<Arc<TaskGraph>>) -> Result<ExecutionHandle> {
        let controller = self.prepare(graph);
        let name = controller.name().to_string();

        let directed = controller.directed_graph();
        if directed.has_cycle() {
            let dot = directed.to_dot();
            error!(graph = %name, "dependency cycle detected; refusing to execute");
            return Err(TaskGraphError::GraphCycle { graph: name, dot });
        }
        debug!(
            graph = %name,
            tasks = directed.vertex_count(),
            edges = directed.edge_count(),
            "task graph accepted"
        );

        let (record, outcome) =
            TaskGraphRecord::new(controller, self.pool.handle(), Arc::clone(&self.coordinator));
        let starter = Arc::clone(&record);
        self.pool.submit(&name, move || starter.start());
        info!(graph = %name, "task graph submitted");

        Ok(ExecutionHandle {
            name,
            record,
            outcome,
        })
    }

    /// Run a single task as a graph of one, named after the task.
    pub fn execute_task(&self, task: Task) -> Result<ExecutionHandle> {
        let graph = TaskGraph::builder(task.name()).task(task).build();
        self.execute(graph)
    }
}

/// Handle to one running execution.
pub struct ExecutionHandle {
    name: String,
    record: Arc<TaskGraphRecord>,
    outcome: oneshot::Receiver<GraphOutcome>,
}

impl ExecutionHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph_controller(&self) -> &GraphController {
        self.record.controller()
    }

    pub fn is_finished(&self) -> bool {
        self.record.controller().is_finished()
    }

    pub fn is_canceled(&self) -> bool {
        self.record.controller().status().is_canceled()
    }

    /// Interrupt every chain currently blocked waiting on an interceptor.
    pub fn interrupt(&self) {
        self.record.interrupt();
    }

    /// Wait for the graph to end or be canceled.
    pub async fn outcome(self) -> Result<GraphOutcome> {
        self.outcome
            .await
            .map_err(|_| TaskGraphError::Abandoned(self.name))
    }

    /// Blocking variant of [`outcome`](Self::outcome). Must not be called
    /// from inside an async context.
    ///
    /// Refused on the coordinator thread: coordinator tasks of this graph
    /// could never run while it waits.
    pub fn blocking_outcome(self) -> Result<GraphOutcome> {
        if self.record.on_coordinator_thread() {
            error!(graph = %self.name, "blocking_outcome called on the coordinator thread");
            return Err(TaskGraphError::CoordinatorBlocked(self.name));
        }
        self.outcome
            .blocking_recv()
            .map_err(|_| TaskGraphError::Abandoned(self.name))
    }
}
