//! Executor and coordinator fixtures.

use std::sync::Arc;
use std::thread::JoinHandle;

use taskgraph::config::ExecutorConfig;
use taskgraph::engine::TaskGraphExecutor;
use taskgraph::exec::coordinator::{Coordinator, CoordinatorQueue, spawn_coordinator_thread};
use taskgraph::exec::process::{ProcessInfo, StaticProcess};

pub const COORDINATOR_THREAD: &str = "test-coordinator";

/// Coordinator loop on a dedicated thread; stopped and joined on drop.
pub struct TestCoordinator {
    queue: CoordinatorQueue,
    thread: Option<JoinHandle<()>>,
}

impl TestCoordinator {
    pub fn spawn() -> Self {
        let (queue, thread) =
            spawn_coordinator_thread(COORDINATOR_THREAD).expect("spawn coordinator thread");
        Self {
            queue,
            thread: Some(thread),
        }
    }

    pub fn queue(&self) -> CoordinatorQueue {
        self.queue.clone()
    }

    pub fn coordinator(&self) -> Arc<dyn Coordinator> {
        Arc::new(self.queue.clone())
    }
}

impl Drop for TestCoordinator {
    fn drop(&mut self) {
        self.queue.shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Small pool suitable for tests.
pub fn test_config() -> ExecutorConfig {
    ExecutorConfig {
        core_pool_size: 2,
        max_pool_size: Some(4),
        keep_alive_secs: 1,
        enable_trace: true,
        log_graphviz: false,
        primary_process: true,
    }
}

/// Executor + its coordinator thread, running as the primary process.
pub fn test_executor() -> (TaskGraphExecutor, TestCoordinator) {
    test_executor_with(test_config(), Arc::new(StaticProcess::primary()))
}

pub fn test_executor_with(
    config: ExecutorConfig,
    process: Arc<dyn ProcessInfo>,
) -> (TaskGraphExecutor, TestCoordinator) {
    let coordinator = TestCoordinator::spawn();
    let executor = TaskGraphExecutor::new(config, coordinator.coordinator(), process)
        .expect("start test executor");
    (executor, coordinator)
}
