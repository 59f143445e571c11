// src/exec/pool.rs

//! Worker pool backed by a dedicated tokio runtime.
//!
//! Jobs run on the runtime's blocking pool: threads are spawned on demand up
//! to `max_pool_size`, extra jobs wait in an unbounded queue, and idle
//! threads are reclaimed after `keep_alive`. The runtime's core worker
//! threads (`core_pool_size`) only host the join watchers that report
//! panics; no blocking thread is kept warm, so `core_pool_size` does not
//! limit or reserve chain concurrency.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, error, trace};

use crate::config::model::ExecutorConfig;
use crate::errors::{Result, TaskGraphError};

pub struct WorkerPool {
    runtime: Option<Runtime>,
    handle: PoolHandle,
}

impl WorkerPool {
    pub fn new(config: &ExecutorConfig) -> Result<Self> {
        let core = config.core_pool_size;
        let max = config.effective_max_pool_size();
        if core == 0 || max < core {
            return Err(TaskGraphError::Pool(format!(
                "invalid pool sizes: core={core}, max={max}"
            )));
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(core)
            .max_blocking_threads(max)
            .thread_keep_alive(config.keep_alive())
            .thread_name_fn(|| {
                static NEXT: AtomicUsize = AtomicUsize::new(1);
                format!("taskgraph-worker-{}", NEXT.fetch_add(1, Ordering::Relaxed))
            })
            .enable_all()
            .build()
            .map_err(|e| TaskGraphError::Pool(format!("failed to start worker pool: {e}")))?;

        debug!(
            core,
            max,
            keep_alive_ms = config.keep_alive().as_millis() as u64,
            "worker pool started"
        );

        let handle = PoolHandle {
            handle: runtime.handle().clone(),
        };
        Ok(Self {
            runtime: Some(runtime),
            handle,
        })
    }

    /// Cloneable submission handle.
    pub fn handle(&self) -> PoolHandle {
        self.handle.clone()
    }

    pub fn submit<F>(&self, label: &str, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.submit(label, job);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            trace!("worker pool shutting down");
            runtime.shutdown_background();
        }
    }
}

/// Submission side of a [`WorkerPool`].
#[derive(Clone)]
pub struct PoolHandle {
    handle: Handle,
}

impl PoolHandle {
    /// Run `job` on a pool thread. Panics are caught by the pool and logged.
    pub fn submit<F>(&self, label: &str, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let join = self.handle.spawn_blocking(job);
        let label = label.to_string();
        self.handle.spawn(async move {
            if let Err(err) = join.await {
                if err.is_panic() {
                    error!(job = %label, "pool job panicked");
                } else {
                    debug!(job = %label, "pool job dropped before completion");
                }
            }
        });
    }
}
