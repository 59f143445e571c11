// src/exec/coordinator.rs

//! Single-thread coordinator loop.
//!
//! Coordinator-affinity chains and their continuations are posted here and
//! run one at a time, in post order, on whichever thread drives the
//! [`CoordinatorRunner`]. The CLI drives it from `main`.

use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};

use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::exec::Job;

/// Where coordinator-affinity work is posted.
pub trait Coordinator: Send + Sync {
    /// Queue `job`. Never runs it inline.
    fn post(&self, job: Job);

    fn is_coordinator_thread(&self) -> bool;
}

enum Message {
    Run(Job),
    Shutdown,
}

/// Posting side of the coordinator loop.
#[derive(Clone)]
pub struct CoordinatorQueue {
    tx: mpsc::UnboundedSender<Message>,
    thread: Arc<OnceLock<ThreadId>>,
}

/// Receiving side; owns the loop.
pub struct CoordinatorRunner {
    rx: mpsc::UnboundedReceiver<Message>,
    thread: Arc<OnceLock<ThreadId>>,
}

pub fn coordinator_channel() -> (CoordinatorQueue, CoordinatorRunner) {
    let (tx, rx) = mpsc::unbounded_channel();
    let thread = Arc::new(OnceLock::new());
    (
        CoordinatorQueue {
            tx,
            thread: Arc::clone(&thread),
        },
        CoordinatorRunner { rx, thread },
    )
}

impl CoordinatorQueue {
    /// Ask the loop to stop after the jobs already queued.
    pub fn shutdown(&self) {
        if self.tx.send(Message::Shutdown).is_err() {
            trace!("coordinator already stopped");
        }
    }
}

impl Coordinator for CoordinatorQueue {
    fn post(&self, job: Job) {
        if self.tx.send(Message::Run(job)).is_err() {
            warn!("coordinator loop is gone; dropping job");
        }
    }

    fn is_coordinator_thread(&self) -> bool {
        self.thread.get() == Some(&thread::current().id())
    }
}

impl CoordinatorRunner {
    /// Run jobs until shutdown is requested or every queue handle is dropped.
    ///
    /// Must not be called from inside an async context.
    pub fn run(mut self) {
        self.bind_current_thread();
        debug!("coordinator loop started");
        while let Some(message) = self.rx.blocking_recv() {
            match message {
                Message::Run(job) => run_job(job),
                Message::Shutdown => break,
            }
        }
        debug!("coordinator loop stopped");
    }

    /// Run whatever is queued right now without blocking. Returns the
    /// number of jobs run; `None` once shutdown was requested.
    pub fn run_pending(&mut self) -> Option<usize> {
        self.bind_current_thread();
        let mut ran = 0;
        while let Ok(message) = self.rx.try_recv() {
            match message {
                Message::Run(job) => {
                    run_job(job);
                    ran += 1;
                }
                Message::Shutdown => return None,
            }
        }
        Some(ran)
    }

    fn bind_current_thread(&self) {
        let current = thread::current().id();
        if let Err(previous) = self.thread.set(current) {
            if previous != current {
                warn!("coordinator runner moved to a different thread");
            }
        }
    }
}

fn run_job(job: Job) {
    if catch_unwind(AssertUnwindSafe(job)).is_err() {
        error!("coordinator job panicked");
    }
}

/// Drive a coordinator loop on its own named thread.
pub fn spawn_coordinator_thread(name: &str) -> io::Result<(CoordinatorQueue, JoinHandle<()>)> {
    let (queue, runner) = coordinator_channel();
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || runner.run())?;
    Ok((queue, handle))
}
