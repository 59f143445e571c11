// src/engine/record.rs

//! Per-execution scheduler: tracks what is running and dispatches whatever
//! becomes ready.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::dag::graph::Vertex;
use crate::dag::graph_controller::{ControllerGraph, ControllerRef, GraphController};
use crate::engine::GraphOutcome;
use crate::engine::controller::{ControllerOwner, TaskController};
use crate::errors::TaskCancelled;
use crate::exec::coordinator::Coordinator;
use crate::exec::pool::PoolHandle;
use crate::exec::Job;
use crate::types::Affinity;

struct RecordState {
    /// Working copy of the resolved graph; completed tasks are removed.
    graph: ControllerGraph,
    running: HashSet<ControllerRef>,
}

pub(crate) struct TaskGraphRecord {
    controller: GraphController,
    pool: PoolHandle,
    coordinator: Arc<dyn Coordinator>,
    state: Mutex<RecordState>,
    outcome: Mutex<Option<oneshot::Sender<GraphOutcome>>>,
    this: Weak<TaskGraphRecord>,
}

impl TaskGraphRecord {
    pub(crate) fn new(
        controller: GraphController,
        pool: PoolHandle,
        coordinator: Arc<dyn Coordinator>,
    ) -> (Arc<Self>, oneshot::Receiver<GraphOutcome>) {
        let (tx, rx) = oneshot::channel();
        let graph = controller.directed_graph().clone();
        let record = Arc::new_cyclic(|this| TaskGraphRecord {
            controller,
            pool,
            coordinator,
            state: Mutex::new(RecordState {
                graph,
                running: HashSet::new(),
            }),
            outcome: Mutex::new(Some(tx)),
            this: this.clone(),
        });
        (record, rx)
    }

    pub(crate) fn controller(&self) -> &GraphController {
        &self.controller
    }

    pub(crate) fn on_coordinator_thread(&self) -> bool {
        self.coordinator.is_coordinator_thread()
    }

    fn lock(&self) -> MutexGuard<'_, RecordState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fire the start listeners and dispatch the initial ready set.
    pub(crate) fn start(&self) {
        if !self.controller.start() {
            debug!(graph = %self.controller.name(), "start ignored: graph already started");
            return;
        }
        self.run_next();
    }

    /// Interrupt every chain blocked in a wait.
    pub(crate) fn interrupt(&self) {
        for controller in self.controller.controllers() {
            controller.interrupt();
        }
    }

    fn run_next(&self) {
        let ready = {
            let mut state = self.lock();
            if self.controller.is_finished() {
                return;
            }
            if state.graph.is_empty() {
                None
            } else {
                let ready = ready_set(&state);
                for node in &ready {
                    state.running.insert(node.clone());
                }
                Some(ready)
            }
        };

        let Some(ready) = ready else {
            self.finish_ended();
            return;
        };

        if ready.is_empty() {
            trace!(graph = %self.controller.name(), "nothing ready; waiting for running tasks");
        }
        for node in ready {
            if self.controller.is_finished() {
                debug!(graph = %self.controller.name(), "graph finished; dispatch stopped");
                break;
            }
            self.dispatch(node.controller());
        }
    }

    fn dispatch(&self, controller: &Arc<TaskController>) {
        let Some(owner) = self.this.upgrade() else {
            return;
        };
        controller.attach(owner);

        trace!(
            graph = %self.controller.name(),
            task = %controller.name(),
            affinity = ?controller.affinity(),
            "dispatching task"
        );
        let job_controller = Arc::clone(controller);
        match controller.affinity() {
            Affinity::Coordinator => self.coordinator.post(Box::new(move || job_controller.run())),
            Affinity::Worker => self
                .pool
                .submit(controller.name(), move || job_controller.run()),
        }
    }

    fn finish_ended(&self) {
        if let Some(elapsed) = self.controller.end() {
            self.finish(GraphOutcome::Completed { elapsed });
        }
    }

    fn finish(&self, outcome: GraphOutcome) {
        for controller in self.controller.controllers() {
            controller.detach();
        }
        let sender = self
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            if sender.send(outcome).is_err() {
                trace!(graph = %self.controller.name(), "outcome receiver dropped");
            }
        }
    }
}

impl ControllerOwner for TaskGraphRecord {
    fn on_controller_complete(&self, controller: &Arc<TaskController>) {
        {
            let mut state = self.lock();
            let node = ControllerRef::new(Arc::clone(controller));
            state.running.remove(&node);
            state.graph.remove_vertex(&Vertex::new(node));
        }
        if self.controller.is_finished() {
            return;
        }
        self.run_next();
    }

    fn on_controller_cancel(&self, controller: &Arc<TaskController>, cancel: TaskCancelled) {
        if self.controller.cancel(&cancel) {
            self.finish(GraphOutcome::Canceled(cancel));
        } else {
            warn!(
                graph = %self.controller.name(),
                task = %controller.name(),
                "task canceled after the graph finished"
            );
        }
    }

    fn post_to_coordinator(&self, job: Job) {
        self.coordinator.post(job);
    }
}

/// In-degree-zero vertices not yet running: highest priority first, then
/// name, then build order.
fn ready_set(state: &RecordState) -> Vec<ControllerRef> {
    let mut ready: Vec<ControllerRef> = state
        .graph
        .vertices()
        .filter(|v| state.graph.in_degree(v) == 0 && !state.running.contains(v.value()))
        .map(|v| v.value().clone())
        .collect();
    ready.sort_by(dispatch_order);
    ready
}

fn dispatch_order(a: &ControllerRef, b: &ControllerRef) -> Ordering {
    let (a, b) = (a.controller(), b.controller());
    b.priority()
        .cmp(&a.priority())
        .then_with(|| a.name().cmp(b.name()))
        .then_with(|| a.seq().cmp(&b.seq()))
}
