// src/engine/controller.rs

//! Per-task execution state machine.
//!
//! A [`TaskController`] drives one task through its interceptor chain and
//! then its body. The chain is a FIFO of steps: the task's interceptors in
//! order, followed by one terminal step that runs the body.
//!
//! Phases:
//!
//! ```text
//! Idle -> Intercepting -> Proceeding -> Intercepting ... -> Running -> Completed
//!              \______________ cancel / interrupt / body failure ______-> Canceled
//! ```
//!
//! Worker-affinity controllers run the whole chain on one pool thread and
//! block on a condition variable while an interceptor holds its step.
//! Coordinator-affinity controllers never block: each `proceed()` posts the
//! next step back to the coordinator.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, error, info_span, trace, warn};

use crate::dag::graph_controller::GraphStatus;
use crate::dag::task::{Dependency, Task, TaskListener};
use crate::engine::interceptor::{InterceptorChain, TaskInterceptor};
use crate::errors::TaskCancelled;
use crate::exec::Job;
use crate::types::Affinity;

/// Name reported for the terminal body step.
const BODY_STEP: &str = "task body";

/// Receives the terminal signal of a controller it dispatched.
///
/// At most one of `on_controller_complete` / `on_controller_cancel` is
/// delivered per controller, and the owner is released right before.
pub trait ControllerOwner: Send + Sync {
    fn on_controller_complete(&self, controller: &Arc<TaskController>);

    fn on_controller_cancel(&self, controller: &Arc<TaskController>, cancel: TaskCancelled);

    /// Schedule a continuation on the coordinator thread.
    fn post_to_coordinator(&self, job: Job);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainPhase {
    Idle,
    Intercepting,
    Proceeding,
    Running,
    Completed,
    Canceled,
}

impl ChainPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, ChainPhase::Completed | ChainPhase::Canceled)
    }
}

enum Step {
    Intercept(Arc<dyn TaskInterceptor>),
    RunBody,
}

struct ChainState {
    phase: ChainPhase,
    queue: VecDeque<Step>,
    /// Number of steps taken so far; the current step's token.
    step: usize,
    /// `proceed()` accepted for `step` and not yet consumed.
    resume: bool,
    interrupt_pending: bool,
    owner: Option<Arc<dyn ControllerOwner>>,
}

pub struct TaskController {
    task: Arc<Task>,
    seq: usize,
    listeners: Vec<Arc<dyn TaskListener>>,
    step_names: Vec<String>,
    status: Arc<GraphStatus>,
    trace_body: bool,
    state: Mutex<ChainState>,
    wake: Condvar,
}

impl TaskController {
    /// Wrap `task` for one execution.
    ///
    /// `extra_listeners` (graph-wide task listeners) run after the task's own.
    pub fn new(
        task: Arc<Task>,
        seq: usize,
        extra_listeners: &[Arc<dyn TaskListener>],
        status: Arc<GraphStatus>,
        trace_body: bool,
    ) -> Self {
        let listeners = task
            .listeners()
            .iter()
            .chain(extra_listeners)
            .cloned()
            .collect();

        let mut queue: VecDeque<Step> = task
            .interceptors()
            .iter()
            .cloned()
            .map(Step::Intercept)
            .collect();
        queue.push_back(Step::RunBody);

        let mut step_names: Vec<String> = task.interceptors().iter().map(|i| i.name()).collect();
        step_names.push(BODY_STEP.to_string());

        Self {
            task,
            seq,
            listeners,
            step_names,
            status,
            trace_body,
            state: Mutex::new(ChainState {
                phase: ChainPhase::Idle,
                queue,
                step: 0,
                resume: false,
                interrupt_pending: false,
                owner: None,
            }),
            wake: Condvar::new(),
        }
    }

    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    pub fn name(&self) -> &str {
        self.task.name()
    }

    /// Position of the task in graph build order.
    pub fn seq(&self) -> usize {
        self.seq
    }

    pub fn priority(&self) -> i32 {
        self.task.priority()
    }

    pub fn affinity(&self) -> Affinity {
        self.task.affinity()
    }

    pub fn depends_on(&self) -> &[Dependency] {
        self.task.depends_on()
    }

    pub fn phase(&self) -> ChainPhase {
        self.lock().phase
    }

    pub fn is_canceled(&self) -> bool {
        self.phase() == ChainPhase::Canceled
    }

    pub fn is_completed(&self) -> bool {
        self.phase() == ChainPhase::Completed
    }

    /// Register who receives this controller's terminal signal.
    pub fn attach(&self, owner: Arc<dyn ControllerOwner>) {
        self.lock().owner = Some(owner);
    }

    /// Drop the owner and wake any blocked wait so it can observe that the
    /// graph has finished.
    pub fn detach(&self) {
        let owner = self.lock().owner.take();
        self.wake.notify_all();
        drop(owner);
    }

    /// Start the chain on the calling thread.
    ///
    /// Worker affinity: returns once the chain reaches a terminal phase or the
    /// graph finishes. Coordinator affinity: returns as soon as the current
    /// step yields.
    pub fn run(self: &Arc<Self>) {
        match self.affinity() {
            Affinity::Worker => self.run_blocking(),
            Affinity::Coordinator => self.advance(),
        }
    }

    /// Request interruption of a blocked chain wait.
    ///
    /// The wait turns it into a `ThreadInterrupted` cancellation. Only a
    /// worker chain held on an unreleased interceptor step is affected;
    /// idle, running and terminal controllers ignore it.
    pub fn interrupt(&self) {
        let mut state = self.lock();
        let held = self.affinity() == Affinity::Worker
            && state.phase == ChainPhase::Intercepting
            && !state.resume;
        if !held {
            trace!(task = %self.name(), phase = ?state.phase, "interrupt ignored: chain not waiting");
            return;
        }
        state.interrupt_pending = true;
        drop(state);
        self.wake.notify_all();
    }

    /// Cancel the chain from outside an interceptor.
    pub fn cancel(self: &Arc<Self>) {
        let interceptor = {
            let state = self.lock();
            self.step_label(state.step)
        };
        self.cancel_with(TaskCancelled::by_interceptor(self.name(), interceptor));
    }

    pub(crate) fn proceed_step(self: &Arc<Self>, step: usize) {
        let owner = {
            let mut state = self.lock();
            if state.phase.is_terminal() || self.status.is_finished() {
                trace!(task = %self.name(), step, "proceed ignored: chain already finished");
                return;
            }
            if state.step != step || state.resume || state.phase != ChainPhase::Intercepting {
                trace!(task = %self.name(), step, "proceed ignored: step already released");
                return;
            }
            state.resume = true;
            state.phase = ChainPhase::Proceeding;

            match self.affinity() {
                Affinity::Worker => {
                    drop(state);
                    self.wake.notify_all();
                    return;
                }
                Affinity::Coordinator => state.owner.clone(),
            }
        };

        match owner {
            Some(owner) => {
                let this = Arc::clone(self);
                owner.post_to_coordinator(Box::new(move || this.advance()));
            }
            None => debug!(task = %self.name(), step, "proceed with no owner attached; dropping"),
        }
    }

    pub(crate) fn cancel_step(self: &Arc<Self>, step: usize) {
        let interceptor = self.step_label(step);
        self.cancel_with(TaskCancelled::by_interceptor(self.name(), interceptor));
    }

    fn step_label(&self, step: usize) -> String {
        step.checked_sub(1)
            .and_then(|idx| self.step_names.get(idx))
            .cloned()
            .unwrap_or_else(|| "controller".to_string())
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pop the next step and enter its phase.
    fn next_step(&self) -> Option<(usize, Step)> {
        let mut state = self.lock();
        if state.phase.is_terminal() || self.status.is_finished() {
            return None;
        }
        let step = state.queue.pop_front()?;
        state.step += 1;
        state.resume = false;
        state.interrupt_pending = false;
        state.phase = match step {
            Step::Intercept(_) => ChainPhase::Intercepting,
            Step::RunBody => ChainPhase::Running,
        };
        Some((state.step, step))
    }

    /// Coordinator affinity: run exactly one step, then yield.
    fn advance(self: &Arc<Self>) {
        let Some((step, next)) = self.next_step() else {
            return;
        };
        match next {
            Step::Intercept(interceptor) => {
                trace!(task = %self.name(), step, interceptor = %interceptor.name(), "intercept");
                interceptor.intercept(InterceptorChain::new(Arc::clone(self), step));
            }
            Step::RunBody => self.run_body(),
        }
    }

    /// Worker affinity: run the whole chain, blocking between steps.
    fn run_blocking(self: &Arc<Self>) {
        while let Some((step, next)) = self.next_step() {
            match next {
                Step::Intercept(interceptor) => {
                    trace!(task = %self.name(), step, interceptor = %interceptor.name(), "intercept");
                    interceptor.intercept(InterceptorChain::new(Arc::clone(self), step));
                    if !self.await_release(step) {
                        return;
                    }
                }
                Step::RunBody => {
                    self.run_body();
                    return;
                }
            }
        }
    }

    /// Block until `step` is released by `proceed()`. Returns `false` when
    /// the chain must stop instead.
    fn await_release(self: &Arc<Self>, step: usize) -> bool {
        let mut state = self.lock();
        loop {
            if state.phase.is_terminal() || self.status.is_finished() {
                return false;
            }
            if state.resume && state.step == step {
                state.resume = false;
                return true;
            }
            if state.interrupt_pending {
                drop(state);
                warn!(task = %self.name(), step, "chain wait interrupted");
                self.cancel_with(TaskCancelled::interrupted(self.name()));
                return false;
            }
            state = self.wake.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Terminal step. Listener panics count as body failures so the owner
    /// always hears back.
    fn run_body(self: &Arc<Self>) {
        let task = &self.task;
        let thread = std::thread::current();
        trace!(task = %task.name(), thread = ?thread.name(), "task body start");

        let outcome = catch_unwind(AssertUnwindSafe(|| -> anyhow::Result<Duration> {
            for listener in &self.listeners {
                listener.before_run(task);
            }

            let started = Instant::now();
            {
                let span = self
                    .trace_body
                    .then(|| info_span!("task", task = %task.name(), priority = task.priority()));
                let _entered = span.as_ref().map(|s| s.enter());
                (task.body())()?;
            }
            let elapsed = started.elapsed();
            debug!(
                task = %task.name(),
                elapsed_ms = elapsed.as_millis() as u64,
                "task body finished"
            );

            for listener in &self.listeners {
                listener.after_run(task, elapsed);
            }
            Ok(elapsed)
        }));

        match outcome {
            Ok(Ok(_elapsed)) => self.complete(),
            Ok(Err(err)) => {
                error!(task = %task.name(), error = %format!("{err:#}"), "task body failed");
                self.cancel_with(TaskCancelled::body_failed(task.name(), format!("{err:#}")));
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(task = %task.name(), panic = %message, "task body or listener panicked");
                self.cancel_with(TaskCancelled::body_failed(task.name(), message));
            }
        }
    }

    fn complete(self: &Arc<Self>) {
        let owner = {
            let mut state = self.lock();
            if state.phase.is_terminal() {
                return;
            }
            state.phase = ChainPhase::Completed;
            state.queue.clear();
            state.owner.take()
        };
        self.wake.notify_all();

        if let Some(owner) = owner {
            owner.on_controller_complete(self);
        }
    }

    fn cancel_with(self: &Arc<Self>, cancel: TaskCancelled) {
        let owner = {
            let mut state = self.lock();
            if state.phase.is_terminal() || self.status.is_finished() {
                trace!(task = %self.name(), "cancel ignored: chain already finished");
                return;
            }
            state.phase = ChainPhase::Canceled;
            state.queue.clear();
            state.owner.take()
        };
        self.wake.notify_all();

        warn!(task = %self.name(), reason = %cancel, "task chain canceled");
        if let Some(owner) = owner {
            owner.on_controller_cancel(self, cancel);
        }
    }
}

impl fmt::Debug for TaskController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskController")
            .field("task", &self.name())
            .field("seq", &self.seq)
            .field("phase", &self.phase())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
