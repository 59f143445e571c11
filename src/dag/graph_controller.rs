// src/dag/graph_controller.rs

//! Resolves a [`TaskGraph`] into a directed graph of task controllers and
//! owns the graph-level lifecycle (start / end / cancel).

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use crate::config::model::ExecutorConfig;
use crate::dag::graph::{Edge, Graph, Vertex};
use crate::dag::task::{Dependency, Task, TaskId};
use crate::dag::task_graph::TaskGraph;
use crate::engine::controller::TaskController;
use crate::errors::TaskCancelled;
use crate::exec::process::ProcessInfo;
use crate::types::ProcessScope;

/// Graph vertex value: a controller compared by identity.
#[derive(Clone)]
pub struct ControllerRef(Arc<TaskController>);

impl ControllerRef {
    pub fn new(controller: Arc<TaskController>) -> Self {
        ControllerRef(controller)
    }

    pub fn controller(&self) -> &Arc<TaskController> {
        &self.0
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }
}

impl PartialEq for ControllerRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ControllerRef {}

impl Hash for ControllerRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.seq().hash(state);
        self.0.task().id().hash(state);
    }
}

impl fmt::Debug for ControllerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.0.name(), self.0.seq())
    }
}

impl fmt::Display for ControllerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.name())
    }
}

pub type ControllerGraph = Graph<ControllerRef>;

#[derive(Debug, Default)]
struct StatusFlags {
    started: bool,
    ended: bool,
    canceled: bool,
    started_at: Option<Instant>,
    elapsed: Option<Duration>,
}

/// Lifecycle flags shared between a graph controller and its task
/// controllers. `ended` and `canceled` are mutually exclusive.
#[derive(Debug, Default)]
pub struct GraphStatus {
    flags: Mutex<StatusFlags>,
}

impl GraphStatus {
    fn lock(&self) -> MutexGuard<'_, StatusFlags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_started(&self) -> bool {
        self.lock().started
    }

    pub fn is_ended(&self) -> bool {
        self.lock().ended
    }

    pub fn is_canceled(&self) -> bool {
        self.lock().canceled
    }

    /// Ended or canceled.
    pub fn is_finished(&self) -> bool {
        let flags = self.lock();
        flags.ended || flags.canceled
    }

    /// Time between start and end, once the graph has ended normally.
    pub fn elapsed(&self) -> Option<Duration> {
        self.lock().elapsed
    }

    fn mark_started(&self) -> bool {
        let mut flags = self.lock();
        if flags.started || flags.ended || flags.canceled {
            return false;
        }
        flags.started = true;
        flags.started_at = Some(Instant::now());
        true
    }

    fn mark_ended(&self) -> Option<Duration> {
        let mut flags = self.lock();
        if !flags.started || flags.ended || flags.canceled {
            return None;
        }
        let elapsed = flags.started_at.map(|t| t.elapsed()).unwrap_or_default();
        flags.ended = true;
        flags.elapsed = Some(elapsed);
        Some(elapsed)
    }

    fn mark_canceled(&self) -> bool {
        let mut flags = self.lock();
        if flags.ended || flags.canceled {
            return false;
        }
        flags.canceled = true;
        true
    }
}

/// One execution of a [`TaskGraph`].
pub struct GraphController {
    graph: Arc<TaskGraph>,
    status: Arc<GraphStatus>,
    controllers: Vec<Arc<TaskController>>,
    first: Option<Arc<TaskController>>,
    last: Option<Arc<TaskController>>,
    log_graphviz: bool,
    directed: OnceLock<ControllerGraph>,
}

impl GraphController {
    /// Wrap every task that applies to the current process in a controller.
    ///
    /// Tasks scoped to the primary process are dropped when `process` is
    /// not primary; barriers are filtered the same way.
    pub fn new(graph: Arc<TaskGraph>, process: &dyn ProcessInfo, config: &ExecutorConfig) -> Self {
        let status = Arc::new(GraphStatus::default());
        let primary = process.is_primary_process();
        let extra = graph.task_listeners();

        let mut seq = 0usize;
        let mut wrap = |task: &Arc<Task>| -> Option<Arc<TaskController>> {
            if !applies(task, primary) {
                debug!(
                    graph = %graph.name(),
                    task = %task.name(),
                    "task scoped to the primary process; skipped here"
                );
                return None;
            }
            let controller = TaskController::new(
                Arc::clone(task),
                seq,
                extra,
                Arc::clone(&status),
                config.enable_trace,
            );
            seq += 1;
            Some(Arc::new(controller))
        };

        let first = graph.first().and_then(&mut wrap);
        let mut controllers: Vec<Arc<TaskController>> = first.iter().cloned().collect();
        controllers.extend(graph.tasks().iter().filter_map(&mut wrap));
        let last = graph.last().and_then(&mut wrap);
        controllers.extend(last.iter().cloned());

        Self {
            graph,
            status,
            controllers,
            first,
            last,
            log_graphviz: config.log_graphviz,
            directed: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.graph.name()
    }

    pub fn task_graph(&self) -> &Arc<TaskGraph> {
        &self.graph
    }

    pub fn status(&self) -> &Arc<GraphStatus> {
        &self.status
    }

    /// All controllers in build order: first, tasks, last.
    pub fn controllers(&self) -> &[Arc<TaskController>] {
        &self.controllers
    }

    pub fn controller(&self, name: &str) -> Option<&Arc<TaskController>> {
        self.controllers.iter().find(|c| c.name() == name)
    }

    pub fn first(&self) -> Option<&Arc<TaskController>> {
        self.first.as_ref()
    }

    pub fn last(&self) -> Option<&Arc<TaskController>> {
        self.last.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    /// The resolved dependency graph. Built on first call; later calls
    /// return the same graph.
    pub fn directed_graph(&self) -> &ControllerGraph {
        self.directed.get_or_init(|| self.build_graph())
    }

    fn build_graph(&self) -> ControllerGraph {
        let started = Instant::now();
        let mut graph = ControllerGraph::new();

        let mut by_name: HashMap<&str, Vec<ControllerRef>> = HashMap::new();
        let mut by_id: HashMap<TaskId, Vec<ControllerRef>> = HashMap::new();
        for controller in &self.controllers {
            let node = ControllerRef::new(Arc::clone(controller));
            graph.add_vertex(Vertex::new(node.clone()));
            if let Some(name) = controller.task().explicit_name() {
                by_name.entry(name).or_default().push(node.clone());
            }
            by_id.entry(controller.task().id()).or_default().push(node);
        }

        for controller in &self.controllers {
            let dependent = Vertex::new(ControllerRef::new(Arc::clone(controller)));
            for dependency in controller.depends_on() {
                let matches = match dependency {
                    Dependency::Name(name) => by_name.get(name.as_str()),
                    Dependency::Task(id) => by_id.get(id),
                };
                let Some(matches) = matches else {
                    debug!(
                        graph = %self.name(),
                        task = %controller.name(),
                        dependency = %dependency,
                        "dependency matches no task; ignoring"
                    );
                    continue;
                };
                for provider in matches {
                    graph.add_edge(Edge::new(Vertex::new(provider.clone()), dependent.clone()));
                }
            }
        }

        let first = self
            .first
            .as_ref()
            .map(|c| Vertex::new(ControllerRef::new(Arc::clone(c))));
        let last = self
            .last
            .as_ref()
            .map(|c| Vertex::new(ControllerRef::new(Arc::clone(c))));
        if let Some(first) = &first {
            wire_first(&mut graph, first, last.as_ref());
        }
        if let Some(last) = &last {
            wire_last(&mut graph, last);
        }

        debug!(
            graph = %self.name(),
            vertices = graph.vertex_count(),
            edges = graph.edge_count(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "dependency graph resolved"
        );
        if self.log_graphviz {
            info!(graph = %self.name(), "graphviz:\n{}", graph.to_dot());
        }
        graph
    }

    /// Mark the graph started and notify listeners. Returns `false` if it
    /// was already started or finished.
    pub fn start(&self) -> bool {
        if !self.status.mark_started() {
            return false;
        }
        info!(graph = %self.name(), tasks = self.controllers.len(), "task graph started");
        for listener in self.graph.listeners() {
            listener.on_graph_start(&self.graph);
        }
        true
    }

    /// Mark the graph ended and notify listeners once. Returns the elapsed
    /// time on the transition, `None` otherwise.
    pub fn end(&self) -> Option<Duration> {
        let elapsed = self.status.mark_ended()?;
        info!(
            graph = %self.name(),
            elapsed_ms = elapsed.as_millis() as u64,
            "task graph finished"
        );
        for listener in self.graph.listeners() {
            listener.on_graph_end(&self.graph, elapsed);
        }
        Some(elapsed)
    }

    /// Mark the graph canceled and notify listeners once. Returns `false`
    /// if the graph had already ended or been canceled.
    pub fn cancel(&self, cancel: &TaskCancelled) -> bool {
        if !self.status.mark_canceled() {
            trace!(graph = %self.name(), reason = %cancel, "cancel ignored: graph already finished");
            return false;
        }
        info!(graph = %self.name(), reason = %cancel, "task graph canceled");
        for listener in self.graph.listeners() {
            listener.on_graph_cancel(&self.graph, cancel);
        }
        true
    }
}

impl fmt::Debug for GraphController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphController")
            .field("name", &self.name())
            .field("controllers", &self.controllers.len())
            .field("status", &self.status)
            .finish()
    }
}

fn applies(task: &Task, primary: bool) -> bool {
    primary || task.process_scope() == ProcessScope::Any
}

/// Add `first -> v` for every vertex that neither precedes `first` nor is
/// already reachable from it through another dependency.
///
/// A vertex qualifies when all of its direct predecessors are ancestors of
/// `first` (roots qualify trivially). Every other non-ancestor is then
/// reached through one of these. The `last` barrier is skipped; it is wired
/// afterwards from the exit points.
fn wire_first(
    graph: &mut ControllerGraph,
    first: &Vertex<ControllerRef>,
    last: Option<&Vertex<ControllerRef>>,
) {
    let ancestors = graph.ancestors(first);
    let targets: Vec<Vertex<ControllerRef>> = graph
        .vertices()
        .filter(|v| !ancestors.contains(*v) && Some(*v) != last)
        .filter(|v| {
            graph
                .incoming_edges(v)
                .map(|edges| edges.iter().all(|e| ancestors.contains(e.from())))
                .unwrap_or(true)
        })
        .cloned()
        .collect();

    for target in targets {
        trace!(from = %first, to = %target, "first barrier edge");
        graph.add_edge(Edge::new(first.clone(), target));
    }
}

/// Mirror of [`wire_first`]: add `v -> last` for every vertex that does not
/// follow `last` and has no successor outside `last`'s descendants.
fn wire_last(graph: &mut ControllerGraph, last: &Vertex<ControllerRef>) {
    let descendants = graph.descendants(last);
    let sources: Vec<Vertex<ControllerRef>> = graph
        .vertices()
        .filter(|v| !descendants.contains(*v))
        .filter(|v| {
            graph
                .outgoing_edges(v)
                .map(|edges| edges.iter().all(|e| descendants.contains(e.to())))
                .unwrap_or(true)
        })
        .cloned()
        .collect();

    for source in sources {
        trace!(from = %source, to = %last, "last barrier edge");
        graph.add_edge(Edge::new(source, last.clone()));
    }
}
