// src/dag/task_graph.rs

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::dag::task::{Task, TaskListener};
use crate::errors::TaskCancelled;

/// Graph-level lifecycle callbacks. Each fires at most once per execution.
pub trait TaskGraphListener: Send + Sync {
    fn on_graph_start(&self, _graph: &TaskGraph) {}

    fn on_graph_end(&self, _graph: &TaskGraph, _elapsed: Duration) {}

    fn on_graph_cancel(&self, _graph: &TaskGraph, _cancel: &TaskCancelled) {}
}

/// A named collection of tasks plus optional first/last barriers.
///
/// `first` runs before every other task and `last` after every other task.
/// Graph-wide task listeners are attached to every member, barriers included.
pub struct TaskGraph {
    name: String,
    tasks: Vec<Arc<Task>>,
    first: Option<Arc<Task>>,
    last: Option<Arc<Task>>,
    listeners: Vec<Arc<dyn TaskGraphListener>>,
    task_listeners: Vec<Arc<dyn TaskListener>>,
}

impl TaskGraph {
    pub fn builder(name: impl Into<String>) -> TaskGraphBuilder {
        TaskGraphBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tasks(&self) -> &[Arc<Task>] {
        &self.tasks
    }

    pub fn first(&self) -> Option<&Arc<Task>> {
        self.first.as_ref()
    }

    pub fn last(&self) -> Option<&Arc<Task>> {
        self.last.as_ref()
    }

    pub fn listeners(&self) -> &[Arc<dyn TaskGraphListener>] {
        &self.listeners
    }

    pub fn task_listeners(&self) -> &[Arc<dyn TaskListener>] {
        &self.task_listeners
    }

    /// Number of tasks including barriers.
    pub fn len(&self) -> usize {
        self.tasks.len() + usize::from(self.first.is_some()) + usize::from(self.last.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskGraph")
            .field("name", &self.name)
            .field("tasks", &self.tasks)
            .field("first", &self.first.as_ref().map(|t| t.name()))
            .field("last", &self.last.as_ref().map(|t| t.name()))
            .finish_non_exhaustive()
    }
}

pub struct TaskGraphBuilder {
    name: String,
    tasks: Vec<Arc<Task>>,
    first: Option<Arc<Task>>,
    last: Option<Arc<Task>>,
    listeners: Vec<Arc<dyn TaskGraphListener>>,
    task_listeners: Vec<Arc<dyn TaskListener>>,
}

impl TaskGraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
            first: None,
            last: None,
            listeners: Vec::new(),
            task_listeners: Vec::new(),
        }
    }

    pub fn task(mut self, task: impl Into<Arc<Task>>) -> Self {
        self.tasks.push(task.into());
        self
    }

    pub fn tasks<I, T>(self, tasks: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Arc<Task>>,
    {
        tasks.into_iter().fold(self, |builder, task| builder.task(task))
    }

    /// Barrier that runs before every other task. Replaces a previous one.
    pub fn first_task(mut self, task: impl Into<Arc<Task>>) -> Self {
        self.first = Some(task.into());
        self
    }

    /// Barrier that runs after every other task. Replaces a previous one.
    pub fn last_task(mut self, task: impl Into<Arc<Task>>) -> Self {
        self.last = Some(task.into());
        self
    }

    pub fn listener(mut self, listener: Arc<dyn TaskGraphListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Listener attached to every task of the graph.
    pub fn task_listener(mut self, listener: Arc<dyn TaskListener>) -> Self {
        self.task_listeners.push(listener);
        self
    }

    pub fn build(self) -> TaskGraph {
        TaskGraph {
            name: self.name,
            tasks: self.tasks,
            first: self.first,
            last: self.last,
            listeners: self.listeners,
            task_listeners: self.task_listeners,
        }
    }
}
