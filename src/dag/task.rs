// src/dag/task.rs

//! Immutable description of one unit of work.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::engine::interceptor::TaskInterceptor;
use crate::errors::{Result, TaskGraphError};
use crate::types::{Affinity, ProcessScope};

/// The work itself. Runs to completion, or fails with an error.
pub type TaskBody = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a built [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A dependency identifier: another task's name, or its identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dependency {
    Name(String),
    Task(TaskId),
}

impl From<&str> for Dependency {
    fn from(name: &str) -> Self {
        Dependency::Name(name.to_string())
    }
}

impl From<String> for Dependency {
    fn from(name: String) -> Self {
        Dependency::Name(name)
    }
}

impl From<TaskId> for Dependency {
    fn from(id: TaskId) -> Self {
        Dependency::Task(id)
    }
}

impl From<&Task> for Dependency {
    fn from(task: &Task) -> Self {
        Dependency::Task(task.id)
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Name(name) => f.write_str(name),
            Dependency::Task(id) => write!(f, "task{id}"),
        }
    }
}

/// Lifecycle callbacks around a task body.
pub trait TaskListener: Send + Sync {
    fn before_run(&self, _task: &Task) {}

    fn after_run(&self, _task: &Task, _elapsed: Duration) {}
}

/// A named unit of work. Immutable once built; identity is [`TaskId`].
pub struct Task {
    id: TaskId,
    name: Option<String>,
    display_name: String,
    body: TaskBody,
    affinity: Affinity,
    process_scope: ProcessScope,
    priority: i32,
    depends_on: Vec<Dependency>,
    listeners: Vec<Arc<dyn TaskListener>>,
    interceptors: Vec<Arc<dyn TaskInterceptor>>,
}

impl Task {
    /// Start building a task with the given name.
    pub fn builder(name: impl Into<String>) -> TaskBuilder {
        TaskBuilder::new().name(name)
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Name used in logs and listener callbacks. Unnamed tasks render as
    /// `task#<id>`.
    pub fn name(&self) -> &str {
        &self.display_name
    }

    /// The explicitly assigned name, which is what `Dependency::Name`
    /// resolves against.
    pub fn explicit_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn body(&self) -> &TaskBody {
        &self.body
    }

    pub fn affinity(&self) -> Affinity {
        self.affinity
    }

    pub fn process_scope(&self) -> ProcessScope {
        self.process_scope
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn depends_on(&self) -> &[Dependency] {
        &self.depends_on
    }

    pub fn listeners(&self) -> &[Arc<dyn TaskListener>] {
        &self.listeners
    }

    pub fn interceptors(&self) -> &[Arc<dyn TaskInterceptor>] {
        &self.interceptors
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.display_name)
            .field("affinity", &self.affinity)
            .field("process_scope", &self.process_scope)
            .field("priority", &self.priority)
            .field("depends_on", &self.depends_on)
            .field("interceptors", &self.interceptors.len())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name)
    }
}

/// Builder for [`Task`].
///
/// Defaults: worker affinity, primary-process only, priority `0`.
#[derive(Default)]
pub struct TaskBuilder {
    name: Option<String>,
    body: Option<TaskBody>,
    affinity: Affinity,
    process_scope: ProcessScope,
    priority: i32,
    depends_on: Vec<Dependency>,
    listeners: Vec<Arc<dyn TaskListener>>,
    interceptors: Vec<Arc<dyn TaskInterceptor>>,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn body<F>(mut self, body: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.body = Some(Arc::new(body));
        self
    }

    /// Share an existing body (e.g. between graphs).
    pub fn shared_body(mut self, body: TaskBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn affinity(mut self, affinity: Affinity) -> Self {
        self.affinity = affinity;
        self
    }

    /// Shorthand for `affinity(Affinity::Coordinator)`.
    pub fn on_coordinator(self) -> Self {
        self.affinity(Affinity::Coordinator)
    }

    pub fn process_scope(mut self, scope: ProcessScope) -> Self {
        self.process_scope = scope;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Add a dependency. Duplicates are collapsed.
    pub fn depends_on(mut self, dependency: impl Into<Dependency>) -> Self {
        let dependency = dependency.into();
        if !self.depends_on.contains(&dependency) {
            self.depends_on.push(dependency);
        }
        self
    }

    pub fn depends_on_all<I, D>(self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<Dependency>,
    {
        dependencies
            .into_iter()
            .fold(self, |builder, dep| builder.depends_on(dep))
    }

    pub fn clear_depends_on(mut self) -> Self {
        self.depends_on.clear();
        self
    }

    pub fn listener(mut self, listener: Arc<dyn TaskListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Append an interceptor; interceptors run in insertion order.
    pub fn interceptor(mut self, interceptor: Arc<dyn TaskInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Build the task. A task without a body is rejected here, not at run time.
    pub fn build(self) -> Result<Task> {
        let id = TaskId::next();
        let display_name = self
            .name
            .clone()
            .unwrap_or_else(|| format!("task{id}"));

        let body = self
            .body
            .ok_or_else(|| TaskGraphError::MissingBody(display_name.clone()))?;

        Ok(Task {
            id,
            name: self.name,
            display_name,
            body,
            affinity: self.affinity,
            process_scope: self.process_scope,
            priority: self.priority,
            depends_on: self.depends_on,
            listeners: self.listeners,
            interceptors: self.interceptors,
        })
    }
}
