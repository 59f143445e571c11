//! Listeners that record what happened, in order.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskgraph::dag::{Task, TaskGraph, TaskGraphListener, TaskListener};
use taskgraph::errors::TaskCancelled;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `before_run` listener.
    Started(String),
    /// Body invoked (recorded by bodies built with [`EventLog::body`]).
    Ran(String),
    /// `after_run` listener.
    Finished(String),
    GraphStart(String),
    GraphEnd(String),
    GraphCancel(String, TaskCancelled),
}

/// Shared, append-only event log. Implements both listener traits.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn position(&self, event: &Event) -> Option<usize> {
        self.snapshot().iter().position(|e| e == event)
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.snapshot().iter().filter(|e| pred(e)).count()
    }

    /// Names of tasks whose body ran, in order.
    pub fn ran(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter_map(|e| match e {
                Event::Ran(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn has_run(&self, task: &str) -> bool {
        self.ran().iter().any(|n| n == task)
    }

    /// Position of `before` strictly precedes `after`.
    pub fn happened_before(&self, before: &Event, after: &Event) -> bool {
        match (self.position(before), self.position(after)) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        }
    }

    pub fn cancellations(&self) -> Vec<TaskCancelled> {
        self.snapshot()
            .into_iter()
            .filter_map(|e| match e {
                Event::GraphCancel(_, cancel) => Some(cancel),
                _ => None,
            })
            .collect()
    }

    /// Task body that records [`Event::Ran`] for `name`.
    pub fn body(&self, name: &str) -> impl Fn() -> anyhow::Result<()> + Send + Sync + 'static {
        let log = self.clone();
        let name = name.to_string();
        move || {
            log.push(Event::Ran(name.clone()));
            Ok(())
        }
    }

    /// Like [`body`](Self::body), but sleeps first.
    pub fn slow_body(
        &self,
        name: &str,
        delay: Duration,
    ) -> impl Fn() -> anyhow::Result<()> + Send + Sync + 'static {
        let log = self.clone();
        let name = name.to_string();
        move || {
            std::thread::sleep(delay);
            log.push(Event::Ran(name.clone()));
            Ok(())
        }
    }

    pub fn as_task_listener(&self) -> Arc<dyn TaskListener> {
        Arc::new(self.clone())
    }

    pub fn as_graph_listener(&self) -> Arc<dyn TaskGraphListener> {
        Arc::new(self.clone())
    }
}

impl TaskListener for EventLog {
    fn before_run(&self, task: &Task) {
        self.push(Event::Started(task.name().to_string()));
    }

    fn after_run(&self, task: &Task, _elapsed: Duration) {
        self.push(Event::Finished(task.name().to_string()));
    }
}

impl TaskGraphListener for EventLog {
    fn on_graph_start(&self, graph: &TaskGraph) {
        self.push(Event::GraphStart(graph.name().to_string()));
    }

    fn on_graph_end(&self, graph: &TaskGraph, _elapsed: Duration) {
        self.push(Event::GraphEnd(graph.name().to_string()));
    }

    fn on_graph_cancel(&self, graph: &TaskGraph, cancel: &TaskCancelled) {
        self.push(Event::GraphCancel(graph.name().to_string(), cancel.clone()));
    }
}
