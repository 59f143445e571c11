#![allow(dead_code)]

use std::collections::BTreeMap;

use taskgraph::config::{ConfigFile, ExecutorConfig, GraphSection, RawConfigFile, TaskConfig};
use taskgraph::dag::{Task, TaskBuilder};
use taskgraph::types::{Affinity, ProcessScope};

use crate::recorder::EventLog;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                executor: ExecutorConfig::default(),
                graph: GraphSection::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn first(mut self, name: &str) -> Self {
        self.config.graph.first = Some(name.to_string());
        self
    }

    pub fn last(mut self, name: &str) -> Self {
        self.config.graph.last = Some(name.to_string());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                cmd: cmd.to_string(),
                after: vec![],
                affinity: Affinity::Worker,
                process: ProcessScope::Primary,
                priority: 0,
                confirm: false,
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn affinity(mut self, affinity: Affinity) -> Self {
        self.task.affinity = affinity;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// Task with an empty body.
pub fn noop(name: &str) -> TaskBuilder {
    Task::builder(name).body(|| Ok(()))
}

/// Task whose body records [`crate::recorder::Event::Ran`] and whose
/// listeners record start/finish into `log`.
pub fn recorded(name: &str, log: &EventLog) -> TaskBuilder {
    Task::builder(name)
        .body(log.body(name))
        .listener(log.as_task_listener())
}
