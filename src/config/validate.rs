// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::dot::{Config as DotConfig, Dot};
use petgraph::graphmap::DiGraphMap;
use tracing::warn;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, TaskGraphError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = TaskGraphError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.executor, raw.graph, raw.task))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_executor(cfg)?;
    validate_barriers(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(TaskGraphError::Config(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_executor(cfg: &RawConfigFile) -> Result<()> {
    let executor = &cfg.executor;
    if executor.core_pool_size == 0 {
        return Err(TaskGraphError::Config(
            "[executor].core_pool_size must be >= 1 (got 0)".to_string(),
        ));
    }
    let max = executor.effective_max_pool_size();
    if max < executor.core_pool_size {
        return Err(TaskGraphError::Config(format!(
            "[executor].max_pool_size ({max}) must be >= core_pool_size ({})",
            executor.core_pool_size
        )));
    }
    Ok(())
}

fn validate_barriers(cfg: &RawConfigFile) -> Result<()> {
    for (key, barrier) in [("first", &cfg.graph.first), ("last", &cfg.graph.last)] {
        if let Some(name) = barrier {
            if !cfg.task.contains_key(name) {
                return Err(TaskGraphError::Config(format!(
                    "[graph].{key} names unknown task '{name}'"
                )));
            }
        }
    }
    if let (Some(first), Some(last)) = (&cfg.graph.first, &cfg.graph.last) {
        if first == last {
            return Err(TaskGraphError::Config(format!(
                "[graph].first and [graph].last cannot both be '{first}'"
            )));
        }
    }
    Ok(())
}

/// Unknown `after` names are tolerated (they resolve to nothing at run
/// time), but flagged.
fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if dep == name {
                return Err(TaskGraphError::Config(format!(
                    "task '{name}' cannot depend on itself in `after`"
                )));
            }
            if !cfg.task.contains_key(dep) {
                warn!(task = %name, dependency = %dep, "unknown dependency in `after`; ignoring");
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> task.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if cfg.task.contains_key(dep) {
                graph.add_edge(dep.as_str(), name.as_str(), ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            warn!(task = %cycle.node_id(), "dependency cycle in [task.*] tables");
            Err(TaskGraphError::GraphCycle {
                graph: cfg.graph.name.clone(),
                dot: format!("{:?}", Dot::with_config(&graph, &[DotConfig::EdgeNoLabel])),
            })
        }
    }
}
