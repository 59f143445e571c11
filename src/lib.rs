// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::graph_controller::GraphController;
use crate::dag::task::Task;
use crate::dag::task_graph::{TaskGraph, TaskGraphBuilder, TaskGraphListener};
use crate::engine::{GraphOutcome, TaskGraphExecutor};
use crate::errors::TaskCancelled;
use crate::exec::command::command_body;
use crate::exec::confirm::ConfirmInterceptor;
use crate::exec::coordinator::{CoordinatorQueue, coordinator_channel};
use crate::exec::process::StaticProcess;

/// High-level entry point used by `main.rs`.
///
/// Loads the config, builds the task graph and runs it. The calling thread
/// becomes the coordinator thread until the graph ends or is canceled.
/// Returns `None` for `--dry-run`.
pub fn run(args: CliArgs) -> Result<Option<GraphOutcome>> {
    let cfg = load_and_validate(&args.config)?;

    if args.dry_run {
        print_dry_run(&cfg, args.yes)?;
        return Ok(None);
    }

    let (queue, runner) = coordinator_channel();
    let process = Arc::new(StaticProcess::new(cfg.executor.primary_process));
    let executor = TaskGraphExecutor::new(cfg.executor.clone(), Arc::new(queue.clone()), process)?;

    let graph = graph_builder(&cfg, args.yes)?
        .listener(Arc::new(StopCoordinator(queue)))
        .build();

    let handle = executor.execute(graph)?;
    runner.run();

    let outcome = handle.blocking_outcome()?;
    match &outcome {
        GraphOutcome::Completed { elapsed } => {
            info!(elapsed_ms = elapsed.as_millis() as u64, "all tasks finished")
        }
        GraphOutcome::Canceled(cancel) => warn!(reason = %cancel, "task graph canceled"),
    }
    Ok(Some(outcome))
}

/// Translate `[task.*]` tables into a task graph builder.
///
/// `[graph].first` / `[graph].last` become the barrier tasks. Each body runs
/// the task's `cmd` through the platform shell.
pub fn graph_builder(cfg: &ConfigFile, auto_confirm: bool) -> crate::errors::Result<TaskGraphBuilder> {
    let mut builder = TaskGraph::builder(cfg.graph.name.clone());

    for (name, tc) in cfg.task.iter() {
        let mut task = Task::builder(name.clone())
            .shared_body(command_body(name.clone(), tc.cmd.clone()))
            .affinity(tc.affinity)
            .process_scope(tc.process)
            .priority(tc.priority)
            .depends_on_all(tc.after.iter().map(String::as_str));
        if tc.confirm {
            task = task.interceptor(Arc::new(ConfirmInterceptor::terminal(auto_confirm)));
        }
        let task = task.build()?;

        builder = if cfg.graph.first.as_deref() == Some(name.as_str()) {
            builder.first_task(task)
        } else if cfg.graph.last.as_deref() == Some(name.as_str()) {
            builder.last_task(task)
        } else {
            builder.task(task)
        };
    }

    Ok(builder)
}

/// Stops the coordinator loop once the graph is over.
struct StopCoordinator(CoordinatorQueue);

impl TaskGraphListener for StopCoordinator {
    fn on_graph_end(&self, _graph: &TaskGraph, _elapsed: Duration) {
        self.0.shutdown();
    }

    fn on_graph_cancel(&self, _graph: &TaskGraph, _cancel: &TaskCancelled) {
        self.0.shutdown();
    }
}

/// Print tasks and the resolved dependency graph.
fn print_dry_run(cfg: &ConfigFile, auto_confirm: bool) -> crate::errors::Result<()> {
    println!("taskgraph dry-run");
    println!("  graph = {}", cfg.graph.name);
    if let Some(first) = &cfg.graph.first {
        println!("  first = {first}");
    }
    if let Some(last) = &cfg.graph.last {
        println!("  last = {last}");
    }
    println!(
        "  executor.core_pool_size = {}, max_pool_size = {}",
        cfg.executor.core_pool_size,
        cfg.executor.effective_max_pool_size()
    );
    println!();

    println!("tasks ({}):", cfg.task.len());
    for (name, task) in cfg.task.iter() {
        println!("  - {name}");
        println!("      cmd: {}", task.cmd);
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        println!("      affinity: {:?}, process: {:?}", task.affinity, task.process);
        if task.priority != 0 {
            println!("      priority: {}", task.priority);
        }
        if task.confirm {
            println!("      confirm: true");
        }
    }
    println!();

    let graph = graph_builder(cfg, auto_confirm)?.build();
    let process = StaticProcess::new(cfg.executor.primary_process);
    let controller = GraphController::new(Arc::new(graph), &process, &cfg.executor);
    println!("{}", controller.directed_graph().to_dot());

    debug!("dry-run complete (no execution)");
    Ok(())
}
