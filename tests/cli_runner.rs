use std::io::Write;
use std::sync::Arc;

use tempfile::NamedTempFile;

use taskgraph::cli::{CliArgs, LogLevel};
use taskgraph::config::load_and_validate;
use taskgraph::dag::GraphController;
use taskgraph::engine::GraphOutcome;
use taskgraph::exec::process::StaticProcess;
use taskgraph::logging::resolve_level;
use taskgraph::{graph_builder, run};
use taskgraph_test_utils::init_tracing;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write temp config");
    file
}

fn args(config: &NamedTempFile, dry_run: bool) -> CliArgs {
    CliArgs {
        config: config.path().to_string_lossy().into_owned(),
        log_level: None,
        dry_run,
        yes: true,
    }
}

const BARRIER_CONFIG: &str = r#"
[graph]
name = "cli"
first = "init"
last = "done"

[task.init]
cmd = "echo init"

[task.A]
cmd = "echo A"

[task.B]
cmd = "echo B"
after = ["A"]
confirm = true

[task.done]
cmd = "echo done"
"#;

#[test]
fn config_becomes_a_barrier_graph() {
    let file = write_config(BARRIER_CONFIG);
    let cfg = load_and_validate(file.path()).unwrap();

    let graph = graph_builder(&cfg, true).unwrap().build();
    assert_eq!(graph.first().map(|t| t.name()), Some("init"));
    assert_eq!(graph.last().map(|t| t.name()), Some("done"));
    assert_eq!(graph.tasks().len(), 2);

    let b = graph.tasks().iter().find(|t| t.name() == "B").unwrap();
    assert_eq!(b.interceptors().len(), 1);

    let controller =
        GraphController::new(Arc::new(graph), &StaticProcess::primary(), &cfg.executor);
    let dot = controller.directed_graph().to_dot();
    assert!(dot.contains("\"init\" -> \"A\""));
    assert!(dot.contains("\"A\" -> \"B\""));
    assert!(dot.contains("\"B\" -> \"done\""));
}

#[test]
fn dry_run_executes_nothing() {
    init_tracing();
    let file = write_config(BARRIER_CONFIG);
    let outcome = run(args(&file, true)).unwrap();
    assert!(outcome.is_none());
}

#[cfg(unix)]
#[test]
fn run_completes_shell_graph() {
    init_tracing();
    let file = write_config(BARRIER_CONFIG);
    let outcome = run(args(&file, false)).unwrap();
    assert!(matches!(outcome, Some(GraphOutcome::Completed { .. })));
}

#[cfg(unix)]
#[test]
fn failing_command_cancels_the_run() {
    init_tracing();
    let file = write_config(
        r#"
[task.ok]
cmd = "true"

[task.bad]
cmd = "exit 3"
after = ["ok"]

[task.never]
cmd = "true"
after = ["bad"]
affinity = "coordinator"
"#,
    );
    let outcome = run(args(&file, false)).unwrap();
    let Some(GraphOutcome::Canceled(cancel)) = outcome else {
        panic!("expected cancellation, got {outcome:?}");
    };
    assert_eq!(cancel.task, "bad");
}

#[test]
fn log_level_prefers_flag_then_env() {
    assert_eq!(resolve_level(Some(LogLevel::Debug), Some("error")), tracing::Level::DEBUG);
    assert_eq!(resolve_level(None, Some("warn")), tracing::Level::WARN);
    assert_eq!(resolve_level(None, Some("verbose")), tracing::Level::TRACE);
    assert_eq!(resolve_level(None, Some("nonsense")), tracing::Level::INFO);
    assert_eq!(resolve_level(None, None), tracing::Level::INFO);
}
