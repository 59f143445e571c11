use std::io::Write;

use tempfile::NamedTempFile;

use taskgraph::config::{ConfigFile, load_and_validate};
use taskgraph::errors::TaskGraphError;
use taskgraph::types::{Affinity, ProcessScope};
use taskgraph_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write temp config");
    file
}

#[test]
fn full_config_round_trips_into_the_model() {
    let file = write_config(
        r#"
[executor]
core_pool_size = 3
max_pool_size = 6
keep_alive_secs = 5
enable_trace = true
log_graphviz = true
primary_process = false

[graph]
name = "startup"
first = "init"
last = "ready"

[task.init]
cmd = "echo init"

[task.A]
cmd = "echo A"
after = ["init"]
affinity = "coordinator"
process = "any"
priority = 7
confirm = true

[task.ready]
cmd = "echo ready"
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.executor.core_pool_size, 3);
    assert_eq!(cfg.executor.effective_max_pool_size(), 6);
    assert_eq!(cfg.executor.keep_alive().as_secs(), 5);
    assert!(cfg.executor.enable_trace);
    assert!(!cfg.executor.primary_process);

    assert_eq!(cfg.graph.name, "startup");
    assert_eq!(cfg.graph.first.as_deref(), Some("init"));

    let a = &cfg.task["A"];
    assert_eq!(a.after, vec!["init"]);
    assert_eq!(a.affinity, Affinity::Coordinator);
    assert_eq!(a.process, ProcessScope::Any);
    assert_eq!(a.priority, 7);
    assert!(a.confirm);

    let regular: Vec<&String> = cfg.regular_tasks().map(|(name, _)| name).collect();
    assert_eq!(regular, vec!["A"]);
}

#[test]
fn omitted_sections_take_defaults() {
    let file = write_config(
        r#"
[task.only]
cmd = "true"
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    let only = &cfg.task["only"];

    assert_eq!(cfg.graph.name, "taskgraph");
    assert!(cfg.executor.core_pool_size >= 4);
    assert!(cfg.executor.effective_max_pool_size() >= cfg.executor.core_pool_size);
    assert_eq!(cfg.executor.keep_alive_secs, 30);
    assert!(cfg.executor.primary_process);
    assert_eq!(only.affinity, Affinity::Worker);
    assert_eq!(only.process, ProcessScope::Primary);
    assert_eq!(only.priority, 0);
    assert!(!only.confirm);
}

#[test]
fn unknown_after_entry_is_tolerated() {
    let cfg = ConfigFileBuilder::new()
        .with_task("A", TaskConfigBuilder::new("true").after("nowhere").build())
        .build();
    assert_eq!(cfg.task["A"].after, vec!["nowhere"]);
}

#[test]
fn self_dependency_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_task("A", TaskConfigBuilder::new("true").after("A").build())
        .raw();
    let err = ConfigFile::try_from(raw).unwrap_err();
    assert!(matches!(err, TaskGraphError::Config(msg) if msg.contains("itself")));
}

#[test]
fn dependency_cycle_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_task("A", TaskConfigBuilder::new("true").after("B").build())
        .with_task("B", TaskConfigBuilder::new("true").after("A").build())
        .raw();
    let err = ConfigFile::try_from(raw).unwrap_err();
    let TaskGraphError::GraphCycle { dot, .. } = &err else {
        panic!("expected a cycle error, got {err:?}");
    };
    assert!(dot.starts_with("digraph"), "{dot}");
    assert!(dot.contains('A') && dot.contains('B'), "{dot}");
    assert_eq!(dot.matches("->").count(), 2, "{dot}");
}

#[test]
fn barriers_must_name_distinct_known_tasks() {
    let unknown = ConfigFileBuilder::new()
        .with_task("A", TaskConfigBuilder::new("true").build())
        .first("missing")
        .raw();
    assert!(matches!(
        ConfigFile::try_from(unknown),
        Err(TaskGraphError::Config(msg)) if msg.contains("missing")
    ));

    let same = ConfigFileBuilder::new()
        .with_task("A", TaskConfigBuilder::new("true").build())
        .first("A")
        .last("A")
        .raw();
    assert!(ConfigFile::try_from(same).is_err());
}

#[test]
fn pool_sizes_are_checked() {
    let file = write_config(
        r#"
[executor]
core_pool_size = 8
max_pool_size = 2

[task.A]
cmd = "true"
"#,
    );
    let err = load_and_validate(file.path()).unwrap_err();
    assert!(matches!(err, TaskGraphError::Config(msg) if msg.contains("max_pool_size")));

    let zero = write_config(
        r#"
[executor]
core_pool_size = 0

[task.A]
cmd = "true"
"#,
    );
    assert!(load_and_validate(zero.path()).is_err());
}

#[test]
fn empty_config_is_rejected() {
    let file = write_config("[graph]\nname = \"nothing\"\n");
    assert!(matches!(
        load_and_validate(file.path()),
        Err(TaskGraphError::Config(_))
    ));
}

#[test]
fn bad_enum_value_is_a_toml_error() {
    let file = write_config(
        r#"
[task.A]
cmd = "true"
affinity = "gpu"
"#,
    );
    assert!(matches!(
        load_and_validate(file.path()),
        Err(TaskGraphError::Toml(_))
    ));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_and_validate(dir.path().join("Taskgraph.toml")).unwrap_err();
    assert!(matches!(err, TaskGraphError::Io(_)));
}
