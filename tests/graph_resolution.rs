use std::sync::Arc;

use taskgraph::config::ExecutorConfig;
use taskgraph::dag::{ControllerGraph, ControllerRef, GraphController, Task, TaskGraph, Vertex};
use taskgraph::exec::process::StaticProcess;
use taskgraph::types::ProcessScope;
use taskgraph_test_utils::builders::noop;

fn resolve(graph: TaskGraph) -> GraphController {
    GraphController::new(Arc::new(graph), &StaticProcess::primary(), &ExecutorConfig::default())
}

fn vertex(controller: &GraphController, name: &str) -> Vertex<ControllerRef> {
    let c = controller
        .controller(name)
        .unwrap_or_else(|| panic!("no controller named {name}"));
    Vertex::new(ControllerRef::new(Arc::clone(c)))
}

fn has_edge(controller: &GraphController, from: &str, to: &str) -> bool {
    let graph: &ControllerGraph = controller.directed_graph();
    let from = vertex(controller, from);
    let to = vertex(controller, to);
    graph
        .outgoing_edges(&from)
        .map(|edges| edges.iter().any(|e| e.to() == &to))
        .unwrap_or(false)
}

#[test]
fn dependencies_by_name_become_edges() {
    let graph = TaskGraph::builder("g")
        .task(noop("A").build().unwrap())
        .task(noop("B").build().unwrap())
        .task(noop("C").depends_on("A").depends_on("B").build().unwrap())
        .build();
    let controller = resolve(graph);

    assert!(has_edge(&controller, "A", "C"));
    assert!(has_edge(&controller, "B", "C"));
    assert_eq!(controller.directed_graph().edge_count(), 2);
    assert_eq!(controller.directed_graph().in_degree(&vertex(&controller, "C")), 2);
}

#[test]
fn dependencies_by_task_identity_become_edges() {
    let a = noop("A").build().unwrap();
    let b = noop("B").depends_on(&a).build().unwrap();
    let graph = TaskGraph::builder("g").task(a).task(b).build();
    let controller = resolve(graph);

    assert!(has_edge(&controller, "A", "B"));
}

#[test]
fn unknown_dependency_is_ignored() {
    let graph = TaskGraph::builder("g")
        .task(noop("A").depends_on("ghost").build().unwrap())
        .build();
    let controller = resolve(graph);
    let directed = controller.directed_graph();

    assert_eq!(directed.vertex_count(), 1);
    assert_eq!(directed.in_degree(&vertex(&controller, "A")), 0);
    assert!(!directed.has_cycle());
}

#[test]
fn duplicate_names_all_satisfy_a_dependency() {
    let graph = TaskGraph::builder("g")
        .task(noop("fetch").build().unwrap())
        .task(noop("fetch").build().unwrap())
        .task(noop("merge").depends_on("fetch").build().unwrap())
        .build();
    let controller = resolve(graph);
    let directed = controller.directed_graph();

    let merge = vertex(&controller, "merge");
    assert_eq!(directed.in_degree(&merge), 2);
}

#[test]
fn first_barrier_only_links_to_entry_points() {
    // A, B independent; C depends on A.
    let graph = TaskGraph::builder("g")
        .first_task(noop("first").build().unwrap())
        .task(noop("A").build().unwrap())
        .task(noop("B").build().unwrap())
        .task(noop("C").depends_on("A").build().unwrap())
        .build();
    let controller = resolve(graph);
    let directed = controller.directed_graph();

    assert!(has_edge(&controller, "first", "A"));
    assert!(has_edge(&controller, "first", "B"));
    assert!(!has_edge(&controller, "first", "C"));

    let first = vertex(&controller, "first");
    assert_eq!(directed.in_degree(&first), 0);
    let reachable = directed.descendants(&first);
    assert_eq!(reachable.len(), directed.vertex_count());
}

#[test]
fn last_barrier_only_links_from_exit_points() {
    // A -> C, B independent.
    let graph = TaskGraph::builder("g")
        .task(noop("A").build().unwrap())
        .task(noop("B").build().unwrap())
        .task(noop("C").depends_on("A").build().unwrap())
        .last_task(noop("last").build().unwrap())
        .build();
    let controller = resolve(graph);
    let directed = controller.directed_graph();

    assert!(has_edge(&controller, "C", "last"));
    assert!(has_edge(&controller, "B", "last"));
    assert!(!has_edge(&controller, "A", "last"));

    let last = vertex(&controller, "last");
    assert_eq!(directed.out_degree(&last), 0);
    assert_eq!(directed.ancestors(&last).len(), directed.vertex_count());
}

#[test]
fn first_and_last_frame_the_whole_graph() {
    let graph = TaskGraph::builder("g")
        .first_task(noop("first").build().unwrap())
        .task(noop("A").build().unwrap())
        .task(noop("B").depends_on("A").build().unwrap())
        .last_task(noop("last").build().unwrap())
        .build();
    let controller = resolve(graph);
    let directed = controller.directed_graph();

    assert!(has_edge(&controller, "first", "A"));
    assert!(has_edge(&controller, "B", "last"));
    assert!(!has_edge(&controller, "first", "last"));
    assert!(!directed.has_cycle());
    assert_eq!(directed.edge_count(), 3);
}

#[test]
fn barriers_alone_are_linked() {
    let graph = TaskGraph::builder("g")
        .first_task(noop("first").build().unwrap())
        .last_task(noop("last").build().unwrap())
        .build();
    let controller = resolve(graph);

    assert!(has_edge(&controller, "first", "last"));
}

#[test]
fn task_declared_dependency_of_first_stays_before_it() {
    let graph = TaskGraph::builder("g")
        .first_task(noop("first").depends_on("setup").build().unwrap())
        .task(noop("setup").build().unwrap())
        .task(noop("A").build().unwrap())
        .build();
    let controller = resolve(graph);

    assert!(has_edge(&controller, "setup", "first"));
    assert!(has_edge(&controller, "first", "A"));
    assert!(!has_edge(&controller, "first", "setup"));
    assert!(!controller.directed_graph().has_cycle());
}

#[test]
fn directed_graph_is_built_once() {
    let graph = TaskGraph::builder("g")
        .task(noop("A").build().unwrap())
        .build();
    let controller = resolve(graph);

    let first = controller.directed_graph() as *const ControllerGraph;
    let second = controller.directed_graph() as *const ControllerGraph;
    assert!(std::ptr::eq(first, second));
}

#[test]
fn primary_only_tasks_are_dropped_in_secondary_process() {
    let graph = TaskGraph::builder("g")
        .task(noop("primary-only").build().unwrap())
        .task(
            noop("everywhere")
                .process_scope(ProcessScope::Any)
                .build()
                .unwrap(),
        )
        .build();
    let controller = GraphController::new(
        Arc::new(graph),
        &StaticProcess::secondary(),
        &ExecutorConfig::default(),
    );

    assert!(controller.controller("primary-only").is_none());
    assert!(controller.controller("everywhere").is_some());
    assert_eq!(controller.directed_graph().vertex_count(), 1);
}

#[test]
fn dependency_cycle_is_visible_in_resolved_graph() {
    let graph = TaskGraph::builder("g")
        .task(noop("A").depends_on("B").build().unwrap())
        .task(noop("B").depends_on("A").build().unwrap())
        .build();
    let controller = resolve(graph);

    assert!(controller.directed_graph().has_cycle());
}

#[test]
fn building_a_task_without_body_fails() {
    let err = Task::builder("empty").build().unwrap_err();
    assert!(err.to_string().contains("empty"));
}
