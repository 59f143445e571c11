// src/dag/mod.rs

//! Task model and dependency graphs.
//!
//! - [`graph`] is a generic mutable directed graph with cycle detection.
//! - [`task`] and [`task_graph`] describe what to run.
//! - [`graph_controller`] resolves a task graph into a controller graph for
//!   one execution and owns its lifecycle flags.

pub mod graph;
pub mod graph_controller;
pub mod task;
pub mod task_graph;

pub use graph::{Edge, Graph, Vertex};
pub use graph_controller::{ControllerGraph, ControllerRef, GraphController, GraphStatus};
pub use task::{Dependency, Task, TaskBody, TaskBuilder, TaskId, TaskListener};
pub use task_graph::{TaskGraph, TaskGraphBuilder, TaskGraphListener};
