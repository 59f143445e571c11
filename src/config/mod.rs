// src/config/mod.rs

//! TOML configuration for the `taskgraph` binary.
//!
//! - [`model`] is the serde data model (`[executor]`, `[graph]`, `[task.*]`).
//! - [`loader`] reads a file from disk.
//! - [`validate`] turns a `RawConfigFile` into a checked `ConfigFile`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{ConfigFile, ExecutorConfig, GraphSection, RawConfigFile, TaskConfig};
