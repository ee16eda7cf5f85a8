//! sassline core library: build configuration, task graph, errors.
//!
//! Public API surface:
//! - [`config`]: [`BuildConfig`] and its YAML loader
//! - [`graph`]: [`TaskRegistry`] and topological stage planning
//! - [`error`]: [`ConfigError`], [`GraphError`]

pub mod config;
pub mod error;
pub mod graph;

pub use config::{BuildConfig, HtmlSources, OutputStyle, ServerConfig, SourcePaths, WatchConfig};
pub use error::{ConfigError, GraphError};
pub use graph::{Plan, TaskName, TaskNode, TaskRegistry};
