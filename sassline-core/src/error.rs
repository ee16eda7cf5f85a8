//! Error types for sassline-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::graph::TaskName;

/// Errors that can arise while loading the build configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure reading the config file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A value parsed but cannot be used (empty path, empty glob, ...).
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Errors raised while registering or planning tasks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("task '{0}' is already registered")]
    Duplicate(TaskName),

    #[error("task '{0}' is not registered")]
    UnknownTask(TaskName),

    #[error("task '{required_by}' depends on unregistered task '{name}'")]
    MissingPrerequisite { name: TaskName, required_by: TaskName },

    #[error("task dependency cycle: {}", format_cycle(.0))]
    Cycle(Vec<TaskName>),
}

fn format_cycle(path: &[TaskName]) -> String {
    path.iter()
        .map(|name| name.0.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}
