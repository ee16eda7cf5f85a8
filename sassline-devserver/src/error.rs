use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the task runtime, watcher and dev server.
#[derive(Debug, Error)]
pub enum DevError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("config error: {0}")]
    Config(#[from] sassline_core::ConfigError),

    #[error("{0}")]
    Graph(#[from] sassline_core::GraphError),

    #[error("task '{0}' is registered but has nothing to run")]
    NoBody(sassline_core::TaskName),

    #[error("invalid glob '{pattern}': {source}")]
    Glob {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("task runtime error: {0}")]
    Runtime(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DevError {
    DevError::Io {
        path: path.into(),
        source,
    }
}
