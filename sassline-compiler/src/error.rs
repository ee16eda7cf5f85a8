//! Error types for sassline-compiler.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while compiling one entry point.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The stylesheet failed to compile (syntax error, missing import,
    /// unreadable entry point). `message` is the compiler's own report.
    #[error("failed to compile {path}:\n{message}")]
    Sass { path: PathBuf, message: String },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Source map serialization error.
    #[error("source map JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`CompileError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CompileError {
    CompileError::Io {
        path: path.into(),
        source,
    }
}
