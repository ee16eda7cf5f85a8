//! Task runtime: task bodies, stage scheduler, watcher, live-reload server.

mod error;
pub mod reload;
pub mod runtime;
pub mod server;
pub mod tasks;
pub mod watcher;

pub use error::DevError;
pub use reload::{ReloadMessage, ReloadSession};
pub use runtime::{run, run_in, start_blocking, RunReport, Runner, TaskRun};
pub use tasks::{BuildTask, SassSummary, TaskContext};
pub use watcher::{WatchRule, WatchRules};
