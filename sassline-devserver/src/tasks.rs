//! Task bodies and the context they share.

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use sassline_compiler::{compile, CompileOptions};
use sassline_core::graph::{DEFAULT, HTML, SASS, SERVE, WATCH};
use sassline_core::{BuildConfig, TaskName};

use crate::error::DevError;
use crate::reload::ReloadSession;
use crate::{server, watcher};

type BackgroundHandle = (&'static str, JoinHandle<Result<(), DevError>>);

/// Everything a task may touch: the immutable config, the reload session
/// and the background work (watch loop, HTTP server) it starts.
#[derive(Debug)]
pub struct TaskContext {
    pub root: PathBuf,
    pub config: BuildConfig,
    pub reload: ReloadSession,
    shutdown: broadcast::Sender<()>,
    background: Mutex<Vec<BackgroundHandle>>,
    server_addr: OnceLock<SocketAddr>,
}

impl TaskContext {
    pub fn new(root: impl Into<PathBuf>, config: BuildConfig) -> Self {
        let root = root.into();
        // Canonicalize so that watcher paths (which arrive as real paths)
        // match the strip_prefix checks in the watch rules.
        let root = std::fs::canonicalize(&root).unwrap_or(root);
        let base_dir = BuildConfig::resolve(&root, &config.server.base_dir);
        let base_dir = std::fs::canonicalize(&base_dir).unwrap_or(base_dir);
        let (shutdown, _) = broadcast::channel(16);

        Self {
            reload: ReloadSession::new(base_dir),
            root,
            config,
            shutdown,
            background: Mutex::new(Vec::new()),
            server_addr: OnceLock::new(),
        }
    }

    pub fn output_folder(&self) -> PathBuf {
        BuildConfig::resolve(&self.root, &self.config.sass.output_folder)
    }

    pub fn base_dir(&self) -> PathBuf {
        let base = BuildConfig::resolve(&self.root, &self.config.server.base_dir);
        std::fs::canonicalize(&base).unwrap_or(base)
    }

    /// Address of the dev server, once `serve` has bound it.
    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.server_addr.get().copied()
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    /// Ask every background task to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    pub fn has_background(&self) -> bool {
        !self.lock_background().is_empty()
    }

    /// Run `future` until it finishes; a finished background task stops the
    /// others too.
    pub(crate) fn spawn_background<F>(&self, name: &'static str, future: F)
    where
        F: Future<Output = Result<(), DevError>> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let result = future.await;
            if let Err(err) = &result {
                tracing::error!(task = name, error = %err, "background task failed");
            }
            let _ = shutdown.send(());
            result
        });
        self.lock_background().push((name, handle));
    }

    /// Wait for every background task started so far.
    pub async fn join_background(&self) -> Result<(), DevError> {
        let handles = std::mem::take(&mut *self.lock_background());
        let mut first_err = None;
        for (name, handle) in handles {
            if let Err(err) = handle_join(name, handle.await) {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn lock_background(&self) -> MutexGuard<'_, Vec<BackgroundHandle>> {
        self.background
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DevError>, tokio::task::JoinError>,
) -> Result<(), DevError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DevError::Runtime(format!("{task} task join failure: {err}"))),
    }
}

// ---------------------------------------------------------------------------
// Task dispatch
// ---------------------------------------------------------------------------

/// Body bound to a registered task name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildTask {
    Sass,
    Html,
    Watch,
    Serve,
    /// Prerequisites only (`default`).
    Alias,
}

impl BuildTask {
    /// Body bound to `name`, or `None` for a name with nothing to run.
    pub fn for_name(name: &TaskName) -> Option<Self> {
        match name.as_str() {
            SASS => Some(BuildTask::Sass),
            HTML => Some(BuildTask::Html),
            WATCH => Some(BuildTask::Watch),
            SERVE => Some(BuildTask::Serve),
            DEFAULT => Some(BuildTask::Alias),
            _ => None,
        }
    }

    pub fn resolve(name: &TaskName) -> Result<Self, DevError> {
        Self::for_name(name).ok_or_else(|| DevError::NoBody(name.clone()))
    }
}

/// Run the body of one task (prerequisites are the scheduler's job).
pub async fn run_body(ctx: &Arc<TaskContext>, name: &TaskName) -> Result<(), DevError> {
    match BuildTask::resolve(name)? {
        BuildTask::Sass => {
            sass(ctx).await;
            Ok(())
        }
        BuildTask::Html => html(ctx, None).map(|_| ()),
        BuildTask::Watch => watch(ctx),
        BuildTask::Serve => serve(ctx).await,
        BuildTask::Alias => Ok(()),
    }
}

/// Run a task in response to watched changes. Failures are logged, never
/// propagated, so the watch loop keeps going.
pub(crate) async fn run_triggered(ctx: &Arc<TaskContext>, name: &TaskName, changed: &[PathBuf]) {
    tracing::info!("Starting '{name}'...");
    let started = std::time::Instant::now();
    let result = match BuildTask::for_name(name) {
        Some(BuildTask::Sass) => {
            sass(ctx).await;
            Ok(())
        }
        Some(BuildTask::Html) => html(ctx, Some(changed)).map(|_| ()),
        other => {
            tracing::warn!(task = %name, kind = ?other, "task cannot be triggered by the watcher");
            return;
        }
    };
    match result {
        Ok(()) => tracing::info!(
            "Finished '{name}' after {} ms",
            started.elapsed().as_millis()
        ),
        Err(err) => tracing::error!(task = %name, error = %err, "triggered task failed"),
    }
}

// ---------------------------------------------------------------------------
// sass
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SassSummary {
    pub compiled: usize,
    pub failed: usize,
}

/// Compile both entry points concurrently into the output folder.
pub async fn sass(ctx: &TaskContext) -> SassSummary {
    let out = ctx.output_folder();
    let options = CompileOptions::from(&ctx.config.sass);
    let jobs = ctx
        .config
        .sass
        .entry_points()
        .map(|entry| compile_entry(ctx, BuildConfig::resolve(&ctx.root, entry), out.clone(), options));

    let mut summary = SassSummary::default();
    for ok in join_all(jobs).await {
        if ok {
            summary.compiled += 1;
        } else {
            summary.failed += 1;
        }
    }
    summary
}

async fn compile_entry(
    ctx: &TaskContext,
    source: PathBuf,
    out: PathBuf,
    options: CompileOptions,
) -> bool {
    let shown = source.clone();
    let result = tokio::task::spawn_blocking(move || compile(&source, &out, &options)).await;

    match result {
        Ok(Ok(output)) => {
            let changed = output.written();
            let clients = ctx.reload.notify(&changed);
            tracing::debug!(
                source = %shown.display(),
                written = changed.len(),
                clients,
                "stylesheet compiled",
            );
            true
        }
        Ok(Err(err)) => {
            tracing::error!("{err}");
            false
        }
        Err(err) => {
            tracing::error!(source = %shown.display(), error = %err, "compile task join failure");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// html
// ---------------------------------------------------------------------------

/// Push HTML files to connected browsers. With `changed` the given files are
/// pushed; otherwise every file matching the HTML glob is.
pub fn html(ctx: &TaskContext, changed: Option<&[PathBuf]>) -> Result<usize, DevError> {
    let files = match changed {
        Some(paths) => paths.to_vec(),
        None => matching_files(&ctx.root, &ctx.config.html.0)?,
    };
    Ok(ctx.reload.notify(&files))
}

fn matching_files(root: &Path, glob_pattern: &str) -> Result<Vec<PathBuf>, DevError> {
    let full = BuildConfig::resolve(root, Path::new(glob_pattern));
    let full = full.to_string_lossy();
    let entries = glob::glob(&full).map_err(|source| DevError::Glob {
        pattern: glob_pattern.to_string(),
        source,
    })?;
    Ok(entries
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect())
}

// ---------------------------------------------------------------------------
// watch / serve
// ---------------------------------------------------------------------------

/// Register the watches; the loop keeps running in the background.
pub fn watch(ctx: &Arc<TaskContext>) -> Result<(), DevError> {
    let watch_loop = watcher::subscribe(ctx.clone(), ctx.subscribe_shutdown())?;
    ctx.spawn_background("watcher", watch_loop);
    Ok(())
}

/// Bind the dev server and serve the base directory in the background.
pub async fn serve(ctx: &Arc<TaskContext>) -> Result<(), DevError> {
    let listener = server::bind(&ctx.config.listen_addr()).await?;
    let addr = listener
        .local_addr()
        .map_err(|e| crate::error::io_err("tcp listener", e))?;
    let _ = ctx.server_addr.set(addr);

    let base_dir = ctx.base_dir();
    tracing::info!(base_dir = %base_dir.display(), "serving at http://{addr}");
    let router = server::router(base_dir, ctx.reload.clone());
    ctx.spawn_background(
        "server",
        server::serve(listener, router, ctx.subscribe_shutdown()),
    );
    Ok(())
}
