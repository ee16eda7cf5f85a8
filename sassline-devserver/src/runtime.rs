use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::broadcast;

use sassline_core::{BuildConfig, TaskName, TaskRegistry};

use crate::error::{io_err, DevError};
use crate::tasks::{self, BuildTask, TaskContext};

/// One executed task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRun {
    pub name: String,
    pub stage: usize,
    pub duration_ms: u128,
}

/// What a run executed, in completion order within each stage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub target: String,
    pub tasks: Vec<TaskRun>,
    /// A watcher or server was left running when the plan finished.
    pub long_running: bool,
}

impl RunReport {
    pub fn stage_of(&self, name: &str) -> Option<usize> {
        self.tasks.iter().find(|t| t.name == name).map(|t| t.stage)
    }
}

/// Executes plans from a fixed registry against one context.
pub struct Runner {
    registry: TaskRegistry,
    ctx: Arc<TaskContext>,
}

impl Runner {
    pub fn new(registry: TaskRegistry, ctx: Arc<TaskContext>) -> Self {
        Self { registry, ctx }
    }

    pub fn context(&self) -> &Arc<TaskContext> {
        &self.ctx
    }

    /// Run `target` and its prerequisites stage by stage.
    ///
    /// Tasks within a stage run concurrently; a stage starts only once the
    /// previous one has fully settled. The first failing task aborts the
    /// run after its stage completes.
    pub async fn run(&self, target: &TaskName) -> Result<RunReport, DevError> {
        let plan = self.registry.plan(target)?;
        for name in plan.tasks() {
            BuildTask::resolve(name)?;
        }
        let mut report = RunReport {
            target: target.to_string(),
            ..RunReport::default()
        };

        for (stage, names) in plan.stages.iter().enumerate() {
            let results = join_all(names.iter().map(|name| self.run_one(name, stage))).await;
            for result in results {
                report.tasks.push(result?);
            }
        }

        report.long_running = self.ctx.has_background();
        Ok(report)
    }

    async fn run_one(&self, name: &TaskName, stage: usize) -> Result<TaskRun, DevError> {
        tracing::info!("Starting '{name}'...");
        let started = Instant::now();

        if let Err(err) = tasks::run_body(&self.ctx, name).await {
            tracing::error!(
                "'{name}' errored after {} ms: {err}",
                started.elapsed().as_millis()
            );
            return Err(err);
        }

        let duration_ms = started.elapsed().as_millis();
        tracing::info!("Finished '{name}' after {duration_ms} ms");
        Ok(TaskRun {
            name: name.to_string(),
            stage,
            duration_ms,
        })
    }
}

/// Start the runtime and block the current thread until the run exits.
pub fn start_blocking(root: &Path, target: &str) -> Result<RunReport, DevError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(root.to_path_buf(), TaskName::from(target)))
}

/// Load the config under `root`, run `target`, then keep watching/serving
/// until Ctrl-C if the run left background work behind.
pub async fn run(root: PathBuf, target: TaskName) -> Result<RunReport, DevError> {
    let config = BuildConfig::load_at(&root)?;
    run_in(Arc::new(TaskContext::new(root, config)), target).await
}

/// [`run`] against an existing context. On error every background task that
/// was started has been stopped and joined before this returns.
pub async fn run_in(ctx: Arc<TaskContext>, target: TaskName) -> Result<RunReport, DevError> {
    // Subscribed before any task starts so an early background failure is
    // not missed by the wait below.
    let stop_rx = ctx.subscribe_shutdown();
    let runner = Runner::new(TaskRegistry::builtin(), ctx.clone());

    let report = match runner.run(&target).await {
        Ok(report) => report,
        Err(err) => {
            ctx.shutdown();
            if let Err(join_err) = ctx.join_background().await {
                tracing::warn!(error = %join_err, "background task failed during abort");
            }
            return Err(err);
        }
    };

    if report.long_running {
        wait_for_shutdown(stop_rx).await?;
    }

    ctx.shutdown();
    ctx.join_background().await?;
    Ok(report)
}

async fn wait_for_shutdown(mut stop_rx: broadcast::Receiver<()>) -> Result<(), DevError> {
    tokio::select! {
        _ = stop_rx.recv() => Ok(()),
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => {
                tracing::info!("received ctrl-c, shutting down");
                Ok(())
            }
            Err(err) => Err(DevError::Runtime(format!("ctrl-c handler failed: {err}"))),
        },
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries the run report
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
