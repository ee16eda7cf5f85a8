//! Filesystem watch rules and the change-batching loop behind `watch`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use glob::{MatchOptions, Pattern};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use sassline_core::graph::{HTML, SASS};
use sassline_core::{BuildConfig, TaskName};

use crate::error::DevError;
use crate::tasks::{self, TaskContext};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// One glob → task binding.
#[derive(Debug, Clone)]
pub struct WatchRule {
    pub pattern: Pattern,
    pub task: TaskName,
}

impl WatchRule {
    pub fn new(glob: &str, task: impl Into<TaskName>) -> Result<Self, DevError> {
        let pattern = Pattern::new(glob).map_err(|source| DevError::Glob {
            pattern: glob.to_string(),
            source,
        })?;
        Ok(Self {
            pattern,
            task: task.into(),
        })
    }
}

/// Rules evaluated against paths relative to the project root.
#[derive(Debug, Clone)]
pub struct WatchRules {
    root: PathBuf,
    rules: Vec<WatchRule>,
}

impl WatchRules {
    pub fn new(root: impl Into<PathBuf>, rules: Vec<WatchRule>) -> Self {
        Self {
            root: root.into(),
            rules,
        }
    }

    /// HTML glob → `html`, stylesheet tree glob → `sass`.
    pub fn from_config(root: &Path, config: &BuildConfig) -> Result<Self, DevError> {
        Ok(Self::new(
            root,
            vec![
                WatchRule::new(&config.html.0, HTML)?,
                WatchRule::new(&config.sass.watch, SASS)?,
            ],
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Task triggered by a change to `path`, if any (first matching rule wins).
    pub fn classify(&self, path: &Path) -> Option<&TaskName> {
        let relative = path.strip_prefix(&self.root).ok()?;
        self.rules
            .iter()
            .find(|rule| rule.pattern.matches_path_with(relative, MATCH_OPTIONS))
            .map(|rule| &rule.task)
    }
}

/// Changes collected during the quiet period, grouped per task.
#[derive(Debug, Default)]
pub(crate) struct PendingChanges {
    batches: Vec<(TaskName, Vec<PathBuf>)>,
    deadline: Option<Instant>,
}

impl PendingChanges {
    /// Record a change; every change pushes the flush deadline back.
    pub(crate) fn record(&mut self, task: &TaskName, path: PathBuf, deadline: Instant) {
        match self.batches.iter_mut().find(|(name, _)| name == task) {
            Some((_, paths)) => {
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
            None => self.batches.push((task.clone(), vec![path])),
        }
        self.deadline = Some(deadline);
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub(crate) fn take(&mut self) -> Vec<(TaskName, Vec<PathBuf>)> {
        self.deadline = None;
        std::mem::take(&mut self.batches)
    }
}

/// Register the watch and return the event loop future.
///
/// Subscription happens before this returns, so setup errors (bad glob,
/// unwatchable root) surface to the caller and no change made after the
/// return is missed.
pub(crate) fn subscribe(
    ctx: Arc<TaskContext>,
    shutdown_rx: broadcast::Receiver<()>,
) -> Result<impl std::future::Future<Output = Result<(), DevError>> + Send + 'static, DevError> {
    let rules = WatchRules::from_config(&ctx.root, &ctx.config)?;

    let (event_tx, event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(rules.root(), RecursiveMode::Recursive)?;
    tracing::info!(
        root = %rules.root().display(),
        html = %ctx.config.html,
        sass = %ctx.config.sass.watch,
        "watching for changes",
    );

    Ok(watch_loop(ctx, rules, watcher, event_rx, shutdown_rx))
}

async fn watch_loop(
    ctx: Arc<TaskContext>,
    rules: WatchRules,
    _watcher: RecommendedWatcher,
    mut event_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DevError> {
    let quiet = Duration::from_millis(ctx.config.watch.debounce_ms);
    let mut pending = PendingChanges::default();

    loop {
        let deadline = pending.deadline();
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                for (task, paths) in pending.take() {
                    tasks::run_triggered(&ctx, &task, &paths).await;
                }
            }
            event = event_rx.recv() => {
                let Some(event) = event else {
                    return Err(DevError::ChannelClosed("watcher events"));
                };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }
                for path in event.paths {
                    if let Some(task) = rules.classify(&path) {
                        tracing::debug!(path = %path.display(), task = %task, "change detected");
                        pending.record(task, path.clone(), Instant::now() + quiet);
                    }
                }
            }
        }
    }

    Ok(())
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}
