//! Live-reload session shared by every task.
//!
//! The session is a broadcast channel; each connected browser holds one
//! receiver. Pushing is fire-and-forget: with no clients it is a no-op and it
//! never waits on a slow client (lagging clients get a full reload instead).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// JSON message sent to browser clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReloadMessage {
    /// Only stylesheets changed; swap them in place.
    Inject { paths: Vec<String> },
    /// Anything else changed; reload the page.
    Reload { paths: Vec<String> },
}

impl ReloadMessage {
    pub fn paths(&self) -> &[String] {
        match self {
            ReloadMessage::Inject { paths } | ReloadMessage::Reload { paths } => paths,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReloadSession {
    base_dir: PathBuf,
    tx: broadcast::Sender<ReloadMessage>,
}

impl ReloadSession {
    /// `base_dir` is the directory served to browsers; pushed paths are
    /// expressed as URL paths relative to it.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            base_dir: base_dir.into(),
            tx,
        }
    }

    /// Register a client.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.tx.subscribe()
    }

    pub fn has_clients(&self) -> bool {
        self.client_count() > 0
    }

    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Push changed files to every connected client.
    ///
    /// Source maps are never pushed. Returns the number of clients reached.
    pub fn notify(&self, changed: &[PathBuf]) -> usize {
        let paths: Vec<String> = changed
            .iter()
            .filter(|path| !has_extension(path, "map"))
            .map(|path| self.url_path(path))
            .collect();

        if paths.is_empty() || !self.has_clients() {
            return 0;
        }

        let message = if paths.iter().all(|p| p.ends_with(".css")) {
            ReloadMessage::Inject { paths }
        } else {
            ReloadMessage::Reload { paths }
        };
        tracing::debug!(?message, "pushing to browser clients");
        self.tx.send(message).unwrap_or(0)
    }

    /// `/css/app.css` for `<base_dir>/css/app.css`.
    pub fn url_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.base_dir).unwrap_or(path);
        let segments: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                std::path::Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        format!("/{}", segments.join("/"))
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}
