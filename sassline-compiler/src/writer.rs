//! Hash-gated atomic writer.
//!
//! ## `atomic_write`: 5-step protocol
//!
//! 1. SHA-256 hash the new content.
//! 2. Hash the file currently on disk (if any) → skip if identical.
//! 3. Write to a unique `<path>.<pid>-<seq>.sassline.tmp` sibling.
//! 4. Rename to final path (atomic on POSIX).
//! 5. Report [`WriteResult::Written`].
//!
//! Overlapping compilations of the same entry point each get their own
//! temporary file, so the last rename wins and readers never observe a
//! partially written stylesheet.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

use crate::error::{io_err, CompileError};

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Outcome of an individual file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// File was written (content changed or did not previously exist).
    Written { path: PathBuf },
    /// File was skipped: content on disk is byte-identical.
    Unchanged { path: PathBuf },
}

impl WriteResult {
    pub fn path(&self) -> &Path {
        match self {
            WriteResult::Written { path } | WriteResult::Unchanged { path } => path,
        }
    }

    pub fn is_written(&self) -> bool {
        matches!(self, WriteResult::Written { .. })
    }
}

fn digest(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

/// Atomically write `content` to `path` unless the file already holds it.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<WriteResult, CompileError> {
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp = PathBuf::from(format!(
        "{}.{}-{}.sassline.tmp",
        path.display(),
        std::process::id(),
        seq
    ));
    atomic_write_with_tmp(path, content, &tmp)
}

fn atomic_write_with_tmp(
    path: &Path,
    content: &[u8],
    tmp: &Path,
) -> Result<WriteResult, CompileError> {
    let new_digest = digest(content);

    match std::fs::read(path) {
        Ok(existing) if digest(&existing) == new_digest => {
            tracing::debug!("unchanged: {}", path.display());
            return Ok(WriteResult::Unchanged {
                path: path.to_path_buf(),
            });
        }
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(io_err(path, err)),
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    std::fs::write(tmp, content).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    tracing::info!("wrote: {}", path.display());
    Ok(WriteResult::Written {
        path: path.to_path_buf(),
    })
}
