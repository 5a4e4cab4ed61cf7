//! Publishing the staged mirror.
//!
//! A publisher exposes what it last published (for the early-exit check)
//! and takes a finished staging directory plus a release label. Reporting
//! "nothing changed" is a normal outcome, distinct from failure.

pub mod directory;
pub mod git;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;

use crate::config::{PublishConfig, PublishMode};
use crate::error::PublishError;

pub use directory::DirectoryPublisher;
pub use git::GitPublisher;

/// Name of the VCS metadata directory, never compared or copied.
const VCS_DIR: &str = ".git";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// The published tree already matches; nothing was written.
    Unchanged,
    /// New content went out. `revision` is the commit id when there is one.
    Published { revision: Option<String> },
}

#[async_trait]
pub trait MirrorPublisher: Send + Sync {
    /// Contents of a previously published file, if any.
    async fn published_file(&self, relative: &str) -> Result<Option<Vec<u8>>, PublishError>;

    /// Replace the published tree with `dir`.
    async fn publish(&self, dir: &Path, label: &str) -> Result<PublishOutcome, PublishError>;
}

/// Build the publisher selected by `publish.mode`.
pub fn publisher_from_config(config: &PublishConfig) -> Result<Box<dyn MirrorPublisher>, PublishError> {
    Ok(match config.mode {
        PublishMode::Git => Box::new(GitPublisher::from_config(config)?),
        PublishMode::Directory => Box::new(DirectoryPublisher::new(&config.target_dir)),
    })
}

/// Read a file, mapping "not found" to `None`.
pub(crate) fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, PublishError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PublishError::io(path, e)),
    }
}

/// Relative paths of all files below `root`, skipping a top-level `.git`.
pub(crate) fn list_files(root: &Path) -> Result<BTreeSet<PathBuf>, PublishError> {
    let mut files = BTreeSet::new();
    if !root.exists() {
        return Ok(files);
    }
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| PublishError::io(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| PublishError::io(&dir, e))?;
            let path = entry.path();
            if dir == root && entry.file_name() == VCS_DIR {
                continue;
            }
            let file_type = entry.file_type().map_err(|e| PublishError::io(&path, e))?;
            if file_type.is_dir() {
                pending.push(path);
            } else if let Ok(relative) = path.strip_prefix(root) {
                files.insert(relative.to_path_buf());
            }
        }
    }
    Ok(files)
}

/// Same file set with the same bytes, ignoring `.git`.
pub fn trees_equal(a: &Path, b: &Path) -> Result<bool, PublishError> {
    let files = list_files(a)?;
    if files != list_files(b)? {
        return Ok(false);
    }
    for relative in &files {
        let left = a.join(relative);
        let right = b.join(relative);
        let left = std::fs::read(&left).map_err(|e| PublishError::io(&left, e))?;
        let right = std::fs::read(&right).map_err(|e| PublishError::io(&right, e))?;
        if left != right {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Delete everything in `root` except `.git`.
pub(crate) fn clear_tree(root: &Path) -> Result<(), PublishError> {
    let entries = std::fs::read_dir(root).map_err(|e| PublishError::io(root, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| PublishError::io(root, e))?;
        if entry.file_name() == VCS_DIR {
            continue;
        }
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| PublishError::io(&path, e))?;
        let removed = if file_type.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        removed.map_err(|e| PublishError::io(&path, e))?;
    }
    Ok(())
}

/// Copy every file of `src` into `dst`, skipping `.git`.
pub(crate) fn copy_tree(src: &Path, dst: &Path) -> Result<usize, PublishError> {
    let files = list_files(src)?;
    for relative in &files {
        let from = src.join(relative);
        let to = dst.join(relative);
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PublishError::io(parent, e))?;
        }
        std::fs::copy(&from, &to).map_err(|e| PublishError::io(&from, e))?;
    }
    Ok(files.len())
}
