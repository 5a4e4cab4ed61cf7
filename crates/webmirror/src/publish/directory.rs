//! Publish into a plain directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{clear_tree, copy_tree, read_optional, trees_equal, MirrorPublisher, PublishOutcome};
use crate::error::PublishError;
use crate::staging::safe_relative_path;

/// Keeps `target` identical to the last staged tree. No history.
#[derive(Debug, Clone)]
pub struct DirectoryPublisher {
    target: PathBuf,
}

impl DirectoryPublisher {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }
}

#[async_trait]
impl MirrorPublisher for DirectoryPublisher {
    async fn published_file(&self, relative: &str) -> Result<Option<Vec<u8>>, PublishError> {
        let relative = safe_relative_path(relative).map_err(|e| PublishError::Config(e.to_string()))?;
        read_optional(&self.target.join(relative))
    }

    async fn publish(&self, dir: &Path, label: &str) -> Result<PublishOutcome, PublishError> {
        if self.target.exists() && trees_equal(dir, &self.target)? {
            tracing::info!(dir = %self.target.display(), "published tree is already current");
            return Ok(PublishOutcome::Unchanged);
        }

        std::fs::create_dir_all(&self.target).map_err(|e| PublishError::io(&self.target, e))?;
        clear_tree(&self.target)?;
        let files = copy_tree(dir, &self.target)?;
        tracing::info!(dir = %self.target.display(), files, label, "mirror published");
        Ok(PublishOutcome::Published { revision: None })
    }
}
