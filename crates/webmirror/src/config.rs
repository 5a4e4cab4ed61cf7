//! Pipeline configuration.
//!
//! Every component receives its section explicitly; nothing reads globals.
//! All sections deserialize with defaults so a partial file is valid.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MirrorError, MirrorResult};
use crate::fetch::{DEFAULT_ACCEPT_LANGUAGE, DEFAULT_USER_AGENT};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub origin: OriginConfig,
    pub assets: AssetsConfig,
    pub acquisition: AcquisitionConfig,
    pub staging: StagingConfig,
    pub publish: PublishConfig,
}

impl MirrorConfig {
    /// Reject settings no run could succeed with.
    pub fn validate(&self) -> MirrorResult<()> {
        let root = url::Url::parse(&self.origin.root_url).map_err(|e| {
            MirrorError::Config(format!("origin.root_url `{}`: {e}", self.origin.root_url))
        })?;
        if root.cannot_be_a_base() {
            return Err(MirrorError::Config(format!(
                "origin.root_url `{}` cannot be used as a base URL",
                self.origin.root_url
            )));
        }
        if self.origin.manifest_path.trim().is_empty() {
            return Err(MirrorError::Config("origin.manifest_path is empty".into()));
        }
        if self.assets.concurrency == 0 {
            return Err(MirrorError::Config(
                "assets.concurrency must be at least 1".into(),
            ));
        }
        if self.acquisition.max_attempts == Some(0) {
            return Err(MirrorError::Config(
                "acquisition.max_attempts must be at least 1 when set".into(),
            ));
        }
        if self.publish.mode == PublishMode::Git && self.publish.remote.is_none() {
            return Err(MirrorError::Config(
                "publish.remote is required for git mode".into(),
            ));
        }
        Ok(())
    }
}

/// Where the entry document and manifest live, and how to ask for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    pub root_url: String,
    /// Service-worker manifest path, relative to `root_url`.
    pub manifest_path: String,
    pub user_agent: String,
    pub accept_language: String,
    pub request_timeout_secs: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            root_url: "https://x.com".to_string(),
            manifest_path: "sw.js".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
            request_timeout_secs: 60,
        }
    }
}

/// Parse an origin root as a directory base, so relative references land
/// below its last path segment instead of replacing it.
pub fn base_url(root_url: &str) -> MirrorResult<url::Url> {
    let mut root = url::Url::parse(root_url)
        .map_err(|e| MirrorError::Config(format!("origin.root_url `{root_url}`: {e}")))?;
    if !root.cannot_be_a_base() && !root.path().ends_with('/') {
        let path = format!("{}/", root.path());
        root.set_path(&path);
    }
    Ok(root)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Asset-origin prefix; URLs under it are mapped below `local_prefix`.
    pub prefix: String,
    pub local_prefix: String,
    /// Downloads in flight at once.
    pub concurrency: usize,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            prefix: "https://abs.twimg.com/responsive-web/".to_string(),
            local_prefix: "responsive-web/".to_string(),
            concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Unbounded when `None`.
    pub max_attempts: Option<u32>,
    pub retry_delay_ms: u64,
}

impl AcquisitionConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    pub path: PathBuf,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./webmirror-staging"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishMode {
    /// Commit into a clone of a git remote.
    Git,
    /// Sync into a plain directory.
    Directory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub mode: PublishMode,
    /// Working copy for git mode, destination for directory mode.
    pub target_dir: PathBuf,
    pub remote: Option<String>,
    pub branch: String,
    pub author_name: String,
    pub author_email: String,
    /// Environment variable holding the push token.
    pub token_env: String,
    pub push: bool,
    pub label_prefix: String,
    /// End the run early when the core documents match the published ones.
    pub skip_if_unchanged: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            mode: PublishMode::Directory,
            target_dir: PathBuf::from("./webmirror-output"),
            remote: None,
            branch: "main".to_string(),
            author_name: "webmirror".to_string(),
            author_email: "webmirror@users.noreply.github.com".to_string(),
            token_env: "GH_PERSONAL_ACCESS_TOKEN".to_string(),
            push: true,
            label_prefix: "Web build".to_string(),
            skip_if_unchanged: true,
        }
    }
}

impl PublishConfig {
    /// `"<prefix>: <sha[..7]>"`, or the bare prefix when there is no sha.
    pub fn release_label(&self, sha: Option<&str>) -> String {
        match sha {
            Some(sha) => {
                let short: String = sha.chars().take(7).collect();
                format!("{}: {short}", self.label_prefix)
            }
            None => self.label_prefix.clone(),
        }
    }
}
