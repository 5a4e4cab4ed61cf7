//! Publish by committing into a git repository.
//!
//! The output repository is cloned fresh into `target_dir` the first time
//! the publisher needs it. The push token, when present, only ever appears
//! in the URL handed to `git clone` and `git push`; it is not written to
//! the clone's config and is masked in every error.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::OnceCell;

use super::{clear_tree, copy_tree, read_optional, trees_equal, MirrorPublisher, PublishOutcome};
use crate::config::PublishConfig;
use crate::error::PublishError;
use crate::staging::safe_relative_path;

const TOKEN_USER: &str = "x-access-token";

#[derive(Debug, Clone)]
pub struct GitPublisherConfig {
    pub remote: String,
    pub branch: String,
    /// Where the working copy is cloned.
    pub workdir: PathBuf,
    pub author_name: String,
    pub author_email: String,
    pub token: Option<String>,
    pub push: bool,
}

pub struct GitPublisher {
    config: GitPublisherConfig,
    checkout: OnceCell<PathBuf>,
}

impl GitPublisher {
    pub fn new(config: GitPublisherConfig) -> Self {
        Self {
            config,
            checkout: OnceCell::new(),
        }
    }

    /// Read the remote from config and the token from `token_env`.
    pub fn from_config(publish: &PublishConfig) -> Result<Self, PublishError> {
        let remote = publish
            .remote
            .clone()
            .ok_or_else(|| PublishError::Config("publish.remote is not set".into()))?;
        let token = std::env::var(&publish.token_env)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if token.is_none() && publish.push {
            tracing::warn!(
                var = %publish.token_env,
                "no push token in environment, relying on ambient git credentials"
            );
        }

        Ok(Self::new(GitPublisherConfig {
            remote,
            branch: publish.branch.clone(),
            workdir: publish.target_dir.clone(),
            author_name: publish.author_name.clone(),
            author_email: publish.author_email.clone(),
            token,
            push: publish.push,
        }))
    }

    /// Remote URL with the token injected as `x-access-token` credentials.
    ///
    /// Only `https://` remotes carry a token; anything else is returned as is.
    pub fn authenticated_remote(&self) -> String {
        let Some(token) = &self.config.token else {
            return self.config.remote.clone();
        };
        match url::Url::parse(&self.config.remote) {
            Ok(mut url) if url.scheme() == "https" => {
                let injected = url.set_username(TOKEN_USER).is_ok()
                    && url.set_password(Some(token.as_str())).is_ok();
                if !injected {
                    return self.config.remote.clone();
                }
                url.into()
            }
            _ => self.config.remote.clone(),
        }
    }

    fn redact(&self, text: &str) -> String {
        match &self.config.token {
            Some(token) => text.replace(token.as_str(), "***"),
            None => text.to_string(),
        }
    }

    async fn git(&self, cwd: Option<&Path>, args: &[&str]) -> Result<String, PublishError> {
        let mut command = Command::new("git");
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }
        command.args(args).env("GIT_TERMINAL_PROMPT", "0");

        let rendered = self.redact(&args.join(" "));
        tracing::debug!(command = %rendered, "running git");

        let output = command.output().await.map_err(|e| PublishError::Git {
            command: rendered.clone(),
            status: "not started".into(),
            stderr: e.to_string(),
        })?;

        if !output.status.success() {
            return Err(PublishError::Git {
                command: rendered,
                status: output.status.to_string(),
                stderr: self.redact(String::from_utf8_lossy(&output.stderr).trim()),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Clone on first use; later calls reuse the same working copy.
    async fn workdir(&self) -> Result<&Path, PublishError> {
        let path = self
            .checkout
            .get_or_try_init(|| async {
                self.clone_fresh().await?;
                Ok::<_, PublishError>(self.config.workdir.clone())
            })
            .await?;
        Ok(path.as_path())
    }

    async fn clone_fresh(&self) -> Result<(), PublishError> {
        let workdir = &self.config.workdir;
        if workdir.exists() {
            std::fs::remove_dir_all(workdir).map_err(|e| PublishError::io(workdir, e))?;
        }
        if let Some(parent) = workdir.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PublishError::io(parent, e))?;
        }

        let remote = self.authenticated_remote();
        let branch = self.config.branch.as_str();
        let target = workdir.to_string_lossy().into_owned();
        let heads = self.git(None, &["ls-remote", "--heads", remote.as_str(), branch]).await?;

        if heads.trim().is_empty() {
            tracing::info!(branch, "branch not on remote yet, starting a new history");
            std::fs::create_dir_all(workdir).map_err(|e| PublishError::io(workdir, e))?;
            self.git(Some(workdir), &["init"]).await?;
            self.git(Some(workdir), &["remote", "add", "origin", self.config.remote.as_str()])
                .await?;
            let head = format!("refs/heads/{branch}");
            self.git(Some(workdir), &["symbolic-ref", "HEAD", head.as_str()]).await?;
        } else {
            self.git(
                None,
                &["clone", "--branch", branch, "--single-branch", remote.as_str(), target.as_str()],
            )
            .await?;
            self.git(Some(workdir), &["remote", "set-url", "origin", self.config.remote.as_str()])
                .await?;
        }

        tracing::info!(workdir = %workdir.display(), "output repository ready");
        Ok(())
    }
}

#[async_trait]
impl MirrorPublisher for GitPublisher {
    async fn published_file(&self, relative: &str) -> Result<Option<Vec<u8>>, PublishError> {
        let relative = safe_relative_path(relative).map_err(|e| PublishError::Config(e.to_string()))?;
        let workdir = self.workdir().await?;
        read_optional(&workdir.join(relative))
    }

    async fn publish(&self, dir: &Path, label: &str) -> Result<PublishOutcome, PublishError> {
        let workdir = self.workdir().await?;
        if trees_equal(dir, workdir)? {
            tracing::info!("output repository already matches the staged mirror");
            return Ok(PublishOutcome::Unchanged);
        }

        clear_tree(workdir)?;
        let files = copy_tree(dir, workdir)?;
        self.git(Some(workdir), &["add", "-A"]).await?;

        let status = self.git(Some(workdir), &["status", "--porcelain"]).await?;
        if status.trim().is_empty() {
            tracing::info!("no staged changes after sync");
            return Ok(PublishOutcome::Unchanged);
        }

        let name = format!("user.name={}", self.config.author_name);
        let email = format!("user.email={}", self.config.author_email);
        self.git(
            Some(workdir),
            &[
                "-c",
                name.as_str(),
                "-c",
                email.as_str(),
                "-c",
                "commit.gpgsign=false",
                "commit",
                "--quiet",
                "-m",
                label,
            ],
        )
        .await?;
        let revision = self
            .git(Some(workdir), &["rev-parse", "HEAD"])
            .await?
            .trim()
            .to_string();
        tracing::info!(%revision, files, label, "committed mirror");

        if self.config.push {
            let remote = self.authenticated_remote();
            let refspec = format!("HEAD:refs/heads/{}", self.config.branch);
            self.git(Some(workdir), &["push", remote.as_str(), refspec.as_str()]).await?;
            tracing::info!(branch = %self.config.branch, "pushed");
        }

        Ok(PublishOutcome::Published {
            revision: Some(revision),
        })
    }
}
