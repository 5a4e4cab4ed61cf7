//! One end-to-end mirroring run for the web client.
//!
//! converge -> stage core documents -> early exit? -> resolve -> download
//! -> publish. The staging directory is dropped on every path out.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::assets::{extract_release_sha, AssetResolver};
use crate::config::MirrorConfig;
use crate::download::download_assets;
use crate::error::{MirrorError, MirrorResult};
use crate::fetch::Fetch;
use crate::publish::{MirrorPublisher, PublishOutcome};
use crate::sanitize::SanitizeStats;
use crate::snapshot::SnapshotAcquirer;
use crate::staging::{MirrorDirectory, ENTRY_FILE, MANIFEST_FILE};
use crate::target::{CaptureTarget, TargetKind};

/// Where a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Acquire,
    Resolve,
    Download,
    Stage,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Acquire => "acquire",
            Stage::Resolve => "resolve",
            Stage::Download => "download",
            Stage::Stage => "stage",
            Stage::Publish => "publish",
        };
        f.write_str(name)
    }
}

#[derive(thiserror::Error, Debug)]
#[error("{stage} stage failed: {error}")]
pub struct RunFailure {
    pub stage: Stage,
    #[source]
    pub error: MirrorError,
}

impl RunFailure {
    pub fn new(stage: Stage, error: impl Into<MirrorError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }
}

/// Per-invocation switches.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Ignore the "core documents unchanged" early exit.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Published entry document and manifest already match; assets skipped.
    CoreUnchanged,
    /// Full mirror built, publisher found nothing new.
    Unchanged,
    Published { revision: Option<String> },
    /// Full mirror built, no publisher was given.
    NotPublished,
}

impl From<PublishOutcome> for RunOutcome {
    fn from(outcome: PublishOutcome) -> Self {
        match outcome {
            PublishOutcome::Unchanged => RunOutcome::Unchanged,
            PublishOutcome::Published { revision } => RunOutcome::Published { revision },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub target: TargetKind,
    /// Attempt on which the core documents converged.
    pub attempts: u32,
    /// Assets downloaded; zero after an early exit.
    pub assets: usize,
    /// Release sha from the manifest, when present.
    pub release: Option<String>,
    pub label: String,
    pub sanitize: SanitizeStats,
    pub outcome: RunOutcome,
}

/// Web client capture wired to one origin.
pub struct WebClientPipeline<F> {
    config: MirrorConfig,
    fetcher: F,
    resolver: AssetResolver,
    entry_url: String,
    manifest_url: String,
}

impl<F: Fetch> WebClientPipeline<F> {
    pub fn new(config: MirrorConfig, fetcher: F) -> MirrorResult<Self> {
        config.validate()?;
        let manifest_url = crate::config::base_url(&config.origin.root_url)?
            .join(&config.origin.manifest_path)
            .map_err(|e| MirrorError::Config(format!("origin.manifest_path: {e}")))?;
        let resolver = AssetResolver::from_config(&config.origin, &config.assets)?;

        Ok(Self {
            entry_url: config.origin.root_url.clone(),
            manifest_url: manifest_url.into(),
            config,
            fetcher,
            resolver,
        })
    }

    pub fn manifest_url(&self) -> &str {
        &self.manifest_url
    }

    /// Run the full pipeline.
    pub async fn execute(
        &self,
        publisher: Option<&dyn MirrorPublisher>,
        options: &RunOptions,
    ) -> Result<RunReport, RunFailure> {
        tracing::info!(origin = %self.entry_url, "starting web client capture");

        let mut acquirer =
            SnapshotAcquirer::new(&self.fetcher, self.entry_url.as_str(), self.manifest_url.as_str())
                .with_max_attempts(self.config.acquisition.max_attempts)
                .with_retry_delay(self.config.acquisition.retry_delay());
        let snapshot = acquirer
            .acquire()
            .await
            .map_err(|e| RunFailure::new(Stage::Acquire, e))?;

        let release = extract_release_sha(&snapshot.manifest);
        match &release {
            Some(sha) => tracing::info!(%sha, "release identified"),
            None => tracing::warn!("manifest carries no release sha"),
        }
        let label = self.config.publish.release_label(release.as_deref());

        let mirror = MirrorDirectory::create(&self.config.staging.path)
            .map_err(|e| RunFailure::new(Stage::Stage, e))?;
        stage_core(&mirror, &snapshot.entry_document, &snapshot.manifest)
            .map_err(|e| RunFailure::new(Stage::Stage, e))?;

        let report = |assets: usize, outcome: RunOutcome| RunReport {
            target: TargetKind::WebClient,
            attempts: snapshot.attempt,
            assets,
            release: release.clone(),
            label: label.clone(),
            sanitize: snapshot.sanitize_stats.clone(),
            outcome,
        };

        if let Some(publisher) = publisher {
            if self.config.publish.skip_if_unchanged && !options.force {
                let unchanged = core_unchanged(publisher, &snapshot.entry_document, &snapshot.manifest)
                    .await
                    .map_err(|e| RunFailure::new(Stage::Publish, e))?;
                if unchanged {
                    tracing::info!("entry document and manifest unchanged, nothing to mirror");
                    return Ok(report(0, RunOutcome::CoreUnchanged));
                }
            } else if options.force {
                tracing::debug!("forced run, skipping unchanged check");
            }
        }

        let assets = self
            .resolver
            .resolve(&snapshot.entry_document, &snapshot.manifest)
            .map_err(|e| RunFailure::new(Stage::Resolve, e))?;

        let downloaded = download_assets(
            &self.fetcher,
            &assets,
            &mirror,
            self.config.assets.concurrency,
        )
        .await
        .map_err(|e| RunFailure::new(Stage::Download, e))?;

        let outcome = match publisher {
            Some(publisher) => publisher
                .publish(mirror.path(), &label)
                .await
                .map(RunOutcome::from)
                .map_err(|e| RunFailure::new(Stage::Publish, e))?,
            None => {
                tracing::info!(dir = %mirror.path().display(), "publishing disabled");
                RunOutcome::NotPublished
            }
        };

        tracing::info!(attempts = snapshot.attempt, assets = downloaded, %label, "run complete");
        Ok(report(downloaded, outcome))
    }
}

fn stage_core(mirror: &MirrorDirectory, entry_document: &str, manifest: &str) -> MirrorResult<()> {
    mirror.write(ENTRY_FILE, entry_document.as_bytes())?;
    mirror.write(MANIFEST_FILE, manifest.as_bytes())?;
    Ok(())
}

async fn core_unchanged(
    publisher: &dyn MirrorPublisher,
    entry_document: &str,
    manifest: &str,
) -> MirrorResult<bool> {
    let entry_same = publisher.published_file(ENTRY_FILE).await?.as_deref()
        == Some(entry_document.as_bytes());
    let manifest_same = publisher.published_file(MANIFEST_FILE).await?.as_deref()
        == Some(manifest.as_bytes());
    tracing::debug!(entry_same, manifest_same, "compared core documents with published state");
    Ok(entry_same && manifest_same)
}

#[async_trait]
impl<F: Fetch + 'static> CaptureTarget for WebClientPipeline<F> {
    fn kind(&self) -> TargetKind {
        TargetKind::WebClient
    }

    async fn run(
        &self,
        publisher: Option<&dyn MirrorPublisher>,
        options: &RunOptions,
    ) -> Result<RunReport, RunFailure> {
        self.execute(publisher, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_names_its_stage() {
        let failure = RunFailure::new(Stage::Resolve, crate::error::ManifestParseError::MarkerNotFound);
        assert_eq!(failure.stage, Stage::Resolve);
        assert!(failure.to_string().starts_with("resolve stage failed: asset table marker"));
    }

    #[test]
    fn outcome_serializes_with_a_status_tag() {
        let json = serde_json::to_value(RunOutcome::Published {
            revision: Some("abc".into()),
        })
        .unwrap();
        assert_eq!(json["status"], "published");
        assert_eq!(json["revision"], "abc");
        assert_eq!(
            serde_json::to_value(RunOutcome::CoreUnchanged).unwrap()["status"],
            "core_unchanged"
        );
    }

    #[test]
    fn manifest_url_is_joined_to_the_root() {
        struct Never;
        #[async_trait]
        impl Fetch for Never {
            async fn fetch(&self, url: &str) -> Result<Vec<u8>, crate::error::FetchError> {
                Err(crate::error::FetchError::status(url, 500))
            }
        }
        let pipeline = WebClientPipeline::new(MirrorConfig::default(), Never).unwrap();
        assert_eq!(pipeline.manifest_url(), "https://x.com/sw.js");

        let mut config = MirrorConfig::default();
        config.origin.root_url = "https://example.com/app".into();
        let pipeline = WebClientPipeline::new(config, Never).unwrap();
        assert_eq!(pipeline.manifest_url(), "https://example.com/app/sw.js");
    }
}
