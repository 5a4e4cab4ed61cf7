//! Capture targets.
//!
//! A target knows how to capture one kind of site bundle. There is one
//! kind today; new ones are added to [`TargetKind`] and [`build_target`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::MirrorConfig;
use crate::error::{MirrorError, MirrorResult};
use crate::fetch::Fetch;
use crate::pipeline::{RunFailure, RunOptions, RunReport, WebClientPipeline};
use crate::publish::MirrorPublisher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    /// The single-page web client: entry document, service worker, bundle.
    WebClient,
}

impl TargetKind {
    pub const ALL: &'static [TargetKind] = &[TargetKind::WebClient];

    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::WebClient => "web-client",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TargetKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| MirrorError::Config(format!("unknown capture target `{s}`")))
    }
}

#[async_trait]
pub trait CaptureTarget: Send + Sync {
    fn kind(&self) -> TargetKind;

    /// Capture, resolve, download and (unless `publisher` is `None`) publish.
    async fn run(
        &self,
        publisher: Option<&dyn MirrorPublisher>,
        options: &RunOptions,
    ) -> Result<RunReport, RunFailure>;
}

/// Instantiate the target for `kind`.
pub fn build_target(
    kind: TargetKind,
    config: MirrorConfig,
    fetcher: Arc<dyn Fetch>,
) -> MirrorResult<Box<dyn CaptureTarget>> {
    match kind {
        TargetKind::WebClient => Ok(Box::new(WebClientPipeline::new(config, fetcher)?)),
    }
}
