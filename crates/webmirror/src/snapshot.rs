//! Double-fetch snapshot acquisition.
//!
//! Each attempt captures the entry document and manifest twice, fully
//! formats and sanitizes both samples, and only then compares them. A
//! snapshot is accepted when the two samples are byte-identical; anything
//! else means the origin is mid-deploy and the attempt is repeated.

use std::time::Duration;

use crate::error::{MirrorError, MirrorResult};
use crate::fetch::Fetch;
use crate::format::{format_text, ContentKind};
use crate::sanitize::{sanitize, SanitizeStats};

/// The core documents as captured by one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// 1-indexed attempt that produced this sample.
    pub attempt: u32,
    /// Formatted and sanitized entry document.
    pub entry_document: String,
    /// Formatted manifest.
    pub manifest: String,
    pub sanitize_stats: SanitizeStats,
}

impl Snapshot {
    /// Same documents, regardless of which attempt captured them.
    pub fn same_documents(&self, other: &Snapshot) -> bool {
        self.entry_document == other.entry_document && self.manifest == other.manifest
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionState {
    /// The next `step` runs this attempt.
    Capturing { attempt: u32 },
    Converged(Snapshot),
}

/// Result of a single `step`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Converged(Snapshot),
    Mismatch {
        attempt: u32,
        entry_differs: bool,
        manifest_differs: bool,
    },
}

/// Drives attempts until two consecutive samples agree.
pub struct SnapshotAcquirer<F> {
    fetcher: F,
    entry_url: String,
    manifest_url: String,
    max_attempts: Option<u32>,
    retry_delay: Duration,
    state: AcquisitionState,
}

impl<F: Fetch> SnapshotAcquirer<F> {
    pub fn new(fetcher: F, entry_url: impl Into<String>, manifest_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            entry_url: entry_url.into(),
            manifest_url: manifest_url.into(),
            max_attempts: None,
            retry_delay: Duration::ZERO,
            state: AcquisitionState::Capturing { attempt: 1 },
        }
    }

    /// Give up with `NotConverged` after this many attempts.
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Pause between a mismatch and the next attempt.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn state(&self) -> &AcquisitionState {
        &self.state
    }

    /// Run one attempt. Once converged, returns the accepted snapshot
    /// without fetching again.
    pub async fn step(&mut self) -> MirrorResult<AttemptOutcome> {
        let attempt = match &self.state {
            AcquisitionState::Converged(snapshot) => {
                return Ok(AttemptOutcome::Converged(snapshot.clone()));
            }
            AcquisitionState::Capturing { attempt } => *attempt,
        };

        let first = self.capture(attempt, 1).await?;
        let second = self.capture(attempt, 2).await?;

        if first.same_documents(&second) {
            tracing::info!(attempt, "core documents converged");
            self.state = AcquisitionState::Converged(second.clone());
            return Ok(AttemptOutcome::Converged(second));
        }

        let entry_differs = first.entry_document != second.entry_document;
        let manifest_differs = first.manifest != second.manifest;
        tracing::info!(
            attempt,
            entry_differs,
            manifest_differs,
            "samples differ, retrying capture"
        );
        self.state = AcquisitionState::Capturing {
            attempt: attempt + 1,
        };
        Ok(AttemptOutcome::Mismatch {
            attempt,
            entry_differs,
            manifest_differs,
        })
    }

    /// Step until converged or the attempt ceiling is hit.
    pub async fn acquire(&mut self) -> MirrorResult<Snapshot> {
        loop {
            if let AcquisitionState::Capturing { attempt } = self.state {
                if let Some(max) = self.max_attempts {
                    if attempt > max {
                        tracing::warn!(attempts = max, "snapshot did not converge");
                        return Err(MirrorError::NotConverged { attempts: max });
                    }
                }
            }

            match self.step().await? {
                AttemptOutcome::Converged(snapshot) => return Ok(snapshot),
                AttemptOutcome::Mismatch { attempt, .. } => {
                    let exhausted = self.max_attempts.is_some_and(|max| attempt >= max);
                    if !exhausted && !self.retry_delay.is_zero() {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
    }

    async fn capture(&self, attempt: u32, sample: u8) -> MirrorResult<Snapshot> {
        tracing::debug!(attempt, sample, "capturing core documents");

        let body = self.fetcher.fetch(&self.entry_url).await?;
        let formatted = format_text(body, ContentKind::Markup)?;
        let (entry_document, sanitize_stats) = sanitize(&formatted)?;

        let body = self.fetcher.fetch(&self.manifest_url).await?;
        let manifest = format_text(body, ContentKind::Script)?;

        Ok(Snapshot {
            attempt,
            entry_document,
            manifest,
            sanitize_stats,
        })
    }
}
