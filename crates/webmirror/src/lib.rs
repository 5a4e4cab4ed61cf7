// Copyright 2026 Webmirror Contributors
// SPDX-License-Identifier: MIT

//! webmirror: consistency-verified mirroring of a single-page web app bundle.
//!
//! A run captures the entry document and service-worker manifest twice per
//! attempt until both captures agree, resolves every static asset they
//! reference, stages the whole tree locally and hands it to a publisher.

pub mod assets;
pub mod config;
pub mod download;
pub mod error;
pub mod fetch;
pub mod format;
pub mod pipeline;
pub mod publish;
pub mod sanitize;
pub mod snapshot;
pub mod staging;
pub mod target;

pub use assets::{AssetDescriptor, AssetResolver, AssetSet};
pub use config::MirrorConfig;
pub use error::{
    FetchError, FormatError, ManifestParseError, MirrorError, MirrorResult, PublishError,
    SanitizeError,
};
pub use fetch::{Fetch, HttpFetcher};
pub use format::{format, ContentKind};
pub use pipeline::{RunFailure, RunOptions, RunOutcome, RunReport, Stage, WebClientPipeline};
pub use publish::{
    publisher_from_config, DirectoryPublisher, GitPublisher, MirrorPublisher, PublishOutcome,
};
pub use sanitize::{sanitize, SanitizeStats};
pub use snapshot::{AcquisitionState, AttemptOutcome, Snapshot, SnapshotAcquirer};
pub use staging::MirrorDirectory;
pub use target::{build_target, CaptureTarget, TargetKind};
