//! Error taxonomy for the mirroring pipeline.

use std::fmt;
use std::path::PathBuf;

use crate::format::ContentKind;

/// Why a single GET failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchCause {
    /// The origin answered with a non-success status.
    Status(u16),
    /// DNS, TLS, timeout, or body read failure.
    Transport(String),
}

impl fmt::Display for FetchCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchCause::Status(code) => write!(f, "HTTP status {code}"),
            FetchCause::Transport(cause) => write!(f, "transport error: {cause}"),
        }
    }
}

/// A failed HTTP GET.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("GET {url} failed: {cause}")]
pub struct FetchError {
    pub url: String,
    pub cause: FetchCause,
}

impl FetchError {
    pub fn status(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            cause: FetchCause::Status(status),
        }
    }

    pub fn transport(url: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self {
            url: url.into(),
            cause: FetchCause::Transport(cause.to_string()),
        }
    }
}

/// Content that could not be canonicalized.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot format {kind} content: {cause}")]
pub struct FormatError {
    pub kind: ContentKind,
    pub cause: String,
}

impl FormatError {
    pub fn new(kind: ContentKind, cause: impl Into<String>) -> Self {
        Self {
            kind,
            cause: cause.into(),
        }
    }
}

/// The service-worker asset table is missing or unreadable.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestParseError {
    #[error("asset table marker `self.ASSETS = [...]` not found in manifest")]
    MarkerNotFound,

    #[error("asset table is malformed: {0}")]
    Malformed(String),
}

/// Sanitization is pure string and tree rewriting; this only guards the
/// tree round-trip.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("sanitize failed: {0}")]
pub struct SanitizeError(pub String);

/// Failures reported by a mirror publisher.
#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("git {command} failed ({status}): {stderr}")]
    Git {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("publisher is not configured: {0}")]
    Config(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PublishError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Every error the pipeline can raise.
#[derive(thiserror::Error, Debug)]
pub enum MirrorError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Manifest(#[from] ManifestParseError),

    #[error(transparent)]
    Sanitize(#[from] SanitizeError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("refusing to write outside the mirror directory: {0}")]
    UnsafePath(String),

    #[error("snapshot did not converge after {attempts} attempts")]
    NotConverged { attempts: u32 },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl MirrorError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience result type.
pub type MirrorResult<T> = Result<T, MirrorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_names_url_and_status() {
        let err = FetchError::status("https://example.com/sw.js", 503);
        assert_eq!(
            err.to_string(),
            "GET https://example.com/sw.js failed: HTTP status 503"
        );
    }

    #[test]
    fn mirror_error_is_transparent_for_stage_errors() {
        let err: MirrorError = ManifestParseError::MarkerNotFound.into();
        assert!(err.to_string().contains("self.ASSETS"));

        let err: MirrorError = FormatError::new(ContentKind::Script, "unterminated string").into();
        assert_eq!(
            err.to_string(),
            "cannot format script content: unterminated string"
        );
    }
}
