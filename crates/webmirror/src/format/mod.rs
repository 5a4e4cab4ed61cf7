//! Canonical rendering of captured content.
//!
//! Two payloads that differ only in minification, line wrapping, or
//! attribute order render to the same bytes, so that convergence checks and
//! repository diffs only see real changes.

pub mod markup;
pub mod script;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FormatError;

pub use markup::{MarkupDocument, MarkupElement, MarkupNode};

/// Indentation unit used by both printers.
pub const INDENT: &str = "    ";

/// How a payload should be canonicalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// HTML documents.
    Markup,
    /// JavaScript sources.
    Script,
    /// Anything else; passed through untouched.
    Plain,
}

impl ContentKind {
    /// Pick a kind from a file name's extension.
    pub fn from_filename(name: &str) -> Self {
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "js" | "mjs" => ContentKind::Script,
            "html" | "htm" => ContentKind::Markup,
            _ => ContentKind::Plain,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Markup => "markup",
            ContentKind::Script => "script",
            ContentKind::Plain => "plain",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonicalize UTF-8 text of the given kind.
pub fn format(raw: &str, kind: ContentKind) -> Result<String, FormatError> {
    match kind {
        ContentKind::Markup => markup::format_markup(raw),
        ContentKind::Script => script::format_script(raw),
        ContentKind::Plain => Ok(raw.to_string()),
    }
}

/// Decode a response body as UTF-8 and canonicalize it.
pub fn format_text(body: Vec<u8>, kind: ContentKind) -> Result<String, FormatError> {
    let text = String::from_utf8(body)
        .map_err(|e| FormatError::new(kind, format!("body is not valid UTF-8: {e}")))?;
    format(&text, kind)
}

/// Canonicalize a raw response body.
///
/// Plain content is returned byte-for-byte; markup and script must be UTF-8.
pub fn format_bytes(body: Vec<u8>, kind: ContentKind) -> Result<Vec<u8>, FormatError> {
    if kind == ContentKind::Plain {
        return Ok(body);
    }
    format_text(body, kind).map(String::into_bytes)
}
