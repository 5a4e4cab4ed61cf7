//! Readers for the service-worker manifest.
//!
//! The asset table is a JavaScript array literal, not JSON: single quotes,
//! and usually a trailing comma. It is read in two stages. `normalize_table`
//! rewrites the literal into strict JSON, then `serde_json` parses it.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::ManifestParseError;

fn table_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"self\.ASSETS\s*=\s*\[([\s\S]*?)\]").expect("valid regex"))
}

fn import_directive() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"importScripts\(\s*["'`]([^"'`]+)["'`]"#).expect("valid regex")
    })
}

fn release_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"sha:\s*["']([a-f0-9]{40})["']"#).expect("valid regex"))
}

/// URLs listed in the manifest's `self.ASSETS = [...]` table.
pub fn extract_manifest_asset_table(manifest: &str) -> Result<Vec<String>, ManifestParseError> {
    let captures = table_marker()
        .captures(manifest)
        .ok_or(ManifestParseError::MarkerNotFound)?;
    let body = captures.get(1).map_or("", |m| m.as_str());

    let normalized = normalize_table(body)?;
    serde_json::from_str::<Vec<String>>(&normalized)
        .map_err(|e| ManifestParseError::Malformed(format!("{e} in `{normalized}`")))
}

/// The script named by the manifest's `importScripts("...")` directive.
pub fn extract_manifest_bootstrap_script(manifest: &str) -> Option<String> {
    import_directive()
        .captures(manifest)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// The 40-hex release id from the manifest's `sha: "..."` marker.
pub fn extract_release_sha(manifest: &str) -> Option<String> {
    release_marker()
        .captures(manifest)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Rewrite the inside of the table literal as a JSON array.
///
/// Every element must be a quoted string; any other token means the format
/// changed and is reported as `Malformed`.
pub(crate) fn normalize_table(body: &str) -> Result<String, ManifestParseError> {
    let mut items: Vec<String> = Vec::new();
    let mut expect_item = true;
    let mut chars = body.char_indices();

    while let Some((offset, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '"' | '\'' | '`' if expect_item => {
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c2)) = chars.next() {
                    match c2 {
                        '\\' => match chars.next() {
                            Some((_, 'n')) => value.push('\n'),
                            Some((_, 't')) => value.push('\t'),
                            Some((_, escaped)) => value.push(escaped),
                            None => break,
                        },
                        _ if c2 == c => {
                            closed = true;
                            break;
                        }
                        _ => value.push(c2),
                    }
                }
                if !closed {
                    return Err(ManifestParseError::Malformed(format!(
                        "unterminated string at offset {offset}"
                    )));
                }
                let encoded = serde_json::to_string(&value)
                    .map_err(|e| ManifestParseError::Malformed(e.to_string()))?;
                items.push(encoded);
                expect_item = false;
            }
            ',' if !expect_item => expect_item = true,
            other => {
                return Err(ManifestParseError::Malformed(format!(
                    "unexpected `{other}` at offset {offset}"
                )));
            }
        }
    }

    Ok(format!("[{}]", items.join(",")))
}
