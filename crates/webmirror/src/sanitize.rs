//! Strip per-request noise from the entry document.
//!
//! Every rewrite replaces a value with a constant, so sanitizing twice is
//! the same as sanitizing once. Missing targets are not errors.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Serialize;

use crate::error::SanitizeError;
use crate::format::{MarkupDocument, MarkupNode};

/// Placeholder written over nonces and verification tokens.
pub const SENTINEL: &str = "REPLACED_BY_WEBMIRROR";

/// `meta[name]` values that carry a per-session verification token.
const VERIFICATION_META_NAMES: &[&str] = &["twitter-site-verification"];

/// Id of the inline stylesheet generated by the platform's UI runtime.
const PLATFORM_STYLESHEET_ID: &str = "react-native-stylesheet";

/// Utility classes whose rule bodies change between requests.
const VOLATILE_STYLE_CLASSES: &[&str] = &["r-vlxjld", "r-yfoy6g"];

/// A textual substitution applied to the serialized document.
///
/// The first capture group is the volatile token; it is overwritten with
/// `fill` repeated to the token's own width.
#[derive(Debug)]
pub struct SanitizationRule {
    pub name: &'static str,
    pub pattern: Regex,
    pub fill: char,
}

/// Text rules, in application order.
///
/// State fields match with bare or quoted keys and any spacing around the colon.
pub fn text_rules() -> &'static [SanitizationRule] {
    static RULES: OnceLock<Vec<SanitizationRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            SanitizationRule {
                name: "gt",
                pattern: Regex::new(r"gt=(\d+)").expect("valid regex"),
                fill: '0',
            },
            SanitizationRule {
                name: "guestId",
                pattern: Regex::new(r#""?guestId"?\s*:\s*"(\d+)""#).expect("valid regex"),
                fill: '0',
            },
            SanitizationRule {
                name: "serverDate",
                pattern: Regex::new(r#""?serverDate"?\s*:\s*(\d+)"#).expect("valid regex"),
                fill: '0',
            },
            SanitizationRule {
                name: "userHash",
                pattern: Regex::new(r#""?userHash"?\s*:\s*"([0-9a-f]+)""#).expect("valid regex"),
                fill: 'a',
            },
        ]
    })
}

fn style_rules() -> &'static [Regex] {
    static RULES: OnceLock<Vec<Regex>> = OnceLock::new();
    RULES.get_or_init(|| {
        VOLATILE_STYLE_CLASSES
            .iter()
            .map(|class| {
                let pattern = format!(r"(?m)^\s*\.{}\b[^{{]*\{{[^}}]*\}}\s*$\n?", regex::escape(class));
                Regex::new(&pattern).expect("valid regex")
            })
            .collect()
    })
}

/// What a sanitize pass touched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SanitizeStats {
    /// `nonce` attributes overwritten.
    pub nonce_count: usize,
    /// Whether a verification `meta` tag was found and cleared.
    pub verification_cleared: bool,
    /// Platform stylesheet blocks that had volatile rules removed.
    pub style_blocks_cleaned: usize,
    /// Text substitutions applied after serialization.
    pub text_substitutions: usize,
}

/// Sanitize a rendered entry document.
pub fn sanitize(html: &str) -> Result<(String, SanitizeStats), SanitizeError> {
    let mut document =
        MarkupDocument::parse(html).map_err(|e| SanitizeError(e.to_string()))?;
    let mut stats = SanitizeStats::default();

    document.visit_elements_mut(&mut |element| {
        if element.replace_attr("nonce", SENTINEL) {
            stats.nonce_count += 1;
        }

        if element.name == "meta"
            && element
                .attr("name")
                .is_some_and(|name| VERIFICATION_META_NAMES.contains(&name))
            && element.replace_attr("content", SENTINEL)
        {
            stats.verification_cleared = true;
        }

        if element.name == "style" && element.attr("id") == Some(PLATFORM_STYLESHEET_ID) {
            let mut touched = false;
            for child in &mut element.children {
                if let MarkupNode::Text(css) = child {
                    let cleaned = strip_volatile_rules(css);
                    touched |= cleaned != *css;
                    *css = cleaned;
                }
            }
            if touched {
                stats.style_blocks_cleaned += 1;
            }
        }
    });

    let mut text = document.render();
    for rule in text_rules() {
        let hits = rule.pattern.find_iter(&text).count();
        if hits == 0 {
            continue;
        }
        stats.text_substitutions += hits;
        text = rule
            .pattern
            .replace_all(&text, |caps: &Captures<'_>| mask_token(caps, rule.fill))
            .into_owned();
    }

    tracing::debug!(
        nonce_count = stats.nonce_count,
        verification_cleared = stats.verification_cleared,
        style_blocks_cleaned = stats.style_blocks_cleaned,
        text_substitutions = stats.text_substitutions,
        "sanitized entry document"
    );

    Ok((text, stats))
}

fn strip_volatile_rules(css: &str) -> String {
    style_rules()
        .iter()
        .fold(css.to_string(), |acc, rule| rule.replace_all(&acc, "").into_owned())
}

/// Rebuild the whole match with capture 1 replaced by `fill` of equal width.
fn mask_token(caps: &Captures<'_>, fill: char) -> String {
    let (Some(whole), Some(token)) = (caps.get(0), caps.get(1)) else {
        return caps[0].to_string();
    };
    let start = token.start() - whole.start();
    let end = token.end() - whole.start();
    let text = whole.as_str();
    let mask: String = std::iter::repeat(fill).take(token.as_str().chars().count()).collect();
    format!("{}{mask}{}", &text[..start], &text[end..])
}
