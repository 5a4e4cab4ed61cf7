//! Asset graph resolution.
//!
//! Turns the converged entry document and manifest into the set of static
//! assets to mirror, each with the local path it is saved under.

pub mod manifest;

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;
use url::Url;

use crate::config::{AssetsConfig, OriginConfig};
use crate::error::{ManifestParseError, MirrorResult};
use crate::format::ContentKind;

pub use manifest::{
    extract_manifest_asset_table, extract_manifest_bootstrap_script, extract_release_sha,
};

/// One asset to download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetDescriptor {
    /// Absolute URL the asset is fetched from.
    pub source_url: String,
    /// File name with any content hash removed.
    pub local_filename: String,
    /// Directory inside the mirror; opaque references keep their raw form.
    pub local_directory: String,
    pub kind: ContentKind,
}

impl AssetDescriptor {
    /// `local_directory/local_filename`, before staging normalization.
    pub fn relative_path(&self) -> String {
        let dir = self.local_directory.trim_end_matches('/');
        if dir.is_empty() {
            self.local_filename.clone()
        } else {
            format!("{dir}/{}", self.local_filename)
        }
    }
}

/// Assets keyed by source URL, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct AssetSet {
    items: Vec<AssetDescriptor>,
    seen: HashSet<String>,
}

impl AssetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor unless its source URL is already present.
    pub fn insert(&mut self, descriptor: AssetDescriptor) -> bool {
        if !self.seen.insert(descriptor.source_url.clone()) {
            return false;
        }
        self.items.push(descriptor);
        true
    }

    pub fn contains(&self, source_url: &str) -> bool {
        self.seen.contains(source_url)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AssetDescriptor> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<AssetDescriptor> {
        self.items
    }
}

impl<'a> IntoIterator for &'a AssetSet {
    type Item = &'a AssetDescriptor;
    type IntoIter = std::slice::Iter<'a, AssetDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

fn content_hash() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.*)\.[0-9a-f]{8}(\.[^.]+)$").expect("valid regex"))
}

/// Last path segment with query, fragment and content hash removed.
///
/// `app.a1b2c3d4.js` becomes `app.js`.
pub fn resolve_filename(url: &str) -> String {
    let path = strip_query(url);
    let segment = path.rsplit('/').next().unwrap_or(path);
    content_hash().replace(segment, "$1$2").into_owned()
}

/// Expand directory markers encoded in a manifest file name.
///
/// `~~` and `~` become `/`, then every `.` before the extension does too:
/// `vendor~~react.core.min.js` becomes `vendor/react/core/min.js`.
pub fn fix_path(filename: &str) -> String {
    let expanded = filename.replace("~~", "/").replace('~', "/");
    match expanded.rfind('.') {
        Some(ext) => format!("{}{}", expanded[..ext].replace('.', "/"), &expanded[ext..]),
        None => expanded,
    }
}

fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Every preload target in the entry document, in document order.
pub fn extract_preloaded_scripts(entry_document: &str) -> Vec<String> {
    let document = Html::parse_document(entry_document);
    let selector = Selector::parse("link[rel][href]").expect("valid selector");

    document
        .select(&selector)
        .filter(|link| {
            link.value().attr("rel").is_some_and(|rel| {
                rel.split_ascii_whitespace().any(|token| {
                    token.eq_ignore_ascii_case("preload")
                        || token.eq_ignore_ascii_case("modulepreload")
                })
            })
        })
        .filter_map(|link| link.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
        .collect()
}

/// Maps references to descriptors for one origin.
#[derive(Debug, Clone)]
pub struct AssetResolver {
    root: Url,
    prefix: String,
    local_prefix: String,
}

impl AssetResolver {
    pub fn new(
        root_url: &str,
        prefix: impl Into<String>,
        local_prefix: impl Into<String>,
    ) -> MirrorResult<Self> {
        let root = crate::config::base_url(root_url)?;
        Ok(Self {
            root,
            prefix: prefix.into(),
            local_prefix: local_prefix.into(),
        })
    }

    pub fn from_config(origin: &OriginConfig, assets: &AssetsConfig) -> MirrorResult<Self> {
        Self::new(&origin.root_url, &assets.prefix, &assets.local_prefix)
    }

    /// Containing directory for an asset URL.
    ///
    /// URLs outside the asset prefix are returned unchanged.
    pub fn resolve_path(&self, url: &str) -> String {
        let Some(rest) = url.strip_prefix(self.prefix.as_str()) else {
            return url.to_string();
        };
        let local = self.local_prefix.trim_end_matches('/');
        match strip_query(rest).rsplit_once('/') {
            Some((dir, _)) if !dir.is_empty() => format!("{local}/{dir}"),
            _ => local.to_string(),
        }
    }

    /// Absolute URL for a reference, resolved against the origin root.
    pub fn source_url(&self, reference: &str) -> String {
        self.root
            .join(reference)
            .map(String::from)
            .unwrap_or_else(|_| reference.to_string())
    }

    fn describe(&self, reference: &str, from_manifest: bool) -> AssetDescriptor {
        let mut local_filename = resolve_filename(reference);
        if from_manifest {
            local_filename = fix_path(&local_filename);
        }
        AssetDescriptor {
            source_url: self.source_url(reference),
            kind: ContentKind::from_filename(&local_filename),
            local_filename,
            local_directory: self.resolve_path(reference),
        }
    }

    /// Union of asset-table and other references, table entries first.
    ///
    /// Members are keyed by the resolved absolute URL, so `b.js` and
    /// `https://<root>/b.js` are one asset. Only asset-table file names go
    /// through [`fix_path`].
    pub fn build_asset_set(&self, manifest_urls: &[String], index_urls: &[String]) -> AssetSet {
        let mut set = AssetSet::new();
        for url in manifest_urls {
            set.insert(self.describe(url, true));
        }
        for url in index_urls {
            set.insert(self.describe(url, false));
        }
        set
    }

    /// Everything the entry document and manifest reference.
    pub fn resolve(&self, entry_document: &str, manifest: &str) -> Result<AssetSet, ManifestParseError> {
        let manifest_urls = extract_manifest_asset_table(manifest)?;

        // The bootstrap script name carries no encoded directories.
        let mut index_urls = Vec::new();
        match extract_manifest_bootstrap_script(manifest) {
            Some(script) => index_urls.push(script),
            None => tracing::warn!("manifest has no importScripts directive"),
        }
        let preloaded = extract_preloaded_scripts(entry_document);
        if preloaded.is_empty() {
            tracing::warn!("entry document has no preload links");
        }
        index_urls.extend(preloaded);

        let set = self.build_asset_set(&manifest_urls, &index_urls);
        tracing::info!(
            manifest = manifest_urls.len(),
            document = index_urls.len(),
            total = set.len(),
            "resolved static assets"
        );
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "https://abs.twimg.com/responsive-web/";

    fn resolver() -> AssetResolver {
        AssetResolver::new("https://x.com", PREFIX, "responsive-web/").unwrap()
    }

    #[test]
    fn filename_hash_is_stripped() {
        assert_eq!(resolve_filename("app.a1b2c3d4.js"), "app.js");
        assert_eq!(resolve_filename("app.js"), "app.js");
        assert_eq!(
            resolve_filename("https://abs.twimg.com/responsive-web/client-web/main.0f1e2d3c.js?v=1"),
            "main.js"
        );
        // Uppercase or short segments are not content hashes.
        assert_eq!(resolve_filename("app.A1B2C3D4.js"), "app.A1B2C3D4.js");
        assert_eq!(resolve_filename("app.a1b2c3.js"), "app.a1b2c3.js");
    }

    #[test]
    fn fix_path_expands_markers_in_order() {
        assert_eq!(fix_path("vendor~~react.core.min.js"), "vendor/react/core/min.js");
        assert_eq!(fix_path("bundle.Compose~bundle.Home.js"), "bundle/Compose/bundle/Home.js");
        assert_eq!(fix_path("main.js"), "main.js");
        assert_eq!(fix_path("LICENSE"), "LICENSE");
    }

    #[test]
    fn resolve_path_maps_prefix_and_drops_filename() {
        let r = resolver();
        assert_eq!(
            r.resolve_path("https://abs.twimg.com/responsive-web/client-web/main.a1b2c3d4.js"),
            "responsive-web/client-web"
        );
        assert_eq!(
            r.resolve_path("https://abs.twimg.com/responsive-web/top.js"),
            "responsive-web"
        );
        assert_eq!(r.resolve_path("/static/app.js"), "/static/app.js");
        assert_eq!(
            r.resolve_path("https://cdn.example.com/lib.js"),
            "https://cdn.example.com/lib.js"
        );
    }

    #[test]
    fn asset_set_is_deduplicated_by_url() {
        let r = resolver();
        let manifest = vec!["a.js".to_string(), "b.js".to_string()];
        let index = vec!["b.js".to_string(), "c.js".to_string()];
        let set = r.build_asset_set(&manifest, &index);
        assert_eq!(set.len(), 3);
        let urls: Vec<&str> = set.iter().map(|d| d.source_url.as_str()).collect();
        assert_eq!(urls, ["https://x.com/a.js", "https://x.com/b.js", "https://x.com/c.js"]);
    }

    #[test]
    fn same_local_path_from_distinct_urls_is_kept_twice() {
        let r = resolver();
        let manifest = vec![
            format!("{PREFIX}client-web/main.a1b2c3d4.js"),
            format!("{PREFIX}client-web/main.99887766.js"),
        ];
        let set = r.build_asset_set(&manifest, &[]);
        assert_eq!(set.len(), 2);
        assert!(set.iter().all(|d| d.relative_path() == "responsive-web/client-web/main.js"));
    }

    #[test]
    fn preload_links_in_order() {
        let html = r#"<html><head>
            <link rel="preload" as="script" href="https://abs.twimg.com/responsive-web/client-web/vendor.11111111.js">
            <link rel="stylesheet" href="/style.css">
            <link rel="modulepreload" href="/app.js">
            <link rel="Preload dns-prefetch" href="/other.js">
        </head><body></body></html>"#;
        assert_eq!(
            extract_preloaded_scripts(html),
            vec![
                "https://abs.twimg.com/responsive-web/client-web/vendor.11111111.js",
                "/app.js",
                "/other.js",
            ]
        );
    }

    #[test]
    fn resolve_combines_manifest_and_document() {
        let r = resolver();
        let manifest = format!(
            "importScripts(\"{PREFIX}client-serviceworker/serviceworker.aaaaaaaa.js\");\n\
             self.ASSETS = ['{PREFIX}client-web/vendor~~react.core.12345678.js', '{PREFIX}client-web/main.a1b2c3d4.js',];"
        );
        let html = format!(
            "<html><head><link rel=\"preload\" href=\"{PREFIX}client-web/main.a1b2c3d4.js\">\
             <link rel=\"preload\" href=\"{PREFIX}client-web/i18n.en.deadbeef.js\"></head></html>"
        );

        let set = r.resolve(&html, &manifest).unwrap();
        let paths: Vec<String> = set.iter().map(AssetDescriptor::relative_path).collect();
        assert_eq!(
            paths,
            [
                "responsive-web/client-web/vendor/react/core.js",
                "responsive-web/client-web/main.js",
                "responsive-web/client-serviceworker/serviceworker.js",
                "responsive-web/client-web/i18n.en.js",
            ]
        );
        assert!(set.iter().all(|d| d.kind == ContentKind::Script));
    }

    #[test]
    fn bootstrap_script_keeps_its_dotted_name() {
        let manifest = format!(
            "importScripts(\"{PREFIX}client-serviceworker/serviceworker.core.aaaaaaaa.js\");\n\
             self.ASSETS = ['{PREFIX}client-web/loader.core.12345678.js'];"
        );
        let set = resolver().resolve("<html></html>", &manifest).unwrap();
        let paths: Vec<String> = set.iter().map(AssetDescriptor::relative_path).collect();
        assert_eq!(
            paths,
            [
                "responsive-web/client-web/loader/core.js",
                "responsive-web/client-serviceworker/serviceworker.core.js",
            ]
        );
    }

    #[test]
    fn relative_and_absolute_spellings_are_one_asset() {
        let r = resolver();
        let set = r.build_asset_set(&[], &["b.js".to_string(), "https://x.com/b.js".to_string()]);
        assert_eq!(set.len(), 1);
        assert!(set.contains("https://x.com/b.js"));
    }

    #[test]
    fn resolve_requires_the_asset_table() {
        let err = resolver().resolve("<html></html>", "importScripts('x.js')").unwrap_err();
        assert_eq!(err, ManifestParseError::MarkerNotFound);
    }
}
