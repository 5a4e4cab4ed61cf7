//! The per-run staging directory.
//!
//! Created empty at the start of a run and removed when the guard drops,
//! whatever the run's outcome.

use std::path::{Component, Path, PathBuf};

use crate::assets::AssetDescriptor;
use crate::error::{MirrorError, MirrorResult};

/// Entry document file name inside the mirror.
pub const ENTRY_FILE: &str = "index.html";

/// Manifest file name inside the mirror.
pub const MANIFEST_FILE: &str = "sw.js";

/// Staging area owned by one run. Deleted on drop.
#[derive(Debug)]
pub struct MirrorDirectory {
    root: PathBuf,
}

impl MirrorDirectory {
    /// Create a fresh, empty directory, replacing any stale one.
    pub fn create(path: impl Into<PathBuf>) -> MirrorResult<Self> {
        let root = path.into();
        if root.exists() {
            tracing::warn!(path = %root.display(), "removing stale staging directory");
            std::fs::remove_dir_all(&root).map_err(|e| MirrorError::io(&root, e))?;
        }
        std::fs::create_dir_all(&root).map_err(|e| MirrorError::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Write a file below the root, creating parent directories.
    pub fn write(&self, relative: &str, bytes: &[u8]) -> MirrorResult<PathBuf> {
        let relative = safe_relative_path(relative)?;
        if relative.as_os_str().is_empty() {
            return Err(MirrorError::UnsafePath("empty file path".into()));
        }
        let full = self.root.join(relative);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MirrorError::io(parent, e))?;
        }
        std::fs::write(&full, bytes).map_err(|e| MirrorError::io(&full, e))?;
        Ok(full)
    }

    /// Write an asset at its normalized `local_directory/local_filename`.
    pub fn write_asset(&self, asset: &AssetDescriptor, bytes: &[u8]) -> MirrorResult<PathBuf> {
        let relative = asset_path(asset)?;
        self.write(&relative.to_string_lossy(), bytes)
    }

    pub fn read(&self, relative: &str) -> MirrorResult<Vec<u8>> {
        let full = self.root.join(safe_relative_path(relative)?);
        std::fs::read(&full).map_err(|e| MirrorError::io(&full, e))
    }
}

impl Drop for MirrorDirectory {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => tracing::debug!(path = %self.root.display(), "staging directory removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!(path = %self.root.display(), "failed to remove staging directory: {e}"),
        }
    }
}

/// Where `asset` lands inside the mirror.
pub fn asset_path(asset: &AssetDescriptor) -> MirrorResult<PathBuf> {
    let dir = safe_relative_path(&asset.local_directory)?;
    Ok(dir.join(safe_relative_path(&asset.local_filename)?))
}

/// Turn a directory or file reference into a path that stays below the root.
///
/// Absolute URLs lose their scheme and host, leading `/` is dropped, `.`
/// segments vanish and `..` is refused.
pub fn safe_relative_path(raw: &str) -> MirrorResult<PathBuf> {
    let path = match url::Url::parse(raw) {
        Ok(url) if url.has_host() => url.path().to_string(),
        _ => raw.to_string(),
    };

    let mut out = PathBuf::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => return Err(MirrorError::UnsafePath(raw.to_string())),
            _ => {
                let mut components = Path::new(segment).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(part)), None) => out.push(part),
                    _ => return Err(MirrorError::UnsafePath(raw.to_string())),
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ContentKind;

    #[test]
    fn relative_paths_are_normalized() {
        assert_eq!(
            safe_relative_path("responsive-web/client-web").unwrap(),
            PathBuf::from("responsive-web").join("client-web")
        );
        assert_eq!(
            safe_relative_path("https://cdn.example.com/lib/x.js?v=2").unwrap(),
            PathBuf::from("lib").join("x.js")
        );
        assert_eq!(
            safe_relative_path("/static/./app.js").unwrap(),
            PathBuf::from("static").join("app.js")
        );
        assert_eq!(safe_relative_path("").unwrap(), PathBuf::new());
    }

    #[test]
    fn parent_segments_are_refused() {
        assert!(matches!(
            safe_relative_path("a/../../etc/passwd"),
            Err(MirrorError::UnsafePath(_))
        ));
        assert!(safe_relative_path("https://evil.example/../x").is_ok());
    }

    #[test]
    fn directory_is_fresh_and_removed_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("stage");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("stale.txt"), b"old").unwrap();

        {
            let dir = MirrorDirectory::create(&root).unwrap();
            assert!(!root.join("stale.txt").exists());
            dir.write(ENTRY_FILE, b"<html></html>").unwrap();
            dir.write_asset(
                &AssetDescriptor {
                    source_url: "https://abs.twimg.com/responsive-web/client-web/main.js".into(),
                    local_filename: "vendor/react.js".into(),
                    local_directory: "responsive-web/client-web".into(),
                    kind: ContentKind::Script,
                },
                b"x",
            )
            .unwrap();
            assert!(root.join("responsive-web/client-web/vendor/react.js").is_file());
            assert_eq!(dir.read(ENTRY_FILE).unwrap(), b"<html></html>");
        }

        assert!(!root.exists());
    }

    #[test]
    fn removed_even_when_the_run_panics() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("stage");
        let guard_root = root.clone();
        let result = std::panic::catch_unwind(move || {
            let dir = MirrorDirectory::create(&guard_root).unwrap();
            dir.write(MANIFEST_FILE, b"self.ASSETS = []").unwrap();
            panic!("boom");
        });
        assert!(result.is_err());
        assert!(!root.exists());
    }
}
