//! Configuration file discovery and environment overrides.

use std::path::{Path, PathBuf};

use anyhow::Context;
use webmirror::config::MirrorConfig;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "WEBMIRROR_CONFIG";
const CWD_CONFIG: &str = "webmirror.config.json";

/// Resolve the config file path.
///
/// Order: explicit flag, `WEBMIRROR_CONFIG`, `./webmirror.config.json`,
/// then `~/.webmirror/config.json`.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    if let Some(env_path) = read_env_string(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(env_path);
    }

    let cwd_config = PathBuf::from(CWD_CONFIG);
    if cwd_config.exists() {
        return cwd_config;
    }

    resolve_default_config_path()
}

fn resolve_default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".webmirror")
        .join("config.json")
}

/// Load `path`, falling back to defaults when it does not exist.
///
/// A file that was asked for explicitly must exist.
pub fn load_config(path: &Path, required: bool) -> anyhow::Result<MirrorConfig> {
    let config = match std::fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            MirrorConfig::default()
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read config {}", path.display()))
        }
    };
    Ok(config)
}

/// Apply `WEBMIRROR_*` overrides on top of the file.
pub fn apply_env_overrides(config: &mut MirrorConfig) {
    if let Some(origin) = read_env_string("WEBMIRROR_ORIGIN").filter(|v| !v.is_empty()) {
        config.origin.root_url = origin;
    }
    if let Some(attempts) = read_env_string("WEBMIRROR_MAX_ATTEMPTS") {
        // "0" or "unbounded" lifts the ceiling.
        config.acquisition.max_attempts = match attempts.parse::<u32>() {
            Ok(0) => None,
            Ok(n) => Some(n),
            Err(_) if attempts.eq_ignore_ascii_case("unbounded") => None,
            Err(_) => config.acquisition.max_attempts,
        };
    }
    config.assets.concurrency = read_env_usize("WEBMIRROR_CONCURRENCY", config.assets.concurrency);
    config.acquisition.retry_delay_ms =
        read_env_u64("WEBMIRROR_RETRY_DELAY_MS", config.acquisition.retry_delay_ms);
    if let Some(dir) = read_env_string("WEBMIRROR_TARGET_DIR").filter(|v| !v.is_empty()) {
        config.publish.target_dir = PathBuf::from(dir);
    }
    config.publish.skip_if_unchanged =
        read_env_bool("WEBMIRROR_SKIP_IF_UNCHANGED", config.publish.skip_if_unchanged);
}

/// Resolve, load and override in one go.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<(PathBuf, MirrorConfig)> {
    let path = resolve_config_path(explicit);
    let required = explicit.is_some() || read_env_string(CONFIG_ENV).is_some_and(|p| !p.is_empty());
    let mut config = load_config(&path, required)?;
    apply_env_overrides(&mut config);
    Ok((path, config))
}

fn read_env_u64(name: &str, default_value: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default_value)
}

fn read_env_usize(name: &str, default_value: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default_value)
}

fn read_env_bool(name: &str, default_value: bool) -> bool {
    match read_env_string(name).as_deref() {
        Some("1") | Some("true") | Some("yes") => true,
        Some("0") | Some("false") | Some("no") => false,
        _ => default_value,
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string())
}
