//! Concurrent asset download into the staging directory.

use std::collections::HashMap;
use std::path::PathBuf;

use futures::stream::{self, StreamExt, TryStreamExt};

use crate::assets::{AssetDescriptor, AssetSet};
use crate::error::MirrorResult;
use crate::fetch::Fetch;
use crate::format::format_bytes;
use crate::staging::{asset_path, MirrorDirectory};

/// Fetch, format and stage every asset, `concurrency` at a time.
///
/// Assets sharing a local path are written in set order, so the later one
/// owns the file. The first failure aborts the phase; in-flight downloads
/// are dropped.
pub async fn download_assets<F: Fetch + ?Sized>(
    fetcher: &F,
    assets: &AssetSet,
    mirror: &MirrorDirectory,
    concurrency: usize,
) -> MirrorResult<usize> {
    let groups = group_by_destination(assets);
    let downloads: Vec<_> = groups
        .into_iter()
        .map(|group| download_group(fetcher, group, mirror))
        .collect();
    let count = stream::iter(downloads)
        .buffer_unordered(concurrency.max(1))
        .try_fold(0usize, |count, written| async move { Ok(count + written) })
        .await?;

    tracing::info!(count, "assets downloaded");
    Ok(count)
}

/// Assets bucketed by destination, buckets and members in set order.
fn group_by_destination(assets: &AssetSet) -> Vec<Vec<&AssetDescriptor>> {
    let mut slots: HashMap<PathBuf, usize> = HashMap::new();
    let mut groups: Vec<Vec<&AssetDescriptor>> = Vec::new();
    for asset in assets {
        // Unsafe paths get their own bucket and fail at write time.
        let key = asset_path(asset).unwrap_or_else(|_| PathBuf::from(asset.relative_path()));
        let slot = *slots.entry(key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        if groups[slot].len() == 1 {
            tracing::warn!(path = %asset.relative_path(), "several assets share one local path");
        }
        groups[slot].push(asset);
    }
    groups
}

async fn download_group<F: Fetch + ?Sized>(
    fetcher: &F,
    group: Vec<&AssetDescriptor>,
    mirror: &MirrorDirectory,
) -> MirrorResult<usize> {
    for asset in &group {
        download_one(fetcher, asset, mirror).await?;
    }
    Ok(group.len())
}

async fn download_one<F: Fetch + ?Sized>(
    fetcher: &F,
    asset: &AssetDescriptor,
    mirror: &MirrorDirectory,
) -> MirrorResult<()> {
    let body = fetcher.fetch(&asset.source_url).await?;
    let formatted = format_bytes(body, asset.kind)?;
    let path = mirror.write_asset(asset, &formatted)?;
    tracing::debug!(url = %asset.source_url, path = %path.display(), "asset staged");
    Ok(())
}
