//! On-disk cache for the compacted exit interval index
//!
//! Fetching and parsing a month's exit-list archive takes minutes; the
//! resulting index is tiny. It is therefore persisted per month as a bincode
//! file (`exit-cache-YYYY-MM.bin`) and reloaded on subsequent runs for the
//! same month. A missing, unreadable, or stale-format cache file is never
//! fatal: the caller falls back to fetch-and-bake.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::ExitIntervalIndex;
use crate::month::Month;

/// Bumped whenever the serialized index layout changes; a mismatch
/// invalidates the cache instead of deserializing garbage
const CACHE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    index: ExitIntervalIndex,
}

/// Path of the cache file for one month under `cache_dir`
#[must_use]
pub fn cache_path(cache_dir: &Path, month: Month) -> PathBuf {
    cache_dir.join(format!("exit-cache-{}.bin", month))
}

/// Load a previously stored index for `month`
///
/// Any failure (missing file, truncated file, version mismatch) is returned
/// as an error; callers treat it as "rebuild", not as a run failure.
pub fn load_cache(cache_dir: &Path, month: Month) -> Result<ExitIntervalIndex> {
    let path = cache_path(cache_dir, month);
    let bytes = fs::read(&path)
        .with_context(|| format!("reading exit cache {}", path.display()))?;
    let cache: CacheFile = bincode::deserialize(&bytes)
        .with_context(|| format!("decoding exit cache {}", path.display()))?;
    if cache.version != CACHE_VERSION {
        bail!(
            "exit cache {} has version {}, expected {}",
            path.display(),
            cache.version,
            CACHE_VERSION
        );
    }
    info!(
        path = %path.display(),
        addresses = cache.index.len(),
        "loaded exit node cache"
    );
    Ok(cache.index)
}

/// Store a (compacted) index for `month`
pub fn store_cache(cache_dir: &Path, month: Month, index: &ExitIntervalIndex) -> Result<()> {
    fs::create_dir_all(cache_dir)
        .with_context(|| format!("creating cache directory {}", cache_dir.display()))?;
    let path = cache_path(cache_dir, month);
    let cache = CacheFile {
        version: CACHE_VERSION,
        index: index.clone(),
    };
    let bytes = bincode::serialize(&cache).context("encoding exit cache")?;
    fs::write(&path, bytes)
        .with_context(|| format!("writing exit cache {}", path.display()))?;
    info!(path = %path.display(), addresses = index.len(), "saved exit node cache");
    Ok(())
}
