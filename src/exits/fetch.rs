//! Exit-list acquisition
//!
//! CollecTor publishes one `.tar.xz` archive of exit lists per month. The
//! archive is downloaded in full, decompressed in memory, and each contained
//! exit-list file is parsed into descriptors. Archives are a few megabytes,
//! so buffering the response is fine for a batch run.
//!
//! Already-downloaded material can be loaded without touching the network:
//! [`load_exit_list_paths`] accepts plain exit-list files, `.tar.xz`
//! archives, and directories of either.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tar::Archive;
use tracing::{debug, info};
use xz2::read::XzDecoder;

use super::descriptor::{DescriptorReader, ExitDescriptor};
use crate::month::Month;

/// Monthly exit-list archive location, `{}` replaced by `YYYY-MM`
pub const EXIT_LIST_URI: &str =
    "https://collector.torproject.org/archive/exit-lists/exit-list-{}.tar.xz";

/// Download and parse the exit-list archive for one month
///
/// A failure here (network, decompression, descriptor syntax) fails the run
/// for that month unless the caller has a usable cache to fall back on.
pub fn fetch_exit_list_archive(
    month: Month,
    reader: &DescriptorReader,
) -> Result<Vec<ExitDescriptor>> {
    let url = EXIT_LIST_URI.replace("{}", &month.to_string());
    info!(%url, "downloading exit node list");

    let response = reqwest::blocking::get(&url)
        .and_then(reqwest::blocking::Response::error_for_status)
        .with_context(|| format!("fetching exit list archive {url}"))?;
    let compressed = response
        .bytes()
        .with_context(|| format!("reading exit list archive {url}"))?;

    parse_archive(&compressed, reader)
        .with_context(|| format!("parsing exit list archive {url}"))
}

/// Decompress a `.tar.xz` exit-list archive and parse every file in it
pub fn parse_archive(
    compressed: &[u8],
    reader: &DescriptorReader,
) -> Result<Vec<ExitDescriptor>> {
    let mut archive = Archive::new(XzDecoder::new(compressed));
    let mut descriptors = Vec::new();

    for entry in archive.entries().context("reading tar entries")? {
        let mut entry = entry.context("reading tar entry")?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry.path().context("tar entry path")?.into_owned();
        let mut text = String::new();
        entry
            .read_to_string(&mut text)
            .with_context(|| format!("reading archive member {}", path.display()))?;
        let parsed = reader
            .parse(&text)
            .with_context(|| format!("parsing archive member {}", path.display()))?;
        debug!(member = %path.display(), descriptors = parsed.len(), "parsed exit list");
        descriptors.extend(parsed);
    }

    info!(descriptors = descriptors.len(), "parsed exit node list archive");
    Ok(descriptors)
}

/// Parse exit lists from local files and directories, skipping the network
///
/// Each path may be a single exit-list file, a monthly `.tar.xz` archive, or
/// a directory whose files are either. Directory entries are processed in
/// name order so repeated runs see the documents in the same order.
pub fn load_exit_list_paths(
    paths: &[PathBuf],
    reader: &DescriptorReader,
) -> Result<Vec<ExitDescriptor>> {
    let mut descriptors = Vec::new();
    for path in paths {
        load_path(path, reader, &mut descriptors)?;
    }
    info!(
        descriptors = descriptors.len(),
        "parsed local exit node lists"
    );
    Ok(descriptors)
}

fn load_path(
    path: &Path,
    reader: &DescriptorReader,
    descriptors: &mut Vec<ExitDescriptor>,
) -> Result<()> {
    if path.is_dir() {
        let mut children: Vec<PathBuf> = std::fs::read_dir(path)
            .with_context(|| format!("reading exit list directory {}", path.display()))?
            .collect::<std::io::Result<Vec<_>>>()
            .with_context(|| format!("reading exit list directory {}", path.display()))?
            .into_iter()
            .map(|entry| entry.path())
            .collect();
        children.sort();
        for child in children {
            load_path(&child, reader, descriptors)?;
        }
        return Ok(());
    }

    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if name.ends_with(".tar.xz") {
        let compressed = std::fs::read(path)
            .with_context(|| format!("reading exit list archive {}", path.display()))?;
        let parsed = parse_archive(&compressed, reader)
            .with_context(|| format!("parsing exit list archive {}", path.display()))?;
        descriptors.extend(parsed);
    } else {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading exit list {}", path.display()))?;
        let parsed = reader
            .parse(&text)
            .with_context(|| format!("parsing exit list {}", path.display()))?;
        debug!(file = %path.display(), descriptors = parsed.len(), "parsed exit list");
        descriptors.extend(parsed);
    }
    Ok(())
}
