//! Persisted results document
//!
//! The datafile is a single JSON object accumulated across runs: one key per
//! month (`"2022-07": {"any": {"plain": 10, "tor": 0}, ...}`) plus a `meta`
//! block with title, comment, source and last-updated timestamp. Each run
//! merges its month into the existing document and rewrites the whole file
//! with sorted keys and two-space indentation, atomically. A write failure
//! is fatal: persisting results is the point of the run.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::counter::BucketStats;
use crate::month::Month;

/// Timestamp format of the meta block's `last-updated` field (UTC)
const LAST_UPDATED_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Static description written into the datafile's meta block
#[derive(Debug, Clone, Default)]
pub struct Meta {
    pub title: String,
    pub comment: Option<String>,
    pub source: Option<String>,
    /// Suppressed for reproducible output (tests, diffing)
    pub record_last_updated: bool,
}

/// Merge one month's results into the datafile at `path`
///
/// A missing datafile starts an empty document; an existing but unreadable
/// one is an error (silently replacing accumulated history would lose it).
pub fn update_datafile(
    path: &Path,
    month: Month,
    stats: &BTreeMap<String, BucketStats>,
    meta: &Meta,
) -> Result<()> {
    let mut document = read_document(path)?;

    document.insert(month.to_string(), serde_json::to_value(stats)?);
    document.insert("meta".to_string(), meta_value(meta));

    info!(month = %month, path = %path.display(), "writing stats to datafile");
    write_document(path, &Value::Object(document))
}

fn read_document(path: &Path) -> Result<Map<String, Value>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "datafile not found, starting a new one");
            return Ok(Map::new());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("reading datafile {}", path.display()))
        }
    };
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parsing datafile {}", path.display()))?;
    match value {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!(
            "datafile {} holds {} where an object was expected",
            path.display(),
            json_type_name(&other)
        ),
    }
}

fn meta_value(meta: &Meta) -> Value {
    let mut block = Map::new();
    block.insert("title".to_string(), json!(meta.title));
    if let Some(comment) = &meta.comment {
        block.insert("comment".to_string(), json!(comment));
    }
    if let Some(source) = &meta.source {
        block.insert("source".to_string(), json!(source));
    }
    if meta.record_last_updated {
        block.insert(
            "last-updated".to_string(),
            json!(Utc::now().format(LAST_UPDATED_FORMAT).to_string()),
        );
    }
    Value::Object(block)
}

/// Serialize the document with sorted keys and two-space indentation
///
/// serde_json's object map is a BTreeMap, so key order falls out sorted;
/// `to_string_pretty` indents with two spaces. Together they reproduce the
/// historical on-disk formatting byte for byte.
pub fn render_document(document: &Value) -> Result<String> {
    serde_json::to_string_pretty(document).context("encoding datafile")
}

fn write_document(path: &Path, document: &Value) -> Result<()> {
    let rendered = render_document(document)?;
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());

    let mut file = match dir {
        Some(dir) => tempfile::NamedTempFile::new_in(dir),
        None => tempfile::NamedTempFile::new(),
    }
    .with_context(|| format!("creating temporary file next to {}", path.display()))?;
    file.write_all(rendered.as_bytes())
        .and_then(|()| file.flush())
        .with_context(|| format!("writing datafile {}", path.display()))?;
    file.persist(path)
        .with_context(|| format!("replacing datafile {}", path.display()))?;
    Ok(())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
