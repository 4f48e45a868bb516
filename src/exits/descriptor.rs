//! TorDNSEL exit-list descriptor parsing
//!
//! Exit lists are plain-text documents published by CollecTor, one entry per
//! relay:
//!
//! ```text
//! @type tordnsel 1.0
//! Downloaded 2022-07-01 02:02:00
//! ExitNode 0011BD2485AD45D984EC4159C88FC066E5E3300E
//! Published 2022-06-30 22:44:22
//! LastStatus 2022-07-01 02:00:00
//! ExitAddress 162.247.74.201 2022-07-01 02:10:19
//! ExitNode ...
//! ```
//!
//! A descriptor may carry several `ExitAddress` lines; each (address,
//! descriptor) pair becomes one `register` call on the interval index.
//!
//! Documents normally start with an `@type tordnsel` annotation. Some
//! historical archives lack it (tor#21195); callers can force a type instead
//! of rejecting such documents by setting
//! [`DescriptorReader::force_descriptor_type`] at construction. This is an
//! explicit per-reader setting, never process-global state.

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;
use tracing::debug;

use super::ExitIntervalIndex;

/// Annotation prefix expected on the first line of an exit-list document
const TYPE_ANNOTATION: &str = "@type ";

/// Descriptor type this parser understands
const TORDNSEL_TYPE: &str = "tordnsel";

/// Timestamp format used throughout exit lists (always UTC)
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors from parsing an exit-list document
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DescriptorError {
    #[error("document has no @type annotation and no forced type was configured")]
    MissingTypeAnnotation,

    #[error("unsupported descriptor type '{0}', expected tordnsel")]
    UnsupportedType(String),

    #[error("invalid timestamp '{value}' on line {line}")]
    BadTimestamp { value: String, line: usize },

    #[error("entry beginning on line {line} is missing its {field} field")]
    MissingField { field: &'static str, line: usize },
}

/// One parsed exit-list entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitDescriptor {
    /// Relay fingerprint, informational only
    pub fingerprint: String,
    /// Descriptor publication time
    pub published: DateTime<Utc>,
    /// Last time the relay was seen in a network status
    pub last_status: DateTime<Utc>,
    /// Observed exit addresses with their scan times
    pub exit_addresses: Vec<(String, DateTime<Utc>)>,
}

/// Parser configuration for exit-list documents
#[derive(Debug, Clone, Default)]
pub struct DescriptorReader {
    /// Assume this descriptor type when a document lacks its `@type`
    /// annotation (compatibility workaround for old archives)
    pub force_descriptor_type: Option<String>,
}

impl DescriptorReader {
    /// Parse one exit-list document into descriptors
    pub fn parse(&self, text: &str) -> Result<Vec<ExitDescriptor>, DescriptorError> {
        let mut lines = text.lines().enumerate().peekable();

        // Type annotation comes first when present.
        let descriptor_type = match lines.peek() {
            Some((_, line)) if line.starts_with(TYPE_ANNOTATION) => {
                let (_, line) = lines.next().expect("peeked");
                line[TYPE_ANNOTATION.len()..].trim().to_string()
            }
            _ => self
                .force_descriptor_type
                .clone()
                .ok_or(DescriptorError::MissingTypeAnnotation)?,
        };
        if !descriptor_type.starts_with(TORDNSEL_TYPE) {
            return Err(DescriptorError::UnsupportedType(descriptor_type));
        }

        let mut descriptors = Vec::new();
        let mut current: Option<PartialEntry> = None;

        for (idx, line) in lines {
            let lineno = idx + 1;
            let Some((keyword, rest)) = split_keyword(line) else {
                continue;
            };
            match keyword {
                "ExitNode" => {
                    if let Some(entry) = current.take() {
                        descriptors.push(entry.finish()?);
                    }
                    current = Some(PartialEntry::new(rest.to_string(), lineno));
                }
                "Published" => {
                    if let Some(entry) = current.as_mut() {
                        entry.published = Some(parse_timestamp(rest, lineno)?);
                    }
                }
                "LastStatus" => {
                    if let Some(entry) = current.as_mut() {
                        entry.last_status = Some(parse_timestamp(rest, lineno)?);
                    }
                }
                "ExitAddress" => {
                    if let Some(entry) = current.as_mut() {
                        let (address, scanned) = rest
                            .split_once(' ')
                            .unwrap_or((rest, ""));
                        let scanned = parse_timestamp(scanned.trim(), lineno)?;
                        entry.exit_addresses.push((address.to_string(), scanned));
                    }
                }
                // Downloaded and any future keywords are irrelevant here
                _ => debug!(keyword, line = lineno, "skipping exit-list keyword"),
            }
        }
        if let Some(entry) = current.take() {
            descriptors.push(entry.finish()?);
        }

        Ok(descriptors)
    }
}

/// Parse one exit-list document with default settings
///
/// Convenience wrapper for documents that carry their `@type` annotation.
pub fn parse_exit_list(text: &str) -> Result<Vec<ExitDescriptor>, DescriptorError> {
    DescriptorReader::default().parse(text)
}

/// Register every (address, descriptor) observation from a batch of
/// descriptors into the index
///
/// Returns `(descriptors, addresses)` counts for progress logging. The index
/// still needs [`ExitIntervalIndex::compact`] before querying.
pub fn bake_descriptors(
    index: &mut ExitIntervalIndex,
    descriptors: &[ExitDescriptor],
) -> (usize, usize) {
    let mut n_addr = 0;
    for descriptor in descriptors {
        for (address, _scanned) in &descriptor.exit_addresses {
            index.register(address, descriptor.published, descriptor.last_status);
            n_addr += 1;
        }
    }
    (descriptors.len(), n_addr)
}

struct PartialEntry {
    fingerprint: String,
    first_line: usize,
    published: Option<DateTime<Utc>>,
    last_status: Option<DateTime<Utc>>,
    exit_addresses: Vec<(String, DateTime<Utc>)>,
}

impl PartialEntry {
    fn new(fingerprint: String, first_line: usize) -> Self {
        Self {
            fingerprint,
            first_line,
            published: None,
            last_status: None,
            exit_addresses: Vec::new(),
        }
    }

    fn finish(self) -> Result<ExitDescriptor, DescriptorError> {
        let published = self.published.ok_or(DescriptorError::MissingField {
            field: "Published",
            line: self.first_line,
        })?;
        let last_status = self.last_status.ok_or(DescriptorError::MissingField {
            field: "LastStatus",
            line: self.first_line,
        })?;
        Ok(ExitDescriptor {
            fingerprint: self.fingerprint,
            published,
            last_status,
            exit_addresses: self.exit_addresses,
        })
    }
}

fn split_keyword(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_end();
    if line.is_empty() {
        return None;
    }
    match line.split_once(' ') {
        Some((keyword, rest)) => Some((keyword, rest.trim_start())),
        None => Some((line, "")),
    }
}

fn parse_timestamp(value: &str, line: usize) -> Result<DateTime<Utc>, DescriptorError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| DescriptorError::BadTimestamp {
            value: value.to_string(),
            line,
        })
}
