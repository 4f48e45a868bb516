//! Combined-format access log parsing
//!
//! Turns raw nginx/Apache "combined" log lines into [`Request`] values:
//!
//! ```text
//! address - - [timestamp] "method path protocol" status length "referer" "agent"
//! ```
//!
//! Real-world logs contain garbage: truncated request lines, binary noise,
//! and clients that embed literal spaces in the request target even though
//! RFC 9112 §3.2 forbids it. The server answers such lines with 400 (or
//! sometimes 301), so:
//!
//! - status 400 lines are skipped silently, their other fields cannot be
//!   trusted;
//! - the quoted request field is split by taking the method off the left at
//!   the *first* space and the protocol off the right at the *last* space,
//!   leaving everything in between (spaces and all) as the path;
//! - any other malformed line is reported and skipped, the stream never
//!   aborts.

use std::io::BufRead;

use chrono::{DateTime, FixedOffset};
use percent_encoding::percent_decode_str;
use thiserror::Error;
use tracing::{error, warn};

/// Timestamp layout of the bracketed field pair, e.g.
/// `[01/Jul/2022:00:01:15 +0000]`
const TIMESTAMP_FORMAT: &str = "[%d/%b/%Y:%H:%M:%S %z]";

/// Fields in a combined log line after quote-aware splitting
const COMBINED_FIELD_COUNT: usize = 10;

/// One accepted HTTP access
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Client IP in text form, exactly as logged
    pub address: String,
    /// Request time, timezone-aware
    pub timestamp: DateTime<FixedOffset>,
    /// Percent-decoded request target
    pub path: String,
    /// HTTP response status
    pub status: u16,
}

/// Line-level parse failures
///
/// These are always recovered by skipping the line; they exist so the skip
/// can be logged with a reason.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum LineError {
    #[error("expected {COMBINED_FIELD_COUNT} fields, found {0}")]
    FieldCount(usize),

    #[error("unparseable status field '{0}'")]
    BadStatus(String),

    #[error("unparseable length field '{0}'")]
    BadLength(String),

    #[error("unparseable timestamp '{0}'")]
    BadTimestamp(String),

    #[error("request field '{0}' has no method/protocol tokens")]
    BadRequestField(String),
}

/// Parse one combined log line
///
/// `Ok(None)` means the line was deliberately skipped (status 400: the
/// request field of such lines is frequently truncated garbage). `Err` means
/// the line is malformed; callers log it and continue.
pub fn parse_line(line: &str) -> Result<Option<Request>, LineError> {
    let fields = split_fields(line);
    let [address, _ident, _user, time1, time2, request, status, length, _referer, _agent]: [&str;
        COMBINED_FIELD_COUNT] = fields[..]
        .try_into()
        .map_err(|_| LineError::FieldCount(fields.len()))?;

    let status: u16 = status
        .parse()
        .map_err(|_| LineError::BadStatus(status.to_string()))?;
    // Parsed only as a sanity check on the tail of the line.
    let _length: u64 = length
        .parse()
        .map_err(|_| LineError::BadLength(length.to_string()))?;

    if status == 400 {
        // There is no guarantee the request field holds anything sensible,
        // the line is invalid anyway.
        return Ok(None);
    }

    let (_method, path) = split_request_field(request)
        .ok_or_else(|| LineError::BadRequestField(request.to_string()))?;
    let path = percent_decode_str(path).decode_utf8_lossy().into_owned();

    let bracketed = format!("{time1} {time2}");
    let timestamp = DateTime::parse_from_str(&bracketed, TIMESTAMP_FORMAT)
        .map_err(|_| LineError::BadTimestamp(bracketed.clone()))?;

    Ok(Some(Request {
        address: address.to_string(),
        timestamp,
        path,
        status,
    }))
}

/// Stream requests from a combined-format log source
///
/// Malformed lines are logged and skipped; status-400 lines are skipped
/// silently; only a real I/O error ends the stream (with an error log).
/// Lines are read as raw bytes and decoded lossily: logs of public servers
/// contain non-UTF-8 garbage, and one binary line must not cost the rest of
/// the file. The iterator is lazy, memory stays bounded regardless of log
/// size.
pub fn parse_combined<R: BufRead>(mut reader: R) -> impl Iterator<Item = Request> {
    let mut buf = Vec::new();
    std::iter::from_fn(move || loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => return None,
            Ok(_) => {
                let decoded = String::from_utf8_lossy(&buf);
                let line = decoded.trim_end_matches(['\n', '\r']);
                if line.is_empty() {
                    continue;
                }
                match parse_line(line) {
                    Ok(Some(request)) => return Some(request),
                    Ok(None) => continue,
                    Err(err) => {
                        warn!(%err, line, "error parsing log line");
                        continue;
                    }
                }
            }
            Err(err) => {
                error!(%err, "error reading log stream");
                return None;
            }
        }
    })
}

/// Split a log line into space-delimited fields, honoring double quotes
///
/// Quoted fields keep their inner spaces and lose the surrounding quotes;
/// nginx escapes literal quotes inside fields as `\x22`, so no unescaping is
/// needed here. The bracketed timestamp intentionally stays as two fields,
/// matching the plain space-split the format was designed around.
fn split_fields(line: &str) -> Vec<&str> {
    let bytes = line.as_bytes();
    let mut fields = Vec::with_capacity(COMBINED_FIELD_COUNT);
    let mut pos = 0;

    while pos < bytes.len() {
        // skip field separators
        if bytes[pos] == b' ' {
            pos += 1;
            continue;
        }
        if bytes[pos] == b'"' {
            let start = pos + 1;
            let end = memchr::memchr(b'"', &bytes[start..])
                .map(|i| start + i)
                .unwrap_or(bytes.len());
            fields.push(&line[start..end]);
            pos = end + 1;
        } else {
            let start = pos;
            let end = memchr::memchr(b' ', &bytes[start..])
                .map(|i| start + i)
                .unwrap_or(bytes.len());
            fields.push(&line[start..end]);
            pos = end;
        }
    }
    fields
}

/// Split `"GET /some path HTTP/1.1"` into method and raw path
///
/// The method comes off at the first space, the protocol at the last; the
/// middle may legitimately (well, illegitimately) contain spaces.
fn split_request_field(request: &str) -> Option<(&str, &str)> {
    let bytes = request.as_bytes();
    let first = memchr::memchr(b' ', bytes)?;
    let last = memchr::memrchr(b' ', bytes)?;
    if first == last {
        // only one space: either no path or no protocol token
        return None;
    }
    Some((&request[..first], &request[first + 1..last]))
}
