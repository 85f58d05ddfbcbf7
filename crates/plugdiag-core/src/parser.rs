//! Reconstructing structured entries from an append-only text log.
//!
//! A line shaped `<ISO8601 timestamp> <LEVEL> <message>` starts a new
//! entry; everything up to the next head line is that entry's trailing
//! JSON context. Parsing never fails: malformed trailing content is
//! folded back into the message (visible-but-misplaced beats silent
//! loss) and an unreadable file yields an empty sequence.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::path::Path;

use crate::level::Severity;
use crate::sink::ATTRIBUTION_FIELD;

/// One reconstructed log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
    /// Absent when the entry had no parsable trailing context.
    pub context: Option<Map<String, Value>>,
}

/// Parse a whole log file. Unreadable files yield no entries.
pub fn parse_file(path: impl AsRef<Path>) -> Vec<ParsedEntry> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_str(&content),
        Err(_) => Vec::new(),
    }
}

/// Parse log text, one entry per head-line match.
pub fn parse_str(content: &str) -> Vec<ParsedEntry> {
    let mut entries = Vec::new();
    let mut open: Option<(DateTime<Utc>, Severity, String, Vec<String>)> = None;

    for line in content.lines() {
        if let Some((timestamp, severity, message)) = parse_head(line) {
            if let Some(entry) = open.take() {
                entries.push(close(entry));
            }
            open = Some((timestamp, severity, message, Vec::new()));
        } else if let Some((_, _, _, trailing)) = &mut open {
            trailing.push(line.to_string());
        }
        // Trailing text before any head line has no entry to belong to.
    }
    if let Some(entry) = open.take() {
        entries.push(close(entry));
    }
    entries
}

/// `^<timestamp><ws><LEVEL><ws><message>$`. The timestamp must be RFC
/// 3339 and the level one of the eight uppercase tokens, which is what
/// keeps JSON context lines from ever matching.
fn parse_head(line: &str) -> Option<(DateTime<Utc>, Severity, String)> {
    let mut parts = line.splitn(3, char::is_whitespace);
    let timestamp = parts.next()?;
    let level = parts.next()?;
    let message = parts.next()?;

    let timestamp = DateTime::parse_from_rfc3339(timestamp)
        .ok()?
        .with_timezone(&Utc);
    // Only the uppercase on-disk form counts as a head line.
    if level != level.to_ascii_uppercase() {
        return None;
    }
    let severity: Severity = level.parse().ok()?;
    Some((timestamp, severity, message.to_string()))
}

/// Resolve an entry's trailing lines: one JSON parse of the joined block,
/// else per-line with the last parsable object winning and every
/// unparsable line appended back onto the message.
fn close(
    (timestamp, severity, mut message, trailing): (DateTime<Utc>, Severity, String, Vec<String>),
) -> ParsedEntry {
    let mut context: Option<Map<String, Value>> = None;

    if !trailing.is_empty() {
        let joined = trailing.join("\n");
        match serde_json::from_str::<Value>(&joined) {
            Ok(Value::Object(map)) => context = Some(map),
            _ => {
                for line in &trailing {
                    match serde_json::from_str::<Value>(line) {
                        Ok(Value::Object(map)) => context = Some(map),
                        _ => {
                            message.push('\n');
                            message.push_str(line);
                        }
                    }
                }
            }
        }
    }

    if let Some(map) = &mut context {
        map.remove(ATTRIBUTION_FIELD);
    }

    ParsedEntry {
        timestamp,
        severity,
        message,
        context,
    }
}
