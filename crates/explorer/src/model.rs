use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normalized log severity, mapped from the OTLP severity number bands or
/// best-effort matched from severity text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Severity {
    pub const ALL: [Severity; 6] = [
        Severity::Trace,
        Severity::Debug,
        Severity::Info,
        Severity::Warn,
        Severity::Error,
        Severity::Fatal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP status class derived from a structured body's status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatusCategory {
    #[serde(rename = "2xx")]
    Success,
    #[serde(rename = "3xx")]
    Redirect,
    #[serde(rename = "4xx")]
    ClientError,
    #[serde(rename = "5xx")]
    ServerError,
}

impl StatusCategory {
    pub const ALL: [StatusCategory; 4] = [
        StatusCategory::Success,
        StatusCategory::Redirect,
        StatusCategory::ClientError,
        StatusCategory::ServerError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCategory::Success => "2xx",
            StatusCategory::Redirect => "3xx",
            StatusCategory::ClientError => "4xx",
            StatusCategory::ServerError => "5xx",
        }
    }
}

impl std::fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The canonical flattened record produced from one OTLP log record.
///
/// Created by the flattener, owned by the aggregation store afterwards, and
/// never mutated; removal happens only on file removal or a full reset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedLogRecord {
    /// Content-derived id; doubles as the dedup key across chunks.
    pub id: String,
    /// Absolute instant resolved from `timeUnixNano` (observed time as
    /// fallback); epoch 0 when neither is usable.
    pub timestamp: DateTime<Utc>,
    /// Raw nanosecond string as it appeared in the payload.
    pub time_unix_nano: String,
    pub severity: Severity,
    /// Raw body: the string body verbatim, or the JSON text of a non-string
    /// body.
    pub body: String,
    /// Human-readable message: the structured body's `message` field when
    /// present, otherwise a bounded prefix of the raw body.
    pub message: String,
    /// Sub-fields parsed out of a JSON-shaped body; `None` when the body is
    /// not a JSON object.
    pub fields: Option<BodyFields>,
    /// Trace/span ids, preferring values found inside a structured body.
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    /// Envelope-level ids retained separately for forensic comparison.
    pub envelope_trace_id: Option<String>,
    pub envelope_span_id: Option<String>,
    /// Derived from resource attributes (`service.name`, then `service`).
    pub service_name: Option<String>,
    pub resource_attributes: BTreeMap<String, Value>,
    pub scope_name: Option<String>,
    pub scope_version: Option<String>,
    pub attributes: BTreeMap<String, Value>,
    /// Provenance: originating file and 1-based line (JSONL) or envelope
    /// sequence number (pretty-printed input).
    pub source_file: String,
    pub line_number: u64,
}

/// Structured fields extracted from a JSON-object log body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BodyFields {
    pub level: Option<String>,
    pub timestamp: Option<String>,
    pub http_method: Option<String>,
    pub http_path: Option<String>,
    pub http_status: Option<i64>,
    pub user_id: Option<String>,
    pub user_session_id: Option<String>,
    pub user_ip: Option<String>,
    pub service_version: Option<String>,
    pub tags: Vec<String>,
    /// Remaining body keys not claimed by a named field above.
    pub attrs: BTreeMap<String, Value>,
}

/// Metadata for one fully loaded file, registered on job completion and
/// removed together with the file's records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadedFile {
    pub name: String,
    pub byte_size: u64,
    pub record_count: u64,
    pub parse_errors: u64,
    pub loaded_at: DateTime<Utc>,
    /// Whether the file name looks like a rotated log segment.
    pub rotated: bool,
}

/// Rotated-segment heuristic: an all-digit suffix after the final dot
/// (`app.log.1`) or an embedded `YYYY-MM-DD` stamp (`app-2024-01-05.log`).
pub fn is_rotated_name(name: &str) -> bool {
    if let Some((_, suffix)) = name.rsplit_once('.') {
        if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
            return true;
        }
    }
    contains_date_stamp(name)
}

fn contains_date_stamp(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.len() < 10 {
        return false;
    }
    // Scan for a digit run shaped DDDD-DD-DD.
    for window in bytes.windows(10) {
        let shape_ok = window[0].is_ascii_digit()
            && window[1].is_ascii_digit()
            && window[2].is_ascii_digit()
            && window[3].is_ascii_digit()
            && window[4] == b'-'
            && window[5].is_ascii_digit()
            && window[6].is_ascii_digit()
            && window[7] == b'-'
            && window[8].is_ascii_digit()
            && window[9].is_ascii_digit();
        if shape_ok {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_display_matches_canonical_names() {
        assert_eq!(Severity::Trace.to_string(), "TRACE");
        assert_eq!(Severity::Fatal.to_string(), "FATAL");
        assert_eq!(Severity::ALL.len(), 6);
    }

    #[test]
    fn status_category_display() {
        assert_eq!(StatusCategory::Success.to_string(), "2xx");
        assert_eq!(StatusCategory::ServerError.to_string(), "5xx");
    }

    #[test]
    fn rotated_numeric_suffix() {
        assert!(is_rotated_name("app.log.1"));
        assert!(is_rotated_name("app.log.20"));
        assert!(!is_rotated_name("app.log"));
        assert!(!is_rotated_name("app.json"));
    }

    #[test]
    fn rotated_date_stamp() {
        assert!(is_rotated_name("app-2024-01-05.log"));
        assert!(is_rotated_name("app.log.2024-01-05"));
        assert!(!is_rotated_name("app-v2.log"));
    }

    #[test]
    fn short_names_are_not_rotated() {
        assert!(!is_rotated_name("a.log"));
        assert!(!is_rotated_name(""));
    }
}
