//! Pure codecs for OTLP primitive encodings: typed-value extraction,
//! severity normalization, timestamp parsing, HTTP status classes, and the
//! content-derived record id.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::model::{Severity, StatusCategory};
use crate::otlp::{AnyValue, KeyValue};

/// FNV-1a 32-bit parameters.
const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// How much of the raw body participates in the record id.
const ID_BODY_PREFIX_CHARS: usize = 200;

/// Resolve the first populated variant of a typed value, in the fixed
/// precedence order string, int, double, bool, array, kvlist, bytes.
///
/// Returns `None` when no variant is populated; never errors.
pub fn extract_value(value: &AnyValue) -> Option<Value> {
    if let Some(s) = &value.string_value {
        return Some(Value::String(s.clone()));
    }
    if let Some(i) = &value.int_value {
        // int64 arrives string-encoded; keep the raw text if it overflows.
        return Some(match i.as_i64() {
            Some(n) => Value::Number(n.into()),
            None => Value::String(i.raw()),
        });
    }
    if let Some(d) = value.double_value {
        return Some(match serde_json::Number::from_f64(d) {
            Some(n) => Value::Number(n),
            None => Value::Null,
        });
    }
    if let Some(b) = value.bool_value {
        return Some(Value::Bool(b));
    }
    if let Some(arr) = &value.array_value {
        let items = arr
            .values
            .iter()
            .map(|v| extract_value(v).unwrap_or(Value::Null))
            .collect();
        return Some(Value::Array(items));
    }
    if let Some(kvlist) = &value.kvlist_value {
        let map = kvlist
            .values
            .iter()
            .filter_map(|kv| {
                kv.value
                    .as_ref()
                    .and_then(extract_value)
                    .map(|v| (kv.key.clone(), v))
            })
            .collect();
        return Some(Value::Object(map));
    }
    if let Some(bytes) = &value.bytes_value {
        // Base64 text is kept as-is; decoding it has no consumer here.
        return Some(Value::String(bytes.clone()));
    }
    None
}

/// Flatten a key/value attribute list into a map, keeping primitives only.
/// Array- and map-valued attributes are dropped at this level.
pub fn attrs_to_map(attrs: &[KeyValue]) -> BTreeMap<String, Value> {
    attrs
        .iter()
        .filter_map(|kv| {
            let value = kv.value.as_ref().and_then(extract_value)?;
            match value {
                Value::Array(_) | Value::Object(_) => None,
                primitive => Some((kv.key.clone(), primitive)),
            }
        })
        .collect()
}

/// Map an OTLP severity to the six canonical levels.
///
/// A number in 1..=24 wins over text and maps via fixed 4-wide bands; text
/// is substring-matched case-insensitively in priority order; everything
/// else is INFO.
pub fn normalize_severity(number: Option<i64>, text: &str) -> Severity {
    if let Some(n) = number {
        if (1..=24).contains(&n) {
            return match (n - 1) / 4 {
                0 => Severity::Trace,
                1 => Severity::Debug,
                2 => Severity::Info,
                3 => Severity::Warn,
                4 => Severity::Error,
                _ => Severity::Fatal,
            };
        }
    }

    let upper = text.to_ascii_uppercase();
    if upper.contains("TRACE") {
        Severity::Trace
    } else if upper.contains("DEBUG") {
        Severity::Debug
    } else if upper.contains("INFO") {
        Severity::Info
    } else if upper.contains("WARN") {
        Severity::Warn
    } else if upper.contains("ERROR") || upper.contains("ERR") {
        Severity::Error
    } else if upper.contains("FATAL") || upper.contains("CRITICAL") {
        Severity::Fatal
    } else {
        Severity::Info
    }
}

/// Parse a timestamp string into an absolute instant.
///
/// The unit is disambiguated by digit count: all-digit strings of length
/// >= 16 are nanoseconds, exactly 13 digits are milliseconds, exactly 10
/// digits are seconds. Anything else gets an ISO-8601 attempt. Unparseable
/// or empty input resolves to epoch 0.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return DateTime::UNIX_EPOCH;
    }

    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        if trimmed.len() >= 16 {
            // Nanoseconds; truncate to milliseconds. i128 soaks up inputs
            // past the i64 range before the division brings them back.
            return trimmed
                .parse::<i128>()
                .ok()
                .map(|ns| ns / 1_000_000)
                .and_then(|ms| i64::try_from(ms).ok())
                .and_then(DateTime::from_timestamp_millis)
                .unwrap_or(DateTime::UNIX_EPOCH);
        }
        if trimmed.len() == 13 {
            return trimmed
                .parse::<i64>()
                .ok()
                .and_then(DateTime::from_timestamp_millis)
                .unwrap_or(DateTime::UNIX_EPOCH);
        }
        if trimmed.len() == 10 {
            return trimmed
                .parse::<i64>()
                .ok()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .unwrap_or(DateTime::UNIX_EPOCH);
        }
        // Other digit counts fall through to the ISO attempt and fail there.
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return naive.and_utc();
    }

    DateTime::UNIX_EPOCH
}

/// Classify an HTTP status code; codes below 200 have no class.
pub fn status_category(status: Option<i64>) -> Option<StatusCategory> {
    match status? {
        200..=299 => Some(StatusCategory::Success),
        300..=399 => Some(StatusCategory::Redirect),
        400..=499 => Some(StatusCategory::ClientError),
        s if s >= 500 => Some(StatusCategory::ServerError),
        _ => None,
    }
}

/// Compute the deterministic content id for a record.
///
/// FNV-1a over `file:line:timeNanos:severityNumber:body[..200 chars]`,
/// base-36 encoded, with the base-36 line number appended so identical
/// content on different lines still diverges.
pub fn record_id(
    source_file: &str,
    line_number: u64,
    time_unix_nano: &str,
    severity_number: i64,
    raw_body: &str,
) -> String {
    let prefix: String = raw_body.chars().take(ID_BODY_PREFIX_CHARS).collect();
    let input = format!(
        "{}:{}:{}:{}:{}",
        source_file, line_number, time_unix_nano, severity_number, prefix
    );
    format!("{}-{}", to_base36(fnv1a32(input.as_bytes()) as u64), to_base36(line_number))
}

fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize] as char);
        n /= 36;
    }
    out.iter().rev().collect()
}
