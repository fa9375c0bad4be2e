//! Flattener: walks a decoded export envelope (resource -> scope -> log
//! record) and emits normalized [`ParsedLogRecord`] values.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::codec::{attrs_to_map, extract_value, normalize_severity, parse_timestamp, record_id};
use crate::model::{BodyFields, ParsedLogRecord};
use crate::otlp::{LogRecord, LogsEnvelope};

/// Maximum number of characters carried into the derived message when the
/// body has no structured `message` field.
const MESSAGE_PREVIEW_CHARS: usize = 500;

/// Flatten one envelope into records.
///
/// `sequence` is 1-based: the line number for JSONL input, the envelope
/// occurrence index for pretty-printed input.
pub fn flatten_envelope(
    envelope: &LogsEnvelope,
    source_file: &str,
    sequence: u64,
) -> Vec<ParsedLogRecord> {
    let mut records = Vec::new();

    for resource_logs in &envelope.resource_logs {
        let resource_attributes = attrs_to_map(&resource_logs.resource.attributes);
        let service_name = resource_attributes
            .get("service.name")
            .or_else(|| resource_attributes.get("service"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        for scope_logs in &resource_logs.scope_logs {
            let context = ScopeContext {
                source_file,
                sequence,
                resource_attributes: &resource_attributes,
                service_name: &service_name,
                scope_name: non_empty(&scope_logs.scope.name),
                scope_version: non_empty(&scope_logs.scope.version),
            };
            for log_record in &scope_logs.log_records {
                records.push(flatten_record(log_record, &context));
            }
        }
    }

    records
}

/// Resource- and scope-level fields shared by every record under one scope.
struct ScopeContext<'a> {
    source_file: &'a str,
    sequence: u64,
    resource_attributes: &'a BTreeMap<String, Value>,
    service_name: &'a Option<String>,
    scope_name: Option<String>,
    scope_version: Option<String>,
}

fn flatten_record(log_record: &LogRecord, context: &ScopeContext<'_>) -> ParsedLogRecord {
    // timeUnixNano with observed time as fallback.
    let time_raw = if log_record.time_unix_nano.is_missing() {
        log_record.observed_time_unix_nano.raw()
    } else {
        log_record.time_unix_nano.raw()
    };
    let timestamp = parse_timestamp(&time_raw);

    let body = raw_body(log_record);
    let severity = normalize_severity(log_record.severity_number, &log_record.severity_text);

    let parsed_body = parse_structured_body(&body);
    let message = parsed_body
        .as_ref()
        .and_then(|p| p.message.clone())
        .unwrap_or_else(|| body.chars().take(MESSAGE_PREVIEW_CHARS).collect());

    let envelope_trace_id = non_empty(&log_record.trace_id);
    let envelope_span_id = non_empty(&log_record.span_id);
    // Ids found inside a structured body win over the envelope-level ones.
    let trace_id = parsed_body
        .as_ref()
        .and_then(|p| p.trace_id.clone())
        .or_else(|| envelope_trace_id.clone());
    let span_id = parsed_body
        .as_ref()
        .and_then(|p| p.span_id.clone())
        .or_else(|| envelope_span_id.clone());

    let id = record_id(
        context.source_file,
        context.sequence,
        &time_raw,
        log_record.severity_number.unwrap_or(0),
        &body,
    );

    ParsedLogRecord {
        id,
        timestamp,
        time_unix_nano: time_raw,
        severity,
        message,
        fields: parsed_body.map(|p| p.fields),
        trace_id,
        span_id,
        envelope_trace_id,
        envelope_span_id,
        service_name: context.service_name.clone(),
        resource_attributes: context.resource_attributes.clone(),
        scope_name: context.scope_name.clone(),
        scope_version: context.scope_version.clone(),
        attributes: attrs_to_map(&log_record.attributes),
        source_file: context.source_file.to_string(),
        line_number: context.sequence,
        body,
    }
}

/// Body as a raw string: string bodies verbatim, everything else as its
/// JSON text, absent bodies empty.
fn raw_body(log_record: &LogRecord) -> String {
    match log_record.body.as_ref().and_then(extract_value) {
        Some(Value::String(s)) => s,
        Some(other) => serde_json::to_string(&other).unwrap_or_default(),
        None => String::new(),
    }
}

struct ParsedBody {
    message: Option<String>,
    trace_id: Option<String>,
    span_id: Option<String>,
    fields: BodyFields,
}

/// Keys claimed by named [`BodyFields`] members; everything else lands in
/// the leftover attrs map.
const CLAIMED_KEYS: &[&str] = &[
    "level", "lvl", "severity", "timestamp", "time", "ts", "message", "msg", "http", "user",
    "trace", "service", "tags",
];

/// Attempt to parse structured fields out of a JSON-shaped body.
///
/// Only bodies starting with `{` are attempted; a non-object or unparseable
/// result means "no structured body", never an error.
fn parse_structured_body(body: &str) -> Option<ParsedBody> {
    let trimmed = body.trim_start();
    if !trimmed.starts_with('{') {
        return None;
    }
    let value: Value = serde_json::from_str(trimmed).ok()?;
    let obj = value.as_object()?;

    let http = obj.get("http").and_then(|v| v.as_object());
    let user = obj.get("user").and_then(|v| v.as_object());
    let trace = obj.get("trace").and_then(|v| v.as_object());
    let service = obj.get("service").and_then(|v| v.as_object());

    let fields = BodyFields {
        level: pick_string(obj, &["level", "lvl", "severity"]),
        timestamp: pick_string(obj, &["timestamp", "time", "ts"]),
        http_method: nested_string(http, obj, "http", "method"),
        http_path: nested_string(http, obj, "http", "path"),
        http_status: nested_value(http, obj, "http", "status").and_then(as_status_code),
        user_id: nested_string(user, obj, "user", "id"),
        user_session_id: nested_string(user, obj, "user", "session_id"),
        user_ip: nested_string(user, obj, "user", "ip"),
        service_version: nested_string(service, obj, "service", "version"),
        tags: obj
            .get("tags")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|t| t.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default(),
        attrs: obj
            .iter()
            .filter(|(k, _)| !CLAIMED_KEYS.contains(&k.as_str()) && !k.contains('.'))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    };

    Some(ParsedBody {
        message: pick_string(obj, &["message", "msg"]),
        trace_id: nested_string(trace, obj, "trace", "trace_id"),
        span_id: nested_string(trace, obj, "trace", "span_id"),
        fields,
    })
}

/// First present key rendered as a string (strings verbatim, numbers and
/// bools via Display).
fn pick_string(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(found) = obj.get(*key).and_then(value_to_string) {
            return Some(found);
        }
    }
    None
}

/// Look up `group.key`, accepting both the nested-object shape
/// (`{"http":{"method":...}}`) and the flat dotted shape (`"http.method"`).
fn nested_value<'a>(
    group: Option<&'a serde_json::Map<String, Value>>,
    obj: &'a serde_json::Map<String, Value>,
    group_name: &str,
    key: &str,
) -> Option<&'a Value> {
    group
        .and_then(|g| g.get(key))
        .or_else(|| obj.get(&format!("{}.{}", group_name, key)))
}

fn nested_string(
    group: Option<&serde_json::Map<String, Value>>,
    obj: &serde_json::Map<String, Value>,
    group_name: &str,
    key: &str,
) -> Option<String> {
    nested_value(group, obj, group_name, key).and_then(value_to_string)
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_status_code(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
