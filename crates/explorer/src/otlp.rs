//! Serde model of the OTLP JSON logs export envelope.
//!
//! Every field defaults when missing so that best-effort extraction never
//! fails on a sparse exporter payload. Field names follow the OTLP JSON
//! encoding (camelCase).

use serde::Deserialize;

/// One top-level export payload: `{ "resourceLogs": [...] }`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsEnvelope {
    #[serde(default)]
    pub resource_logs: Vec<ResourceLogs>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLogs {
    #[serde(default)]
    pub resource: Resource,
    #[serde(default)]
    pub scope_logs: Vec<ScopeLogs>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(default)]
    pub attributes: Vec<KeyValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeLogs {
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub log_records: Vec<LogRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// One exported log record.
///
/// `timeUnixNano` and `observedTimeUnixNano` are 64-bit values that the JSON
/// encoding carries as strings; some exporters emit plain numbers instead,
/// so both spellings are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    #[serde(default)]
    pub time_unix_nano: NumberOrString,
    #[serde(default)]
    pub observed_time_unix_nano: NumberOrString,
    #[serde(default)]
    pub severity_number: Option<i64>,
    #[serde(default)]
    pub severity_text: String,
    #[serde(default)]
    pub body: Option<AnyValue>,
    #[serde(default)]
    pub attributes: Vec<KeyValue>,
    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub span_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValue {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: Option<AnyValue>,
}

/// The OTLP typed value union.
///
/// At most one variant field is populated; [`crate::codec::extract_value`]
/// resolves them in a fixed precedence order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyValue {
    #[serde(default)]
    pub string_value: Option<String>,
    #[serde(default)]
    pub int_value: Option<NumberOrString>,
    #[serde(default)]
    pub double_value: Option<f64>,
    #[serde(default)]
    pub bool_value: Option<bool>,
    #[serde(default)]
    pub array_value: Option<ArrayValue>,
    #[serde(default)]
    pub kvlist_value: Option<KeyValueList>,
    /// Base64-encoded byte string.
    #[serde(default)]
    pub bytes_value: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayValue {
    #[serde(default)]
    pub values: Vec<AnyValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValueList {
    #[serde(default)]
    pub values: Vec<KeyValue>,
}

/// A 64-bit field that may arrive as a JSON string or a JSON number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    String(String),
    Number(serde_json::Number),
    Missing,
}

impl Default for NumberOrString {
    fn default() -> Self {
        NumberOrString::Missing
    }
}

impl NumberOrString {
    /// The raw decimal string as it appeared in the payload; empty if absent.
    pub fn raw(&self) -> String {
        match self {
            NumberOrString::String(s) => s.clone(),
            NumberOrString::Number(n) => n.to_string(),
            NumberOrString::Missing => String::new(),
        }
    }

    pub fn is_missing(&self) -> bool {
        match self {
            NumberOrString::String(s) => s.is_empty(),
            NumberOrString::Number(_) => false,
            NumberOrString::Missing => true,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NumberOrString::String(s) => s.parse().ok(),
            NumberOrString::Number(n) => n.as_i64(),
            NumberOrString::Missing => None,
        }
    }
}
