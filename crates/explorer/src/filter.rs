//! Filter and summary engine: computes the visible subset of the record set
//! and rollup statistics.
//!
//! Filtering is a left-to-right narrowing pipeline ordered cheapest-first;
//! the free-text search runs last. Empty collections and empty strings mean
//! "no restriction", never "match nothing".

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::codec::status_category;
use crate::model::{ParsedLogRecord, Severity, StatusCategory};

/// Direction of the timestamp sort applied to the filtered view. The
/// underlying store always stays ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

/// Active filter criteria.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFilter {
    pub severities: HashSet<Severity>,
    pub search: String,
    pub time_start: Option<DateTime<Utc>>,
    pub time_end: Option<DateTime<Utc>>,
    pub services: HashSet<String>,
    pub status_categories: HashSet<StatusCategory>,
    pub methods: HashSet<String>,
    pub path_contains: String,
    pub trace_id: String,
}

impl LogFilter {
    pub fn is_unrestricted(&self) -> bool {
        *self == LogFilter::default()
    }

    /// Whether one record passes every active criterion.
    pub fn matches(&self, record: &ParsedLogRecord) -> bool {
        if !self.severities.is_empty() && !self.severities.contains(&record.severity) {
            return false;
        }

        if let Some(start) = self.time_start {
            if record.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.time_end {
            if record.timestamp > end {
                return false;
            }
        }

        if !self.services.is_empty() {
            match &record.service_name {
                Some(service) if self.services.contains(service) => {}
                _ => return false,
            }
        }

        if !self.status_categories.is_empty() {
            let status = record.fields.as_ref().and_then(|f| f.http_status);
            match status_category(status) {
                Some(category) if self.status_categories.contains(&category) => {}
                _ => return false,
            }
        }

        if !self.methods.is_empty() {
            let method = record.fields.as_ref().and_then(|f| f.http_method.as_deref());
            match method {
                Some(m) if self.methods.iter().any(|want| want.eq_ignore_ascii_case(m)) => {}
                _ => return false,
            }
        }

        if !self.path_contains.is_empty() {
            let needle = self.path_contains.to_lowercase();
            let path = record.fields.as_ref().and_then(|f| f.http_path.as_deref());
            match path {
                Some(p) if p.to_lowercase().contains(&needle) => {}
                _ => return false,
            }
        }

        if !self.trace_id.is_empty() {
            let hit = record.trace_id.as_deref() == Some(self.trace_id.as_str())
                || record.envelope_trace_id.as_deref() == Some(self.trace_id.as_str());
            if !hit {
                return false;
            }
        }

        // Free-text search last: it scans the most fields.
        if !self.search.is_empty() {
            let needle = self.search.to_lowercase();
            if !self.search_haystacks(record).any(|hay| hay.to_lowercase().contains(&needle)) {
                return false;
            }
        }

        true
    }

    fn search_haystacks<'a>(
        &self,
        record: &'a ParsedLogRecord,
    ) -> impl Iterator<Item = &'a str> {
        let fields = record.fields.as_ref();
        std::iter::once(record.message.as_str())
            .chain(fields.and_then(|f| f.http_path.as_deref()))
            .chain(fields.and_then(|f| f.user_id.as_deref()))
            .chain(record.trace_id.as_deref())
            .chain(record.service_name.as_deref())
            .chain(fields.map(|f| f.tags.iter().map(String::as_str)).into_iter().flatten())
    }
}

/// Partial filter update; `None` fields leave the current value untouched.
#[derive(Debug, Clone, Default)]
pub struct FilterUpdate {
    pub severities: Option<HashSet<Severity>>,
    pub search: Option<String>,
    pub time_start: Option<Option<DateTime<Utc>>>,
    pub time_end: Option<Option<DateTime<Utc>>>,
    pub services: Option<HashSet<String>>,
    pub status_categories: Option<HashSet<StatusCategory>>,
    pub methods: Option<HashSet<String>>,
    pub path_contains: Option<String>,
    pub trace_id: Option<String>,
}

impl FilterUpdate {
    pub fn apply_to(self, filter: &mut LogFilter) {
        if let Some(v) = self.severities {
            filter.severities = v;
        }
        if let Some(v) = self.search {
            filter.search = v;
        }
        if let Some(v) = self.time_start {
            filter.time_start = v;
        }
        if let Some(v) = self.time_end {
            filter.time_end = v;
        }
        if let Some(v) = self.services {
            filter.services = v;
        }
        if let Some(v) = self.status_categories {
            filter.status_categories = v;
        }
        if let Some(v) = self.methods {
            filter.methods = v;
        }
        if let Some(v) = self.path_contains {
            filter.path_contains = v;
        }
        if let Some(v) = self.trace_id {
            filter.trace_id = v;
        }
    }
}

/// Apply the filter to the (ascending) record set, then the sort direction.
pub fn apply_filter(
    records: &[Arc<ParsedLogRecord>],
    filter: &LogFilter,
    direction: SortDirection,
) -> Vec<Arc<ParsedLogRecord>> {
    let mut out: Vec<Arc<ParsedLogRecord>> = records
        .iter()
        .filter(|record| filter.matches(record))
        .cloned()
        .collect();
    if direction == SortDirection::Descending {
        out.reverse();
    }
    out
}

/// Rollup statistics over the unfiltered record set, with the filtered
/// count reported alongside.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogSummary {
    pub total_records: u64,
    pub filtered_records: u64,
    /// All six levels always present, zero-filled.
    pub severity_counts: BTreeMap<Severity, u64>,
    pub service_counts: BTreeMap<String, u64>,
    /// All four categories always present, zero-filled.
    pub status_counts: BTreeMap<StatusCategory, u64>,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
    pub file_count: u64,
    pub total_parse_errors: u64,
}

pub fn summarize(
    records: &[Arc<ParsedLogRecord>],
    filtered_records: u64,
    file_count: usize,
    total_parse_errors: u64,
) -> LogSummary {
    let mut severity_counts: BTreeMap<Severity, u64> =
        Severity::ALL.iter().map(|s| (*s, 0)).collect();
    let mut status_counts: BTreeMap<StatusCategory, u64> =
        StatusCategory::ALL.iter().map(|c| (*c, 0)).collect();
    let mut service_counts: BTreeMap<String, u64> = BTreeMap::new();

    for record in records {
        *severity_counts.entry(record.severity).or_insert(0) += 1;
        if let Some(service) = &record.service_name {
            *service_counts.entry(service.clone()).or_insert(0) += 1;
        }
        let status = record.fields.as_ref().and_then(|f| f.http_status);
        if let Some(category) = status_category(status) {
            *status_counts.entry(category).or_insert(0) += 1;
        }
    }

    LogSummary {
        total_records: records.len() as u64,
        filtered_records,
        severity_counts,
        service_counts,
        status_counts,
        earliest: records.iter().map(|r| r.timestamp).min(),
        latest: records.iter().map(|r| r.timestamp).max(),
        file_count: file_count as u64,
        total_parse_errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BodyFields;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn record(id: &str, severity: Severity, secs: i64) -> ParsedLogRecord {
        ParsedLogRecord {
            id: id.to_string(),
            timestamp: ts(secs),
            time_unix_nano: String::new(),
            severity,
            body: String::new(),
            message: format!("message {}", id),
            fields: None,
            trace_id: None,
            span_id: None,
            envelope_trace_id: None,
            envelope_span_id: None,
            service_name: Some("api".to_string()),
            resource_attributes: BTreeMap::new(),
            scope_name: None,
            scope_version: None,
            attributes: BTreeMap::new(),
            source_file: "test.json".to_string(),
            line_number: 1,
        }
    }

    fn with_http(mut r: ParsedLogRecord, method: &str, path: &str, status: i64) -> ParsedLogRecord {
        r.fields = Some(BodyFields {
            http_method: Some(method.to_string()),
            http_path: Some(path.to_string()),
            http_status: Some(status),
            ..BodyFields::default()
        });
        r
    }

    fn arcs(records: Vec<ParsedLogRecord>) -> Vec<Arc<ParsedLogRecord>> {
        records.into_iter().map(Arc::new).collect()
    }

    // ─────────────────────────────────────────────────────────
    // Individual criteria
    // ─────────────────────────────────────────────────────────

    #[test]
    fn default_filter_matches_everything() {
        let filter = LogFilter::default();
        assert!(filter.is_unrestricted());
        assert!(filter.matches(&record("a", Severity::Trace, 0)));
    }

    #[test]
    fn severity_set_membership() {
        let filter = LogFilter {
            severities: [Severity::Error, Severity::Fatal].into_iter().collect(),
            ..LogFilter::default()
        };
        assert!(filter.matches(&record("a", Severity::Error, 0)));
        assert!(!filter.matches(&record("b", Severity::Info, 0)));
    }

    #[test]
    fn time_range_bounds_are_inclusive_and_optional() {
        let filter = LogFilter {
            time_start: Some(ts(100)),
            time_end: Some(ts(200)),
            ..LogFilter::default()
        };
        assert!(!filter.matches(&record("a", Severity::Info, 99)));
        assert!(filter.matches(&record("b", Severity::Info, 100)));
        assert!(filter.matches(&record("c", Severity::Info, 200)));
        assert!(!filter.matches(&record("d", Severity::Info, 201)));

        let open_end = LogFilter {
            time_start: Some(ts(100)),
            ..LogFilter::default()
        };
        assert!(open_end.matches(&record("e", Severity::Info, 5000)));
    }

    #[test]
    fn service_allow_list() {
        let filter = LogFilter {
            services: ["api".to_string()].into_iter().collect(),
            ..LogFilter::default()
        };
        assert!(filter.matches(&record("a", Severity::Info, 0)));

        let mut other = record("b", Severity::Info, 0);
        other.service_name = Some("worker".to_string());
        assert!(!filter.matches(&other));

        let mut unnamed = record("c", Severity::Info, 0);
        unnamed.service_name = None;
        assert!(!filter.matches(&unnamed));
    }

    #[test]
    fn status_category_allow_list() {
        let filter = LogFilter {
            status_categories: [StatusCategory::ServerError].into_iter().collect(),
            ..LogFilter::default()
        };
        assert!(filter.matches(&with_http(record("a", Severity::Info, 0), "GET", "/", 502)));
        assert!(!filter.matches(&with_http(record("b", Severity::Info, 0), "GET", "/", 200)));
        // Records without HTTP context fail a status restriction.
        assert!(!filter.matches(&record("c", Severity::Info, 0)));
    }

    #[test]
    fn method_match_is_case_insensitive() {
        let filter = LogFilter {
            methods: ["get".to_string()].into_iter().collect(),
            ..LogFilter::default()
        };
        assert!(filter.matches(&with_http(record("a", Severity::Info, 0), "GET", "/", 200)));
        assert!(!filter.matches(&with_http(record("b", Severity::Info, 0), "POST", "/", 200)));
    }

    #[test]
    fn path_substring_is_case_insensitive() {
        let filter = LogFilter {
            path_contains: "/API/users".to_string(),
            ..LogFilter::default()
        };
        assert!(filter.matches(&with_http(record("a", Severity::Info, 0), "GET", "/api/users/7", 200)));
        assert!(!filter.matches(&with_http(record("b", Severity::Info, 0), "GET", "/health", 200)));
    }

    #[test]
    fn trace_id_matches_either_source() {
        let filter = LogFilter {
            trace_id: "abc".to_string(),
            ..LogFilter::default()
        };
        let mut body_id = record("a", Severity::Info, 0);
        body_id.trace_id = Some("abc".to_string());
        assert!(filter.matches(&body_id));

        let mut envelope_id = record("b", Severity::Info, 0);
        envelope_id.envelope_trace_id = Some("abc".to_string());
        assert!(filter.matches(&envelope_id));

        assert!(!filter.matches(&record("c", Severity::Info, 0)));
    }

    #[test]
    fn free_text_searches_expected_fields() {
        let mut r = with_http(record("a", Severity::Info, 0), "GET", "/checkout", 200);
        if let Some(fields) = &mut r.fields {
            fields.user_id = Some("user-77".to_string());
            fields.tags = vec!["payments".to_string()];
        }
        r.trace_id = Some("deadbeef".to_string());

        for needle in ["MESSAGE a", "checkout", "USER-77", "deadbeef", "payments", "api"] {
            let filter = LogFilter {
                search: needle.to_string(),
                ..LogFilter::default()
            };
            assert!(filter.matches(&r), "needle {:?}", needle);
        }

        let miss = LogFilter {
            search: "absent".to_string(),
            ..LogFilter::default()
        };
        assert!(!miss.matches(&r));
    }

    // ─────────────────────────────────────────────────────────
    // Pipeline properties
    // ─────────────────────────────────────────────────────────

    #[test]
    fn sequential_filters_equal_conjunction() {
        let records = arcs(vec![
            with_http(record("a", Severity::Error, 10), "GET", "/api", 500),
            with_http(record("b", Severity::Error, 20), "POST", "/api", 200),
            with_http(record("c", Severity::Info, 30), "GET", "/api", 500),
            record("d", Severity::Error, 40),
        ]);

        let f1 = LogFilter {
            severities: [Severity::Error].into_iter().collect(),
            ..LogFilter::default()
        };
        let f2 = LogFilter {
            status_categories: [StatusCategory::ServerError].into_iter().collect(),
            ..LogFilter::default()
        };
        let conjunction = LogFilter {
            severities: [Severity::Error].into_iter().collect(),
            status_categories: [StatusCategory::ServerError].into_iter().collect(),
            ..LogFilter::default()
        };

        let narrowed = apply_filter(
            &apply_filter(&records, &f1, SortDirection::Ascending),
            &f2,
            SortDirection::Ascending,
        );
        let single_pass = apply_filter(&records, &conjunction, SortDirection::Ascending);

        let ids = |rs: &[Arc<ParsedLogRecord>]| rs.iter().map(|r| r.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&narrowed), ids(&single_pass));
        assert_eq!(ids(&single_pass), vec!["a"]);
    }

    #[test]
    fn sort_direction_applies_to_view_only() {
        let records = arcs(vec![
            record("a", Severity::Info, 10),
            record("b", Severity::Info, 20),
        ]);
        let descending = apply_filter(&records, &LogFilter::default(), SortDirection::Descending);
        assert_eq!(descending[0].id, "b");
        // Input order untouched.
        assert_eq!(records[0].id, "a");
    }

    #[test]
    fn update_applies_only_set_fields() {
        let mut filter = LogFilter {
            search: "keep me".to_string(),
            ..LogFilter::default()
        };
        FilterUpdate {
            severities: Some([Severity::Warn].into_iter().collect()),
            time_end: Some(Some(ts(99))),
            ..FilterUpdate::default()
        }
        .apply_to(&mut filter);

        assert_eq!(filter.search, "keep me");
        assert!(filter.severities.contains(&Severity::Warn));
        assert_eq!(filter.time_end, Some(ts(99)));

        // An explicit None clears a bound.
        FilterUpdate {
            time_end: Some(None),
            ..FilterUpdate::default()
        }
        .apply_to(&mut filter);
        assert_eq!(filter.time_end, None);
    }

    // ─────────────────────────────────────────────────────────
    // Summary
    // ─────────────────────────────────────────────────────────

    #[test]
    fn summary_counts_are_zero_filled() {
        let summary = summarize(&[], 0, 0, 0);
        assert_eq!(summary.severity_counts.len(), 6);
        assert!(summary.severity_counts.values().all(|c| *c == 0));
        assert_eq!(summary.status_counts.len(), 4);
        assert!(summary.status_counts.values().all(|c| *c == 0));
        assert_eq!(summary.earliest, None);
        assert_eq!(summary.latest, None);
    }

    #[test]
    fn summary_aggregates_over_unfiltered_set() {
        let records = arcs(vec![
            with_http(record("a", Severity::Error, 10), "GET", "/", 500),
            with_http(record("b", Severity::Error, 30), "GET", "/", 200),
            record("c", Severity::Info, 20),
        ]);
        let summary = summarize(&records, 1, 2, 7);

        assert_eq!(summary.total_records, 3);
        assert_eq!(summary.filtered_records, 1);
        assert_eq!(summary.severity_counts[&Severity::Error], 2);
        assert_eq!(summary.severity_counts[&Severity::Info], 1);
        assert_eq!(summary.severity_counts[&Severity::Trace], 0);
        assert_eq!(summary.service_counts["api"], 3);
        assert_eq!(summary.status_counts[&StatusCategory::ServerError], 1);
        assert_eq!(summary.status_counts[&StatusCategory::Success], 1);
        assert_eq!(summary.earliest, Some(ts(10)));
        assert_eq!(summary.latest, Some(ts(30)));
        assert_eq!(summary.file_count, 2);
        assert_eq!(summary.total_parse_errors, 7);
    }
}
