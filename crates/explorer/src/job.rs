//! Parse job identity, the event protocol between parser and aggregator,
//! and the client that owns the in-flight job registry.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::model::ParsedLogRecord;
use crate::parse::run_parse_job;

/// Process-unique parse job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobId(u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[cfg(test)]
impl JobId {
    pub(crate) fn test(n: u64) -> Self {
        JobId(n)
    }
}

/// Events emitted by a parse job, each tagged with its job id.
///
/// A non-cancelled job ends with exactly one `Complete` (always last) or one
/// `Error`; a cancelled job simply stops emitting.
#[derive(Debug, Clone, Serialize)]
pub enum JobEvent {
    Progress {
        job: JobId,
        total_lines: u64,
        processed_lines: u64,
        /// 0..=100, monotonically non-decreasing within a job.
        percent: u8,
    },
    Chunk {
        job: JobId,
        records: Vec<ParsedLogRecord>,
        /// Parse errors attributed to this batch only.
        parse_errors: u64,
    },
    Complete {
        job: JobId,
        total_records: u64,
        total_parse_errors: u64,
        elapsed_ms: u64,
    },
    /// Worker-level fault (unreadable input); the job is abandoned and no
    /// completion follows.
    Error { job: JobId, error: String },
}

impl JobEvent {
    pub fn job(&self) -> JobId {
        match self {
            JobEvent::Progress { job, .. }
            | JobEvent::Chunk { job, .. }
            | JobEvent::Complete { job, .. }
            | JobEvent::Error { job, .. } => *job,
        }
    }
}

/// Snapshot of one in-flight job's progress.
#[derive(Debug, Clone, Serialize)]
pub struct JobProgress {
    pub job: JobId,
    pub file_name: String,
    pub processed_lines: u64,
    pub total_lines: u64,
    pub percent: u8,
}

/// Registry entry for one in-flight job: submission-time file metadata, the
/// cooperative cancellation flag, and the latest observed progress.
#[derive(Debug)]
pub struct JobEntry {
    pub file_name: String,
    byte_size: AtomicU64,
    cancel: Arc<AtomicBool>,
    processed_lines: AtomicU64,
    total_lines: AtomicU64,
    percent: AtomicU8,
}

impl JobEntry {
    fn new(file_name: String, byte_size: u64) -> Self {
        Self {
            file_name,
            byte_size: AtomicU64::new(byte_size),
            cancel: Arc::new(AtomicBool::new(false)),
            processed_lines: AtomicU64::new(0),
            total_lines: AtomicU64::new(0),
            percent: AtomicU8::new(0),
        }
    }

    pub fn byte_size(&self) -> u64 {
        self.byte_size.load(Ordering::Relaxed)
    }
}

/// Bridges callers and parse workers.
///
/// Owns job identity, the in-flight registry, and event routing. Workers are
/// sender-only producers on a shared unbounded channel; the single consumer
/// (the session event loop) receives via the receiver handed out at
/// construction. After [`ParseClient::cancel`] returns, no chunk, progress,
/// or complete event for that id passes [`ParseClient::is_active`], so late
/// in-flight messages are dropped at routing time.
#[derive(Debug)]
pub struct ParseClient {
    next_id: AtomicU64,
    jobs: DashMap<JobId, Arc<JobEntry>>,
    tx: UnboundedSender<JobEvent>,
    idle: Notify,
    chunk_size: usize,
}

impl ParseClient {
    pub fn new(chunk_size: usize) -> (Self, UnboundedReceiver<JobEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                next_id: AtomicU64::new(1),
                jobs: DashMap::new(),
                tx,
                idle: Notify::new(),
                chunk_size,
            },
            rx,
        )
    }

    /// Submit in-memory text for parsing with the default chunk size.
    pub fn submit_text(&self, file_name: &str, content: String) -> JobId {
        self.submit_text_chunked(file_name, content, None)
    }

    /// Submit in-memory text, optionally overriding the chunk size for this
    /// job only.
    pub fn submit_text_chunked(
        &self,
        file_name: &str,
        content: String,
        chunk_size: Option<usize>,
    ) -> JobId {
        let (job, entry) = self.register(file_name, content.len() as u64);
        let cancel = Arc::clone(&entry.cancel);
        let tx = self.tx.clone();
        let chunk_size = chunk_size.unwrap_or(self.chunk_size);
        let name = file_name.to_string();

        info!("submitting {} for {} ({} bytes)", job, name, content.len());
        tokio::spawn(async move {
            run_parse_job(job, &name, &content, chunk_size, &cancel, &tx);
        });
        job
    }

    /// Submit a file path; the worker reads it and an unreadable file
    /// surfaces as a worker-level `Error` event.
    pub fn submit_path(&self, path: PathBuf) -> JobId {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let (job, entry) = self.register(&file_name, 0);
        let cancel = Arc::clone(&entry.cancel);
        let tx = self.tx.clone();
        let chunk_size = self.chunk_size;

        info!("submitting {} for {}", job, path.display());
        tokio::spawn(async move {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    entry.byte_size.store(content.len() as u64, Ordering::Relaxed);
                    run_parse_job(job, &entry.file_name, &content, chunk_size, &cancel, &tx);
                }
                Err(e) => {
                    warn!("{}: failed to read {}: {}", job, path.display(), e);
                    let _ = tx.send(JobEvent::Error {
                        job,
                        error: format!("failed to read {}: {}", path.display(), e),
                    });
                }
            }
        });
        job
    }

    fn register(&self, file_name: &str, byte_size: u64) -> (JobId, Arc<JobEntry>) {
        let job = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = Arc::new(JobEntry::new(file_name.to_string(), byte_size));
        self.jobs.insert(job, Arc::clone(&entry));
        (job, entry)
    }

    /// Request cooperative cancellation. Best-effort: work already begun may
    /// finish internally, but no further events for this id are routable
    /// once this returns.
    pub fn cancel(&self, job: JobId) {
        if let Some((_, entry)) = self.jobs.remove(&job) {
            entry.cancel.store(true, Ordering::Relaxed);
            info!("cancelled {}", job);
            self.notify_if_idle();
        }
    }

    /// Whether events for this job should still be delivered.
    pub fn is_active(&self, job: JobId) -> bool {
        self.jobs.contains_key(&job)
    }

    pub fn entry(&self, job: JobId) -> Option<Arc<JobEntry>> {
        self.jobs.get(&job).map(|e| Arc::clone(e.value()))
    }

    /// Drop a finished job from the registry (after its terminal event has
    /// been applied).
    pub fn finish(&self, job: JobId) {
        self.jobs.remove(&job);
        self.notify_if_idle();
    }

    pub fn record_progress(&self, job: JobId, processed_lines: u64, total_lines: u64, percent: u8) {
        if let Some(entry) = self.jobs.get(&job) {
            entry.processed_lines.store(processed_lines, Ordering::Relaxed);
            entry.total_lines.store(total_lines, Ordering::Relaxed);
            entry.percent.store(percent, Ordering::Relaxed);
        }
    }

    pub fn progress(&self) -> Vec<JobProgress> {
        let mut out: Vec<JobProgress> = self
            .jobs
            .iter()
            .map(|e| JobProgress {
                job: *e.key(),
                file_name: e.value().file_name.clone(),
                processed_lines: e.value().processed_lines.load(Ordering::Relaxed),
                total_lines: e.value().total_lines.load(Ordering::Relaxed),
                percent: e.value().percent.load(Ordering::Relaxed),
            })
            .collect();
        out.sort_by_key(|p| p.job);
        out
    }

    /// Count of outstanding jobs; the consumer-facing loading flag is
    /// derived from this and clears only at zero.
    pub fn outstanding(&self) -> usize {
        self.jobs.len()
    }

    /// Resolve once no jobs are outstanding.
    pub async fn wait_idle(&self) {
        loop {
            // Register the waiter before the emptiness check so a job that
            // finishes in between cannot drop the wakeup.
            let mut notified = std::pin::pin!(self.idle.notified());
            notified.as_mut().enable();
            if self.jobs.is_empty() {
                return;
            }
            notified.await;
        }
    }

    fn notify_if_idle(&self) {
        if self.jobs.is_empty() {
            self.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jsonl_line() -> &'static str {
        r#"{"resourceLogs":[{"scopeLogs":[{"logRecords":[{"timeUnixNano":"1703001234567000000","severityNumber":9,"body":{"stringValue":"hi"}}]}]}]}"#
    }

    #[tokio::test]
    async fn ids_are_unique_and_ordered() {
        let (client, _rx) = ParseClient::new(500);
        let a = client.submit_text("a.json", jsonl_line().to_string());
        let b = client.submit_text("b.json", jsonl_line().to_string());
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[tokio::test]
    async fn events_flow_to_receiver() {
        let (client, mut rx) = ParseClient::new(500);
        let job = client.submit_text("a.json", jsonl_line().to_string());

        let mut saw_chunk = false;
        while let Some(event) = rx.recv().await {
            assert_eq!(event.job(), job);
            match event {
                JobEvent::Chunk { records, .. } => {
                    saw_chunk = true;
                    assert_eq!(records.len(), 1);
                }
                JobEvent::Complete { total_records, .. } => {
                    assert_eq!(total_records, 1);
                    break;
                }
                _ => {}
            }
        }
        assert!(saw_chunk);
    }

    #[tokio::test]
    async fn per_job_chunk_size_override() {
        let (client, mut rx) = ParseClient::new(500);
        let content = format!("{0}\n{0}\n{0}", jsonl_line());
        client.submit_text_chunked("a.json", content, Some(1));

        let mut chunk_count = 0;
        while let Some(event) = rx.recv().await {
            match event {
                JobEvent::Chunk { records, .. } => {
                    chunk_count += 1;
                    assert_eq!(records.len(), 1);
                }
                JobEvent::Complete { total_records, .. } => {
                    assert_eq!(total_records, 3);
                    break;
                }
                _ => {}
            }
        }
        assert_eq!(chunk_count, 3);
    }

    #[tokio::test]
    async fn cancel_before_start_suppresses_all_events() {
        let (client, mut rx) = ParseClient::new(500);
        // Many lines so the job cannot finish before the flag is observed.
        let content = format!("{}\n", jsonl_line()).repeat(500);
        let job = client.submit_text("a.json", content);
        client.cancel(job);
        assert!(!client.is_active(job));

        // Whatever raced the cancellation is dropped at routing time.
        while let Ok(event) = rx.try_recv() {
            assert!(
                !client.is_active(event.job()),
                "late event must not be routable"
            );
        }
        assert_eq!(client.outstanding(), 0);
    }

    #[tokio::test]
    async fn unreadable_path_reports_error_event() {
        let (client, mut rx) = ParseClient::new(500);
        let job = client.submit_path(PathBuf::from("/nonexistent/definitely-missing.json"));

        match rx.recv().await {
            Some(JobEvent::Error { job: id, error }) => {
                assert_eq!(id, job);
                assert!(error.contains("failed to read"));
            }
            other => panic!("expected error event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn wait_idle_resolves_after_finish() {
        let (client, mut rx) = ParseClient::new(500);
        let job = client.submit_text("a.json", jsonl_line().to_string());
        assert_eq!(client.outstanding(), 1);

        while let Some(event) = rx.recv().await {
            if let JobEvent::Complete { .. } = event {
                client.finish(job);
                break;
            }
        }
        client.wait_idle().await;
        assert_eq!(client.outstanding(), 0);
    }

    #[tokio::test]
    async fn progress_snapshot_reflects_recorded_values() {
        let (client, _rx) = ParseClient::new(500);
        let job = client.submit_text("a.json", String::new());
        client.record_progress(job, 5, 10, 50);

        let snapshot = client.progress();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].processed_lines, 5);
        assert_eq!(snapshot[0].total_lines, 10);
        assert_eq!(snapshot[0].percent, 50);
        assert_eq!(snapshot[0].file_name, "a.json");
    }
}
