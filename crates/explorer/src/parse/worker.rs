//! The per-job chunked parser: detection, streaming, batching, progress,
//! and cooperative cancellation.
//!
//! A job moves through detect -> (jsonl streaming | single-json parsing) ->
//! flush -> complete; observing the cancellation flag at any poll point ends
//! the job immediately with no further events of any kind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::flatten::flatten_envelope;
use crate::job::{JobEvent, JobId};
use crate::otlp::LogsEnvelope;
use crate::parse::detect::{detect_format, split_top_level_blocks, InputFormat};
use crate::parse::CANCEL_POLL_LINES;

/// Run one parse job to completion (or cancellation), emitting events on
/// `tx`. Synchronous; callers spawn it onto a task.
pub fn run_parse_job(
    job: JobId,
    file_name: &str,
    content: &str,
    chunk_size: usize,
    cancel: &AtomicBool,
    tx: &UnboundedSender<JobEvent>,
) {
    let started = Instant::now();
    if cancel.load(Ordering::Relaxed) {
        debug!("{} cancelled before start", job);
        return;
    }

    let mut emitter = ChunkEmitter::new(job, chunk_size, tx);
    let finished = match detect_format(content) {
        InputFormat::Jsonl => parse_jsonl(job, file_name, content, cancel, &mut emitter, tx),
        InputFormat::PrettyJson => parse_pretty(job, file_name, content, cancel, &mut emitter, tx),
    };
    if !finished {
        debug!("{} cancelled", job);
        return;
    }

    emitter.flush();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    debug!(
        "{} complete: {} records, {} errors in {}ms",
        job, emitter.total_records, emitter.total_errors, elapsed_ms
    );
    let _ = tx.send(JobEvent::Complete {
        job,
        total_records: emitter.total_records,
        total_parse_errors: emitter.total_errors,
        elapsed_ms,
    });
}

/// JSON-Lines streaming: one envelope per line, per-line failures counted
/// and skipped, cancellation polled every [`CANCEL_POLL_LINES`] lines.
/// Returns false if cancelled.
fn parse_jsonl(
    job: JobId,
    file_name: &str,
    content: &str,
    cancel: &AtomicBool,
    emitter: &mut ChunkEmitter<'_>,
    tx: &UnboundedSender<JobEvent>,
) -> bool {
    let total_lines = content.lines().count() as u64;
    let mut progress = ProgressTracker::new(job, total_lines);
    let mut processed = 0u64;

    for (idx, line) in content.lines().enumerate() {
        if idx % CANCEL_POLL_LINES == 0 && cancel.load(Ordering::Relaxed) {
            return false;
        }
        processed += 1;

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<LogsEnvelope>(trimmed) {
            Ok(envelope) => {
                let records = flatten_envelope(&envelope, file_name, (idx + 1) as u64);
                if emitter.push(records) > 0 {
                    progress.emit(processed, tx);
                }
            }
            Err(e) => {
                debug!("{} line {}: {}", job, idx + 1, e);
                emitter.record_error();
            }
        }
    }

    progress.emit(total_lines, tx);
    true
}

/// Single or concatenated pretty-printed JSON. Progress is coarse: 10% at
/// parse start, 50% once raw parsing is done, then proportional across
/// envelope flattening. Returns false if cancelled.
fn parse_pretty(
    job: JobId,
    file_name: &str,
    content: &str,
    cancel: &AtomicBool,
    emitter: &mut ChunkEmitter<'_>,
    tx: &UnboundedSender<JobEvent>,
) -> bool {
    let total_lines = content.lines().count() as u64;
    let mut progress = ProgressTracker::new(job, total_lines);
    progress.emit_percent(0, 10, tx);

    let envelopes = decode_pretty(content);
    progress.emit_percent(0, 50, tx);

    if envelopes.is_empty() {
        // Readable content with zero extractable envelopes is a failure
        // signal, distinct from empty-but-valid input.
        warn!("{}: no envelopes extracted from {}", job, file_name);
        emitter.record_error();
        return true;
    }

    let count = envelopes.len();
    for (i, envelope) in envelopes.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            return false;
        }
        emitter.push(flatten_envelope(envelope, file_name, (i + 1) as u64));
        let percent = 50 + (((i + 1) * 50) / count) as u8;
        progress.emit_percent((i + 1) as u64, percent, tx);
    }
    true
}

/// Direct whole-content parse (object or array of objects), falling back to
/// the unindented-brace block splitter; unparseable blocks drop silently.
fn decode_pretty(content: &str) -> Vec<LogsEnvelope> {
    let trimmed = content.trim();

    let direct: Vec<LogsEnvelope> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).unwrap_or_default()
    } else {
        serde_json::from_str::<LogsEnvelope>(trimmed)
            .map(|envelope| vec![envelope])
            .unwrap_or_default()
    };
    if !direct.is_empty() {
        return direct;
    }

    split_top_level_blocks(content)
        .iter()
        .filter_map(|block| serde_json::from_str(block).ok())
        .collect()
}

/// Accumulates records and per-batch error counts, emitting chunk events
/// that never exceed the configured size; the final partial batch is flushed
/// at job end.
struct ChunkEmitter<'a> {
    job: JobId,
    chunk_size: usize,
    tx: &'a UnboundedSender<JobEvent>,
    batch: Vec<crate::model::ParsedLogRecord>,
    pending_errors: u64,
    total_records: u64,
    total_errors: u64,
}

impl<'a> ChunkEmitter<'a> {
    fn new(job: JobId, chunk_size: usize, tx: &'a UnboundedSender<JobEvent>) -> Self {
        Self {
            job,
            chunk_size: chunk_size.max(1),
            tx,
            batch: Vec::new(),
            pending_errors: 0,
            total_records: 0,
            total_errors: 0,
        }
    }

    /// Append records, emitting full chunks as the threshold is crossed.
    /// Returns the number of chunks emitted by this call.
    fn push(&mut self, records: Vec<crate::model::ParsedLogRecord>) -> usize {
        self.batch.extend(records);
        let mut emitted = 0;
        while self.batch.len() >= self.chunk_size {
            let rest = self.batch.split_off(self.chunk_size);
            let full = std::mem::replace(&mut self.batch, rest);
            self.send(full);
            emitted += 1;
        }
        emitted
    }

    fn record_error(&mut self) {
        self.pending_errors += 1;
        self.total_errors += 1;
    }

    /// Emit the final partial batch, if any records or errors are pending.
    fn flush(&mut self) {
        if !self.batch.is_empty() || self.pending_errors > 0 {
            let batch = std::mem::take(&mut self.batch);
            self.send(batch);
        }
    }

    fn send(&mut self, records: Vec<crate::model::ParsedLogRecord>) {
        self.total_records += records.len() as u64;
        let parse_errors = std::mem::take(&mut self.pending_errors);
        let _ = self.tx.send(JobEvent::Chunk {
            job: self.job,
            records,
            parse_errors,
        });
    }
}

/// Keeps the reported percent monotonically non-decreasing within a job.
struct ProgressTracker {
    job: JobId,
    total_lines: u64,
    last_percent: u8,
}

impl ProgressTracker {
    fn new(job: JobId, total_lines: u64) -> Self {
        Self {
            job,
            total_lines,
            last_percent: 0,
        }
    }

    fn emit(&mut self, processed_lines: u64, tx: &UnboundedSender<JobEvent>) {
        let percent = if self.total_lines == 0 {
            100
        } else {
            ((processed_lines * 100) / self.total_lines) as u8
        };
        self.emit_percent(processed_lines, percent, tx);
    }

    fn emit_percent(&mut self, processed_lines: u64, percent: u8, tx: &UnboundedSender<JobEvent>) {
        let percent = percent.min(100).max(self.last_percent);
        self.last_percent = percent;
        let _ = tx.send(JobEvent::Progress {
            job: self.job,
            total_lines: self.total_lines,
            processed_lines,
            percent,
        });
    }
}
