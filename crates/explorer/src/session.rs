//! The consumer-facing facade: shared state, the event loop that applies
//! parser output, and the read/mutate API the presentation layer uses.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::RwLock;
use tracing::error;

use crate::config::ExplorerConfig;
use crate::filter::{apply_filter, summarize, FilterUpdate, LogFilter, LogSummary, SortDirection};
use crate::job::{JobEvent, JobId, JobProgress, ParseClient};
use crate::model::{LoadedFile, ParsedLogRecord};
use crate::store::LogStore;

/// View-side state cleared by [`ExplorerState::clear_all`] alongside the
/// store: active filter, sort direction, selection.
#[derive(Debug, Default)]
struct ViewState {
    filter: LogFilter,
    sort: SortDirection,
    selected: Option<String>,
}

/// Shared application state.
///
/// Parse jobs run on their own tasks and communicate exclusively through the
/// event channel; the single event-loop task applies chunk/progress/complete
/// events one at a time in arrival order, so store mutation is serialized.
/// Derived views (filtered records, summary) are recomputed on read and are
/// always consistent with the latest applied mutation.
pub struct ExplorerState {
    store: RwLock<LogStore>,
    view: RwLock<ViewState>,
    /// Most recent worker-level fault, for operator diagnosis.
    last_error: RwLock<Option<String>>,
    client: ParseClient,
}

pub type SharedExplorer = Arc<ExplorerState>;

impl ExplorerState {
    /// Build the shared state and spawn its event loop.
    pub fn start(config: ExplorerConfig) -> SharedExplorer {
        let (client, rx) = ParseClient::new(config.chunk_size);
        let state = Arc::new(Self {
            store: RwLock::new(LogStore::new()),
            view: RwLock::new(ViewState::default()),
            last_error: RwLock::new(None),
            client,
        });
        tokio::spawn(Self::event_loop(Arc::clone(&state), rx));
        state
    }

    async fn event_loop(state: SharedExplorer, mut rx: UnboundedReceiver<JobEvent>) {
        while let Some(event) = rx.recv().await {
            state.apply_event(event).await;
        }
    }

    async fn apply_event(&self, event: JobEvent) {
        // Events for cancelled (or otherwise unknown) jobs are dropped here;
        // this is the delivery guarantee behind cancel-by-id.
        let job = event.job();
        if !self.client.is_active(job) {
            return;
        }

        match event {
            JobEvent::Progress {
                total_lines,
                processed_lines,
                percent,
                ..
            } => {
                self.client
                    .record_progress(job, processed_lines, total_lines, percent);
            }
            JobEvent::Chunk {
                records,
                parse_errors,
                ..
            } => {
                self.store.write().await.apply_chunk(records, parse_errors);
            }
            JobEvent::Complete {
                total_records,
                total_parse_errors,
                ..
            } => {
                if let Some(entry) = self.client.entry(job) {
                    self.store.write().await.register_file(
                        entry.file_name.clone(),
                        entry.byte_size(),
                        total_records,
                        total_parse_errors,
                    );
                }
                self.client.finish(job);
            }
            JobEvent::Error { error, .. } => {
                error!("{} failed: {}", job, error);
                *self.last_error.write().await = Some(error);
                self.client.finish(job);
            }
        }
    }

    // ── Mutators ────────────────────────────────────────────────

    /// Parse a file from disk. Read failures surface through
    /// [`ExplorerState::last_error`]; already-ingested records stay visible.
    pub fn load_path(&self, path: impl Into<PathBuf>) -> JobId {
        self.client.submit_path(path.into())
    }

    /// Parse already-acquired text. Callers supply the display name; the
    /// byte size is derived from the content. How the text was obtained
    /// (disk, drag-drop, paste) is irrelevant here.
    pub fn load_text(&self, file_name: &str, content: String) -> JobId {
        self.client.submit_text(file_name, content)
    }

    /// [`ExplorerState::load_text`] with a per-job chunk size override.
    pub fn load_text_chunked(
        &self,
        file_name: &str,
        content: String,
        chunk_size: usize,
    ) -> JobId {
        self.client
            .submit_text_chunked(file_name, content, Some(chunk_size))
    }

    /// Best-effort cooperative cancellation; no further events for this job
    /// reach the store.
    pub fn cancel(&self, job: JobId) {
        self.client.cancel(job);
    }

    pub async fn update_filter(&self, update: FilterUpdate) {
        update.apply_to(&mut self.view.write().await.filter);
    }

    pub async fn reset_filter(&self) {
        self.view.write().await.filter = LogFilter::default();
    }

    pub async fn toggle_sort_direction(&self) -> SortDirection {
        let mut view = self.view.write().await;
        view.sort = view.sort.toggled();
        view.sort
    }

    pub async fn select(&self, record_id: Option<String>) {
        self.view.write().await.selected = record_id;
    }

    /// Remove one file's records and metadata.
    pub async fn remove_file(&self, name: &str) {
        self.store.write().await.remove_file(name);
    }

    /// Cancel outstanding jobs and clear records, metadata, filters,
    /// selection, and error counters.
    pub async fn clear_all(&self) {
        for progress in self.client.progress() {
            self.client.cancel(progress.job);
        }
        self.store.write().await.clear();
        *self.view.write().await = ViewState::default();
        *self.last_error.write().await = None;
    }

    // ── Readers ─────────────────────────────────────────────────

    /// The full record set, ascending by timestamp.
    pub async fn records(&self) -> Vec<Arc<ParsedLogRecord>> {
        self.store.read().await.records().to_vec()
    }

    /// The currently-visible subset under the active filter and sort
    /// direction.
    pub async fn filtered_records(&self) -> Vec<Arc<ParsedLogRecord>> {
        let store = self.store.read().await;
        let view = self.view.read().await;
        apply_filter(store.records(), &view.filter, view.sort)
    }

    pub async fn summary(&self) -> LogSummary {
        let store = self.store.read().await;
        let view = self.view.read().await;
        let filtered = store
            .records()
            .iter()
            .filter(|record| view.filter.matches(record))
            .count() as u64;
        summarize(
            store.records(),
            filtered,
            store.file_count(),
            store.total_parse_errors(),
        )
    }

    pub async fn files(&self) -> Vec<LoadedFile> {
        self.store.read().await.files()
    }

    pub async fn filter(&self) -> LogFilter {
        self.view.read().await.filter.clone()
    }

    pub async fn sort_direction(&self) -> SortDirection {
        self.view.read().await.sort
    }

    pub async fn selected(&self) -> Option<String> {
        self.view.read().await.selected.clone()
    }

    pub fn progress(&self) -> Vec<JobProgress> {
        self.client.progress()
    }

    /// True while any job is outstanding; clears only at zero.
    pub fn is_loading(&self) -> bool {
        self.client.outstanding() > 0
    }

    /// Resolve once every outstanding job has completed, failed, or been
    /// cancelled.
    pub async fn wait_idle(&self) {
        self.client.wait_idle().await;
    }

    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }
}
