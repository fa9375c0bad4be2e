/// Format detection and the chunked streaming parser.
///
/// - `detect.rs`: JSONL vs pretty-printed framing, top-level block splitting
/// - `worker.rs`: the per-job parse loop (batching, progress, cancellation)
pub mod detect;
pub mod worker;

pub use detect::{detect_format, InputFormat};
pub use worker::run_parse_job;

// Constants
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// Cancellation is polled every N input lines, not per line, to bound
/// polling overhead on the JSONL path.
pub const CANCEL_POLL_LINES: usize = 100;
