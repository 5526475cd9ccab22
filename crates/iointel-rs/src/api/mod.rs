//! API interaction layer: typed errors, retry with backoff, SSE streaming,
//! and model discovery.
//!
//! These modules handle everything between a caller-built request and the
//! io Intelligence API:
//!
//! - [`error`] — [`ApiError`]/[`ErrorKind`] taxonomy and the pure
//!   [`classify_status`] mapping from HTTP status to error kind. The
//!   classifier is the single source of truth for retryability.
//! - [`retry`] — [`RetryPolicy`] (exponential backoff, rate-limit floor)
//!   and the [`with_retry`](retry::with_retry) combinator the executor
//!   runs each attempt through.
//! - [`streaming`] — SSE decoder producing ordered
//!   [`StreamChunk`](streaming::StreamChunk) content deltas, plus the
//!   streaming client calls.
//! - [`models`] — model listing, lookup, and recommendations.

pub mod error;
pub mod models;
pub mod retry;
pub mod streaming;

// Re-export commonly used items at the module level.
pub use error::{ApiError, ErrorKind, classify_status};
pub use retry::RetryPolicy;
pub use streaming::{SseDecoder, StreamChunk, collect_text, decode_lines};
