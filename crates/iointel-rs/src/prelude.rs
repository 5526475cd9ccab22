//! Convenience re-exports for common `iointel-rs` types.
//!
//! Meant to be glob-imported by callers:
//!
//! ```ignore
//! use iointel_rs::prelude::*;
//! ```
//!
//! This pulls in the client, the message/request/response types, the error
//! taxonomy, the retry policy, and the streaming chunk helpers. Specialized
//! items (the standalone decoder, classification functions) live in
//! [`crate::api`] — import those directly when needed.

pub use crate::api::error::{ApiError, ErrorKind};
pub use crate::api::retry::RetryPolicy;
pub use crate::api::streaming::{StreamChunk, collect_text};
pub use crate::{ChatCompletion, ChatRequest, IoClient, Message, MessageRole, UsageInfo};
