//! Rust client for the [io Intelligence](https://io.net/) chat completions API.
//!
//! `iointel-rs` wraps the OpenAI-compatible chat completions endpoint with the
//! three things every production caller ends up needing:
//!
//! - **Typed errors.** Every failure is an [`ApiError`](api::error::ApiError)
//!   with a closed [`ErrorKind`](api::error::ErrorKind) — callers switch on
//!   the kind, not on message text.
//! - **Automatic retry.** Transient failures (429, 5xx, timeouts, connection
//!   resets) are retried with exponential backoff and a separate cooldown
//!   floor for rate limits. See [`api::retry`].
//! - **SSE streaming.** Incremental content deltas decoded from the
//!   server-sent-event wire format, usable live or standalone. See
//!   [`api::streaming`].
//!
//! # Getting started
//!
//! ```ignore
//! use iointel_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ApiError> {
//!     let api_key = std::env::var("IO_API_KEY").unwrap();
//!     let api_url = std::env::var("IO_API_URL").unwrap();
//!     let client = IoClient::new(api_key, api_url)?;
//!
//!     let req = ChatRequest {
//!         model: Some("meta-llama/Llama-3.3-70B-Instruct".into()),
//!         messages: vec![
//!             Message::system("You are a helpful assistant."),
//!             Message::user("Say hello."),
//!         ],
//!         max_tokens: 256,
//!         temperature: 0.7,
//!         ..Default::default()
//!     };
//!
//!     let completion = client.chat(&req).await?;
//!     println!("{}", completion.content);
//!     Ok(())
//! }
//! ```
//!
//! Streaming works the same way, delivering deltas as they arrive:
//!
//! ```ignore
//! let chunks = client
//!     .chat_stream_live(&req, |chunk| print!("{}", chunk.content))
//!     .await?;
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`api::error`] | [`ApiError`](api::error::ApiError), [`ErrorKind`](api::error::ErrorKind), HTTP status classification |
//! | [`api::retry`] | [`RetryPolicy`](api::retry::RetryPolicy), backoff math, the [`with_retry`](api::retry::with_retry) combinator |
//! | [`api::streaming`] | SSE decoding, [`StreamChunk`](api::streaming::StreamChunk), text accumulation |
//! | [`api::models`] | Model discovery (`/models` endpoint) |
//!
//! Configuration is explicit: the client is constructed with its key, URL,
//! timeout, and retry policy. Environment variables (`IO_API_KEY`,
//! `IO_API_URL`) are read only by the `iointel` CLI binary, never by the
//! library.

pub mod api;
pub mod prelude;

use crate::api::error::{ApiError, ErrorKind, classify_status, classify_transport};
use crate::api::retry::{RetryPolicy, with_retry};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// ── Constants ──────────────────────────────────────────────────────

/// Default model for chat completion calls.
pub const DEFAULT_MODEL: &str = "meta-llama/Llama-3.3-70B-Instruct";

/// Default per-attempt request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body. Unused optional fields are omitted from
/// serialization.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    pub messages: Vec<Message>,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,

    /// Request incremental (SSE) delivery. The streaming calls set this
    /// themselves; leave unset for one-shot requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

// ── Response types ─────────────────────────────────────────────────

/// Raw API response (internal deserialization target). Covers both the
/// chat shape (`choices[0].message.content`) and the completion shape
/// (`choices[0].text`).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    id: Option<String>,
    created: Option<u64>,
    model: Option<String>,
    choices: Option<Vec<RawChoice>>,
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: Option<RawResponseMessage>,
    text: Option<String>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

/// Clean return type from [`IoClient::chat`].
#[derive(Debug)]
pub struct ChatCompletion {
    /// Generated text, from `message.content` or `text` depending on the
    /// response shape.
    pub content: String,
    pub finish_reason: Option<String>,
    pub usage: Option<UsageInfo>,
    /// Model name as reported by the server.
    pub model: Option<String>,
    pub response_id: Option<String>,
    pub created: Option<u64>,
}

/// Token usage statistics. Servers may omit any subset of the fields;
/// absent counters stay `None` rather than defaulting to zero.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Extract a [`ChatCompletion`] from a success response body.
///
/// A body with no `choices`, an empty `choices` array, or a first choice
/// carrying neither `message.content` nor `text` is an `InvalidResponse` —
/// a protocol mismatch, never retried.
fn parse_completion(value: serde_json::Value) -> Result<ChatCompletion, ApiError> {
    let raw: RawChatResponse = serde_json::from_value(value)
        .map_err(|e| ApiError::invalid_response(format!("Unexpected response shape: {e}")))?;

    let Some(choice) = raw.choices.and_then(|c| c.into_iter().next()) else {
        return Err(ApiError::invalid_response("No choices in API response"));
    };

    // Chat format first, completion format as fallback.
    let content = match (choice.message, choice.text) {
        (
            Some(RawResponseMessage {
                content: Some(content),
            }),
            _,
        ) => content,
        (_, Some(text)) => text,
        _ => {
            return Err(ApiError::invalid_response(
                "Unsupported response schema - expected 'message.content' or 'text' in choices",
            ));
        }
    };

    Ok(ChatCompletion {
        content,
        finish_reason: choice.finish_reason,
        usage: raw.usage,
        model: raw.model,
        response_id: raw.id,
        created: raw.created,
    })
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the io Intelligence chat completions API.
///
/// One `reqwest::Client` (and so one connection pool) is owned per
/// `IoClient` and reused across retry attempts within a call. The client
/// is cheap to share behind a reference across tasks; there is no
/// coalescing of identical in-flight requests.
pub struct IoClient {
    pub(crate) client: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) api_url: String,
    pub(crate) timeout: Duration,
    pub(crate) policy: RetryPolicy,
}

impl IoClient {
    /// Create a client with the default timeout and retry policy.
    pub fn new(api_key: impl Into<String>, api_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_config(api_key, api_url, DEFAULT_TIMEOUT, RetryPolicy::default())
    }

    /// Create a client with an explicit timeout and retry policy.
    ///
    /// The timeout applies per attempt, not across the whole retry loop.
    pub fn with_config(
        api_key: impl Into<String>,
        api_url: impl Into<String>,
        timeout: Duration,
        policy: RetryPolicy,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("iointel-rs/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ApiError::new(
                    ErrorKind::Unclassified,
                    format!("failed to build HTTP client: {e}"),
                )
            })?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            api_url: api_url.into(),
            timeout,
            policy,
        })
    }

    /// POST a request body and return the raw JSON response, retrying
    /// transient failures per the client's [`RetryPolicy`].
    ///
    /// Transport failures before a response classify as `Timeout` or
    /// `ConnectionFailed`; non-success statuses go through
    /// [`classify_status`]; a success status whose body is not valid JSON
    /// is a terminal `InvalidResponse`. When retries are exhausted the
    /// *last* observed error is returned, not a generic wrapper.
    pub async fn execute<T>(&self, body: &T) -> Result<serde_json::Value, ApiError>
    where
        T: Serialize + ?Sized,
    {
        with_retry(&self.policy, || self.execute_once(body)).await
    }

    /// Single request attempt without retry.
    async fn execute_once<T>(&self, body: &T) -> Result<serde_json::Value, ApiError>
    where
        T: Serialize + ?Sized,
    {
        let start = Instant::now();

        let resp = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| classify_transport(&e, self.timeout))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| classify_transport(&e, self.timeout))?;

        debug!(
            "API response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &text));
        }

        serde_json::from_str(&text)
            .map_err(|e| ApiError::invalid_response(format!("Invalid JSON response: {e}")))
    }

    /// Send a chat completion request and extract the generated text.
    ///
    /// Supports both the chat response shape (`choices[0].message.content`)
    /// and the completion shape (`choices[0].text`) without configuration.
    pub async fn chat(&self, req: &ChatRequest) -> Result<ChatCompletion, ApiError> {
        debug!(
            "API request: model={}, messages={}, max_tokens={}, temp={}",
            req.model.as_deref().unwrap_or("(none)"),
            req.messages.len(),
            req.max_tokens,
            req.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(req).map_or(0, |s| s.len())
        );

        let value = self.execute(req).await?;
        let completion = parse_completion(value)?;

        if let Some(ref usage) = completion.usage {
            debug!(
                "Token usage: prompt={:?}, completion={:?}, total={:?}",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens,
            );
        }

        Ok(completion)
    }
}
