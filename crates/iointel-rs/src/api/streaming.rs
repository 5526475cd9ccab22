//! Server-Sent Events (SSE) streaming for the chat completions API.
//!
//! The decoder turns a line-oriented event stream into an ordered, finite
//! sequence of [`StreamChunk`] content deltas. It is usable standalone via
//! [`decode_lines`] / [`SseDecoder`] by anything that owns a line source,
//! and wired to the live transport by [`IoClient::chat_stream`] and
//! [`IoClient::chat_stream_live`].
//!
//! Protocol: each data line is `data: {json}`; the literal payload `[DONE]`
//! terminates the stream; all other lines (keep-alives, comments) are
//! ignored. Malformed payloads are skipped rather than aborting the stream —
//! individual frame loss must not kill an otherwise-healthy generation.

use crate::api::error::{ApiError, ErrorKind, classify_status, classify_transport};
use crate::{ChatRequest, IoClient};
use serde::Deserialize;
use tracing::{debug, warn};

const DATA_PREFIX: &str = "data: ";

/// End-of-stream sentinel payload.
const DONE_SENTINEL: &str = "[DONE]";

/// One decoded increment of generated text.
///
/// `role` appears on the first chunk of a generation, `finish_reason` on
/// the terminal chunk. `model` and `id` are source metadata carried through
/// unmodified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    /// Content delta; may be empty.
    pub content: String,
    pub role: Option<String>,
    pub finish_reason: Option<String>,
    pub model: Option<String>,
    pub id: Option<String>,
}

/// Raw SSE data payload (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawStreamChunk {
    id: Option<String>,
    model: Option<String>,
    choices: Option<Vec<RawStreamChoice>>,
}

#[derive(Deserialize, Debug)]
struct RawStreamChoice {
    delta: Option<RawStreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawStreamDelta {
    content: Option<String>,
    role: Option<String>,
}

/// Decode a single SSE `data:` payload into a chunk.
///
/// Returns `None` for malformed JSON or frames without a usable first
/// choice — those are dropped silently since downstream consumers only
/// care about accumulated text.
pub fn decode_data(payload: &str) -> Option<StreamChunk> {
    let raw: RawStreamChunk = match serde_json::from_str(payload) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("skipping malformed SSE frame: {e}");
            return None;
        }
    };

    let choice = raw.choices.and_then(|c| c.into_iter().next())?;
    let delta = choice.delta.unwrap_or(RawStreamDelta {
        content: None,
        role: None,
    });

    Some(StreamChunk {
        content: delta.content.unwrap_or_default(),
        role: delta.role,
        finish_reason: choice.finish_reason,
        model: raw.model,
        id: raw.id,
    })
}

/// Lazily decode an ordered chunk sequence from a line source.
///
/// Finite and single-pass: iteration stops at the `[DONE]` sentinel (which
/// is not emitted) or at the end of the source. Non-data lines and
/// malformed payloads are skipped; emission order equals line order.
pub fn decode_lines<'a, I>(lines: I) -> impl Iterator<Item = StreamChunk> + 'a
where
    I: IntoIterator<Item = &'a str>,
    I::IntoIter: 'a,
{
    let mut lines = lines.into_iter();
    let mut done = false;
    std::iter::from_fn(move || {
        if done {
            return None;
        }
        for line in lines.by_ref() {
            let Some(payload) = line.trim().strip_prefix(DATA_PREFIX) else {
                continue;
            };
            if payload.trim() == DONE_SENTINEL {
                done = true;
                return None;
            }
            if let Some(chunk) = decode_data(payload) {
                return Some(chunk);
            }
        }
        None
    })
}

/// Incremental SSE decoder for live byte streams.
///
/// Owns the pending line buffer and done flag for one decode pass; not
/// shared or reused across calls. Feed transport chunks as they arrive,
/// then call [`finish`](Self::finish) once the transport ends to flush a
/// trailing unterminated line.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning chunks decoded from the complete lines
    /// they contain. Emits nothing once the sentinel has been seen.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamChunk> {
        if self.done {
            return Vec::new();
        }
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut chunks = Vec::new();
        while let Some(newline_pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline_pos).collect();
            if let Some(chunk) = self.decode_line(line.trim()) {
                chunks.push(chunk);
            }
            if self.done {
                break;
            }
        }
        chunks
    }

    /// Decode any remaining buffered data (an unterminated final line)
    /// after the transport ends.
    pub fn finish(&mut self) -> Option<StreamChunk> {
        if self.done {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        self.decode_line(line.trim())
    }

    /// Whether the `[DONE]` sentinel has been received.
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn decode_line(&mut self, line: &str) -> Option<StreamChunk> {
        let payload = line.strip_prefix(DATA_PREFIX)?;
        if payload.trim() == DONE_SENTINEL {
            self.done = true;
            return None;
        }
        decode_data(payload)
    }
}

/// Reconstruct the full generated text from a chunk sequence.
///
/// Concatenation order equals emission order — never reordered or
/// deduplicated.
pub fn collect_text(chunks: &[StreamChunk]) -> String {
    let mut text = String::new();
    for chunk in chunks {
        text.push_str(&chunk.content);
    }
    text
}

impl IoClient {
    /// Send a chat completion request with SSE streaming and return the
    /// ordered chunk sequence.
    pub async fn chat_stream(&self, req: &ChatRequest) -> Result<Vec<StreamChunk>, ApiError> {
        self.chat_stream_live(req, |_| {}).await
    }

    /// Send a streaming chat request, invoking `on_chunk` for each chunk as
    /// it arrives off the wire. The full ordered sequence is also returned.
    ///
    /// Retries never apply mid-stream: a non-success status before the
    /// stream starts is classified and returned, and a transport failure
    /// mid-stream fails the call as a whole. Cancellation is dropping the
    /// returned future — the decoder holds no cross-call state.
    pub async fn chat_stream_live(
        &self,
        req: &ChatRequest,
        mut on_chunk: impl FnMut(&StreamChunk),
    ) -> Result<Vec<StreamChunk>, ApiError> {
        let mut body = serde_json::to_value(req).map_err(|e| {
            ApiError::new(
                ErrorKind::Unclassified,
                format!("failed to serialize request: {e}"),
            )
        })?;
        body["stream"] = serde_json::Value::Bool(true);

        debug!(
            "streaming chat request: model={}",
            req.model.as_deref().unwrap_or("(none)")
        );

        let mut resp = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(&e, self.timeout))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &text));
        }

        let mut decoder = SseDecoder::new();
        let mut chunks = Vec::new();

        while let Some(bytes) = resp
            .chunk()
            .await
            .map_err(|e| classify_transport(&e, self.timeout))?
        {
            for chunk in decoder.feed(&bytes) {
                on_chunk(&chunk);
                chunks.push(chunk);
            }
            if decoder.is_done() {
                break;
            }
        }

        if !decoder.is_done()
            && let Some(chunk) = decoder.finish()
        {
            on_chunk(&chunk);
            chunks.push(chunk);
        }

        debug!("stream completed with {} chunk(s)", chunks.len());
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::retry::RetryPolicy;
    use crate::{DEFAULT_TIMEOUT, Message};

    #[test]
    fn decodes_deltas_in_order_and_stops_at_sentinel() {
        let lines = [
            r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":" there"}}]}"#,
            "data: [DONE]",
            r#"data: {"choices":[{"delta":{"content":"after done"}}]}"#,
        ];
        let chunks: Vec<StreamChunk> = decode_lines(lines).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "Hi");
        assert_eq!(chunks[1].content, " there");
        assert_eq!(collect_text(&chunks), "Hi there");
    }

    #[test]
    fn malformed_frame_skipped_without_aborting() {
        let lines = [
            r#"data: {"choices":[{"delta":{"content":"a"}}]}"#,
            "data: {not-json}",
            r#"data: {"choices":[{"delta":{"content":"b"}}]}"#,
            "data: [DONE]",
        ];
        let chunks: Vec<StreamChunk> = decode_lines(lines).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(collect_text(&chunks), "ab");
    }

    #[test]
    fn non_data_lines_ignored() {
        let lines = [
            ": keep-alive",
            "",
            "event: message",
            r#"data: {"choices":[{"delta":{"content":"x"}}]}"#,
            "data: [DONE]",
        ];
        let chunks: Vec<StreamChunk> = decode_lines(lines).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "x");
    }

    #[test]
    fn frame_without_choices_dropped() {
        let lines = [
            r#"data: {"choices":[]}"#,
            r#"data: {"object":"ping"}"#,
            r#"data: {"choices":[{"delta":{"content":"y"}}]}"#,
            "data: [DONE]",
        ];
        let chunks: Vec<StreamChunk> = decode_lines(lines).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "y");
    }

    #[test]
    fn role_and_finish_reason_carried_through() {
        let lines = [
            r#"data: {"id":"c-1","model":"m","choices":[{"delta":{"role":"assistant","content":""}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
            "data: [DONE]",
        ];
        let chunks: Vec<StreamChunk> = decode_lines(lines).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].role.as_deref(), Some("assistant"));
        assert_eq!(chunks[0].model.as_deref(), Some("m"));
        assert_eq!(chunks[0].id.as_deref(), Some("c-1"));
        assert_eq!(chunks[1].content, "");
        assert_eq!(chunks[1].finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn decoder_handles_lines_split_across_feeds() {
        let mut decoder = SseDecoder::new();
        let first = decoder.feed(br#"data: {"choices":[{"delta":{"con"#);
        assert!(first.is_empty());

        let second = decoder.feed(b"tent\":\"Hi\"}}]}\ndata: [DONE]\n");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].content, "Hi");
        assert!(decoder.is_done());

        // Nothing is emitted after the sentinel.
        let after = decoder.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"z\"}}]}\n");
        assert!(after.is_empty());
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn finish_flushes_unterminated_final_line() {
        let mut decoder = SseDecoder::new();
        let chunks = decoder.feed(br#"data: {"choices":[{"delta":{"content":"tail"}}]}"#);
        assert!(chunks.is_empty());
        let last = decoder.finish().unwrap();
        assert_eq!(last.content, "tail");
    }

    fn test_client(url: &str) -> IoClient {
        IoClient::with_config("test-key", url, DEFAULT_TIMEOUT, RetryPolicy::with_retries(0))
            .unwrap()
    }

    #[tokio::test]
    async fn chat_stream_end_to_end() {
        let sse_body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"Hello\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("accept", "text/event-stream")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_body)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let req = ChatRequest {
            messages: vec![Message::user("hi")],
            ..Default::default()
        };

        let mut seen = Vec::new();
        let chunks = client
            .chat_stream_live(&req, |chunk| seen.push(chunk.content.clone()))
            .await
            .unwrap();

        assert_eq!(collect_text(&chunks), "Hello world");
        assert_eq!(seen, vec!["Hello", " world", ""]);
        assert_eq!(chunks.last().unwrap().finish_reason.as_deref(), Some("stop"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn chat_stream_classifies_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let client = test_client(&server.url());
        let req = ChatRequest {
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        let err = client.chat_stream(&req).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::RateLimited);
    }
}
