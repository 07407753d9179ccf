use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use tracing::{debug, warn};

use solace_core::errors::GatewayError;
use solace_core::ids::SessionId;
use solace_core::stream::StreamChunk;

use crate::types::{is_blocked_finish, GeminiApiError, GeminiStreamChunk};

/// Bytes received so far, split into events at blank lines.
///
/// Remembers how far it has already looked for a separator, so a large event
/// arriving in many small reads is scanned once rather than once per read.
#[derive(Debug, Default)]
pub struct EventBuffer {
    buf: Vec<u8>,
    scanned: usize,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Offset up to which the buffer has been searched without finding a
    /// separator.
    pub fn scanned(&self) -> usize {
        self.scanned
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Everything left over, for a trailing event with no blank line after it.
    pub fn take_rest(&mut self) -> Vec<u8> {
        self.scanned = 0;
        std::mem::take(&mut self.buf)
    }

    /// Remove one complete event from the front, if there is one.
    ///
    /// Events end at a blank line; both `\n\n` and `\r\n\r\n` are accepted.
    pub fn take_event(&mut self) -> Option<Vec<u8>> {
        // A separator is at most three bytes, so one cut short by the last
        // read starts within the final two scanned bytes.
        let mut i = self.scanned.saturating_sub(2);
        while i < self.buf.len() {
            if self.buf[i] == b'\n' {
                let rest = &self.buf[i + 1..];
                let separator = if rest.starts_with(b"\n") {
                    Some(1)
                } else if rest.starts_with(b"\r\n") {
                    Some(2)
                } else {
                    None
                };
                if let Some(extra) = separator {
                    let event = self.buf[..i].to_vec();
                    self.buf.drain(..i + 1 + extra);
                    self.scanned = 0;
                    return Some(event);
                }
            }
            i += 1;
        }
        self.scanned = self.buf.len();
        None
    }
}

/// Join the `data:` lines of one event. `None` when the event carries no data.
pub fn event_data(event: &str) -> Option<String> {
    let lines: Vec<&str> = event
        .split('\n')
        .map(|l| l.trim_end_matches('\r'))
        .filter_map(|l| l.strip_prefix("data:"))
        .map(|d| d.strip_prefix(' ').unwrap_or(d))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Turns Gemini stream payloads into chunks for one session.
pub struct ChunkDecoder {
    session_id: SessionId,
}

impl ChunkDecoder {
    pub fn new(session_id: SessionId) -> Self {
        Self { session_id }
    }

    /// Decode one `data:` payload into zero or more items. Malformed payloads
    /// are logged and yield nothing.
    pub fn decode(&self, payload: &str) -> Vec<Result<StreamChunk, GatewayError>> {
        let payload = payload.trim();
        if payload.is_empty() || payload == "[DONE]" {
            return Vec::new();
        }

        let chunk: GeminiStreamChunk = match serde_json::from_str(payload) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, len = payload.len(), "skipping malformed Gemini SSE payload");
                return Vec::new();
            }
        };

        if let Some(err) = chunk.error {
            return vec![Err(classify_stream_error(&err))];
        }

        if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
            return vec![Err(GatewayError::unknown(format!("prompt blocked: {reason}")))];
        }

        let Some(candidate) = chunk.candidates.into_iter().next() else {
            return Vec::new();
        };

        if let Some(reason) = candidate.finish_reason.as_deref() {
            if is_blocked_finish(reason) {
                return vec![Err(GatewayError::unknown(format!(
                    "response withheld: finishReason={reason}"
                )))];
            }
        }

        let text = candidate.visible_text();
        match candidate.finish_reason {
            Some(reason) => {
                debug!(finish_reason = %reason, "Gemini stream finished");
                vec![Ok(StreamChunk::last(self.session_id.clone(), text))]
            }
            None if text.is_empty() => Vec::new(),
            None => vec![Ok(StreamChunk::delta(self.session_id.clone(), text))],
        }
    }
}

fn classify_stream_error(err: &GeminiApiError) -> GatewayError {
    match err.code {
        Some(401) | Some(403) => GatewayError::Unauthorized(err.message.clone()),
        Some(429) => GatewayError::RateLimited { retry_after: None },
        status => GatewayError::Unknown {
            status,
            diagnostic: format!(
                "{}: {}",
                err.status.as_deref().unwrap_or("ERROR"),
                err.message
            ),
        },
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Wraps a response byte stream and yields decoded chunks.
/// Includes an idle timeout: if no bytes arrive within `idle_duration`, the
/// stream fails with `NetworkUnavailable`. The stream ends after the first error.
pub struct SseStream {
    inner: ByteStream,
    decoder: ChunkDecoder,
    buffer: EventBuffer,
    pending: VecDeque<Result<StreamChunk, GatewayError>>,
    idle_deadline: Pin<Box<tokio::time::Sleep>>,
    idle_duration: Duration,
    finished: bool,
}

impl SseStream {
    pub fn new(
        byte_stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
        session_id: SessionId,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            decoder: ChunkDecoder::new(session_id),
            buffer: EventBuffer::new(),
            pending: VecDeque::new(),
            idle_deadline: Box::pin(tokio::time::sleep(idle_timeout)),
            idle_duration: idle_timeout,
            finished: false,
        }
    }

    fn drain_events(&mut self) {
        while let Some(event) = self.buffer.take_event() {
            self.push_event(&event);
        }
    }

    fn push_event(&mut self, event: &[u8]) {
        let text = String::from_utf8_lossy(event);
        if let Some(data) = event_data(&text) {
            let items = self.decoder.decode(&data);
            self.pending.extend(items);
        }
    }

    fn next_pending(&mut self) -> Option<Result<StreamChunk, GatewayError>> {
        let item = self.pending.pop_front()?;
        if item.is_err() {
            self.finished = true;
            self.pending.clear();
        }
        Some(item)
    }
}

impl Stream for SseStream {
    type Item = Result<StreamChunk, GatewayError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(item) = self.next_pending() {
            return Poll::Ready(Some(item));
        }
        if self.finished {
            return Poll::Ready(None);
        }

        loop {
            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let new_deadline = tokio::time::Instant::now() + self.idle_duration;
                    self.idle_deadline.as_mut().reset(new_deadline);

                    self.buffer.extend(&bytes);
                    self.drain_events();

                    if let Some(item) = self.next_pending() {
                        return Poll::Ready(Some(item));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    self.finished = true;
                    return Poll::Ready(Some(Err(GatewayError::NetworkUnavailable(format!(
                        "stream interrupted: {e}"
                    )))));
                }
                Poll::Ready(None) => {
                    // Trailing event without a terminating blank line
                    if !self.buffer.is_empty() {
                        let remaining = self.buffer.take_rest();
                        self.push_event(&remaining);
                    }
                    self.finished = true;
                    return Poll::Ready(self.next_pending());
                }
                Poll::Pending => {
                    if self.idle_deadline.as_mut().poll(cx).is_ready() {
                        self.finished = true;
                        return Poll::Ready(Some(Err(GatewayError::NetworkUnavailable(format!(
                            "idle timeout after {}s",
                            self.idle_duration.as_secs()
                        )))));
                    }
                    return Poll::Pending;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn sid() -> SessionId {
        SessionId::from_raw("sess_sse")
    }

    fn text_event(text: &str) -> String {
        format!(
            "data: {{\"candidates\":[{{\"content\":{{\"role\":\"model\",\"parts\":[{{\"text\":\"{text}\"}}]}}}}]}}\n\n"
        )
    }

    fn final_event(text: &str) -> String {
        format!(
            "data: {{\"candidates\":[{{\"content\":{{\"parts\":[{{\"text\":\"{text}\"}}]}},\"finishReason\":\"STOP\"}}]}}\n\n"
        )
    }

    fn byte_stream(parts: Vec<String>) -> impl Stream<Item = Result<Bytes, reqwest::Error>> {
        futures::stream::iter(parts.into_iter().map(|p| Ok(Bytes::from(p))))
    }

    async fn collect(stream: SseStream) -> Vec<Result<StreamChunk, GatewayError>> {
        stream.collect().await
    }

    #[test]
    fn take_event_lf_and_crlf() {
        let mut buf = EventBuffer::new();
        buf.extend(b"data: a\n\ndata: b\r\n\r\ndata: partial");
        assert_eq!(buf.take_event().unwrap(), b"data: a");
        assert_eq!(buf.take_event().unwrap(), b"data: b\r");
        assert!(buf.take_event().is_none());
        assert_eq!(buf.take_rest(), b"data: partial");
        assert!(buf.is_empty());
    }

    #[test]
    fn large_event_in_small_reads_is_scanned_incrementally() {
        let payload = format!("data: {}", "x".repeat(4096));
        let whole = format!("{payload}\r\n\r\ndata: next");
        let mut buf = EventBuffer::new();
        let mut events = Vec::new();
        for piece in whole.as_bytes().chunks(7) {
            let before = buf.scanned();
            buf.extend(piece);
            match buf.take_event() {
                Some(event) => events.push(event),
                None => {
                    assert!(buf.scanned() > before);
                    assert_eq!(buf.scanned(), buf.len());
                }
            }
        }
        assert_eq!(events, vec![payload.into_bytes()]);
        assert_eq!(buf.take_rest(), b"data: next");
    }

    #[test]
    fn separator_split_across_reads_is_found() {
        let cases: [(&str, &str, &[u8]); 4] = [
            ("data: a\n", "\n", b"data: a"),
            ("data: a\n", "\r\n", b"data: a"),
            ("data: a\r\n", "\r\n", b"data: a\r"),
            ("data: a\r\n\r", "\n", b"data: a\r"),
        ];
        for (first, second, expected) in cases {
            let mut buf = EventBuffer::new();
            buf.extend(first.as_bytes());
            assert!(buf.take_event().is_none(), "{first:?}");
            assert_eq!(buf.scanned(), first.len());
            buf.extend(second.as_bytes());
            assert_eq!(buf.take_event().as_deref(), Some(expected), "{first:?} + {second:?}");
            assert!(buf.is_empty());
            assert_eq!(buf.scanned(), 0);
        }
    }

    #[test]
    fn event_data_joins_lines_and_ignores_other_fields() {
        assert_eq!(event_data("event: x\ndata: {\"a\":\ndata: 1}").as_deref(), Some("{\"a\":\n1}"));
        assert_eq!(event_data("data:tight\r").as_deref(), Some("tight"));
        assert_eq!(event_data(": keepalive"), None);
    }

    #[test]
    fn decoder_emits_delta_then_final() {
        let decoder = ChunkDecoder::new(sid());
        let items = decoder.decode(r#"{"candidates":[{"content":{"parts":[{"text":"Hel"}]}}]}"#);
        let chunk = items[0].as_ref().unwrap();
        assert_eq!(chunk.delta, "Hel");
        assert!(!chunk.is_final);

        let items = decoder.decode(
            r#"{"candidates":[{"content":{"parts":[{"text":"lo"}]},"finishReason":"STOP"}]}"#,
        );
        let chunk = items[0].as_ref().unwrap();
        assert_eq!(chunk.delta, "lo");
        assert!(chunk.is_final);
    }

    #[test]
    fn decoder_safety_finish_is_failure() {
        let decoder = ChunkDecoder::new(sid());
        let items = decoder.decode(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#);
        assert!(matches!(&items[0], Err(GatewayError::Unknown { diagnostic, .. }) if diagnostic.contains("SAFETY")));
    }

    #[test]
    fn decoder_in_stream_errors() {
        let decoder = ChunkDecoder::new(sid());
        let items = decoder.decode(r#"{"error":{"code":429,"message":"quota","status":"RESOURCE_EXHAUSTED"}}"#);
        assert!(matches!(items[0], Err(GatewayError::RateLimited { .. })));

        let items = decoder.decode(r#"{"error":{"code":500,"message":"boom","status":"INTERNAL"}}"#);
        assert!(matches!(items[0], Err(GatewayError::Unknown { status: Some(500), .. })));
    }

    #[test]
    fn decoder_skips_malformed_and_empty() {
        let decoder = ChunkDecoder::new(sid());
        assert!(decoder.decode("{not json").is_empty());
        assert!(decoder.decode("[DONE]").is_empty());
        assert!(decoder.decode(r#"{"candidates":[]}"#).is_empty());
        assert!(decoder.decode(r#"{"candidates":[{"content":{"parts":[]}}]}"#).is_empty());
    }

    #[test]
    fn decoder_prompt_block() {
        let decoder = ChunkDecoder::new(sid());
        let items = decoder.decode(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#);
        assert!(items[0].is_err());
    }

    #[tokio::test]
    async fn stream_yields_deltas_in_order() {
        let stream = SseStream::new(
            byte_stream(vec![text_event("Hel"), final_event("lo")]),
            sid(),
            Duration::from_secs(90),
        );
        let items = collect(stream).await;
        let deltas: Vec<_> = items.iter().map(|i| i.as_ref().unwrap().delta.as_str()).collect();
        assert_eq!(deltas, vec!["Hel", "lo"]);
        assert!(items[1].as_ref().unwrap().is_final);
    }

    #[tokio::test]
    async fn stream_handles_events_split_across_reads() {
        let whole = text_event("split");
        let (a, b) = whole.split_at(17);
        let stream = SseStream::new(
            byte_stream(vec![a.to_string(), b.to_string()]),
            sid(),
            Duration::from_secs(90),
        );
        let items = collect(stream).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap().delta, "split");
    }

    #[tokio::test]
    async fn stream_handles_crlf_framing_and_trailing_event() {
        let crlf = text_event("one").replace('\n', "\r\n");
        let trailing = final_event("two").trim_end().to_string();
        let stream = SseStream::new(byte_stream(vec![crlf, trailing]), sid(), Duration::from_secs(90));
        let items = collect(stream).await;
        let deltas: Vec<_> = items.iter().map(|i| i.as_ref().unwrap().delta.clone()).collect();
        assert_eq!(deltas, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn stream_ends_after_first_error() {
        let stream = SseStream::new(
            byte_stream(vec![
                text_event("Par"),
                "data: {\"candidates\":[{\"finishReason\":\"SAFETY\"}]}\n\n".to_string(),
                text_event("never"),
            ]),
            sid(),
            Duration::from_secs(90),
        );
        let items = collect(stream).await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn idle_timeout_fires_when_no_data() {
        tokio::time::pause();

        let bytes = futures::stream::pending::<Result<Bytes, reqwest::Error>>();
        let mut stream = Box::pin(SseStream::new(bytes, sid(), Duration::from_secs(5)));

        tokio::time::advance(Duration::from_secs(6)).await;

        let item = stream.next().await;
        assert!(
            matches!(&item, Some(Err(GatewayError::NetworkUnavailable(msg))) if msg.contains("idle timeout")),
            "expected idle timeout error, got: {item:?}"
        );
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn idle_timeout_resets_on_data() {
        tokio::time::pause();

        let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, reqwest::Error>>(16);
        let rx_stream = tokio_stream::wrappers::ReceiverStream::new(rx);
        let mut stream = Box::pin(SseStream::new(rx_stream, sid(), Duration::from_secs(5)));

        tx.send(Ok(Bytes::from(text_event("a")))).await.unwrap();
        assert!(stream.next().await.unwrap().is_ok());

        tokio::time::advance(Duration::from_secs(4)).await;

        tx.send(Ok(Bytes::from(text_event("b")))).await.unwrap();
        assert!(stream.next().await.unwrap().is_ok());

        drop(tx);
        let item = stream.next().await;
        assert!(item.is_none(), "expected stream end, got: {item:?}");
    }
}
