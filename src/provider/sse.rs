//! Server-sent event parsing for streaming provider responses.
//!
//! OpenAI-compatible APIs, Anthropic, and Gemini (`alt=sse`) all deliver
//! stream chunks as SSE frames. Only `data:` lines carry payloads here;
//! `event:` lines, comments, and blank keep-alives are skipped.

use crate::error::Result;
use crate::provider::remote_common::map_transport_error;
use futures::stream::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;

/// Boxed stream of `data:` payload strings.
pub(crate) type SseStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Extract the payload of an SSE `data:` line, if this line is one.
pub(crate) fn parse_sse_line(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

/// The OpenAI-style end-of-stream sentinel.
pub(crate) fn is_done_marker(data: &str) -> bool {
    data == "[DONE]"
}

struct SseState<S> {
    bytes: S,
    buffer: Vec<u8>,
    pending: VecDeque<String>,
    ended: bool,
}

impl<S> SseState<S> {
    /// Split complete lines out of the byte buffer and queue their payloads.
    /// Incomplete trailing bytes stay buffered, so UTF-8 sequences and SSE
    /// frames that straddle network chunks are reassembled intact.
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.queue_line(&raw);
        }
    }

    fn queue_line(&mut self, raw: &[u8]) {
        let line = String::from_utf8_lossy(raw);
        if let Some(data) = parse_sse_line(line.trim_end())
            && !data.is_empty()
        {
            self.pending.push_back(data.to_string());
        }
    }
}

/// Convert a stream of raw body bytes into a stream of SSE `data:` payloads.
///
/// The stream ends at the `[DONE]` sentinel or when the transport closes;
/// a transport error is yielded once and then the stream ends.
pub(crate) fn sse_payloads<S, B>(bytes: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = Result<B>> + Send + Unpin,
    B: AsRef<[u8]>,
{
    let state = SseState {
        bytes,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        ended: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(data) = state.pending.pop_front() {
                if is_done_marker(&data) {
                    state.ended = true;
                    state.pending.clear();
                    return None;
                }
                return Some((Ok(data), state));
            }
            if state.ended {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(chunk.as_ref());
                    state.drain_lines();
                }
                Some(Err(e)) => {
                    state.ended = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.ended = true;
                    if !state.buffer.is_empty() {
                        let tail = std::mem::take(&mut state.buffer);
                        state.queue_line(&tail);
                    }
                }
            }
        }
    })
}

/// Streaming access to an HTTP response body as SSE payloads.
pub(crate) trait SseResponseExt {
    fn sse_data(self, provider_name: &'static str) -> SseStream;
}

impl SseResponseExt for reqwest::Response {
    fn sse_data(self, provider_name: &'static str) -> SseStream {
        let bytes = self
            .bytes_stream()
            .map(move |r| r.map_err(|e| map_transport_error(provider_name, e)));
        Box::pin(sse_payloads(Box::pin(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use futures::stream;

    fn chunks(parts: Vec<&[u8]>) -> impl Stream<Item = Result<Vec<u8>>> + Send + Unpin {
        stream::iter(parts.into_iter().map(|p| Ok(p.to_vec())).collect::<Vec<_>>())
    }

    async fn collect(s: impl Stream<Item = Result<String>> + Send) -> (Vec<String>, usize) {
        let mut payloads = Vec::new();
        let mut errors = 0;
        futures::pin_mut!(s);
        while let Some(item) = s.next().await {
            match item {
                Ok(p) => payloads.push(p),
                Err(_) => errors += 1,
            }
        }
        (payloads, errors)
    }

    #[test]
    fn parses_data_lines() {
        assert_eq!(parse_sse_line("data: {\"x\":1}"), Some("{\"x\":1}"));
        assert_eq!(parse_sse_line("data:{\"x\":1}"), Some("{\"x\":1}"));
        assert_eq!(parse_sse_line("event: message_stop"), None);
        assert_eq!(parse_sse_line(": keep-alive"), None);
        assert_eq!(parse_sse_line(""), None);
    }

    #[test]
    fn recognizes_done_marker() {
        assert!(is_done_marker("[DONE]"));
        assert!(!is_done_marker("{\"done\":true}"));
    }

    #[tokio::test]
    async fn splits_multiple_events_in_one_chunk() {
        let s = sse_payloads(chunks(vec![b"data: one\n\ndata: two\n\n"]));
        let (payloads, errors) = collect(s).await;
        assert_eq!(payloads, vec!["one", "two"]);
        assert_eq!(errors, 0);
    }

    #[tokio::test]
    async fn reassembles_frames_split_across_chunks() {
        let s = sse_payloads(chunks(vec![b"data: hel", b"lo\ndata: wor", b"ld\n"]));
        let (payloads, _) = collect(s).await;
        assert_eq!(payloads, vec!["hello", "world"]);
    }

    #[tokio::test]
    async fn reassembles_utf8_split_across_chunks() {
        // "né" with the two bytes of 'é' (0xC3 0xA9) in different chunks.
        let s = sse_payloads(chunks(vec![b"data: n\xC3", b"\xA9\n"]));
        let (payloads, _) = collect(s).await;
        assert_eq!(payloads, vec!["n\u{e9}"]);
    }

    #[tokio::test]
    async fn done_marker_ends_the_stream() {
        let s = sse_payloads(chunks(vec![b"data: a\ndata: [DONE]\ndata: after\n"]));
        let (payloads, _) = collect(s).await;
        assert_eq!(payloads, vec!["a"]);
    }

    #[tokio::test]
    async fn skips_event_lines_and_comments_and_crlf() {
        let s = sse_payloads(chunks(vec![
            b"event: content_block_delta\r\ndata: x\r\n\r\n: ping\r\n",
        ]));
        let (payloads, _) = collect(s).await;
        assert_eq!(payloads, vec!["x"]);
    }

    #[tokio::test]
    async fn flushes_trailing_line_without_newline() {
        let s = sse_payloads(chunks(vec![b"data: last"]));
        let (payloads, _) = collect(s).await;
        assert_eq!(payloads, vec!["last"]);
    }

    #[tokio::test]
    async fn transport_error_is_yielded_then_stream_ends() {
        let parts: Vec<Result<Vec<u8>>> = vec![
            Ok(b"data: ok\n".to_vec()),
            Err(ClientError::Api("connection reset".to_string())),
            Ok(b"data: never\n".to_vec()),
        ];
        let s = sse_payloads(stream::iter(parts));
        let (payloads, errors) = collect(s).await;
        assert_eq!(payloads, vec!["ok"]);
        assert_eq!(errors, 1);
    }
}
