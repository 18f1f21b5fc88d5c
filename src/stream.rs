//! Streaming primitives: the event model providers emit and the
//! consumer-facing stream types the client hands back.
//!
//! All streams are forward-only and single-consumer. The client performs no
//! buffering of unread elements; pacing is entirely pull-based.

use crate::api::Smoothing;
use crate::error::Result;
use crate::partial_json;
use crate::traits::TokenUsage;
use futures::stream::{Stream, StreamExt};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// One element of a provider's streaming response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A fragment of answer text. For structured streaming this carries a
    /// fragment of the serialized object.
    Text(String),
    /// A fragment of reasoning content, separated from the answer upstream.
    Reasoning(String),
    /// Final token accounting for the call.
    Usage(TokenUsage),
    /// The provider signalled end of stream.
    Done,
}

/// A boxed, single-consumer stream of events, as produced by a
/// [`LanguageModel`](crate::traits::LanguageModel).
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// A boxed, single-consumer stream of answer-text chunks.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A boxed, single-consumer stream of progressively larger partial objects.
pub type PartialObjectStream = Pin<Box<dyn Stream<Item = Result<serde_json::Value>> + Send>>;

/// A deferred value produced as a by-product of draining a stream.
///
/// Resolves to `Some` once the owning stream has ended and the value was
/// present, to `None` when the stream ended without it or was dropped before
/// completion. Awaiting before the stream is drained simply waits.
pub struct SideChannel<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> SideChannel<T> {
    fn new() -> (oneshot::Sender<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }
}

impl<T> Future for SideChannel<T> {
    type Output = Option<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|r| r.ok())
    }
}

/// A live streaming chat response.
///
/// `text` yields answer chunks in provider order. `reasoning` and `usage`
/// resolve once `text` has been drained (or dropped).
pub struct ChatStream {
    /// Ordered, finite sequence of answer-text chunks.
    pub text: TextStream,
    /// The reasoning channel, accumulated across the whole response.
    pub reasoning: SideChannel<String>,
    /// Final token usage, when the provider reports it.
    pub usage: SideChannel<TokenUsage>,
}

impl std::fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream").finish_non_exhaustive()
    }
}

struct ChatAdapter {
    inner: EventStream,
    reasoning: String,
    usage: Option<TokenUsage>,
    reasoning_tx: Option<oneshot::Sender<String>>,
    usage_tx: Option<oneshot::Sender<TokenUsage>>,
    done: bool,
}

impl ChatAdapter {
    fn finish(&mut self) {
        if let Some(tx) = self.reasoning_tx.take()
            && !self.reasoning.is_empty()
        {
            let _ = tx.send(std::mem::take(&mut self.reasoning));
        }
        if let Some(tx) = self.usage_tx.take()
            && let Some(usage) = self.usage.take()
        {
            let _ = tx.send(usage);
        }
    }
}

impl ChatStream {
    /// Reshape a provider event stream into the consumer-facing form,
    /// applying the configured smoothing to text chunks.
    pub(crate) fn from_events(events: EventStream, smoothing: Smoothing) -> Self {
        let (reasoning_tx, reasoning) = SideChannel::new();
        let (usage_tx, usage) = SideChannel::new();

        let adapter = ChatAdapter {
            inner: events,
            reasoning: String::new(),
            usage: None,
            reasoning_tx: Some(reasoning_tx),
            usage_tx: Some(usage_tx),
            done: false,
        };

        let text = futures::stream::unfold(adapter, |mut st| async move {
            if st.done {
                st.finish();
                return None;
            }
            loop {
                match st.inner.next().await {
                    Some(Ok(StreamEvent::Text(chunk))) => return Some((Ok(chunk), st)),
                    Some(Ok(StreamEvent::Reasoning(chunk))) => st.reasoning.push_str(&chunk),
                    Some(Ok(StreamEvent::Usage(usage))) => st.usage = Some(usage),
                    Some(Ok(StreamEvent::Done)) | None => {
                        st.finish();
                        return None;
                    }
                    Some(Err(e)) => {
                        // A failed provider call ends the stream; side
                        // channels still resolve with whatever arrived.
                        st.done = true;
                        return Some((Err(e), st));
                    }
                }
            }
        })
        .boxed();

        let text = match smoothing {
            Smoothing::Off => text,
            Smoothing::Word => smooth_words(text),
        };

        Self {
            text,
            reasoning,
            usage,
        }
    }
}

/// A live streaming structured response.
pub struct ObjectStream {
    /// Progressively larger snapshots of the object being generated. Each
    /// element is a complete JSON value; the final element is the finished
    /// object.
    pub partials: PartialObjectStream,
    /// Final token usage, when the provider reports it.
    pub usage: SideChannel<TokenUsage>,
}

impl std::fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStream").finish_non_exhaustive()
    }
}

struct ObjectAdapter {
    inner: EventStream,
    buffer: String,
    last: Option<serde_json::Value>,
    usage: Option<TokenUsage>,
    usage_tx: Option<oneshot::Sender<TokenUsage>>,
    done: bool,
}

impl ObjectAdapter {
    fn finish(&mut self) {
        if let Some(tx) = self.usage_tx.take()
            && let Some(usage) = self.usage.take()
        {
            let _ = tx.send(usage);
        }
    }

    /// Fold the next text fragment into the buffer and return a new snapshot
    /// if the balanced view of the buffer changed.
    fn push(&mut self, fragment: &str) -> Option<serde_json::Value> {
        self.buffer.push_str(fragment);
        let snapshot = partial_json::complete(&self.buffer)?;
        if self.last.as_ref() == Some(&snapshot) {
            return None;
        }
        self.last = Some(snapshot.clone());
        Some(snapshot)
    }
}

impl ObjectStream {
    /// Assemble partial objects from the JSON text fragments of a provider
    /// event stream.
    pub(crate) fn from_events(events: EventStream) -> Self {
        let (usage_tx, usage) = SideChannel::new();

        let adapter = ObjectAdapter {
            inner: events,
            buffer: String::new(),
            last: None,
            usage: None,
            usage_tx: Some(usage_tx),
            done: false,
        };

        let partials = futures::stream::unfold(adapter, |mut st| async move {
            if st.done {
                st.finish();
                return None;
            }
            loop {
                match st.inner.next().await {
                    Some(Ok(StreamEvent::Text(fragment))) => {
                        if let Some(snapshot) = st.push(&fragment) {
                            return Some((Ok(snapshot), st));
                        }
                    }
                    // Reasoning surrounding structured output is dropped:
                    // the contract of this stream is object snapshots only.
                    Some(Ok(StreamEvent::Reasoning(_))) => {}
                    Some(Ok(StreamEvent::Usage(usage))) => st.usage = Some(usage),
                    Some(Ok(StreamEvent::Done)) | None => {
                        st.finish();
                        return None;
                    }
                    Some(Err(e)) => {
                        st.done = true;
                        return Some((Err(e), st));
                    }
                }
            }
        })
        .boxed();

        Self { partials, usage }
    }
}

/// Re-chunk a text stream so every emitted piece ends on a word boundary.
///
/// The concatenation of the output equals the concatenation of the input;
/// only chunk boundaries move. Errors pass through after any buffered text
/// has been flushed.
fn smooth_words(stream: TextStream) -> TextStream {
    struct SmoothState {
        inner: TextStream,
        buffer: String,
        pending: VecDeque<Result<String>>,
        ended: bool,
    }

    fn drain_words(buffer: &mut String, pending: &mut VecDeque<Result<String>>) {
        let mut emit_up_to = 0;
        let mut prev_ws = false;
        for (i, c) in buffer.char_indices() {
            if prev_ws && !c.is_whitespace() {
                emit_up_to = i;
            }
            prev_ws = c.is_whitespace();
        }
        if emit_up_to > 0 {
            let rest = buffer.split_off(emit_up_to);
            let complete = std::mem::replace(buffer, rest);
            let mut start = 0;
            let mut prev_ws = false;
            for (i, c) in complete.char_indices() {
                if prev_ws && !c.is_whitespace() {
                    pending.push_back(Ok(complete[start..i].to_string()));
                    start = i;
                }
                prev_ws = c.is_whitespace();
            }
            if start < complete.len() {
                pending.push_back(Ok(complete[start..].to_string()));
            }
        }
    }

    let state = SmoothState {
        inner: stream,
        buffer: String::new(),
        pending: VecDeque::new(),
        ended: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.ended {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(chunk)) => {
                    st.buffer.push_str(&chunk);
                    drain_words(&mut st.buffer, &mut st.pending);
                }
                Some(Err(e)) => {
                    st.ended = true;
                    if !st.buffer.is_empty() {
                        let tail = std::mem::take(&mut st.buffer);
                        st.pending.push_back(Ok(tail));
                    }
                    st.pending.push_back(Err(e));
                }
                None => {
                    st.ended = true;
                    if !st.buffer.is_empty() {
                        let tail = std::mem::take(&mut st.buffer);
                        st.pending.push_back(Ok(tail));
                    }
                }
            }
        }
    })
    .boxed()
}
