//! Extraction of inline reasoning tags from model output.
//!
//! Some OpenAI-compatible backends emit reasoning in a native
//! `reasoning_content` field; others inline it in the text channel wrapped in
//! a tag such as `<think>...</think>`. [`TagScanner`] separates the two over a
//! stream of deltas, holding back partial tag matches at chunk boundaries.

use crate::stream::StreamEvent;

/// Stateful splitter that routes tagged spans to [`StreamEvent::Reasoning`]
/// and everything else to [`StreamEvent::Text`].
pub(crate) struct TagScanner {
    open: String,
    close: String,
    carry: String,
    inside: bool,
}

impl TagScanner {
    /// Scanner for `<tag>...</tag>` spans.
    pub(crate) fn new(tag: &str) -> Self {
        Self {
            open: format!("<{tag}>"),
            close: format!("</{tag}>"),
            carry: String::new(),
            inside: false,
        }
    }

    /// Feed one content delta; returns the events it resolves to.
    ///
    /// A suffix that could be the start of a tag is carried over to the next
    /// call rather than emitted, so tags split across deltas are still
    /// recognized.
    pub(crate) fn feed(&mut self, chunk: &str) -> Vec<StreamEvent> {
        self.carry.push_str(chunk);
        let mut out = Vec::new();
        loop {
            let needle = if self.inside { &self.close } else { &self.open };
            if let Some(pos) = self.carry.find(needle.as_str()) {
                if pos > 0 {
                    let piece = self.carry[..pos].to_string();
                    out.push(self.wrap(piece));
                }
                self.carry.drain(..pos + needle.len());
                self.inside = !self.inside;
            } else {
                let hold = holdback(&self.carry, needle);
                let emit = self.carry.len() - hold;
                if emit > 0 {
                    let piece: String = self.carry.drain(..emit).collect();
                    out.push(self.wrap(piece));
                }
                return out;
            }
        }
    }

    /// Flush whatever is still carried. A held-back partial tag was not a tag
    /// after all and comes out as text; an unclosed span stays reasoning.
    pub(crate) fn finish(&mut self) -> Vec<StreamEvent> {
        if self.carry.is_empty() {
            return Vec::new();
        }
        let piece = std::mem::take(&mut self.carry);
        vec![self.wrap(piece)]
    }

    fn wrap(&self, piece: String) -> StreamEvent {
        if self.inside {
            StreamEvent::Reasoning(piece)
        } else {
            StreamEvent::Text(piece)
        }
    }
}

/// Length of the longest suffix of `buf` that is a proper prefix of `needle`,
/// starting at a char boundary.
fn holdback(buf: &str, needle: &str) -> usize {
    let max = needle.len().saturating_sub(1).min(buf.len());
    for len in (1..=max).rev() {
        let start = buf.len() - len;
        if buf.is_char_boundary(start) && needle.as_bytes().starts_with(&buf.as_bytes()[start..]) {
            return len;
        }
    }
    0
}

/// Split a complete response into `(answer, reasoning)`.
///
/// The answer keeps its original order with tagged spans removed; reasoning
/// from multiple spans is concatenated. Returns `None` reasoning when no tag
/// is present or the span is empty.
pub(crate) fn split_tagged(text: &str, tag: &str) -> (String, Option<String>) {
    let mut scanner = TagScanner::new(tag);
    let mut events = scanner.feed(text);
    events.extend(scanner.finish());

    let mut answer = String::new();
    let mut reasoning = String::new();
    for event in events {
        match event {
            StreamEvent::Text(t) => answer.push_str(&t),
            StreamEvent::Reasoning(r) => reasoning.push_str(&r),
            _ => {}
        }
    }

    let reasoning = reasoning.trim();
    let reasoning = (!reasoning.is_empty()).then(|| reasoning.to_string());
    (answer.trim_start().to_string(), reasoning)
}
