use super::{ChatResult, EventStream};
use crate::types::{RetrievalHit, StreamEvent};
use futures::StreamExt;
use futures::stream::{self, BoxStream, Stream};
use serde::Deserialize;
use std::collections::VecDeque;
use thiserror::Error;

const EVENT_DELIMITER: &str = "\n\n";
const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// A single `data:` line that could not be parsed. Recovered locally.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed event data: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct WireRecord {
    #[serde(default)]
    choices: Option<Vec<WireChoice>>,
    #[serde(default)]
    rag_hits: Option<Vec<RetrievalHit>>,
    #[serde(default)]
    rag_user_message: Option<String>,
}

#[derive(Deserialize)]
struct WireChoice {
    #[serde(default)]
    delta: Option<WireDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
}

fn parse_record(data: &str) -> Result<Vec<StreamEvent>, DecodeError> {
    let record: WireRecord = serde_json::from_str(data)?;
    Ok(classify(record))
}

fn classify(record: WireRecord) -> Vec<StreamEvent> {
    let augmented = record.rag_user_message.filter(|msg| !msg.is_empty());
    if record.rag_hits.is_some() || augmented.is_some() {
        // Retrieval context wins; any delta on the same record is ignored.
        return vec![StreamEvent::Meta {
            hits: record.rag_hits.unwrap_or_default(),
            augmented_user_message: augmented,
        }];
    }

    let (content, finish_reason) = match record.choices.into_iter().flatten().next() {
        Some(choice) => (
            choice.delta.and_then(|delta| delta.content),
            choice.finish_reason,
        ),
        None => (None, None),
    };
    let finished = finish_reason.is_some_and(|reason| !reason.is_empty());

    let mut events = Vec::with_capacity(2);
    match content {
        Some(text) if !text.is_empty() => events.push(StreamEvent::Token(text)),
        // Nothing recognizable: a no-op token.
        _ if !finished => events.push(StreamEvent::Token(String::new())),
        _ => {}
    }
    if finished {
        events.push(StreamEvent::End);
    }
    events
}

/// Returns the index where an incomplete trailing UTF-8 sequence starts.
fn incomplete_tail_start(buf: &[u8]) -> usize {
    let lower = buf.len().saturating_sub(3);
    for idx in (lower..buf.len()).rev() {
        let byte = buf[idx];
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let needed = match byte {
            b if b & 0b1000_0000 == 0 => 1,
            b if b & 0b1110_0000 == 0b1100_0000 => 2,
            b if b & 0b1111_0000 == 0b1110_0000 => 3,
            b if b & 0b1111_1000 == 0b1111_0000 => 4,
            _ => 1,
        };
        return if buf.len() - idx < needed {
            idx
        } else {
            buf.len()
        };
    }
    buf.len()
}

/// Incremental decoder for a `text/event-stream` body.
///
/// Chunks may split an event anywhere, including inside a UTF-8 sequence, or
/// carry several events at once. Only the trailing incomplete segment is
/// buffered between calls. Once the `[DONE]` sentinel or a terminal reason is
/// seen the decoder is finished and ignores further input.
#[derive(Debug, Default)]
pub struct EventFrameDecoder {
    pending: String,
    utf8_carry: Vec<u8>,
    finished: bool,
}

impl EventFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        let mut buf = std::mem::take(&mut self.utf8_carry);
        buf.extend_from_slice(bytes);
        let cut = incomplete_tail_start(&buf);
        self.utf8_carry = buf.split_off(cut);
        let text = String::from_utf8_lossy(&buf).into_owned();
        self.push_str(&text)
    }

    pub fn push_str(&mut self, chunk: &str) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }
        self.pending.extend(chunk.chars().filter(|c| *c != '\r'));

        while let Some(pos) = self.pending.find(EVENT_DELIMITER) {
            let segment: String = self
                .pending
                .drain(..pos + EVENT_DELIMITER.len())
                .collect();
            self.decode_segment(&segment[..pos], &mut events);
            if self.finished {
                self.pending.clear();
                break;
            }
        }
        events
    }

    /// Flushes whatever is buffered once the body has ended.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }
        if !self.utf8_carry.is_empty() {
            let carry = std::mem::take(&mut self.utf8_carry);
            self.pending.push_str(&String::from_utf8_lossy(&carry));
        }
        let rest = std::mem::take(&mut self.pending);
        if !rest.trim().is_empty() {
            tracing::debug!(bytes = rest.len(), "decoding unterminated trailing event");
            self.decode_segment(&rest, &mut events);
        }
        self.finished = true;
        events
    }

    fn decode_segment(&mut self, segment: &str, events: &mut Vec<StreamEvent>) {
        for line in segment.split('\n') {
            let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
                continue;
            };
            let data = rest.trim();
            if data.is_empty() {
                continue;
            }
            if data == DONE_SENTINEL {
                self.finished = true;
                events.push(StreamEvent::End);
                return;
            }
            match parse_record(data) {
                Ok(parsed) => {
                    let ends = parsed.contains(&StreamEvent::End);
                    events.extend(parsed);
                    if ends {
                        self.finished = true;
                        return;
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, data = %data, "skipping malformed event line");
                }
            }
        }
    }
}

/// Adapts a raw body stream into an [`EventStream`].
pub fn decode_body<S>(body: S) -> EventStream
where
    S: Stream<Item = ChatResult<Vec<u8>>> + Send + 'static,
{
    struct DecodeState {
        body: BoxStream<'static, ChatResult<Vec<u8>>>,
        decoder: EventFrameDecoder,
        queued: VecDeque<StreamEvent>,
        exhausted: bool,
    }

    let state = DecodeState {
        body: body.boxed(),
        decoder: EventFrameDecoder::new(),
        queued: VecDeque::new(),
        exhausted: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.queued.pop_front() {
                return Some((Ok(event), state));
            }
            if state.exhausted || state.decoder.is_finished() {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    tracing::trace!(bytes = chunk.len(), "stream chunk");
                    let events = state.decoder.push_bytes(&chunk);
                    state.queued.extend(events);
                }
                Some(Err(err)) => {
                    state.exhausted = true;
                    return Some((Err(err), state));
                }
                None => {
                    state.exhausted = true;
                    let events = state.decoder.finish();
                    state.queued.extend(events);
                }
            }
        }
    })
    .boxed()
}
