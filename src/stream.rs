//! Server-Sent Events framing for vendor response bodies.
//!
//! Only `data:` fields matter to the dialects. Consecutive `data:` lines are joined
//! with `\n`, a blank line closes the event, and the `[DONE]` sentinel ends the feed.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;

use crate::error::LLMError;
use crate::http::HttpBodyStream;

/// One framed SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Joined `data:` payload.
    Data(String),
    /// The `[DONE]` sentinel.
    Done,
}

/// Incremental line splitter and event assembler, independent of any I/O.
#[derive(Debug, Default)]
struct SseFramer {
    buffer: Vec<u8>,
    data_lines: Vec<Vec<u8>>,
}

impl SseFramer {
    /// Feeds raw bytes and appends every completed event to `out`.
    fn push(&mut self, bytes: &[u8], out: &mut VecDeque<Result<SseEvent, String>>) {
        self.buffer.extend_from_slice(bytes);
        while let Some(line) = self.next_line() {
            if line.is_empty() {
                if let Some(event) = self.take_event() {
                    out.push_back(event);
                }
            } else {
                self.handle_line(line);
            }
        }
    }

    /// Flushes a trailing event when the body ends without a blank line.
    fn finish(&mut self, out: &mut VecDeque<Result<SseEvent, String>>) {
        if !self.buffer.is_empty() {
            let mut line = std::mem::take(&mut self.buffer);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            self.handle_line(line);
        }
        if let Some(event) = self.take_event() {
            out.push_back(event);
        }
    }

    fn next_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buffer.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(line)
    }

    fn handle_line(&mut self, line: Vec<u8>) {
        // comments (":") and non-data fields (event, id, retry) are ignored
        if let Some(rest) = line.strip_prefix(b"data:") {
            let rest = rest.strip_prefix(b" ").unwrap_or(rest);
            self.data_lines.push(rest.to_vec());
        }
    }

    fn take_event(&mut self) -> Option<Result<SseEvent, String>> {
        if self.data_lines.is_empty() {
            return None;
        }
        let joined = self.data_lines.drain(..).collect::<Vec<_>>().join(&b'\n');
        if joined.is_empty() {
            return None;
        }
        Some(match String::from_utf8(joined) {
            Ok(data) if data.trim() == "[DONE]" => Ok(SseEvent::Done),
            Ok(data) => Ok(SseEvent::Data(data)),
            Err(err) => Err(format!("invalid UTF-8 in stream frame: {err}")),
        })
    }
}

/// Turns a raw HTTP body into a stream of [`SseEvent`] values.
///
/// Body read failures pass through unchanged; undecodable frames surface as
/// [`LLMError::Provider`] tagged with the dialect name. The stream ends after `[DONE]`.
pub struct SseDecoder {
    body: HttpBodyStream,
    framer: SseFramer,
    pending: VecDeque<Result<SseEvent, String>>,
    dialect: &'static str,
    body_closed: bool,
    finished: bool,
}

impl SseDecoder {
    pub fn new(body: HttpBodyStream, dialect: &'static str) -> Self {
        Self {
            body,
            framer: SseFramer::default(),
            pending: VecDeque::new(),
            dialect,
            body_closed: false,
            finished: false,
        }
    }

    fn pop_pending(&mut self) -> Option<Result<SseEvent, LLMError>> {
        let event = self.pending.pop_front()?;
        if matches!(event, Ok(SseEvent::Done)) {
            self.finished = true;
            self.pending.clear();
        }
        Some(event.map_err(|message| LLMError::provider(self.dialect, message)))
    }
}

impl Stream for SseDecoder {
    type Item = Result<SseEvent, LLMError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if this.finished {
                return Poll::Ready(None);
            }
            if let Some(event) = this.pop_pending() {
                return Poll::Ready(Some(event));
            }
            if this.body_closed {
                this.finished = true;
                return Poll::Ready(None);
            }

            match this.body.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => this.framer.push(&bytes, &mut this.pending),
                Poll::Ready(Some(Err(err))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    this.body_closed = true;
                    this.framer.finish(&mut this.pending);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
