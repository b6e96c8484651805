use futures_core::Stream;
use futures_util::StreamExt;
use tracing::{debug, error};

use crate::cancel::CancelHandle;
use crate::error::LLMError;
use crate::types::{StateSet, StreamUpdate, StreamingClientUpdate};

/// Consumption state of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    Streaming,
    Done,
}

/// Folds uniform updates into a growing transcript.
///
/// Text deltas and issue texts are appended in arrival order. Once `Done`, further
/// updates are ignored and [`StreamAccumulator::finish`] yields nothing.
#[derive(Debug)]
pub struct StreamAccumulator {
    text: String,
    origin: Option<String>,
    state: AccumulatorState,
    aborted: bool,
}

impl Default for StreamAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self {
            text: String::new(),
            origin: None,
            state: AccumulatorState::Streaming,
            aborted: false,
        }
    }

    pub fn state(&self) -> AccumulatorState {
        self.state
    }

    /// `true` when consumption ended on cancellation.
    pub fn aborted(&self) -> bool {
        self.aborted
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Applies one update and returns what the caller should see, if anything.
    pub fn apply(&mut self, update: StreamUpdate) -> Option<StreamingClientUpdate> {
        if self.state == AccumulatorState::Done {
            return None;
        }
        match update {
            StreamUpdate::Text { t } => {
                self.text.push_str(&t);
                Some(StreamingClientUpdate::typing_text(self.text.clone()))
            }
            StreamUpdate::Issue {
                issue_id,
                issue_text,
            } => {
                debug!(issue_id = %issue_id, "issue relayed into transcript");
                self.text.push_str(&issue_text);
                Some(StreamingClientUpdate::typing_text(self.text.clone()))
            }
            StreamUpdate::Set {
                set: StateSet { model: Some(model), .. },
            } if !model.is_empty() => {
                self.origin = Some(model.clone());
                Some(StreamingClientUpdate::origin(model))
            }
            StreamUpdate::Set { set } => {
                debug!(?set, "state update without model");
                None
            }
            StreamUpdate::Unrecognized(frame) => {
                debug!(%frame, "unrecognized stream frame");
                None
            }
        }
    }

    /// Marks the request aborted by cancellation; `finish` still follows.
    pub fn abort(&mut self) {
        if self.state == AccumulatorState::Streaming {
            self.aborted = true;
        }
    }

    /// Moves to `Done`, returning the terminal update exactly once.
    pub fn finish(&mut self) -> Option<StreamingClientUpdate> {
        match self.state {
            AccumulatorState::Streaming => {
                self.state = AccumulatorState::Done;
                Some(StreamingClientUpdate::terminal())
            }
            AccumulatorState::Done => None,
        }
    }

    /// Whole-response view: transcript, origin and `typing: false`.
    pub fn snapshot(&self) -> StreamingClientUpdate {
        StreamingClientUpdate {
            text_so_far: Some(self.text.clone()),
            typing: Some(false),
            origin_llm: self.origin.clone(),
        }
    }
}

/// Drives `updates` to completion, reporting each client-visible change.
///
/// `on_update` receives `done = false` for every intermediate update and exactly one
/// final `{typing: false}` with `done = true`, whether the stream ended, was cancelled
/// or failed. Failures other than cancellation are logged and swallowed.
pub async fn consume_updates<S, F>(
    updates: S,
    cancel: &CancelHandle,
    mut on_update: F,
) -> StreamAccumulator
where
    S: Stream<Item = Result<StreamUpdate, LLMError>>,
    F: FnMut(StreamingClientUpdate, bool),
{
    let mut accumulator = StreamAccumulator::new();
    let mut updates = std::pin::pin!(updates);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("stream cancelled by caller");
                accumulator.abort();
                break;
            }
            next = updates.next() => next,
        };
        match next {
            None => break,
            Some(Ok(update)) => {
                if let Some(client_update) = accumulator.apply(update) {
                    on_update(client_update, false);
                }
            }
            Some(Err(err)) if err.is_cancelled() => {
                debug!(error = %err, "stream cancelled");
                accumulator.abort();
                break;
            }
            Some(Err(err)) => {
                error!(error = %err, "stream fault");
                break;
            }
        }
    }

    if let Some(terminal) = accumulator.finish() {
        on_update(terminal, true);
    }
    accumulator
}
