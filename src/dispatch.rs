//! Turns one generic chat request into a stream of uniform updates.
//!
//! The dispatcher owns the HTTP leg: it asks the dialect for a prepared request,
//! opens the vendor stream, frames SSE events and feeds every `data:` payload to the
//! dialect's parser. Problems the caller should read about become `Issue` frames;
//! only transport failures and cancellation surface as `Err` items.

use std::pin::Pin;

use async_stream::stream;
use futures_core::Stream;
use futures_util::StreamExt;
use tracing::{debug, warn};

use crate::cancel::CancelHandle;
use crate::error::LLMError;
use crate::http::{DynHttpTransport, HttpStreamResponse, read_body_text};
use crate::intake::{IntakeAccess, IntakeContext, IntakeModel};
use crate::provider::retry::retry_after_from_headers;
use crate::provider::{PreparedRequest, prepare_request};
use crate::stream::{SseDecoder, SseEvent};
use crate::types::{ChatGenerateRequest, IssueKind, StreamUpdate};

/// Lazily evaluated sequence of uniform updates for one request.
pub type UpdateStream = Pin<Box<dyn Stream<Item = Result<StreamUpdate, LLMError>> + Send>>;

/// Vendor-agnostic dispatcher over an [`crate::http::HttpTransport`].
#[derive(Clone)]
pub struct Dispatcher {
    transport: DynHttpTransport,
}

impl Dispatcher {
    pub fn new(transport: DynHttpTransport) -> Self {
        Self { transport }
    }

    /// Streams the vendor's answer as uniform updates.
    ///
    /// Nothing is prepared or sent until the stream is first polled. The stream is
    /// finite and yields at most one `Err`, after which it ends:
    ///
    /// - [`LLMError::Cancelled`] once `cancel` fires; the HTTP body is dropped.
    /// - [`LLMError::Transport`] when the connection or body read fails.
    ///
    /// Translation failures, non-success statuses and unparseable frames are reported
    /// as `dispatch-prepare`, `dispatch-fetch` and `dispatch-parse` issues instead.
    pub fn dispatch(
        &self,
        access: IntakeAccess,
        model: IntakeModel,
        request: ChatGenerateRequest,
        context: IntakeContext,
        cancel: CancelHandle,
    ) -> UpdateStream {
        let transport = self.transport.clone();

        Box::pin(stream! {
            let prepared = match prepare_request(&access, &model, &request, true) {
                Ok(prepared) => prepared,
                Err(err) => {
                    warn!(
                        model = %model.id,
                        context = context.name.as_str(),
                        error = %err,
                        "failed to prepare vendor request"
                    );
                    yield Ok(prepare_issue(&err));
                    return;
                }
            };
            let PreparedRequest {
                request: http_request,
                mut parser,
                classify_error,
                dialect,
            } = prepared;
            debug!(dialect, url = %http_request.url, "opening vendor stream");

            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = transport.send_stream(http_request) => Some(result),
            };
            let HttpStreamResponse { status, headers, body } = match opened {
                None => {
                    yield Err(LLMError::cancelled("while opening the vendor stream"));
                    return;
                }
                Some(Err(err)) => {
                    yield Err(err);
                    return;
                }
                Some(Ok(response)) => response,
            };

            if !(200..300).contains(&status) {
                let retry_after = retry_after_from_headers(&headers);
                let text = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    text = read_body_text(body) => Some(text),
                };
                match text {
                    None => {
                        yield Err(LLMError::cancelled("while reading the error body"));
                    }
                    Some(Err(err)) => {
                        yield Err(err);
                    }
                    Some(Ok(text)) => {
                        let err = classify_error(status, &text, retry_after);
                        warn!(dialect, status, error = %err, "vendor rejected the request");
                        yield Ok(StreamUpdate::issue(
                            IssueKind::DispatchFetch,
                            format!("{status}: {err}"),
                        ));
                    }
                }
                return;
            }

            let mut events = SseDecoder::new(body, dialect);
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    event = events.next() => Some(event),
                };
                let payload = match next {
                    None => {
                        yield Err(LLMError::cancelled("during the vendor stream"));
                        return;
                    }
                    Some(None) | Some(Some(Ok(SseEvent::Done))) => break,
                    Some(Some(Ok(SseEvent::Data(payload)))) => payload,
                    Some(Some(Err(err @ LLMError::Transport { .. }))) => {
                        yield Err(err);
                        return;
                    }
                    Some(Some(Err(err))) => {
                        warn!(dialect, error = %err, "undecodable vendor frame");
                        yield Ok(parse_issue(&err));
                        return;
                    }
                };

                match parser.parse_chunk(&payload) {
                    Ok(updates) => {
                        for update in updates {
                            yield Ok(update);
                        }
                    }
                    Err(err) => {
                        warn!(dialect, error = %err, "failed to parse vendor frame");
                        yield Ok(parse_issue(&err));
                        return;
                    }
                }

                if parser.is_terminated() {
                    debug!(dialect, "vendor reported a terminal condition");
                    break;
                }
            }
        })
    }

    /// Single-shot variant: one non-streaming vendor call folded through the same
    /// dialect parser.
    ///
    /// Issues are returned inline like in [`Dispatcher::dispatch`].
    ///
    /// # Errors
    ///
    /// [`LLMError::Cancelled`] when `cancel` fires first, [`LLMError::Transport`] when
    /// the vendor cannot be reached.
    pub async fn generate(
        &self,
        access: &IntakeAccess,
        model: &IntakeModel,
        request: &ChatGenerateRequest,
        context: &IntakeContext,
        cancel: &CancelHandle,
    ) -> Result<Vec<StreamUpdate>, LLMError> {
        let PreparedRequest {
            request: http_request,
            mut parser,
            classify_error,
            dialect,
        } = match prepare_request(access, model, request, false) {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!(
                    model = %model.id,
                    context = context.name.as_str(),
                    error = %err,
                    "failed to prepare vendor request"
                );
                return Ok(vec![prepare_issue(&err)]);
            }
        };

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LLMError::cancelled("while waiting for the vendor")),
            response = self.transport.send(http_request) => response?,
        };
        let status = response.status;
        let success = response.is_success();
        let retry_after = retry_after_from_headers(&response.headers);
        let text = response.into_string()?;

        if !success {
            let err = classify_error(status, &text, retry_after);
            warn!(dialect, status, error = %err, "vendor rejected the request");
            return Ok(vec![StreamUpdate::issue(
                IssueKind::DispatchFetch,
                format!("{status}: {err}"),
            )]);
        }

        match parser.parse_chunk(&text) {
            Ok(updates) => Ok(updates),
            Err(err) => {
                warn!(dialect, error = %err, "failed to parse vendor response");
                Ok(vec![parse_issue(&err)])
            }
        }
    }
}

fn prepare_issue(err: &LLMError) -> StreamUpdate {
    StreamUpdate::issue(
        IssueKind::DispatchPrepare,
        format!("Could not prepare the vendor request: {err}"),
    )
}

fn parse_issue(err: &LLMError) -> StreamUpdate {
    StreamUpdate::issue(
        IssueKind::DispatchParse,
        format!("Could not parse the vendor response: {err}"),
    )
}
