use std::convert::Infallible;
use std::time::Instant;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::observability::log_request_complete;
use crate::observability::token_counter::placeholder_tokens;
use crate::protocol::openai_chat::response_encoder::encode_chat_chunk;
use crate::protocol::openai_chat::ChatUsage;

use super::decoder::DecodedFrame;
use super::sse::{done_frame, error_frame, openai_sse_frame};

/// Per-request values stamped onto every relayed chunk.
#[derive(Debug, Clone)]
pub struct RelayContext {
    pub model: String,
    pub created: u64,
    pub prompt_tokens: u64,
    pub started: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Relaying,
    Finished,
    Failed,
}

/// Tracks relay progress; logs completion or abort when dropped.
struct RelayGuard {
    ctx: RelayContext,
    chunks: u64,
    completion_tokens: u64,
    outcome: Outcome,
}

impl Drop for RelayGuard {
    fn drop(&mut self) {
        match self.outcome {
            Outcome::Finished => {
                let usage = ChatUsage {
                    prompt_tokens: self.ctx.prompt_tokens,
                    completion_tokens: self.completion_tokens,
                    total_tokens: self.ctx.prompt_tokens + self.completion_tokens,
                };
                log_request_complete(&self.ctx.model, true, &usage, self.ctx.started);
            }
            Outcome::Relaying => debug!(
                model = %self.ctx.model,
                chunks = self.chunks,
                "stream relay dropped before completion (caller disconnected)"
            ),
            Outcome::Failed => {}
        }
    }
}

struct RelayState<S> {
    frames: std::pin::Pin<Box<S>>,
    guard: RelayGuard,
}

/// Re-frame decoded backend frames as caller-facing SSE bytes.
///
/// One `chat.completion.chunk` per backend frame, in order, then exactly one
/// `data: [DONE]` when the backend finishes (marker or end-of-stream). A
/// decoder error is reported as one error frame and ends the stream without
/// `[DONE]`. Dropping the returned stream drops the backend stream with it.
pub fn relay_frames<S>(
    frames: S,
    ctx: RelayContext,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send
where
    S: Stream<Item = Result<DecodedFrame, RelayError>> + Send + 'static,
{
    let state = Some(RelayState {
        frames: Box::pin(frames),
        guard: RelayGuard {
            ctx,
            chunks: 0,
            completion_tokens: 0,
            outcome: Outcome::Relaying,
        },
    });

    futures_util::stream::unfold(state, |state| async move {
        let mut state = state?;
        match state.frames.next().await {
            Some(Ok(DecodedFrame::Frame(frame))) => {
                let ctx = &state.guard.ctx;
                let chunk = encode_chat_chunk(&frame, &ctx.model, ctx.created);
                match serde_json::to_string(&chunk) {
                    Ok(json) => {
                        state.guard.chunks += 1;
                        state.guard.completion_tokens += placeholder_tokens(frame.text());
                        Some((Ok(Bytes::from(openai_sse_frame(&json))), Some(state)))
                    }
                    Err(e) => {
                        let err = RelayError::Internal(format!("failed to encode chunk: {e}"));
                        warn!(error = %err, "stream relay aborted");
                        state.guard.outcome = Outcome::Failed;
                        Some((Ok(error_frame(&err)), None))
                    }
                }
            }
            Some(Ok(DecodedFrame::Done)) | None => {
                state.guard.outcome = Outcome::Finished;
                Some((Ok(done_frame()), None))
            }
            Some(Err(err)) => {
                warn!(
                    error = %err,
                    status = err.status().as_u16(),
                    "backend stream failed mid-relay"
                );
                state.guard.outcome = Outcome::Failed;
                Some((Ok(error_frame(&err)), None))
            }
        }
    })
}
