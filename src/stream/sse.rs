//! Caller-facing SSE wire helpers.

use bytes::Bytes;

use crate::error::{format_error, RelayError};

pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Format an OpenAI-style SSE frame (no event type, just data).
#[must_use]
pub fn openai_sse_frame(json: &str) -> String {
    let mut out = String::with_capacity(8 + json.len());
    out.push_str("data: ");
    out.push_str(json);
    out.push_str("\n\n");
    out
}

#[must_use]
pub fn done_frame() -> Bytes {
    Bytes::from_static(DONE_FRAME.as_bytes())
}

/// Format a mid-stream failure as a single `data: {"error":...}` frame.
#[must_use]
pub fn error_frame(err: &RelayError) -> Bytes {
    let (_, body) = format_error(err);
    Bytes::from(openai_sse_frame(&body.to_string()))
}
