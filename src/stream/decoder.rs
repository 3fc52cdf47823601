//! Backend stream decoder.
//!
//! The backend answers with newline-delimited, optionally `data:`-prefixed
//! JSON objects and may end with a literal `[DONE]`. Network reads do not
//! align with lines, so bytes are buffered until a newline arrives.

use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use memchr::memchr_iter;
use smallvec::SmallVec;
use tracing::debug;

use crate::error::RelayError;
use crate::protocol::sider::BackendFrame;

/// One logical item of the backend stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedFrame {
    Frame(BackendFrame),
    /// The backend sent `[DONE]`; nothing after it is read.
    Done,
}

struct PendingFrames {
    frames: SmallVec<[Option<DecodedFrame>; 8]>,
    head: usize,
}

impl PendingFrames {
    #[inline]
    fn new() -> Self {
        Self {
            frames: SmallVec::new(),
            head: 0,
        }
    }

    #[inline]
    fn pop_front(&mut self) -> Option<DecodedFrame> {
        if self.head >= self.frames.len() {
            return None;
        }
        let frame = self.frames[self.head].take();
        self.head += 1;
        if self.head == self.frames.len() {
            self.clear();
        }
        frame
    }

    #[inline]
    fn extend_from_vec(&mut self, parsed: &mut Vec<DecodedFrame>) {
        if parsed.is_empty() {
            return;
        }
        self.frames.reserve(parsed.len());
        self.frames.extend(parsed.drain(..).map(Some));
    }

    #[inline]
    fn clear(&mut self) {
        self.frames.clear();
        self.head = 0;
    }
}

/// Incremental line decoder for the backend stream.
///
/// Feed it raw byte chunks in arbitrary boundaries; it yields one
/// [`DecodedFrame`] per recognised line. After `[DONE]` all further input is
/// ignored.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    read_offset: usize,
    done: bool,
}

impl LineDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed raw bytes and append complete frames into `out`.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut Vec<DecodedFrame>) {
        if self.done {
            return;
        }
        self.buffer.extend_from_slice(chunk);
        let scan_start = self.read_offset;
        let mut processed_up_to = scan_start;
        for rel_pos in memchr_iter(b'\n', &self.buffer[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let decoded = decode_line(&self.buffer[processed_up_to..line_end]);
            processed_up_to = line_end + 1;
            if let Some(frame) = decoded {
                self.done = frame == DecodedFrame::Done;
                out.push(frame);
                if self.done {
                    break;
                }
            }
        }

        if self.done {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }

    /// Decode whatever is left after end-of-stream as a final line.
    pub fn finish_into(&mut self, out: &mut Vec<DecodedFrame>) {
        if !self.done && self.read_offset < self.buffer.len() {
            if let Some(frame) = decode_line(&self.buffer[self.read_offset..]) {
                if frame == DecodedFrame::Done {
                    self.done = true;
                }
                out.push(frame);
            }
        }
        self.buffer.clear();
        self.read_offset = 0;
    }
}

/// Decode a single backend line (without its trailing `\n`).
///
/// Blank, undecodable and non-frame lines yield `None`.
#[must_use]
pub fn decode_line(raw: &[u8]) -> Option<DecodedFrame> {
    let Ok(line) = std::str::from_utf8(raw) else {
        debug!(len = raw.len(), "skipping backend line with invalid UTF-8");
        return None;
    };
    let line = line.trim();
    let payload = line.strip_prefix("data:").map_or(line, str::trim);
    if payload.is_empty() {
        return None;
    }
    if payload == "[DONE]" {
        return Some(DecodedFrame::Done);
    }
    match serde_json::from_str::<BackendFrame>(payload) {
        Ok(frame) => Some(DecodedFrame::Frame(frame)),
        Err(e) => {
            debug!(error = %e, line = payload, "skipping unparseable backend line");
            None
        }
    }
}

struct DecodeState<S> {
    stream: std::pin::Pin<Box<S>>,
    decoder: LineDecoder,
    parsed: Vec<DecodedFrame>,
    pending: PendingFrames,
    idle_timeout: Option<Duration>,
    finished: bool,
}

/// Turn a backend byte stream into a lazy stream of decoded frames.
///
/// The stream ends after `[DONE]` or at end-of-stream. A read error, or no
/// bytes arriving within `idle_timeout`, yields one `Err` and then ends.
pub fn decode_frames<S, E>(
    byte_stream: S,
    idle_timeout: Option<Duration>,
) -> impl Stream<Item = Result<DecodedFrame, RelayError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = DecodeState {
        stream: Box::pin(byte_stream),
        decoder: LineDecoder::new(),
        parsed: Vec::with_capacity(8),
        pending: PendingFrames::new(),
        idle_timeout,
        finished: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(frame) = state.pending.pop_front() {
                if frame == DecodedFrame::Done {
                    state.pending.clear();
                    state.finished = true;
                }
                return Some((Ok(frame), state));
            }
            if state.finished {
                return None;
            }

            let next = match state.idle_timeout {
                Some(limit) => {
                    if let Ok(next) = tokio::time::timeout(limit, state.stream.next()).await {
                        next
                    } else {
                        state.finished = true;
                        let err = RelayError::Transport(format!(
                            "backend stream idle for more than {}s",
                            limit.as_secs()
                        ));
                        return Some((Err(err), state));
                    }
                }
                None => state.stream.next().await,
            };

            match next {
                Some(Ok(bytes)) => {
                    state.decoder.feed_into(&bytes, &mut state.parsed);
                    state.pending.extend_from_vec(&mut state.parsed);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    let err = RelayError::Transport(format!("backend stream read failed: {e}"));
                    return Some((Err(err), state));
                }
                None => {
                    state.decoder.finish_into(&mut state.parsed);
                    state.pending.extend_from_vec(&mut state.parsed);
                    state.finished = true;
                }
            }
        }
    })
}
