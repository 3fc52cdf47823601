use futures_util::{Stream, StreamExt};

use crate::error::RelayError;

use super::decoder::DecodedFrame;

/// Result of folding a whole backend stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregate {
    pub text: String,
    /// Number of backend frames folded in, empty ones included.
    pub frames: usize,
    /// Last non-empty `chat_model` reported by the backend.
    pub backend_model: Option<String>,
    pub saw_done: bool,
}

/// Consume every decoded frame and concatenate the text fragments.
///
/// Nothing is produced until the frame stream ends.
///
/// # Errors
///
/// Returns the first error yielded by the frame stream.
pub async fn aggregate_frames<S>(frames: S) -> Result<Aggregate, RelayError>
where
    S: Stream<Item = Result<DecodedFrame, RelayError>>,
{
    let mut frames = std::pin::pin!(frames);
    let mut aggregate = Aggregate::default();

    while let Some(item) = frames.next().await {
        match item? {
            DecodedFrame::Frame(frame) => {
                aggregate.frames += 1;
                aggregate.text.push_str(frame.text());
                if !frame.chat_model().is_empty() {
                    aggregate.backend_model = Some(frame.data.chat_model);
                }
            }
            DecodedFrame::Done => {
                aggregate.saw_done = true;
                break;
            }
        }
    }

    Ok(aggregate)
}
