//! Backend stream handling: decode backend lines, then either fold them into
//! one answer or re-frame them as caller-facing SSE chunks.

pub mod aggregate;
pub mod decoder;
pub mod relay;
pub mod sse;

pub use aggregate::{aggregate_frames, Aggregate};
pub use decoder::{decode_frames, DecodedFrame, LineDecoder};
pub use relay::{relay_frames, RelayContext};
