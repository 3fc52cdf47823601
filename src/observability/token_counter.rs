use std::time::Duration;
use tracing::info;

use crate::protocol::openai_chat::ChatUsage;

/// Placeholder token count: the number of Unicode scalar values in `text`.
///
/// The backend reports no usage, so character length stands in for a real
/// tokenizer.
#[must_use]
pub fn placeholder_tokens(text: &str) -> u64 {
    text.chars().count() as u64
}

#[must_use]
pub fn placeholder_usage(prompt: &str, completion: &str) -> ChatUsage {
    let prompt_tokens = placeholder_tokens(prompt);
    let completion_tokens = placeholder_tokens(completion);
    ChatUsage {
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens + completion_tokens,
    }
}

/// Log placeholder usage for a completed request at INFO level.
pub fn log_request_usage(model: &str, stream: bool, usage: &ChatUsage, duration: Duration) {
    info!(
        model = model,
        stream = stream,
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        total_tokens = usage.total_tokens,
        duration_seconds = duration.as_secs_f64(),
        "request completed"
    );
}
