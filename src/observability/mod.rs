pub mod token_counter;

use crate::protocol::openai_chat::ChatUsage;
use tracing_subscriber::EnvFilter;

/// Map a configured log level onto a tracing filter directive.
///
/// Returns `None` for "DISABLED". "WARNING" becomes WARN and "CRITICAL"
/// becomes ERROR; the rest map directly.
#[must_use]
pub fn filter_directive(log_level: &str) -> Option<String> {
    let level = log_level.to_uppercase();
    match level.as_str() {
        "DISABLED" => None,
        "WARNING" => Some("WARN".to_string()),
        "CRITICAL" => Some("ERROR".to_string()),
        _ => Some(level),
    }
}

/// Initialize the tracing subscriber with the configured log level.
pub fn init_tracing(log_level: &str) {
    let Some(directive) = filter_directive(log_level) else {
        return;
    };

    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("INFO"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Log usage for a completed request, computing duration from start time.
pub fn log_request_complete(
    model: &str,
    stream: bool,
    usage: &ChatUsage,
    start_time: std::time::Instant,
) {
    token_counter::log_request_usage(model, stream, usage, start_time.elapsed());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_mapping() {
        assert_eq!(filter_directive("warning").as_deref(), Some("WARN"));
        assert_eq!(filter_directive("CRITICAL").as_deref(), Some("ERROR"));
        assert_eq!(filter_directive("debug").as_deref(), Some("DEBUG"));
        assert_eq!(filter_directive("DISABLED"), None);
    }
}
