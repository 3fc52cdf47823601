use chrono::{DateTime, Local};

use crate::observability::token_counter::placeholder_usage;
use crate::protocol::sider::BackendFrame;

use super::{
    ChatChoice, ChatCompletionChunk, ChatCompletionResponse, ChatResponseMessage, ChunkChoice,
    ChunkDelta,
};

const ID_PREFIX: &str = "chatcmpl-";

/// Completion id derived from the generation time, e.g. `chatcmpl-20240101093000`.
#[must_use]
pub fn completion_id_at(at: DateTime<Local>) -> String {
    format!("{ID_PREFIX}{}", at.format("%Y%m%d%H%M%S"))
}

/// Chunk id derived from the backend-reported model of the frame.
#[must_use]
pub fn chunk_id(chat_model: &str) -> String {
    format!("{ID_PREFIX}{chat_model}")
}

/// Encode the aggregated answer as a buffered `chat.completion` object.
#[must_use]
pub fn encode_chat_completion(
    text: String,
    prompt: &str,
    model: &str,
    at: DateTime<Local>,
) -> ChatCompletionResponse {
    let usage = placeholder_usage(prompt, &text);
    ChatCompletionResponse {
        id: completion_id_at(at),
        object: "chat.completion".to_string(),
        created: unix_secs(at),
        model: model.to_string(),
        choices: vec![ChatChoice {
            message: ChatResponseMessage {
                role: "assistant".to_string(),
                content: text,
            },
            finish_reason: "stop".to_string(),
            index: 0,
        }],
        usage,
    }
}

/// Encode one backend frame as a `chat.completion.chunk`.
///
/// `finish_reason` is always the empty string; the stream end is signalled
/// by the terminal `[DONE]` frame instead.
#[must_use]
pub fn encode_chat_chunk(frame: &BackendFrame, model: &str, created: u64) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: chunk_id(frame.chat_model()),
        object: "chat.completion.chunk".to_string(),
        created,
        model: model.to_string(),
        choices: vec![ChunkChoice {
            delta: ChunkDelta {
                content: frame.text().to_string(),
            },
            finish_reason: String::new(),
            index: 0,
        }],
    }
}

#[must_use]
pub fn unix_secs(at: DateTime<Local>) -> u64 {
    u64::try_from(at.timestamp()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    fn frame(text: &str, chat_model: &str) -> BackendFrame {
        serde_json::from_value(serde_json::json!({
            "code": 0,
            "msg": "ok",
            "data": {"type": "text", "text": text, "chat_model": chat_model}
        }))
        .unwrap()
    }

    #[test]
    fn test_completion_id_uses_timestamp() {
        assert_eq!(completion_id_at(fixed_time()), "chatcmpl-20240102030405");
    }

    #[test]
    fn test_encode_chat_completion_shape() {
        let resp = encode_chat_completion("Hi".to_string(), "你好", "gpt-4o", fixed_time());
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["object"], "chat.completion");
        assert_eq!(value["model"], "gpt-4o");
        assert_eq!(value["created"], unix_secs(fixed_time()));
        assert_eq!(value["choices"][0]["message"]["role"], "assistant");
        assert_eq!(value["choices"][0]["message"]["content"], "Hi");
        assert_eq!(value["choices"][0]["finish_reason"], "stop");
        assert_eq!(value["choices"][0]["index"], 0);
        assert_eq!(value["usage"]["prompt_tokens"], 2);
        assert_eq!(value["usage"]["completion_tokens"], 2);
        assert_eq!(value["usage"]["total_tokens"], 4);
    }

    #[test]
    fn test_encode_chunk_uses_backend_model_for_id() {
        let chunk = encode_chat_chunk(&frame("Hel", "claude-3.5-sonnet"), "claude", 7);
        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(value["id"], "chatcmpl-claude-3.5-sonnet");
        assert_eq!(value["object"], "chat.completion.chunk");
        assert_eq!(value["created"], 7);
        assert_eq!(value["model"], "claude");
        assert_eq!(value["choices"][0]["delta"]["content"], "Hel");
        assert_eq!(value["choices"][0]["finish_reason"], "");
    }

    #[test]
    fn test_encode_chunk_with_empty_text_keeps_empty_delta() {
        let chunk = encode_chat_chunk(&frame("", "gpt-4o"), "gpt-4o", 0);
        assert_eq!(chunk.choices[0].delta.content, "");
    }
}
