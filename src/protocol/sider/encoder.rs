use bytes::Bytes;

use crate::config::BackendConfig;
use crate::error::RelayError;
use crate::protocol::openai_chat::ChatCompletionRequest;

use super::{BackendRequestBody, BackendTemplate};

/// Builds backend request bodies from caller requests.
///
/// Holds the immutable template and fallback values; one instance is shared
/// by all requests.
#[derive(Debug, Clone)]
pub struct RequestTranslator {
    template: BackendTemplate,
    default_model: String,
    default_prompt: String,
}

/// Result of translating one caller request.
#[derive(Debug, Clone)]
pub struct TranslatedRequest {
    pub prompt: String,
    pub model: String,
    pub stream: bool,
    pub body: Bytes,
}

impl RequestTranslator {
    #[must_use]
    pub fn new(backend: &BackendConfig) -> Self {
        Self {
            template: backend.template.clone(),
            default_model: backend.default_model.clone(),
            default_prompt: backend.default_prompt.clone(),
        }
    }

    #[must_use]
    pub fn template(&self) -> &BackendTemplate {
        &self.template
    }

    /// Effective prompt: content of the last message, or the default prompt.
    #[must_use]
    pub fn effective_prompt(&self, request: &ChatCompletionRequest) -> String {
        match request.last_message_text() {
            Some(text) => text.into_owned(),
            None => self.default_prompt.clone(),
        }
    }

    #[must_use]
    pub fn effective_model<'a>(&'a self, request: &'a ChatCompletionRequest) -> &'a str {
        if request.model.is_empty() {
            &self.default_model
        } else {
            &request.model
        }
    }

    /// Translate `request` into a serialized backend body.
    ///
    /// `stream` is the already-resolved stream flag; deployment overrides are
    /// applied by the caller before this point.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when the template cannot be serialized.
    pub fn translate(
        &self,
        request: &ChatCompletionRequest,
        stream: bool,
    ) -> Result<TranslatedRequest, RelayError> {
        let prompt = self.effective_prompt(request);
        let model = self.effective_model(request).to_string();

        let body = BackendRequestBody {
            template: &self.template,
            prompt: &prompt,
            model: &model,
            stream,
        };
        let body = serde_json::to_vec(&body)
            .map_err(|e| RelayError::Config(format!("backend template is not serializable: {e}")))?;

        Ok(TranslatedRequest {
            prompt,
            model,
            stream,
            body: Bytes::from(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::openai_chat::{ChatContent, ChatMessage};

    fn translator() -> RequestTranslator {
        RequestTranslator::new(&BackendConfig::default())
    }

    fn body_json(translated: &TranslatedRequest) -> serde_json::Value {
        serde_json::from_slice(&translated.body).unwrap()
    }

    fn message(role: &str, content: &str) -> ChatMessage {
        ChatMessage {
            role: role.to_string(),
            content: ChatContent::Text(content.to_string()),
        }
    }

    #[test]
    fn test_empty_request_uses_defaults() {
        let translated = translator()
            .translate(&ChatCompletionRequest::default(), false)
            .unwrap();
        assert_eq!(translated.prompt, "你好");
        assert_eq!(translated.model, "gpt-4o");

        let body = body_json(&translated);
        assert_eq!(body["prompt"], "你好");
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_last_message_is_prompt_for_any_history() {
        let translator = translator();
        let history = ["first", "", "third message", "日本語", "  padded  "];
        for len in 1..=history.len() {
            let request = ChatCompletionRequest {
                messages: history[..len]
                    .iter()
                    .enumerate()
                    .map(|(i, text)| message(if i % 2 == 0 { "user" } else { "assistant" }, text))
                    .collect(),
                model: "o1".to_string(),
                stream: true,
                max_tokens: None,
            };
            let translated = translator.translate(&request, true).unwrap();
            assert_eq!(translated.prompt, history[len - 1]);
            assert_eq!(body_json(&translated)["prompt"], history[len - 1]);
        }
    }

    #[test]
    fn test_overlay_keeps_template_keys() {
        let request = ChatCompletionRequest {
            messages: vec![message("user", "hello")],
            model: "claude-3.5-sonnet".to_string(),
            stream: true,
            max_tokens: Some(100),
        };
        let translated = translator().translate(&request, true).unwrap();
        let body = body_json(&translated);
        let object = body.as_object().unwrap();

        let template = serde_json::to_value(BackendTemplate::default()).unwrap();
        for (key, value) in template.as_object().unwrap() {
            assert_eq!(&object[key], value, "template key {key} changed");
        }
        assert_eq!(object.len(), template.as_object().unwrap().len() + 3);
        assert_eq!(body["model"], "claude-3.5-sonnet");
        assert_eq!(body["stream"], true);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_stream_flag_comes_from_argument() {
        let request = ChatCompletionRequest {
            stream: true,
            ..ChatCompletionRequest::default()
        };
        let translated = translator().translate(&request, false).unwrap();
        assert!(!translated.stream);
        assert_eq!(body_json(&translated)["stream"], false);
    }
}
