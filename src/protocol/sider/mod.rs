//! Wire types for the Sider completion backend.

pub mod encoder;

use serde::{Deserialize, Serialize};

use super::null_as_default;

/// Names of the fields overlaid on the template for every request.
pub const OVERLAY_FIELDS: [&str; 3] = ["prompt", "model", "stream"];

/// Fixed part of every backend request body.
///
/// Defaults reproduce the browser-extension client identity the backend
/// expects. Keys not modelled here can be supplied through `extra` and are
/// forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendTemplate {
    pub app_name: String,
    pub app_version: String,
    pub tz_name: String,
    pub cid: String,
    pub search: bool,
    pub auto_search: bool,
    pub filter_search_history: bool,
    pub from: String,
    pub group_id: String,
    pub chat_models: Vec<String>,
    pub files: Vec<serde_json::Value>,
    pub prompt_templates: Vec<PromptTemplate>,
    pub tools: TemplateTools,
    pub extra_info: ExtraInfo,
    pub branch: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for BackendTemplate {
    fn default() -> Self {
        Self {
            app_name: "ChitChat_Edge_Ext".to_string(),
            app_version: "4.40.0".to_string(),
            tz_name: "Asia/Shanghai".to_string(),
            cid: String::new(),
            search: false,
            auto_search: false,
            filter_search_history: false,
            from: "chat".to_string(),
            group_id: "default".to_string(),
            chat_models: Vec::new(),
            files: Vec::new(),
            prompt_templates: vec![
                PromptTemplate {
                    key: "artifacts".to_string(),
                    attributes: serde_json::Map::from_iter([(
                        "lang".to_string(),
                        serde_json::Value::String("original".to_string()),
                    )]),
                },
                PromptTemplate {
                    key: "thinking_mode".to_string(),
                    attributes: serde_json::Map::new(),
                },
            ],
            tools: TemplateTools::default(),
            extra_info: ExtraInfo::default(),
            branch: true,
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub key: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// Tool names the backend may pick automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateTools {
    pub auto: Vec<String>,
}

impl Default for TemplateTools {
    fn default() -> Self {
        Self {
            auto: vec![
                "search".to_string(),
                "text_to_image".to_string(),
                "data_analysis".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtraInfo {
    pub origin_url: String,
    pub origin_title: String,
}

impl Default for ExtraInfo {
    fn default() -> Self {
        Self {
            origin_url: "chrome-extension://dhoenijjpgpeimemopealfcbiecgceod/standalone.html?from=sidebar"
                .to_string(),
            origin_title: "Sider".to_string(),
        }
    }
}

/// Template plus the three per-request fields, serialized as one flat object.
#[derive(Debug, Serialize)]
pub struct BackendRequestBody<'a> {
    #[serde(flatten)]
    pub template: &'a BackendTemplate,
    pub prompt: &'a str,
    pub model: &'a str,
    pub stream: bool,
}

/// One decoded event from the backend stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BackendFrame {
    #[serde(default, deserialize_with = "null_as_default")]
    pub code: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub msg: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: BackendFrameData,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BackendFrameData {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub chat_model: String,
}

impl BackendFrame {
    #[must_use]
    pub fn text(&self) -> &str {
        &self.data.text
    }

    #[must_use]
    pub fn chat_model(&self) -> &str {
        &self.data.chat_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_key_set() {
        let value = serde_json::to_value(BackendTemplate::default()).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 15);
        assert_eq!(object["app_name"], "ChitChat_Edge_Ext");
        assert_eq!(object["tools"]["auto"][1], "text_to_image");
        assert_eq!(object["prompt_templates"][0]["attributes"]["lang"], "original");
        assert_eq!(object["extra_info"]["origin_title"], "Sider");
        assert_eq!(object["branch"], true);
    }

    #[test]
    fn test_default_template_has_no_extra_keys() {
        let template = BackendTemplate::default();
        assert!(template.extra.is_empty());
        for field in OVERLAY_FIELDS {
            assert!(serde_json::to_value(&template).unwrap().get(field).is_none());
        }
    }

    #[test]
    fn test_template_extra_keys_round_trip_verbatim() {
        let template: BackendTemplate =
            serde_json::from_str(r#"{"app_version":"5.0.0","think_mode":{"enable":false}}"#)
                .unwrap();
        assert_eq!(template.app_version, "5.0.0");
        assert_eq!(template.app_name, "ChitChat_Edge_Ext");
        assert_eq!(template.extra["think_mode"]["enable"], false);

        let value = serde_json::to_value(&template).unwrap();
        assert_eq!(value["think_mode"], serde_json::json!({"enable": false}));
    }

    #[test]
    fn test_parse_frame() {
        let frame: BackendFrame = serde_json::from_str(
            r#"{"code":0,"msg":"ok","data":{"type":"text","text":"Hi","chat_model":"gpt-4o"}}"#,
        )
        .unwrap();
        assert_eq!(frame.code, 0);
        assert_eq!(frame.msg, "ok");
        assert_eq!(frame.data.kind, "text");
        assert_eq!(frame.text(), "Hi");
        assert_eq!(frame.chat_model(), "gpt-4o");
    }

    #[test]
    fn test_parse_frame_with_missing_and_null_fields() {
        let frame: BackendFrame = serde_json::from_str(r#"{"code":0,"data":null}"#).unwrap();
        assert_eq!(frame.text(), "");
        let frame: BackendFrame =
            serde_json::from_str(r#"{"data":{"text":null,"chat_model":"o1"}}"#).unwrap();
        assert_eq!(frame.text(), "");
        assert_eq!(frame.chat_model(), "o1");
    }

    #[test]
    fn test_non_object_frame_is_rejected() {
        assert!(serde_json::from_str::<BackendFrame>("[1,2]").is_err());
        assert!(serde_json::from_str::<BackendFrame>("\"ping\"").is_err());
    }
}
