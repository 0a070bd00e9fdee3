use serde::{Deserialize, Serialize};

/// Sampling options forwarded verbatim in the chat request's `options`
/// object. Ranges are the caller's business.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirostat_tau: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i32>,
}

impl OllamaOptions {
    /// Slider defaults of the chat page.
    pub fn chat_defaults() -> Self {
        Self {
            temperature: Some(0.7),
            top_p: Some(0.9),
            top_k: Some(40),
            mirostat_tau: Some(5.0),
            num_ctx: Some(4096),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_fields_are_omitted() {
        let json = serde_json::to_value(OllamaOptions {
            temperature: Some(0.5),
            ..Default::default()
        })
        .expect("serialize");
        assert_eq!(json, serde_json::json!({ "temperature": 0.5 }));
    }

    #[test]
    fn test_chat_defaults() {
        let json = serde_json::to_value(OllamaOptions::chat_defaults()).expect("serialize");
        assert_eq!(json["top_k"], 40);
        assert_eq!(json["num_ctx"], 4096);
        assert_eq!(json["mirostat_tau"], 5.0);
        assert!(json.get("seed").is_none());
    }
}
