//! Chat model abstraction and the Gemini implementation.
//!
//! The conversation engine only needs single-turn text completion: it
//! assembles history, context and question into one prompt itself. A
//! [`ChatModel`] therefore takes a prompt string and returns the reply.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::{LlmConfig, Secrets};
use crate::error::{ConfigError, LlmError};

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Send `prompt` as a single user turn and return the reply text.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

// ============ Gemini ============

const GEMINI_PROVIDER: &str = "gemini";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini over the `generateContent` REST endpoint.
///
/// Authenticates with `GOOGLE_API_KEY` in the `x-goog-api-key` header.
pub struct GeminiChat {
    client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    base_url: String,
}

impl GeminiChat {
    pub fn new(config: &LlmConfig, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn request_body(&self, prompt: &str) -> Value {
        let mut body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }]
        });
        if let Some(temperature) = self.temperature {
            body["generationConfig"] = json!({ "temperature": temperature });
        }
        body
    }
}

#[async_trait]
impl ChatModel for GeminiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|source| LlmError::Transport {
                provider: GEMINI_PROVIDER,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                provider: GEMINI_PROVIDER,
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = response.json().await.map_err(|source| LlmError::Transport {
            provider: GEMINI_PROVIDER,
            source,
        })?;
        parse_gemini_response(&json)
    }
}

/// Concatenate the text parts of the first candidate.
fn parse_gemini_response(json: &Value) -> Result<String, LlmError> {
    let candidate = json.pointer("/candidates/0");

    let text: String = candidate
        .and_then(|c| c.pointer("/content/parts"))
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate
            .and_then(|c| c.get("finishReason"))
            .or_else(|| json.pointer("/promptFeedback/blockReason"))
            .and_then(|r| r.as_str())
            .unwrap_or("unknown");
        return Err(LlmError::Empty(reason.to_string()));
    }

    Ok(text)
}

/// Create the [`ChatModel`] named by `llm.provider`.
pub fn create_chat_model(
    config: &LlmConfig,
    secrets: &Secrets,
) -> Result<Arc<dyn ChatModel>, ConfigError> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiChat::new(config, secrets.llm_api_key.clone()))),
        other => Err(ConfigError::Invalid(format!(
            "Unknown llm provider: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_joins_parts() {
        let json = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{"text": "The entry point "}, {"text": "is main.py."}]
                },
                "finishReason": "STOP"
            }]
        });
        assert_eq!(
            parse_gemini_response(&json).unwrap(),
            "The entry point is main.py."
        );
    }

    #[test]
    fn test_parse_empty_reports_finish_reason() {
        let json = json!({
            "candidates": [{"content": {"parts": []}, "finishReason": "SAFETY"}]
        });
        let err = parse_gemini_response(&json).unwrap_err();
        assert!(matches!(err, LlmError::Empty(ref r) if r == "SAFETY"));
    }

    #[test]
    fn test_parse_blocked_prompt() {
        let json = json!({"promptFeedback": {"blockReason": "OTHER"}});
        let err = parse_gemini_response(&json).unwrap_err();
        assert!(err.to_string().contains("OTHER"));
    }

    #[test]
    fn test_request_body_temperature() {
        let mut config = LlmConfig::default();
        let plain = GeminiChat::new(&config, "k".to_string()).request_body("hi");
        assert_eq!(plain["contents"][0]["parts"][0]["text"], "hi");
        assert!(plain.get("generationConfig").is_none());

        config.temperature = Some(0.2);
        let tuned = GeminiChat::new(&config, "k".to_string()).request_body("hi");
        let t = tuned["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((t - 0.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let chat = GeminiChat::new(&LlmConfig::default(), "k".to_string())
            .with_base_url("http://127.0.0.1:9");
        let err = chat.complete("hello").await.unwrap_err();
        assert!(matches!(err, LlmError::Transport { .. }));
    }
}
