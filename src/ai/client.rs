use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::AiConfig;

use super::AiError;

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// A chat model that answers with a single JSON object.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete_json(&self, prompt: &Prompt) -> Result<Value, AiError>;
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiClient {
    http: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: &AiConfig) -> Result<Self, AiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete_json(&self, prompt: &Prompt) -> Result<Value, AiError> {
        let api_key = self.api_key.as_deref().ok_or(AiError::NotConfigured)?;

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user }
            ],
            "response_format": { "type": "json_object" },
            "temperature": 0.3,
            "stream": false
        });

        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport)?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(AiError::Status { status, body });
        }

        let response_json: Value = resp.json().await.map_err(map_transport)?;
        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AiError::Malformed("missing choices[0].message.content".into()))?;

        tracing::debug!(model = %self.model, "AI completion received");
        parse_content(content)
    }
}

fn map_transport(e: reqwest::Error) -> AiError {
    if e.is_timeout() {
        AiError::Timeout
    } else {
        AiError::Transport(e)
    }
}

/// The message content must be a JSON object, optionally inside a code fence.
pub(crate) fn parse_content(content: &str) -> Result<Value, AiError> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    match serde_json::from_str::<Value>(unfenced) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(AiError::Schema("expected a JSON object".into())),
        Err(e) => Err(AiError::Malformed(e.to_string())),
    }
}
