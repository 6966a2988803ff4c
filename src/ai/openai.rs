//! Client for OpenAI-compatible `chat/completions` endpoints.

use super::{AiError, LlmClient, http_client};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;

pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(
        base_url: String,
        model: String,
        api_key: Option<String>,
        temperature: f32,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, AiError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url,
            model,
            api_key,
            temperature,
            max_tokens,
        })
    }

    fn endpoint(&self) -> String {
        if self.base_url.ends_with('/') {
            format!("{}chat/completions", self.base_url)
        } else {
            format!("{}/chat/completions", self.base_url)
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, system: &str, user: &str) -> Result<String, AiError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": system
                },
                {
                    "role": "user",
                    "content": user
                }
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Api { status, body });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| AiError::InvalidResponse(format!("failed to parse JSON: {}", e)))?;

        json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AiError::InvalidResponse("missing choices[0].message.content".to_string()))
    }

    fn provider(&self) -> &'static str {
        "openai"
    }
}
