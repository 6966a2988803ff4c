//! Google Gemini `generateContent` client.

use super::{AiError, LlmClient, http_client};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct GeminiRequest {
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: String,
}

pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
}

impl GeminiClient {
    pub fn new(
        base_url: String,
        model: String,
        api_key: String,
        temperature: f32,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, AiError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.trim().trim_start_matches("models/").to_string(),
            api_key,
            temperature,
            max_tokens,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(&self, system: &str, user: &str) -> Result<String, AiError> {
        let body = GeminiRequest {
            system_instruction: (!system.trim().is_empty()).then(|| GeminiContent {
                parts: vec![GeminiPart {
                    text: system.to_string(),
                }],
                role: None,
            }),
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: user.to_string(),
                }],
                role: Some("user".to_string()),
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Api { status, body });
        }

        let json: GeminiResponse = response
            .json()
            .await
            .map_err(|e| AiError::InvalidResponse(format!("failed to parse JSON: {}", e)))?;

        let text: String = json
            .candidates
            .first()
            .map(|c| c.content.parts.iter().map(|p| p.text.as_str()).collect())
            .ok_or_else(|| AiError::InvalidResponse("no candidates returned".to_string()))?;
        Ok(text)
    }

    fn provider(&self) -> &'static str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_normalises_model_and_base() {
        let client = GeminiClient::new(
            "https://example.test/v1beta/models/".into(),
            "models/gemini-2.0-flash".into(),
            "key".into(),
            0.2,
            256,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.endpoint(),
            "https://example.test/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn request_body_shape() {
        let body = GeminiRequest {
            system_instruction: None,
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: "hi".into() }],
                role: Some("user".into()),
            }],
            generation_config: GenerationConfig {
                temperature: 0.5,
                max_output_tokens: 10,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("systemInstruction").is_none());
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 10);
    }
}
