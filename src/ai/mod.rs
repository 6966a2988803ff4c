//! SQL assistant backed by an external language model.
//!
//! Two independent calls: [`SqlAssistant::suggest`] writes a query for a
//! parameter description, [`SqlAssistant::verify`] judges whether a query fits
//! one. Neither retries; failures go straight back to the caller.

pub mod gemini;
pub mod openai;
pub mod prompts;

use crate::config::{LlmConfig, LlmProvider};
use async_trait::async_trait;
use gemini::GeminiClient;
use openai::OpenAiClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Errors from the language model boundary.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("the SQL assistant is disabled (llm.provider = none)")]
    Disabled,
    #[error("missing API key for the {0} provider")]
    MissingApiKey(&'static str),
    #[error("request failed: {0}")]
    Request(String),
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        AiError::Request(err.to_string())
    }
}

/// A text-generation backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send one system + user prompt pair and return the model's text.
    async fn generate(&self, system: &str, user: &str) -> Result<String, AiError>;

    /// Short provider name for logs.
    fn provider(&self) -> &'static str;
}

/// Verdict returned by [`SqlAssistant::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    #[serde(alias = "is_suitable")]
    pub is_suitable: bool,
    #[serde(default)]
    pub reason: String,
}

/// Suggests and verifies parameter SQL.
#[derive(Clone)]
pub struct SqlAssistant {
    client: Arc<dyn LlmClient>,
    date_token: String,
}

impl std::fmt::Debug for SqlAssistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlAssistant")
            .field("provider", &self.client.provider())
            .field("date_token", &self.date_token)
            .finish()
    }
}

impl SqlAssistant {
    pub fn new(client: Arc<dyn LlmClient>, date_token: impl Into<String>) -> Self {
        Self {
            client,
            date_token: date_token.into(),
        }
    }

    /// Build from configuration. `Ok(None)` when the provider is `none`.
    pub fn from_config(config: &LlmConfig, date_token: &str) -> Result<Option<Self>, AiError> {
        Ok(client_from_config(config)?.map(|client| Self::new(client, date_token)))
    }

    /// Ask the model for a query returning the described value.
    ///
    /// `schema` is the compact table listing from
    /// [`DatabaseSchema::summary`](crate::db::schema::DatabaseSchema::summary).
    pub async fn suggest(
        &self,
        parameter_name: &str,
        description: &str,
        schema: &str,
    ) -> Result<String, AiError> {
        let (system, user) =
            prompts::suggest_prompt(parameter_name, description, schema, &self.date_token);
        debug!(provider = self.client.provider(), parameter = %parameter_name, "Requesting SQL suggestion");
        let raw = self.client.generate(&system, &user).await?;
        let sql = extract_sql(&raw)?;
        info!(provider = self.client.provider(), parameter = %parameter_name, "SQL suggestion received");
        Ok(sql)
    }

    /// Ask the model whether `sql` retrieves the described value.
    pub async fn verify(
        &self,
        sql: &str,
        expected: &str,
        schema: &str,
    ) -> Result<Verification, AiError> {
        let (system, user) = prompts::verify_prompt(sql, expected, schema, &self.date_token);
        debug!(provider = self.client.provider(), "Requesting SQL verification");
        let raw = self.client.generate(&system, &user).await?;
        let verdict = parse_verification(&raw)?;
        info!(
            provider = self.client.provider(),
            suitable = verdict.is_suitable,
            "SQL verification received"
        );
        Ok(verdict)
    }
}

/// Create the configured client, or `None` when the assistant is disabled.
pub fn client_from_config(config: &LlmConfig) -> Result<Option<Arc<dyn LlmClient>>, AiError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let client: Arc<dyn LlmClient> = match config.provider {
        LlmProvider::None => return Ok(None),
        LlmProvider::Gemini => {
            let api_key = config
                .resolve_api_key()
                .ok_or(AiError::MissingApiKey("gemini"))?;
            Arc::new(GeminiClient::new(
                config.effective_base_url(),
                config.effective_model(),
                api_key,
                config.temperature,
                config.max_tokens,
                timeout,
            )?)
        }
        LlmProvider::Openai => Arc::new(OpenAiClient::new(
            config.effective_base_url(),
            config.effective_model(),
            // Local OpenAI-compatible servers often run without a key
            config.resolve_api_key(),
            config.temperature,
            config.max_tokens,
            timeout,
        )?),
    };
    Ok(Some(client))
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, AiError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Strip a Markdown code fence (with optional language tag) if present.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string on the opening fence line
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Pull the SQL text out of a model reply.
pub fn extract_sql(reply: &str) -> Result<String, AiError> {
    let text = strip_code_fence(reply);
    let text = text
        .strip_prefix("SQL Query:")
        .map(str::trim)
        .unwrap_or(text);
    if text.is_empty() {
        return Err(AiError::InvalidResponse("empty SQL suggestion".to_string()));
    }
    Ok(text.to_string())
}

/// Parse the JSON verdict out of a model reply.
pub fn parse_verification(reply: &str) -> Result<Verification, AiError> {
    let text = strip_code_fence(reply);
    let json = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => {
            return Err(AiError::InvalidResponse(format!(
                "expected a JSON object, got: {}",
                text
            )));
        }
    };
    serde_json::from_str(json).map_err(|e| AiError::InvalidResponse(e.to_string()))
}
