//! Configuration types and structures.

use crate::db::query::DEFAULT_DATE_TOKEN;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default port for the web UI.
pub const DEFAULT_PORT: u16 = 31995;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub report: ReportConfig,

    #[serde(default)]
    pub llm: LlmConfig,
}

impl Config {
    /// Load a single configuration file (YAML), with defaults for missing fields.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Create the directory that holds the database file, if any.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.server.db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

/// Server-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the SQLite database parameter queries run against.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Address the web UI binds to.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Port for the web UI.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body (base64 templates are ~4/3 of the file size).
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Load the sample tables when the database has no tables at start-up.
    #[serde(default = "default_true")]
    pub seed_if_empty: bool,

    /// YAML file with the parameters the store starts with.
    #[serde(default)]
    pub parameters_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bind: default_bind(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
            seed_if_empty: true,
            parameters_file: None,
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("report-forge.db")
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

/// How query results are written into documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Token in parameter SQL replaced with the report month (`YYYY-MM`).
    #[serde(default = "default_date_token")]
    pub date_token: String,

    /// Written when a query returns no rows.
    #[serde(default = "default_no_data_text")]
    pub no_data_text: String,

    /// Written (in a highlighted run) when a query fails.
    #[serde(default = "default_error_marker")]
    pub error_marker: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            date_token: default_date_token(),
            no_data_text: default_no_data_text(),
            error_marker: default_error_marker(),
        }
    }
}

fn default_date_token() -> String {
    DEFAULT_DATE_TOKEN.to_string()
}

fn default_no_data_text() -> String {
    "N/A".to_string()
}

fn default_error_marker() -> String {
    "Query Error".to_string()
}

/// Which text-generation API backs the SQL assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// Google Gemini `generateContent`.
    #[default]
    Gemini,
    /// Any OpenAI-compatible `chat/completions` endpoint.
    #[serde(alias = "openai_compatible")]
    Openai,
    /// Assistant disabled.
    None,
}

/// Language model settings for the SQL assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,

    /// API base URL; provider default when unset.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Model id; provider default when unset.
    #[serde(default)]
    pub model: Option<String>,

    /// API key. Prefer `api_key_env` so keys stay out of config files.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key; provider default when unset.
    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            base_url: None,
            model: None,
            api_key: None,
            api_key_env: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn effective_base_url(&self) -> String {
        self.base_url.clone().unwrap_or_else(|| {
            match self.provider {
                LlmProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta/models",
                LlmProvider::Openai | LlmProvider::None => "https://api.openai.com/v1",
            }
            .to_string()
        })
    }

    pub fn effective_model(&self) -> String {
        self.model.clone().unwrap_or_else(|| {
            match self.provider {
                LlmProvider::Gemini => "gemini-2.0-flash",
                LlmProvider::Openai | LlmProvider::None => "gpt-4o-mini",
            }
            .to_string()
        })
    }

    /// The API key from config, or from the configured environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Some(key.clone());
        }
        let var = self.api_key_env.clone().unwrap_or_else(|| {
            match self.provider {
                LlmProvider::Gemini => "GEMINI_API_KEY",
                LlmProvider::Openai | LlmProvider::None => "OPENAI_API_KEY",
            }
            .to_string()
        });
        std::env::var(var).ok().filter(|k| !k.trim().is_empty())
    }
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_timeout_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert!(config.server.seed_if_empty);
        assert_eq!(config.report.date_token, "[REPORT_DATE]");
        assert_eq!(config.report.no_data_text, "N/A");
        assert_eq!(config.report.error_marker, "Query Error");
        assert_eq!(config.llm.provider, LlmProvider::Gemini);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: Config = serde_yaml::from_str(
            "report:\n  no_data_text: \"-\"\nllm:\n  provider: openai\n  model: local\n",
        )
        .unwrap();
        assert_eq!(config.report.no_data_text, "-");
        assert_eq!(config.report.error_marker, "Query Error");
        assert_eq!(config.llm.provider, LlmProvider::Openai);
        assert_eq!(config.llm.effective_model(), "local");
        assert_eq!(config.llm.effective_base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn explicit_api_key_wins() {
        let llm = LlmConfig {
            api_key: Some("secret".into()),
            api_key_env: Some("REPORT_FORGE_TEST_UNSET_KEY".into()),
            ..LlmConfig::default()
        };
        assert_eq!(llm.resolve_api_key().as_deref(), Some("secret"));

        let llm = LlmConfig {
            api_key_env: Some("REPORT_FORGE_TEST_UNSET_KEY".into()),
            ..LlmConfig::default()
        };
        assert!(llm.resolve_api_key().is_none());
    }
}
