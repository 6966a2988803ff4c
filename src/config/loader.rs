//! Configuration loader with tier-based merging.
//!
//! Loads configuration from multiple tiers and merges them field-by-field.

use super::merge::deep_merge_all;
use super::types::Config;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Explicit config file; when set no other tier is read.
pub const ENV_CONFIG_PATH: &str = "REPORT_FORGE_CONFIG_PATH";
pub const ENV_DB_PATH: &str = "REPORT_FORGE_DB_PATH";
pub const ENV_PORT: &str = "REPORT_FORGE_PORT";
pub const ENV_PARAMETERS: &str = "REPORT_FORGE_PARAMETERS";
pub const ENV_LLM_API_KEY: &str = "REPORT_FORGE_LLM_API_KEY";

/// Configuration tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    /// Embedded defaults (lowest priority)
    Defaults = 0,
    /// Project-level config ($CWD/report-forge/)
    Project = 1,
    /// User-level config (~/.report-forge/)
    User = 2,
    /// Environment variables (highest priority)
    Environment = 3,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Defaults => write!(f, "defaults"),
            ConfigTier::Project => write!(f, "project"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Environment => write!(f, "environment"),
        }
    }
}

/// Directories searched for `config.yaml`, or a single explicit file.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub project_dir: Option<PathBuf>,
    pub user_dir: Option<PathBuf>,
    /// When set, the only file read
    pub explicit_file: Option<PathBuf>,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl ConfigPaths {
    /// Discover configuration paths from environment and defaults.
    pub fn discover() -> Self {
        // User dir: REPORT_FORGE_USER_DIR or ~/.report-forge
        let user_dir = std::env::var("REPORT_FORGE_USER_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".report-forge")));

        // Project dir: REPORT_FORGE_PROJECT_DIR or $CWD/report-forge
        let project_dir = std::env::var("REPORT_FORGE_PROJECT_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from("report-forge")));

        let explicit_file = std::env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from);

        Self {
            project_dir,
            user_dir,
            explicit_file,
        }
    }

    /// Create paths with explicit directories.
    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            user_dir,
            explicit_file: None,
        }
    }

    /// Read only `path`, ignoring the tier directories.
    pub fn with_explicit_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_file = Some(path.into());
        self
    }

    /// Config files in tier order, with the tier each belongs to.
    fn config_files(&self) -> Vec<(ConfigTier, PathBuf)> {
        [
            (ConfigTier::Project, self.project_dir.as_ref()),
            (ConfigTier::User, self.user_dir.as_ref()),
        ]
        .into_iter()
        .filter_map(|(tier, dir)| dir.map(|d| (tier, d.join("config.yaml"))))
        .collect()
    }
}

/// Configuration loader that handles tier-based merging.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Paths for each tier
    pub paths: ConfigPaths,
    config: Config,
    /// Highest-priority config file that was read, if any
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Load configuration from all tiers with proper merging.
    ///
    /// `explicit` takes precedence over `REPORT_FORGE_CONFIG_PATH`.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut paths = ConfigPaths::discover();
        if let Some(path) = explicit {
            paths = paths.with_explicit_file(path);
        }
        Self::load_with_paths(paths)
    }

    /// Load configuration with explicit paths.
    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        if let Some(path) = paths.explicit_file.clone() {
            let mut config = Config::load(&path)
                .with_context(|| format!("failed to load config file {}", path.display()))?;
            Self::apply_env_overrides(&mut config)?;
            return Ok(Self {
                paths,
                config,
                config_path: Some(path),
            });
        }

        let mut configs: Vec<Value> = vec![serde_json::to_value(Config::default())?];
        let mut config_path = None;

        for (tier, file) in paths.config_files() {
            if !file.exists() {
                continue;
            }
            match read_yaml(&file) {
                Ok(value) => {
                    configs.push(value);
                    config_path = Some(file);
                }
                // A broken file in one tier should not keep the server down
                Err(e) => warn!("Ignoring {} config {}: {:#}", tier, file.display(), e),
            }
        }

        let merged = deep_merge_all(configs);
        let mut config: Config = serde_json::from_value(merged)?;

        Self::apply_env_overrides(&mut config)?;

        Ok(Self {
            paths,
            config,
            config_path,
        })
    }

    /// Apply environment variable overrides to config.
    fn apply_env_overrides(config: &mut Config) -> Result<()> {
        if let Ok(db_path) = std::env::var(ENV_DB_PATH) {
            config.server.db_path = PathBuf::from(db_path);
        }

        if let Ok(port) = std::env::var(ENV_PORT) {
            config.server.port = port
                .parse()
                .with_context(|| format!("{} must be a port number, got '{}'", ENV_PORT, port))?;
        }

        if let Ok(parameters) = std::env::var(ENV_PARAMETERS) {
            config.server.parameters_file = Some(PathBuf::from(parameters));
        }

        if let Ok(key) = std::env::var(ENV_LLM_API_KEY) {
            config.llm.api_key = Some(key);
        }

        Ok(())
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get mutable access to the configuration.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Get the config file path that was used.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

fn read_yaml(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_yaml::from_str(&content)?;
    Ok(value)
}
