//! Unified configuration system.
//!
//! Consolidates configuration from tiers with field-by-field YAML merging:
//! 1. **Defaults** - compiled into [`Config::default`]
//! 2. **Project** - `$CWD/report-forge/config.yaml`
//! 3. **User** - `~/.report-forge/config.yaml`
//! 4. **Environment** - variables below, applied last
//!
//! ## Environment Variables
//! - `REPORT_FORGE_CONFIG_PATH` - Explicit config file (overrides all files)
//! - `REPORT_FORGE_DB_PATH` - Database path
//! - `REPORT_FORGE_PORT` - Web UI port
//! - `REPORT_FORGE_PARAMETERS` - Parameters YAML file
//! - `REPORT_FORGE_LLM_API_KEY` - API key for the SQL assistant
//! - `REPORT_FORGE_USER_DIR` - User config dir (default: `~/.report-forge`)
//! - `REPORT_FORGE_PROJECT_DIR` - Project config dir (default: `./report-forge`)

mod loader;
mod merge;
mod types;

pub use loader::{
    ConfigLoader, ConfigPaths, ConfigTier, ENV_CONFIG_PATH, ENV_DB_PATH, ENV_LLM_API_KEY,
    ENV_PARAMETERS, ENV_PORT,
};
pub use merge::{deep_merge, deep_merge_all};
pub use types::*;
