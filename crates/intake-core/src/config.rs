//! Configuration types and loading for intake.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{APP_NAME, env_prefix};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the intake database.
    pub database: PathBuf,

    /// Text generation backend.
    pub llm: LlmConfig,

    /// Sign-off workflow switches.
    pub workflow: WorkflowConfig,

    /// HTTP API settings.
    pub api: ApiConfig,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_NAME);

        Self {
            database: data_dir.join("intake.db"),
            llm: LlmConfig::default(),
            workflow: WorkflowConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default config file.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::default_config_path())
    }

    /// Load configuration from a file, layering `INTAKE__SECTION__KEY`
    /// environment overrides on top. A missing file yields defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(&env_prefix())
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = settings
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;
        config.expand_paths();
        Ok(config)
    }

    /// Get the default config file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_NAME)
            .join("config.toml")
    }

    /// Save configuration to a specific file path.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Ensure config exists at the given path, creating defaults if missing.
    pub fn ensure_at(path: &Path) -> Result<Self> {
        if !path.exists() {
            let mut config = Self::default();
            config.expand_paths();
            config.save_to_path(path)?;
        }
        Self::load_from_path(path)
    }

    /// Expand a path, replacing ~ with home directory.
    pub fn expand_path(path: &str) -> PathBuf {
        let expanded = shellexpand::full(path)
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| path.to_string());
        PathBuf::from(expanded)
    }

    fn expand_paths(&mut self) {
        self.database = Self::expand_path(&self.database.to_string_lossy());
    }
}

/// Text generation backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// "placeholder" (offline canned output) or "openai" (any compatible endpoint).
    pub provider: String,

    /// Base URL of the chat completions API.
    pub base_url: String,

    /// Model used for documents and replies.
    pub model: String,

    /// Cheaper model used for titles.
    pub small_model: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Upper bound on generated tokens per call.
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "placeholder".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            small_model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 120,
            max_tokens: 4096,
        }
    }
}

/// Sign-off workflow configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Allow signing off an already signed-off conversation (re-runs the orchestrator).
    pub allow_repeat_sign_off: bool,

    /// Send admin notifications for new documents and proposed applications.
    pub notify_admins: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            allow_repeat_sign_off: false,
            notify_admins: true,
        }
    }
}

/// HTTP API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Interface to bind.
    pub host: String,

    /// Port to listen on.
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
