// ABOUTME: Configuration loading for roomclaw.
// ABOUTME: Reads ~/.roomclaw/config.toml; every field has a default and CLI flags override.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub room: RoomConfig,
    pub logging: LoggingConfig,
}

/// Completion API configuration. The credential is deliberately absent.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub stream: bool,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            stream: true,
            max_retries: 2,
            retry_base_delay_ms: 500,
            timeout_seconds: 120,
        }
    }
}

/// Shared room configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Shared history file. `None` means `~/.roomclaw/chat_history.json`.
    pub history_path: Option<PathBuf>,
    pub poll_interval_ms: u64,
    pub trigger: String,
    pub assistant_name: String,
    pub assistant_icon: String,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            history_path: None,
            poll_interval_ms: 1000,
            trigger: "nurt".to_string(),
            assistant_name: "Assistant".to_string(),
            assistant_icon: "\u{2728}".to_string(),
        }
    }
}

impl RoomConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(50))
    }

    pub fn resolved_history_path(&self) -> PathBuf {
        self.history_path
            .clone()
            .unwrap_or_else(|| Config::base_dir().join("chat_history.json"))
    }
}

/// Log output configuration. The TUI owns the terminal, so logs go to a file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    pub fn resolved_file(&self) -> PathBuf {
        self.file
            .clone()
            .unwrap_or_else(|| Config::base_dir().join("roomclaw.log"))
    }
}

impl Config {
    /// Load config from ~/.roomclaw/config.toml, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from an explicit path; a missing file yields defaults.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Directory holding config, secrets, default history and logs.
    pub fn base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".roomclaw")
    }

    /// Path to the config file.
    pub fn config_path() -> PathBuf {
        Self::base_dir().join("config.toml")
    }

    /// Path to the optional secrets env file.
    pub fn secrets_env_path() -> PathBuf {
        Self::base_dir().join("secrets.env")
    }
}
