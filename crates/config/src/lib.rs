//! Configuration loading, validation, and management for contextweave.
//!
//! Loads configuration from `~/.contextweave/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use contextweave_core::ChainKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Token threshold used by project mode, independent of user settings.
pub const PROJECT_TOKEN_THRESHOLD: usize = 1_000_000;

/// The root configuration structure.
///
/// Maps directly to `~/.contextweave/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Context layering and compaction policy
    #[serde(default)]
    pub layering: LayeringConfig,

    /// Chat defaults applied when a turn does not override them
    #[serde(default)]
    pub chat: ChatConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayeringConfig {
    /// Context size (in tokens) above which a turn's context is compacted.
    #[serde(default = "default_auto_compact_token_threshold")]
    pub auto_compact_token_threshold: usize,

    /// Fixed threshold for project-mode chains.
    #[serde(default = "default_project_token_threshold")]
    pub project_token_threshold: usize,

    /// Characters per token used for size estimates.
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,

    /// Content preview kept per block when a prior turn enters the library.
    #[serde(default = "default_l2_preview_chars")]
    pub l2_preview_chars: usize,

    /// Headings kept per block when a prior turn enters the library.
    #[serde(default = "default_l2_max_headings")]
    pub l2_max_headings: usize,
}

fn default_auto_compact_token_threshold() -> usize {
    128_000
}
fn default_project_token_threshold() -> usize {
    PROJECT_TOKEN_THRESHOLD
}
fn default_chars_per_token() -> usize {
    4
}
fn default_l2_preview_chars() -> usize {
    600
}
fn default_l2_max_headings() -> usize {
    12
}

impl Default for LayeringConfig {
    fn default() -> Self {
        Self {
            auto_compact_token_threshold: default_auto_compact_token_threshold(),
            project_token_threshold: default_project_token_threshold(),
            chars_per_token: default_chars_per_token(),
            l2_preview_chars: default_l2_preview_chars(),
            l2_max_headings: default_l2_max_headings(),
        }
    }
}

impl LayeringConfig {
    /// Compaction threshold in tokens for a chain.
    pub fn token_threshold_for(&self, chain: ChainKind) -> usize {
        if chain.uses_project_threshold() {
            self.project_token_threshold
        } else {
            self.auto_compact_token_threshold
        }
    }

    /// Compaction threshold in characters for a chain.
    pub fn char_threshold_for(&self, chain: ChainKind) -> usize {
        self.token_threshold_for(chain)
            .saturating_mul(self.chars_per_token)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default)]
    pub default_chain: ChainKind,

    /// Attach the active note to every turn.
    #[serde(default)]
    pub include_active_note: bool,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_system_prompt() -> String {
    "You are a helpful assistant working with the user's notes. \
     Answer using the provided context when it is relevant."
        .into()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_chain: ChainKind::default(),
            include_active_note: false,
            system_prompt: default_system_prompt(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.contextweave/config.toml).
    ///
    /// Environment overrides:
    /// - `CONTEXTWEAVE_TOKEN_THRESHOLD` (auto-compaction threshold in tokens)
    /// - `CONTEXTWEAVE_LOG` (default log filter)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(raw) = lookup("CONTEXTWEAVE_TOKEN_THRESHOLD") {
            let threshold = raw.trim().parse::<usize>().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "CONTEXTWEAVE_TOKEN_THRESHOLD must be a positive integer, got {raw:?}"
                ))
            })?;
            self.layering.auto_compact_token_threshold = threshold;
        }

        if let Some(level) = lookup("CONTEXTWEAVE_LOG") {
            self.logging.level = level;
        }

        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".contextweave")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.layering.auto_compact_token_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "layering.auto_compact_token_threshold must be > 0".into(),
            ));
        }

        if self.layering.project_token_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "layering.project_token_threshold must be > 0".into(),
            ));
        }

        if self.layering.chars_per_token == 0 {
            return Err(ConfigError::ValidationError(
                "layering.chars_per_token must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
