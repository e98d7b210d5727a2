//! Application configuration, loadable from TOML with environment overrides.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use cw_protocol::AiMode;
use cw_providers::AiConfig;

use crate::processor::ProcessorSettings;

pub const ENV_AI_MODE: &str = "CMDWEAVE_AI_MODE";
pub const ENV_HISTORY_PATH: &str = "CMDWEAVE_HISTORY_PATH";
pub const ENV_USE_AI: &str = "CMDWEAVE_USE_AI";

/// Directory under the home directory holding config and history.
pub const APP_DIR: &str = ".cmdweave";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub nlp: NlpConfig,
}

/// Natural-language pipeline settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NlpConfig {
    /// History entries kept on disk.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Minimum AI confidence to override a known rule-based intent.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Minimum confidence to accept an AI-resolved entity.
    #[serde(default = "default_entity_confidence_threshold")]
    pub entity_confidence_threshold: f64,
    /// Consult the reasoning engine even when rules find an intent.
    #[serde(default)]
    pub use_ai: bool,
    /// History file. Defaults to `~/.cmdweave/history.json`.
    #[serde(default)]
    pub history_path: Option<PathBuf>,
}

fn default_max_history() -> usize {
    100
}
fn default_confidence_threshold() -> f64 {
    0.7
}
fn default_entity_confidence_threshold() -> f64 {
    0.6
}

impl Default for NlpConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            confidence_threshold: default_confidence_threshold(),
            entity_confidence_threshold: default_entity_confidence_threshold(),
            use_ai: false,
            history_path: None,
        }
    }
}

impl NlpConfig {
    pub fn processor_settings(&self) -> ProcessorSettings {
        ProcessorSettings {
            confidence_threshold: self.confidence_threshold,
            entity_confidence_threshold: self.entity_confidence_threshold,
        }
    }

    /// Configured history path, or the per-user default.
    pub fn resolved_history_path(&self) -> Option<PathBuf> {
        self.history_path
            .clone()
            .or_else(|| default_app_dir().map(|dir| dir.join("history.json")))
    }
}

/// `~/.cmdweave`, if a home directory can be determined.
pub fn default_app_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(APP_DIR))
}

/// `~/.cmdweave/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    default_app_dir().map(|dir| dir.join("config.toml"))
}

impl AppConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from `path` when given, else from the default location when it
    /// exists, else defaults. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(default) => Self::from_file(default)?,
                None => Self::default(),
            },
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Apply `CMDWEAVE_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_AI_MODE) {
            self.ai.mode = value
                .parse::<AiMode>()
                .map_err(|reason| ConfigError::InvalidEnv {
                    var: ENV_AI_MODE,
                    value: value.clone(),
                    reason,
                })?;
        }
        if let Some(value) = lookup(ENV_HISTORY_PATH).filter(|v| !v.trim().is_empty()) {
            self.nlp.history_path = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup(ENV_USE_AI) {
            self.nlp.use_ai = match value.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: ENV_USE_AI,
                        value,
                        reason: "expected a boolean".into(),
                    });
                }
            };
        }
        Ok(())
    }
}
