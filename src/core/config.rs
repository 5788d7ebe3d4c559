//! TOML configuration file loading
//!
//! A connector process is told which definition it serves and how to behave
//! when the broker goes away. Everything else (host, credentials, tuning)
//! comes from the definition store and the control bus.

use crate::core::error_handling::ContextualError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const CONFIG_DIR_NAME: &str = "amqp-connector";
const CONFIG_FILE_NAME: &str = "connector.toml";
const LOG_FORMATS: [&str; 3] = ["text", "ext", "json"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl ContextualError for ConfigError {
    fn is_user_actionable(&self) -> bool {
        matches!(self, ConfigError::NotFound { .. } | ConfigError::Invalid { .. })
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            ConfigError::NotFound { .. } => {
                Some("Create the configuration file or pass its path explicitly")
            }
            ConfigError::Invalid { message } => Some(message),
            _ => None,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level connector process configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectorConfig {
    pub cluster_id: i64,
    pub definition_id: i64,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconnectConfig {
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file: Option<PathBuf>,
    pub color: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            file: None,
            color: false,
        }
    }
}

impl ConnectorConfig {
    /// Configuration for a definition with default reconnect and logging settings
    pub fn new(cluster_id: i64, definition_id: i64) -> Self {
        Self {
            cluster_id,
            definition_id,
            reconnect: ReconnectConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Default location: `<config_dir>/amqp-connector/connector.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load configuration from an explicit path, or from the default location
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path().ok_or_else(|| ConfigError::NotFound {
                path: PathBuf::from(CONFIG_FILE_NAME),
            })?,
        };

        if !path.exists() {
            return Err(ConfigError::NotFound { path });
        }

        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        log::debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let reconnect = &self.reconnect;
        if reconnect.max_attempts == Some(0) {
            return Err(invalid("reconnect.max_attempts must be greater than 0"));
        }
        if !(reconnect.multiplier >= 1.0) {
            return Err(invalid(format!(
                "reconnect.multiplier must be at least 1.0, got {}",
                reconnect.multiplier
            )));
        }
        if reconnect.initial_delay_ms > reconnect.max_delay_ms {
            return Err(invalid(format!(
                "reconnect.initial_delay_ms ({}) exceeds reconnect.max_delay_ms ({})",
                reconnect.initial_delay_ms, reconnect.max_delay_ms
            )));
        }
        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(invalid(format!(
                "logging.format must be one of {:?}, got '{}'",
                LOG_FORMATS, self.logging.format
            )));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}
