use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parse::DEFAULT_CHUNK_SIZE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Records per emitted chunk during streaming parse.
    pub chunk_size: usize,
}

impl ExplorerConfig {
    /// Load configuration.
    /// Priority: Environment Variables > Config File > Defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("EXPLORER_CONFIG_FILE")
            .unwrap_or_else(|_| "explorer.toml".to_string());

        let mut config = if Path::new(&config_path).exists() {
            tracing::info!("Loading configuration from: {}", config_path);
            Self::from_file(&config_path)?
        } else {
            Self::default()
        };

        if let Some(chunk_size) = env_usize("EXPLORER_CHUNK_SIZE") {
            config.chunk_size = chunk_size;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: ExplorerConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be > 0".to_string()));
        }
        Ok(())
    }
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}
