//! Configuration file loader.

use std::path::{Path, PathBuf};

use super::ShipperConfig;

/// Document format of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON document.
    Json,
    /// TOML document.
    Toml,
}

impl ConfigFormat {
    /// Pick the format from the file extension; anything but `.toml` is JSON.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

/// Loads and validates a shipper configuration file.
#[derive(Debug)]
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    /// Create a config loader for a specific config file path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Path this loader reads.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read, parse and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or fails
    /// validation.
    pub fn load(&self) -> Result<ShipperConfig, ConfigError> {
        tracing::debug!(path = %self.path.display(), "Loading config file");

        let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::ReadError {
            path: self.path.clone(),
            source: e,
        })?;

        let config = Self::parse(&self.path, &content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration text in the format implied by `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not a valid document.
    pub fn parse(path: &Path, content: &str) -> Result<ShipperConfig, ConfigError> {
        match ConfigFormat::from_path(path) {
            ConfigFormat::Json => {
                serde_json::from_str(content).map_err(|e| ConfigError::JsonParseError {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| ConfigError::TomlParseError {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    JsonParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    TomlParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid multiline pattern for {path}: {source}")]
    InvalidPattern { path: PathBuf, source: regex::Error },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("No inputs configured")]
    NoInputs,

    #[error("No outputs configured")]
    NoOutputs,
}
