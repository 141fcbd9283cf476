//! Configuration types.

use std::path::PathBuf;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ConfigError;
use crate::watcher::DEFAULT_MAX_PENDING_LINES;

/// Default Redis port.
pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// Top-level shipper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipperConfig {
    /// Files to tail.
    #[serde(default)]
    pub input: Vec<InputConfig>,
    /// Sinks that receive every event, in order.
    #[serde(default)]
    pub output: Vec<OutputConfig>,
    /// Debounce interval for filesystem notifications, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Maximum physical lines buffered for one multi-line event.
    #[serde(default = "default_multiline_max_lines")]
    pub multiline_max_lines: usize,
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_multiline_max_lines() -> usize {
    DEFAULT_MAX_PENDING_LINES
}

impl ShipperConfig {
    /// Check the configuration for fatal problems.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no inputs or outputs, a multiline
    /// pattern does not compile, or a numeric setting is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input.is_empty() {
            return Err(ConfigError::NoInputs);
        }
        if self.output.is_empty() {
            return Err(ConfigError::NoOutputs);
        }
        if self.multiline_max_lines == 0 {
            return Err(ConfigError::InvalidValue {
                field: "multiline_max_lines",
                reason: "must be at least 1".to_string(),
            });
        }
        for input in &self.input {
            if input.kind.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "type",
                    reason: format!("empty type for input {}", input.path.display()),
                });
            }
            input.continuation_pattern()?;
        }
        for output in &self.output {
            if let OutputConfig::Redis { key, .. } = output {
                if key.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: "key",
                        reason: "redis output needs a non-empty key".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// One file to tail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Path of the log file.
    pub path: PathBuf,
    /// Type label attached to every event.
    #[serde(rename = "type")]
    pub kind: String,
    /// Static fields added to events that lack them.
    #[serde(default)]
    pub add_field: Map<String, Value>,
    /// Pattern marking continuation lines of a multi-line event.
    #[serde(default)]
    pub multiline: Option<String>,
}

impl InputConfig {
    /// Compile the multiline pattern, matched case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is not a valid regex.
    pub fn continuation_pattern(&self) -> Result<Option<Regex>, ConfigError> {
        self.multiline
            .as_deref()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| ConfigError::InvalidPattern {
                        path: self.path.clone(),
                        source,
                    })
            })
            .transpose()
    }
}

/// One output sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputConfig {
    /// Print events as JSON lines on stdout.
    Stdout,
    /// Push events onto a Redis list.
    Redis {
        /// Redis server host.
        host: String,
        /// Redis server port.
        #[serde(default = "default_redis_port")]
        port: u16,
        /// List key to `RPUSH` onto.
        key: String,
    },
}

fn default_redis_port() -> u16 {
    DEFAULT_REDIS_PORT
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(multiline: Option<&str>) -> InputConfig {
        InputConfig {
            path: PathBuf::from("/var/log/app.log"),
            kind: "app".to_string(),
            add_field: Map::new(),
            multiline: multiline.map(String::from),
        }
    }

    fn config() -> ShipperConfig {
        ShipperConfig {
            input: vec![input(None)],
            output: vec![OutputConfig::Stdout],
            debounce_ms: default_debounce_ms(),
            multiline_max_lines: default_multiline_max_lines(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_no_inputs_rejected() {
        let mut config = config();
        config.input.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoInputs)));
    }

    #[test]
    fn test_no_outputs_rejected() {
        let mut config = config();
        config.output.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoOutputs)));
    }

    #[test]
    fn test_bad_pattern_rejected() {
        let mut config = config();
        config.input.push(input(Some("(unclosed")));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_pattern_is_case_insensitive() {
        let pattern = input(Some("^caused by")).continuation_pattern().unwrap().unwrap();
        assert!(pattern.is_match("Caused By: timeout"));
        assert!(input(None).continuation_pattern().unwrap().is_none());
    }

    #[test]
    fn test_empty_redis_key_rejected() {
        let mut config = config();
        config.output.push(OutputConfig::Redis {
            host: "localhost".to_string(),
            port: DEFAULT_REDIS_PORT,
            key: String::new(),
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "key", .. })
        ));
    }

    #[test]
    fn test_output_redis_port_defaults() {
        let output: OutputConfig =
            serde_json::from_str(r#"{"type": "redis", "host": "logs", "key": "events"}"#).unwrap();
        assert_eq!(
            output,
            OutputConfig::Redis {
                host: "logs".to_string(),
                port: DEFAULT_REDIS_PORT,
                key: "events".to_string(),
            }
        );
    }
}
