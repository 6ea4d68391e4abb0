//! Runtime configuration.
//!
//! Loaded from YAML or built from defaults. Durations are written in
//! human-readable form (`"30s"`, `"1m 30s"`).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::resilience::CircuitBreakerConfig;

/// Errors from runtime configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidValue(String),

    #[error("Missing component: {0}")]
    MissingComponent(&'static str),

    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Serde adapter for `humantime` durations.
pub(crate) mod human_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Transport retry policy for one correction round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the first retry
    #[serde(with = "human_duration")]
    pub base_delay: Duration,

    /// Upper bound on any single delay
    #[serde(with = "human_duration")]
    pub max_delay: Duration,

    /// Total calls per round, including the first
    pub max_tries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            max_tries: 3,
        }
    }
}

/// Validation cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: u64,

    #[serde(with = "human_duration")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1_000,
            ttl: Duration::from_secs(600),
        }
    }
}

/// Configuration for the refinement runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Score at which a document counts as validated
    pub threshold: f64,

    /// Maximum correction rounds per document
    pub max_attempts: usize,

    /// Timeout for a single correction service call
    #[serde(with = "human_duration")]
    pub request_timeout: Duration,

    pub retry: RetryConfig,

    /// Cap on the number of focus sections sent per round
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_limit: Option<usize>,

    pub circuit_breaker: CircuitBreakerConfig,
    pub cache: CacheConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            threshold: 0.95,
            max_attempts: 5,
            request_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            focus_limit: None,
            circuit_breaker: CircuitBreakerConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse a config from YAML; missing keys take their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(ConfigError::InvalidValue(format!(
                "threshold must be in (0, 1], got {}",
                self.threshold
            )));
        }
        if self.retry.max_tries == 0 {
            return Err(ConfigError::InvalidValue(
                "retry.max_tries must be at least 1".to_string(),
            ));
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(ConfigError::InvalidValue(format!(
                "retry.base_delay ({:?}) exceeds retry.max_delay ({:?})",
                self.retry.base_delay, self.retry.max_delay
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "request_timeout must be positive".to_string(),
            ));
        }
        if self.focus_limit == Some(0) {
            return Err(ConfigError::InvalidValue(
                "focus_limit must be at least 1 when set".to_string(),
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::InvalidValue(
                "circuit_breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.threshold, 0.95);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.retry.max_tries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_with_human_durations() {
        let config = RuntimeConfig::from_yaml(
            r#"
threshold: 0.9
request_timeout: 45s
retry:
  base_delay: 500ms
  max_delay: 4s
focus_limit: 3
circuit_breaker:
  recovery_timeout: 2m
"#,
        )
        .unwrap();

        assert_eq!(config.threshold, 0.9);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.request_timeout, Duration::from_secs(45));
        assert_eq!(config.retry.base_delay, Duration::from_millis(500));
        assert_eq!(config.retry.max_tries, 3);
        assert_eq!(config.focus_limit, Some(3));
        assert_eq!(config.circuit_breaker.recovery_timeout, Duration::from_secs(120));
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
    }

    #[test]
    fn test_serialized_config_reloads() {
        let config = RuntimeConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("request_timeout: 30s"));
        assert_eq!(RuntimeConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(RuntimeConfig::from_yaml("threshold: 0").is_err());
        assert!(RuntimeConfig::from_yaml("threshold: 1.5").is_err());
        assert!(RuntimeConfig::from_yaml("retry: { max_tries: 0 }").is_err());
        assert!(RuntimeConfig::from_yaml("retry: { base_delay: 10s, max_delay: 1s }").is_err());
        assert!(RuntimeConfig::from_yaml("request_timeout: soon").is_err());
    }

    #[test]
    fn test_from_yaml_file() {
        let dir = std::env::temp_dir().join(format!("conform-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("runtime.yaml");
        fs::write(&path, "max_attempts: 2\n").unwrap();

        let config = RuntimeConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.max_attempts, 2);
        fs::remove_dir_all(&dir).unwrap();
    }
}
