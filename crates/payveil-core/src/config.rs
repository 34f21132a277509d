//! Lifecycle runtime configuration.
//!
//! Layered: defaults, then an optional TOML file, then `PAYVEIL_*`
//! environment variables.

use crate::types::ContractContext;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "PAYVEIL_";

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// File that failed
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid TOML for this schema
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    /// An environment override could not be parsed
    #[error("Invalid value for {key}: {value}")]
    Env {
        /// Variable name
        key: String,
        /// Raw value
        value: String,
    },
    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Lifecycle controller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Context passed to the encryption gateway and decryption verifier
    pub contract_context: String,
    /// Bound on every finality wait (ms)
    pub finality_timeout_ms: u64,
    /// How long a Success status stays visible (ms)
    pub success_display_ms: u64,
    /// How long an Error status stays visible (ms)
    pub error_display_ms: u64,
    /// Prefix of generated record ids
    pub record_id_prefix: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            contract_context: "payveil-ledger".to_string(),
            finality_timeout_ms: 60_000,
            success_display_ms: 2_000,
            error_display_ms: 3_000,
            record_id_prefix: "rate".to_string(),
        }
    }
}

impl LifecycleConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply `PAYVEIL_*` overrides from the process environment.
    pub fn merge_with_env(&mut self) -> Result<(), ConfigError> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply `PAYVEIL_*` overrides from an explicit variable set.
    pub fn merge_with_vars(
        &mut self,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<(), ConfigError> {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "CONTRACT_CONTEXT" => self.contract_context = value,
                "RECORD_ID_PREFIX" => self.record_id_prefix = value,
                "FINALITY_TIMEOUT_MS" => self.finality_timeout_ms = parse_ms(&key, &value)?,
                "SUCCESS_DISPLAY_MS" => self.success_display_ms = parse_ms(&key, &value)?,
                "ERROR_DISPLAY_MS" => self.error_display_ms = parse_ms(&key, &value)?,
                other => tracing::debug!(key = other, "ignoring unknown config override"),
            }
        }
        Ok(())
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.contract_context.trim().is_empty() {
            return Err(ConfigError::Invalid("contract_context must not be empty".into()));
        }
        if self.record_id_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("record_id_prefix must not be empty".into()));
        }
        if self.finality_timeout_ms == 0 {
            return Err(ConfigError::Invalid("finality_timeout_ms must be > 0".into()));
        }
        if self.success_display_ms == 0 || self.error_display_ms == 0 {
            return Err(ConfigError::Invalid("display windows must be > 0".into()));
        }
        Ok(())
    }

    /// Context as a typed value.
    pub fn context(&self) -> ContractContext {
        ContractContext::new(self.contract_context.clone())
    }

    /// Finality bound.
    pub fn finality_timeout(&self) -> Duration {
        Duration::from_millis(self.finality_timeout_ms)
    }

    /// Success display window.
    pub fn success_display(&self) -> Duration {
        Duration::from_millis(self.success_display_ms)
    }

    /// Error display window.
    pub fn error_display(&self) -> Duration {
        Duration::from_millis(self.error_display_ms)
    }
}

fn parse_ms(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        key: key.to_string(),
        value: value.to_string(),
    })
}
