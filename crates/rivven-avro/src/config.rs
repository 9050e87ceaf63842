//! Transcoder configuration

use crate::error::{Result, TranscodeError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`crate::MessageTranscoder`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscoderConfig {
    /// Schema registry connection
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Register unknown schemas when encoding (default: true)
    ///
    /// When disabled, encoding a document the registry does not know fails
    /// with `SchemaNotRegistered`.
    #[serde(default = "default_true")]
    pub auto_register: bool,
}

fn default_true() -> bool {
    true
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            auto_register: true,
        }
    }
}

impl TranscoderConfig {
    /// Config for a registry at `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            registry: RegistryConfig::new(url),
            ..Default::default()
        }
    }

    pub fn with_auto_register(mut self, auto_register: bool) -> Self {
        self.auto_register = auto_register;
        self
    }

    /// Registry call deadline, kept to the millisecond
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.registry.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Deadline for a single registry call
    pub fn registry_timeout(&self) -> Duration {
        self.registry.timeout()
    }

    pub fn validate(&self) -> Result<()> {
        self.registry.validate()
    }
}

/// Schema registry connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Schema registry URL
    #[serde(default = "default_url")]
    pub url: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl RegistryConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(TranscodeError::Config(
                "schema registry url must not be empty".to_string(),
            ));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(TranscodeError::Config(format!(
                "schema registry url must start with http:// or https://, got {}",
                url
            )));
        }
        if self.timeout_ms == 0 {
            return Err(TranscodeError::Config(
                "schema registry timeout must be at least one millisecond".to_string(),
            ));
        }
        Ok(())
    }
}
