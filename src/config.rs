//! Processor configuration
//!
//! Loaded from JSON by the host binary or assembled with
//! [`ProcessorConfigBuilder`]. Every field has a default, so an empty object
//! is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::address::{AddressScheme, DEFAULT_NAMESPACE};
use crate::types::Version;

pub const DEFAULT_STATE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_VERIFIER_PROGRAM: &str = "hbzksnark";
pub const DEFAULT_VERIFIER_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {reason}")]
    Invalid { reason: String },
}

/// External proof verifier invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    pub program: String,
    pub keys_path: String,
    pub timeout_ms: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_VERIFIER_PROGRAM.to_string(),
            keys_path: String::new(),
            timeout_ms: DEFAULT_VERIFIER_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub namespace: String,
    pub state_timeout_ms: u64,
    /// Match family version served with plaintext balance checks
    pub direct_version: Version,
    /// Match family version served with proof checks
    pub opaque_version: Version,
    /// Governance families version
    pub governance_version: Version,
    pub verifier: VerifierConfig,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            state_timeout_ms: DEFAULT_STATE_TIMEOUT_MS,
            direct_version: Version::new(0, 1, 0),
            opaque_version: Version::new(0, 2, 0),
            governance_version: Version::new(0, 1, 0),
            verifier: VerifierConfig::default(),
        }
    }
}

impl ProcessorConfig {
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder::new()
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: ProcessorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: "namespace must not be empty".to_string(),
            });
        }
        if self.state_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "state_timeout_ms must be positive".to_string(),
            });
        }
        if self.direct_version == self.opaque_version {
            return Err(ConfigError::Invalid {
                reason: format!("direct and opaque modes share version {}", self.direct_version),
            });
        }
        Ok(())
    }

    pub fn state_timeout(&self) -> Duration {
        Duration::from_millis(self.state_timeout_ms)
    }

    pub fn scheme(&self) -> AddressScheme {
        AddressScheme::new(self.namespace.clone())
    }
}

/// Fluent construction of a [`ProcessorConfig`]
#[derive(Debug, Clone, Default)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    pub fn with_state_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.state_timeout_ms = timeout_ms;
        self
    }

    pub fn with_direct_version(mut self, version: Version) -> Self {
        self.config.direct_version = version;
        self
    }

    pub fn with_opaque_version(mut self, version: Version) -> Self {
        self.config.opaque_version = version;
        self
    }

    pub fn with_governance_version(mut self, version: Version) -> Self {
        self.config.governance_version = version;
        self
    }

    pub fn with_verifier(mut self, verifier: VerifierConfig) -> Self {
        self.config.verifier = verifier;
        self
    }

    pub fn build(self) -> Result<ProcessorConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
