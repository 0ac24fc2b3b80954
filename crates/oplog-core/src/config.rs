use std::path::Path;

use serde::{Deserialize, Serialize};

/// Default number of concurrent block reads during traversal.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 16;

/// Tunables for a [`Log`](crate::Log).
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// fetch_concurrency = 32
/// default_fetch_length = 1000
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Upper bound on simultaneous store reads while loading.
    pub fetch_concurrency: usize,
    /// Length used by loads that do not pass one. `None` loads everything.
    pub default_fetch_length: Option<usize>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            default_fetch_length: None,
        }
    }
}

impl LogConfig {
    /// Parse from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "fetch_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Errors from loading a [`LogConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
