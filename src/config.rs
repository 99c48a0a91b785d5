//! Execution settings for group lookups.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding [`LookupConfig::lookahead_quantum`].
pub const QUANTUM_ENV: &str = "GROUP_LOOKUP_QUANTUM";

/// Default number of sub-cursors a lookahead execution keeps open.
pub const DEFAULT_LOOKAHEAD_QUANTUM: usize = 1;

/// Settings shared by every lookup executed under one query context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Number of sub-cursors to keep open ahead of consumption; `<= 1` runs serially.
    pub lookahead_quantum: usize,
    /// Whether cursors validate the open/next/close sequence.
    pub lifecycle_checks: bool,
    /// Whether open/next timings are reported to the lookup metrics sink.
    pub profile: bool,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            lookahead_quantum: DEFAULT_LOOKAHEAD_QUANTUM,
            lifecycle_checks: true,
            profile: false,
        }
    }
}

impl LookupConfig {
    /// Parses a configuration from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse { path: None, source })
    }

    /// Reads a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })
    }

    /// Renders the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|source| ConfigError::Serialize { source })
    }

    /// Applies the [`QUANTUM_ENV`] override, if set.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        match std::env::var(QUANTUM_ENV) {
            Ok(raw) => self.apply_quantum_override(&raw),
            Err(_) => Ok(self),
        }
    }

    fn apply_quantum_override(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.lookahead_quantum = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: QUANTUM_ENV,
            value: raw.to_owned(),
        })?;
        Ok(self)
    }

    /// Sets the lookahead quantum.
    pub fn lookahead_quantum(mut self, quantum: usize) -> Self {
        self.lookahead_quantum = quantum;
        self
    }

    /// Enables or disables cursor lifecycle validation.
    pub fn lifecycle_checks(mut self, enabled: bool) -> Self {
        self.lifecycle_checks = enabled;
        self
    }

    /// Enables or disables timing collection.
    pub fn profile(mut self, enabled: bool) -> Self {
        self.profile = enabled;
        self
    }
}

/// Errors raised while loading a [`LookupConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration text is not valid TOML for [`LookupConfig`].
    #[error("failed to parse config: {source}")]
    Parse {
        /// File that failed, if the text came from a file.
        path: Option<PathBuf>,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },
    /// The configuration could not be rendered.
    #[error("failed to serialize config: {source}")]
    Serialize {
        /// Underlying serialization error.
        #[source]
        source: toml::ser::Error,
    },
    /// An override carried a malformed value.
    #[error("invalid value {value:?} for {key}")]
    InvalidValue {
        /// Setting name.
        key: &'static str,
        /// Rejected text.
        value: String,
    },
}
