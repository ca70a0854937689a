//! Error types for the settings crate.

use std::fmt;
use std::io;
use thiserror::Error;

use rotaslice_core::ExtruderIndex;

/// One missing or unparsable setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingIssue {
    /// The setting key.
    pub key: String,
    /// The extruder whose value was read, `None` for global settings.
    pub extruder: Option<ExtruderIndex>,
    /// What is wrong with the value.
    pub reason: String,
}

impl fmt::Display for SettingIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.extruder {
            Some(extruder) => write!(f, "{} (extruder {}): {}", self.key, extruder, self.reason),
            None => write!(f, "{}: {}", self.key, self.reason),
        }
    }
}

/// Errors that can occur during settings operations.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The configuration file could not be loaded.
    #[error("Failed to load settings: {0}")]
    LoadError(String),

    /// The configuration file could not be saved.
    #[error("Failed to save settings: {0}")]
    SaveError(String),

    /// One or more snapshot values are missing or invalid.
    #[error("Invalid settings: {}", join_issues(.issues))]
    InvalidSettings {
        /// Every offending key.
        issues: Vec<SettingIssue>,
    },

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("TOML error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    /// A configuration validation error occurred.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl SettingsError {
    /// Keys named by an `InvalidSettings` error, empty otherwise
    pub fn keys(&self) -> Vec<String> {
        match self {
            SettingsError::InvalidSettings { issues } => {
                issues.iter().map(|issue| issue.key.clone()).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn join_issues(issues: &[SettingIssue]) -> String {
    issues
        .iter()
        .map(|issue| issue.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors related to configuration validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file format is not supported.
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// A configuration value is out of valid range.
    #[error("Value out of range for '{key}': {value}")]
    ValueOutOfRange {
        /// The configuration key.
        key: String,
        /// The rejected value.
        value: String,
    },

    /// No platform configuration directory is available.
    #[error("No configuration directory available on this platform")]
    NoConfigDirectory,
}

/// Result type alias for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;

impl From<SettingsError> for rotaslice_core::Error {
    fn from(err: SettingsError) -> Self {
        rotaslice_core::Error::Configuration(err.to_string())
    }
}
