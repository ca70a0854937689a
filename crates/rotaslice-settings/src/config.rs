//! Backend configuration
//!
//! Provides configuration file handling and validation. Supports JSON and
//! TOML files, by extension, stored in the platform configuration directory.
//!
//! Configuration is organized into sections:
//! - Backend settings (debounce, auto-slice, plate count, work directory)
//! - Engine settings (executable, extra arguments, timeout)
//! - Profile values merged over the stock settings snapshot

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, SettingsError, SettingsResult};
use crate::snapshot::SettingsSnapshot;

/// Controller behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Idle time after the last change notification before slicing starts
    pub debounce_ms: u64,
    /// Slice automatically on scene and setting changes
    pub auto_slice: bool,
    /// Number of build plates in the scene
    pub plate_count: u32,
    /// Parent directory for per-run work directories, system temp when unset
    pub work_dir: Option<PathBuf>,
    /// Extract per-layer visualization data for the displayed plate
    pub visualize: bool,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            auto_slice: true,
            plate_count: 1,
            work_dir: None,
            visualize: true,
        }
    }
}

impl BackendSettings {
    /// Debounce interval as a duration
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// External engine invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Engine executable
    pub executable: PathBuf,
    /// Arguments placed before the generated ones
    pub extra_args: Vec<String>,
    /// Wall-clock limit for one engine run, unlimited when unset
    pub timeout_secs: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("rotaslice-engine"),
            extra_args: Vec::new(),
            timeout_secs: None,
        }
    }
}

impl EngineSettings {
    /// Engine timeout as a duration
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Complete backend configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Controller behaviour
    pub backend: BackendSettings,
    /// Engine invocation
    pub engine: EngineSettings,
    /// Values overriding the stock settings snapshot
    pub profile: SettingsSnapshot,
}

impl Config {
    /// Create default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SettingsError::LoadError(format!("{}: {}", path.display(), e))
        })?;

        let config: Self = match Format::of(path)? {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match Format::of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        if self.backend.debounce_ms == 0 {
            return Err(out_of_range("backend.debounce_ms", self.backend.debounce_ms));
        }

        if self.backend.plate_count == 0 {
            return Err(out_of_range("backend.plate_count", self.backend.plate_count));
        }

        if self.engine.executable.as_os_str().is_empty() {
            return Err(out_of_range("engine.executable", "\"\""));
        }

        if self.engine.timeout_secs == Some(0) {
            return Err(out_of_range("engine.timeout_secs", 0));
        }

        if let Some(mode) = self.profile.get("kinematic_mode") {
            if mode.parse::<rotaslice_core::KinematicMode>().is_err() {
                return Err(out_of_range("profile.kinematic_mode", mode));
            }
        }

        Ok(())
    }

    /// Stock settings with this configuration's profile applied
    pub fn snapshot(&self) -> SettingsSnapshot {
        let mut snapshot = SettingsSnapshot::defaults();
        snapshot.merge(&self.profile);
        snapshot
    }
}

enum Format {
    Json,
    Toml,
}

impl Format {
    fn of(path: &Path) -> SettingsResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Format::Json),
            Some("toml") => Ok(Format::Toml),
            other => Err(ConfigError::UnsupportedFormat(other.unwrap_or("").to_string()).into()),
        }
    }
}

fn out_of_range(key: &str, value: impl ToString) -> SettingsError {
    ConfigError::ValueOutOfRange {
        key: key.to_string(),
        value: value.to_string(),
    }
    .into()
}

/// Platform default configuration file path
pub fn default_config_path() -> SettingsResult<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("rotaslice").join("config.toml"))
        .ok_or_else(|| ConfigError::NoConfigDirectory.into())
}
