//! Configuration and settings snapshots for rotaslice
//!
//! - [`Config`]: the on-disk backend configuration (JSON or TOML)
//! - [`SettingsSnapshot`]: the flattened global + per-extruder key/value map
//!   handed to the pipeline when a plate is sliced

pub mod config;
pub mod error;
pub mod snapshot;

pub use config::{default_config_path, BackendSettings, Config, EngineSettings};
pub use error::{ConfigError, SettingIssue, SettingsError, SettingsResult};
pub use snapshot::{SettingsReader, SettingsSnapshot};
