//! # rotaslice
//!
//! Slicing backend and toolpath synthesis for 3D printers with rotary axes:
//! cylindrical and spherical layers, hybrid planar-core prints and discrete
//! tilted segments.
//!
//! ## Architecture
//!
//! rotaslice is organized as a workspace with multiple crates:
//!
//! 1. **rotaslice-core** - Result codes, shared types, cancellation, events
//! 2. **rotaslice-settings** - Configuration files and settings snapshots
//! 3. **rotaslice-toolpath** - Kinematic transform and g-code synthesis
//! 4. **rotaslice-engine** - External slicing engine subprocess adapter
//! 5. **rotaslice-backend** - Job pipeline, plate queue and state machine
//! 6. **rotaslice** - Command line front end that integrates all crates

pub use rotaslice_backend as backend;
pub use rotaslice_engine as engine;
pub use rotaslice_toolpath as toolpath;

pub use rotaslice_core::{
    event_bus, AppEvent, BackendState, BuildPlateId, CancelToken, EngineError, Error, EventBus,
    FeatureType, KinematicMode, PipelineError, Result, ResultCode, StageKind, SynthesisError,
};

pub use rotaslice_settings::{default_config_path, Config, SettingsError, SettingsSnapshot};

pub use rotaslice_toolpath::{
    generate_basement, synthesize, KinematicTransform, ModeMapping, SynthesisOutput,
    SynthesisSettings,
};

pub use rotaslice_backend::{
    Backend, BackendHandle, GcodeFileSink, MemorySink, ObjectSnapshot, SceneSource, SliceOutput,
    SliceOutputSink, StaticScene,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable, multi-line
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Initialize logging
///
/// Sets up structured logging with:
/// - stderr output, so g-code written to stdout stays clean
/// - RUST_LOG environment variable support, INFO otherwise
pub fn init_logging(format: LogFormat) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.to_string()));

    match format {
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .with_thread_names(true)
                .with_line_number(true)
                .pretty();
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()?;
        }
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .json();
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()?;
        }
    }

    Ok(())
}
