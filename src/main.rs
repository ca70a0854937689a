use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rotaslice::event_bus::{BackendEvent, ErrorEvent};
use rotaslice::{
    init_logging, AppEvent, Backend, BackendState, CancelToken, Config, GcodeFileSink, LogFormat,
    ModeMapping, ObjectSnapshot, SettingsSnapshot, StaticScene, SynthesisSettings,
};

#[derive(Parser)]
#[command(name = "rotaslice")]
#[command(about = "Slicing backend and toolpath synthesis for rotary-axis printers", long_about = None)]
#[command(version = rotaslice::VERSION)]
struct Cli {
    /// Configuration file (JSON or TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override a setting, repeatable
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    overrides: Vec<String>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn an engine geometry stream into machine g-code
    Synthesize {
        /// Intermediate stream written by the engine
        stream: PathBuf,

        /// Output g-code file, defaults to the stream path with .gcode
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Slice one plate end to end through an external engine
    Slice {
        /// Engine executable
        #[arg(long)]
        engine: PathBuf,

        /// JSON file with the plate's objects
        #[arg(long)]
        scene: PathBuf,

        /// Build plate to slice
        #[arg(long, default_value_t = 0)]
        plate: u32,

        /// Directory for the g-code file
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    })?;
    tracing::debug!("rotaslice {} built {}", rotaslice::VERSION, rotaslice::BUILD_DATE);

    let config = load_config(cli.config.as_deref(), &cli.overrides)?;

    match cli.command {
        Commands::Synthesize { stream, output } => {
            let output = output.unwrap_or_else(|| stream.with_extension("gcode"));
            run_synthesize(&config, &stream, &output)
        }
        Commands::Slice {
            engine,
            scene,
            plate,
            output,
        } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_slice(config, engine, &scene, plate, output))
        }
    }
}

fn load_config(path: Option<&Path>, overrides: &[String]) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => match rotaslice::default_config_path() {
            Ok(path) if path.is_file() => Config::load_from_file(&path)
                .with_context(|| format!("loading {}", path.display()))?,
            _ => Config::default(),
        },
    };

    for entry in overrides {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("setting override '{}' is not KEY=VALUE", entry);
        };
        config.profile.set(key.trim(), value.trim());
    }
    config.validate()?;
    Ok(config)
}

fn run_synthesize(config: &Config, stream: &Path, output: &Path) -> Result<()> {
    let snapshot: SettingsSnapshot = config.snapshot();
    let settings = SynthesisSettings::from_snapshot(&snapshot)?;
    let file = std::fs::File::open(stream)
        .with_context(|| format!("opening {}", stream.display()))?;

    let result = rotaslice::synthesize(
        &settings,
        ModeMapping::for_mode(settings.mode),
        BufReader::new(file),
        &CancelToken::new(),
    )?;
    if result.anomalies > 0 {
        tracing::warn!("{} malformed stream records skipped", result.anomalies);
    }

    let lines = result.resolved_gcode(&settings);
    let mut writer = BufWriter::new(
        std::fs::File::create(output).with_context(|| format!("creating {}", output.display()))?,
    );
    for line in &lines {
        writeln!(writer, "{}", line)?;
    }
    writer.flush()?;

    tracing::info!(
        "Wrote {} ({} layers, {:.0} s)",
        output.display(),
        result.layer_count(),
        result.time.total()
    );
    Ok(())
}

async fn run_slice(
    mut config: Config,
    engine: PathBuf,
    scene_path: &Path,
    plate: u32,
    output: PathBuf,
) -> Result<()> {
    config.engine.executable = engine;
    config.backend.auto_slice = false;
    config.backend.plate_count = config.backend.plate_count.max(plate + 1);

    let text = std::fs::read_to_string(scene_path)
        .with_context(|| format!("reading {}", scene_path.display()))?;
    let objects: Vec<ObjectSnapshot> = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", scene_path.display()))?;
    let scene = StaticScene::new();
    for object in objects {
        scene.add_object(plate, object);
    }

    let stem = scene_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("plate")
        .to_string();
    let sink = Arc::new(GcodeFileSink::new(&output, stem));
    let handle = Backend::new(config, Arc::new(scene), sink.clone()).spawn();

    let mut events = handle.event_bus().receiver();
    handle.request_slice(plate)?;

    let mut failure = None;
    let settled = loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, cancelling");
                handle.cancel()?;
                continue;
            }
        };
        match event {
            Ok(AppEvent::Error(ErrorEvent::SliceFailed { message, .. })) => failure = Some(message),
            Ok(AppEvent::Backend(BackendEvent::StateChanged {
                from: BackendState::Processing,
                to,
            })) => break to,
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Skipped {} backend events", skipped);
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break handle.state(),
        }
    };
    handle.shutdown().await;

    match settled {
        BackendState::Done => {
            println!("{}", sink.path_for(plate).display());
            Ok(())
        }
        BackendState::Error => bail!(failure.unwrap_or_else(|| "slicing failed".into())),
        other => bail!("plate {} was not sliced (backend {})", plate, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = "\
;LAYER:0,0.2
;TYPE:WALL-OUTER
POLY:0,0,10,0,10,10,0,10,0,0
;LAYER:1,0.4
;TYPE:WALL-OUTER
POLY:0,0,10,0,10,10,0,10,0,0
";

    fn config_file(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("config.toml");
        std::fs::write(&path, contents).expect("write config");
        path
    }

    #[test]
    fn test_synthesize_writes_gcode() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stream = dir.path().join("part.stream");
        std::fs::write(&stream, STREAM).expect("write stream");
        let path = config_file(dir.path(), "[backend]\ndebounce_ms = 100\n");
        let config = load_config(Some(&path), &[]).expect("config");

        let output = dir.path().join("part.gcode");
        run_synthesize(&config, &stream, &output).expect("synthesize");

        let gcode = std::fs::read_to_string(&output).expect("gcode written");
        assert!(gcode.lines().any(|line| line == ";LAYER:1"));
        assert!(!gcode.contains("{print_time}"));
    }

    #[test]
    fn test_overrides_apply_to_profile() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = config_file(dir.path(), "");
        let overrides = vec!["kinematic_mode = cylindrical_full".to_string()];
        let config = load_config(Some(&path), &overrides).expect("config");
        assert_eq!(config.profile.get("kinematic_mode"), Some("cylindrical_full"));
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = config_file(dir.path(), "");
        assert!(load_config(Some(&path), &["kinematic_mode=helical".to_string()]).is_err());
        assert!(load_config(Some(&path), &["layer_height".to_string()]).is_err());
    }
}
