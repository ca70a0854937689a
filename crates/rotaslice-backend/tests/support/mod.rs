//! Fake engine and scene helpers shared by the backend tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use rotaslice_backend::{ObjectSnapshot, StaticScene};
use rotaslice_core::{AppEvent, EventBus, EventFilter};
use rotaslice_settings::Config;

pub const STREAM: &str = "\
;LAYER:0,0.2
;TYPE:WALL-OUTER
POLY:-5,-5,5,-5,5,5,-5,5,-5,-5
;TYPE:FILL
POLY:-4,-4,4,4
;LAYER:1,0.4
;TYPE:WALL-OUTER
POLY:-5,-5,5,-5,5,5,-5,5,-5,-5
";

/// Shell script standing in for the engine
///
/// Reads `-o <path>` from its arguments, reports progress, optionally
/// sleeps, then writes [`STREAM`] to the output path.
pub fn engine_script(dir: &Path, delay_secs: u32) -> PathBuf {
    let script = format!(
        r#"out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; fi
  shift
done
echo "Progress:slice:1:2"
sleep {delay}
cat > "$out" <<'STREAM'
{stream}STREAM
echo "LayerCount:2"
"#,
        delay = delay_secs,
        stream = STREAM
    );
    let path = dir.join("engine.sh");
    std::fs::write(&path, script).expect("write engine script");
    path
}

/// Configuration running the fake engine through `sh`
pub fn config(dir: &Path, delay_secs: u32) -> Config {
    let mut config = Config::default();
    config.engine.executable = PathBuf::from("sh");
    config.engine.extra_args = vec![engine_script(dir, delay_secs).display().to_string()];
    config.backend.work_dir = Some(dir.join("work"));
    config.backend.debounce_ms = 50;
    config.backend.plate_count = 2;
    config
}

pub fn cube(name: &str) -> ObjectSnapshot {
    ObjectSnapshot::cuboid(name, 0, [-5.0, -5.0, 0.0], [5.0, 5.0, 0.4])
}

/// Scene with one cube on each of `plates`
pub fn scene(plates: &[u32]) -> Arc<StaticScene> {
    let scene = StaticScene::new();
    for &plate in plates {
        scene.add_object(plate, cube(&format!("cube-{}", plate)));
    }
    Arc::new(scene)
}

/// Records every event published on `bus`
pub fn record(bus: &EventBus) -> Arc<Mutex<Vec<AppEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    bus.subscribe(EventFilter::All, move |event| sink.lock().push(event));
    events
}

pub fn process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
