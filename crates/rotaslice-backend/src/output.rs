//! Slice output hand-off
//!
//! Finished results leave the backend by value through a
//! [`SliceOutputSink`]. A newer result for the same plate supersedes the
//! previous one; the sink decides what to keep.

use parking_lot::Mutex;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::Notify;

use rotaslice_core::BuildPlateId;
use rotaslice_toolpath::{LayerPolyline, LayerSet, MaterialEstimate, TimeEstimate};

/// Per-layer polylines for the viewport
pub type Visualization = Vec<(i32, Vec<LayerPolyline>)>;

/// Everything produced for one plate
#[derive(Debug, Clone)]
pub struct SliceOutput {
    pub plate: BuildPlateId,
    /// G-code with deferred tokens resolved
    pub gcode: Vec<String>,
    pub layers: LayerSet,
    pub time: TimeEstimate,
    pub material: MaterialEstimate,
    /// Filament length in meters, summed over extruders
    pub filament_m: f64,
    /// Filament weight in grams, summed over extruders
    pub filament_g: f64,
    /// Present only for the displayed plate
    pub visualization: Option<Visualization>,
}

impl SliceOutput {
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn print_time_seconds(&self) -> f64 {
        self.time.total()
    }
}

/// Receiver of finished slices
pub trait SliceOutputSink: Send + Sync {
    fn publish(&self, output: SliceOutput);
}

/// Keeps the latest output of every plate in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    outputs: Mutex<Vec<SliceOutput>>,
    notify: Notify,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest output of `plate`
    pub fn latest(&self, plate: BuildPlateId) -> Option<SliceOutput> {
        self.outputs
            .lock()
            .iter()
            .rev()
            .find(|output| output.plate == plate)
            .cloned()
    }

    /// Plates in publication order
    pub fn published_plates(&self) -> Vec<BuildPlateId> {
        self.outputs.lock().iter().map(|output| output.plate).collect()
    }

    pub fn len(&self) -> usize {
        self.outputs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.lock().is_empty()
    }

    /// Wait until at least `count` outputs were published
    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.len() >= count {
                return;
            }
            notified.await;
        }
    }
}

impl SliceOutputSink for MemorySink {
    fn publish(&self, output: SliceOutput) {
        self.outputs.lock().push(output);
        self.notify.notify_waiters();
    }
}

/// Writes each plate's g-code to `<dir>/<stem>_<plate>.gcode`
#[derive(Debug, Clone)]
pub struct GcodeFileSink {
    dir: PathBuf,
    stem: String,
}

impl GcodeFileSink {
    pub fn new(dir: impl Into<PathBuf>, stem: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.into(),
        }
    }

    pub fn path_for(&self, plate: BuildPlateId) -> PathBuf {
        self.dir.join(format!("{}_{}.gcode", self.stem, plate))
    }

    fn write(&self, output: &SliceOutput) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(output.plate);
        let mut file = std::io::BufWriter::new(std::fs::File::create(&path)?);
        for line in &output.gcode {
            writeln!(file, "{}", line)?;
        }
        file.flush()?;
        Ok(path)
    }
}

impl SliceOutputSink for GcodeFileSink {
    fn publish(&self, output: SliceOutput) {
        match self.write(&output) {
            Ok(path) => tracing::info!(
                "Plate {}: wrote {} lines to {}",
                output.plate,
                output.gcode.len(),
                path.display()
            ),
            Err(e) => tracing::error!("Plate {}: failed to write g-code: {}", output.plate, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(plate: BuildPlateId) -> SliceOutput {
        SliceOutput {
            plate,
            gcode: vec!["G28".into(), "G1 X1".into()],
            layers: LayerSet::new(),
            time: TimeEstimate::new(),
            material: MaterialEstimate::new(1),
            filament_m: 0.0,
            filament_g: 0.0,
            visualization: None,
        }
    }

    #[test]
    fn test_memory_sink_keeps_latest() {
        let sink = MemorySink::new();
        sink.publish(output(0));
        let mut second = output(0);
        second.gcode.push("M84".into());
        sink.publish(second);
        sink.publish(output(1));
        assert_eq!(sink.published_plates(), vec![0, 0, 1]);
        assert_eq!(sink.latest(0).map(|o| o.gcode.len()), Some(3));
    }

    #[test]
    fn test_file_sink_writes_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = GcodeFileSink::new(dir.path(), "part");
        sink.publish(output(2));
        let text = std::fs::read_to_string(dir.path().join("part_2.gcode")).expect("written");
        assert_eq!(text, "G28\nG1 X1\n");
    }
}
