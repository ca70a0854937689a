//! Toolpath synthesis
//!
//! A [`SynthesisRun`] consumes one or more geometry streams, in print order,
//! and produces g-code, layer records and estimates. Hybrid kinematic modes
//! feed several streams (planar core first, then the curved shell, or one
//! stream per discrete segment) into the same run so the kinematic state
//! and the accounting carry over between them.

use std::io::BufRead;

use rotaslice_core::{CancelToken, SynthesisError};

use crate::basement;
use crate::estimate::{MaterialEstimate, TimeEstimate};
use crate::layers::LayerSet;
use crate::mode::ModeMapping;
use crate::motion::MotionWriter;
use crate::settings::SynthesisSettings;
use crate::stream::{StreamParser, StreamRecord};
use crate::template::{DeferredValues, TemplateSet};

/// Result of a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisOutput {
    /// G-code with deferred tokens still in place
    pub gcode: Vec<String>,
    pub layers: LayerSet,
    pub time: TimeEstimate,
    pub material: MaterialEstimate,
    /// Malformed stream records that were skipped
    pub anomalies: usize,
}

impl SynthesisOutput {
    /// Number of layers kept, basement included
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Values for the deferred template tokens
    pub fn deferred_values(&self, settings: &SynthesisSettings) -> DeferredValues {
        let extruders = settings.extruders.iter().enumerate();
        let (length_mm, weight_g) = extruders.fold((0.0, 0.0), |(len, weight), (i, params)| {
            (
                len + self.material.length(i, params.filament_area()),
                weight + self.material.weight(i, params.filament_density),
            )
        });
        DeferredValues {
            print_time_seconds: self.time.total(),
            filament_amount: length_mm / 1000.0,
            filament_weight: weight_g,
            jobname: settings.jobname.clone(),
            layer_count: self.layer_count(),
        }
    }

    /// G-code with every deferred token resolved
    pub fn resolved_gcode(&self, settings: &SynthesisSettings) -> Vec<String> {
        let mut lines = self.gcode.clone();
        self.deferred_values(settings).resolve_all(&mut lines);
        lines
    }
}

/// One synthesis run over any number of streams
pub struct SynthesisRun<'s> {
    settings: &'s SynthesisSettings,
    writer: MotionWriter<'s>,
    cancel: CancelToken,
    anomalies: usize,
    layer_offset: i32,
    next_layer: i32,
}

impl<'s> SynthesisRun<'s> {
    pub fn new(settings: &'s SynthesisSettings, cancel: CancelToken) -> Self {
        Self {
            settings,
            writer: MotionWriter::new(settings),
            cancel,
            anomalies: 0,
            layer_offset: 0,
            next_layer: 0,
        }
    }

    /// Print the basement before the first stream, when enabled
    pub fn basement(&mut self) -> Result<(), SynthesisError> {
        basement::write_basement(&mut self.writer, self.settings, &self.cancel)
    }

    /// Consume one geometry stream
    ///
    /// Layer indices of later streams continue after the last layer of the
    /// previous one.
    pub fn feed<R: BufRead>(
        &mut self,
        mapping: ModeMapping,
        reader: R,
    ) -> Result<(), SynthesisError> {
        self.layer_offset = self.next_layer;
        let mut parser = StreamParser::new(reader);
        let mut previous_height = 0.0_f64;
        let mut height = 0.0_f64;
        let mut thickness = self.settings.layer_height;
        let mut in_layer = false;

        tracing::debug!("Synthesizing stream with {:?} mapping", mapping);

        for record in parser.by_ref() {
            self.cancel.check()?;
            match record? {
                StreamRecord::Layer {
                    index,
                    height: layer_height,
                } => {
                    height = layer_height;
                    thickness = self.guard_thickness(index, layer_height - previous_height);
                    previous_height = layer_height;

                    let emitted = index + self.layer_offset;
                    self.writer.begin_layer(emitted, height, thickness);
                    self.next_layer = self.next_layer.max(emitted + 1);
                    in_layer = true;
                }
                StreamRecord::Feature(feature) => self.writer.set_feature(feature),
                StreamRecord::Polyline(points) => {
                    if !in_layer {
                        tracing::warn!("Geometry stream: polyline before first layer dropped");
                        self.anomalies += 1;
                        continue;
                    }
                    let mut iter = points.iter();
                    if let Some(&(u, v)) = iter.next() {
                        let (p, n) = mapping.map(u, v, height);
                        self.writer.travel_to(p, n);
                    }
                    for &(u, v) in iter {
                        let (p, n) = mapping.map(u, v, height);
                        self.writer.extrude_to(p, n, thickness);
                    }
                }
            }
        }

        self.writer.end_layer();
        self.anomalies += parser.anomalies();
        Ok(())
    }

    /// Wrap the body in the prologue and epilogue
    pub fn finish(self) -> SynthesisOutput {
        let templates = TemplateSet::from_settings(self.settings);
        let motion = self.writer.finish();

        let mut gcode = templates.render_prologue(self.settings);
        gcode.extend(motion.lines);
        gcode.extend(templates.render_epilogue(self.settings));

        tracing::info!(
            "Synthesized {} layers, {} lines, {:.0}s",
            motion.layers.len(),
            gcode.len(),
            motion.time.total()
        );

        SynthesisOutput {
            gcode,
            layers: motion.layers,
            time: motion.time,
            material: motion.material,
            anomalies: self.anomalies,
        }
    }

    fn guard_thickness(&self, index: i32, thickness: f64) -> f64 {
        let max = self.settings.thickness_sanity_max;
        if thickness > max || thickness <= 0.0 {
            tracing::warn!(
                "Layer {} thickness {:.4} outside (0, {}], using {}",
                index,
                thickness,
                max,
                self.settings.thickness_fallback
            );
            self.settings.thickness_fallback
        } else {
            thickness
        }
    }
}

/// Synthesize a single stream
pub fn synthesize<R: BufRead>(
    settings: &SynthesisSettings,
    mapping: ModeMapping,
    reader: R,
    cancel: &CancelToken,
) -> Result<SynthesisOutput, SynthesisError> {
    let mut run = SynthesisRun::new(settings, cancel.clone());
    run.basement()?;
    run.feed(mapping, reader)?;
    Ok(run.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotaslice_core::FeatureType;
    use rotaslice_settings::SettingsSnapshot;
    use std::io::Cursor;

    fn planar() -> SynthesisSettings {
        SynthesisSettings::from_snapshot(&SettingsSnapshot::defaults()).expect("valid")
    }

    const SQUARE: &str = "\
;LAYER:0,0.2
;TYPE:WALL-OUTER
POLY:0,0,10,0,10,10,0,10,0,0
;LAYER:1,0.4
;TYPE:FILL
POLY:1,1,9,9
";

    #[test]
    fn test_square_layers() {
        let settings = planar();
        let out = synthesize(&settings, ModeMapping::Planar, Cursor::new(SQUARE), &CancelToken::new())
            .expect("synthesis");
        assert_eq!(out.layer_count(), 2);
        assert_eq!(out.anomalies, 0);
        assert!(out.gcode.iter().any(|l| l == ";TYPE:WALL-OUTER"));
        assert!(out.gcode.iter().any(|l| l == ";TYPE:FILL"));
        assert!((out.material.volume(0) - (40.0 + 128f64.sqrt()) * 0.4 * 0.2).abs() < 1e-9);
        assert!(out.time.get(FeatureType::WallOuter) > 0.0);
    }

    #[test]
    fn test_thickness_fallback() {
        let settings = planar();
        let stream = ";LAYER:0,0.2\nPOLY:0,0,1,0\n;LAYER:1,1.4\nPOLY:0,0,1,0\n";
        let out = synthesize(&settings, ModeMapping::Planar, Cursor::new(stream), &CancelToken::new())
            .expect("synthesis");
        assert!((out.layers[&0].thickness - 0.2).abs() < 1e-12);
        assert!((out.layers[&1].thickness - 0.2).abs() < 1e-12);
        assert!((out.layers[&1].height - 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_cancelled_run_stops() {
        let settings = planar();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = synthesize(&settings, ModeMapping::Planar, Cursor::new(SQUARE), &cancel);
        assert!(matches!(result, Err(SynthesisError::Cancelled)));
    }

    #[test]
    fn test_second_stream_continues_layer_indices() {
        let settings = planar();
        let mut run = SynthesisRun::new(&settings, CancelToken::new());
        run.feed(ModeMapping::Planar, Cursor::new(SQUARE)).expect("core");
        run.feed(ModeMapping::Planar, Cursor::new(SQUARE)).expect("shell");
        let out = run.finish();
        let indices: Vec<i32> = out.layers.keys().copied().collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_deferred_tokens_resolve() {
        let settings = planar();
        let out = synthesize(&settings, ModeMapping::Planar, Cursor::new(SQUARE), &CancelToken::new())
            .expect("synthesis");
        let resolved = out.resolved_gcode(&settings);
        assert!(resolved.iter().any(|l| l == ";LAYER_COUNT:2"));
        assert!(resolved.iter().any(|l| l == ";JOB:rotaslice"));
        assert!(!resolved.iter().any(|l| l.contains("{print_time}")));
    }
}
