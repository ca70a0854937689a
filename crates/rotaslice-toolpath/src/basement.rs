//! Basement generator
//!
//! Curved layers need something to stick to. Before the first curved layer a
//! tube is wound around the rotary axis: each basement layer is a double
//! helix at a slightly larger radius than the last. Both strands sweep down
//! from the basement height to twice the line width, the second half a turn
//! behind the first so the two interleave.

use nalgebra::{Point3, Vector3};
use std::f64::consts::{PI, TAU};

use rotaslice_core::{CancelToken, FeatureType, SynthesisError};

use crate::motion::MotionWriter;
use crate::settings::SynthesisSettings;
use crate::synthesizer::SynthesisOutput;

/// Command written when the basement is disabled
pub const DISABLED_PRIME: &str = "G92 E0";

/// Angular step keeping each chord within `chordal_error` of the circle
pub fn angular_step(radius: f64, chordal_error: f64) -> f64 {
    if radius <= 0.0 || chordal_error <= 0.0 {
        return PI / 2.0;
    }
    let ratio = (chordal_error / radius).min(1.0);
    (2.0 * (1.0 - ratio).acos()).min(PI / 2.0)
}

/// Write `layers` basement layers, or the disabled prime command
pub(crate) fn write_basement_layers(
    writer: &mut MotionWriter<'_>,
    settings: &SynthesisSettings,
    layers: usize,
    cancel: &CancelToken,
) -> Result<(), SynthesisError> {
    let raft = &settings.raft;
    if !raft.enabled || layers == 0 || !settings.mode.has_rotary_axes() {
        writer.raw(DISABLED_PRIME);
        return Ok(());
    }

    let bottom = 2.0 * settings.line_width;
    let top = raft.height.max(bottom);
    let pitch = 2.0 * settings.line_width;
    let turns = ((top - bottom) / pitch).ceil().max(1.0);
    let thickness = settings.layer_height;

    tracing::info!("Writing {} basement layers", layers);
    writer.set_feature(FeatureType::Skirt);
    writer.set_feed_override(Some(raft.speed));

    for n in 0..layers {
        cancel.check()?;
        let index = n as i32 - layers as i32;
        let radius = raft.base_radius + n as f64 * raft.radius_step;
        writer.begin_layer(index, radius, thickness);

        let step = angular_step(radius, raft.chordal_error);
        let sweep = TAU * turns;
        let steps = (sweep / step).ceil().max(1.0) as usize;

        for phase in [0.0, PI] {
            for i in 0..=steps {
                cancel.check()?;
                let t = i as f64 / steps as f64;
                let theta = phase + sweep * t;
                let z = top + (bottom - top) * t;
                let (p, normal) = helix_point(radius, theta, z);
                if i == 0 {
                    writer.travel_to(p, normal);
                } else {
                    writer.extrude_to(p, normal, thickness);
                }
            }
        }
    }

    writer.set_feed_override(None);
    writer.end_layer();
    Ok(())
}

/// Basement of the configured layer count inside a running synthesis
pub(crate) fn write_basement(
    writer: &mut MotionWriter<'_>,
    settings: &SynthesisSettings,
    cancel: &CancelToken,
) -> Result<(), SynthesisError> {
    write_basement_layers(writer, settings, settings.raft.layers, cancel)
}

/// Generate a standalone basement of `layer_count` layers
///
/// The output carries no prologue or epilogue. With the basement disabled
/// it holds only the prime command and no layers.
pub fn generate_basement(
    settings: &SynthesisSettings,
    layer_count: usize,
    cancel: &CancelToken,
) -> Result<SynthesisOutput, SynthesisError> {
    let mut writer = MotionWriter::new(settings);
    write_basement_layers(&mut writer, settings, layer_count, cancel)?;
    let motion = writer.finish();
    Ok(SynthesisOutput {
        gcode: motion.lines,
        layers: motion.layers,
        time: motion.time,
        material: motion.material,
        anomalies: 0,
    })
}

fn helix_point(radius: f64, theta: f64, z: f64) -> (Point3<f64>, Vector3<f64>) {
    let (sin, cos) = theta.sin_cos();
    (
        Point3::new(radius * cos, radius * sin, z),
        Vector3::new(cos, sin, 0.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotaslice_settings::SettingsSnapshot;

    fn raft_settings(enabled: bool) -> SynthesisSettings {
        mode_settings("cylindrical_full", enabled)
    }

    fn mode_settings(mode: &str, enabled: bool) -> SynthesisSettings {
        let snapshot = SettingsSnapshot::defaults()
            .with("kinematic_mode", mode)
            .with("raft_enabled", if enabled { "true" } else { "false" });
        SynthesisSettings::from_snapshot(&snapshot).expect("valid")
    }

    #[test]
    fn test_angular_step_from_chordal_error() {
        let step = angular_step(10.0, 0.1);
        let sagitta = 10.0 * (1.0 - (step / 2.0).cos());
        assert!((sagitta - 0.1).abs() < 1e-12);
        assert_eq!(angular_step(0.0, 0.1), PI / 2.0);
        assert_eq!(angular_step(1.0, 5.0), PI / 2.0);
    }

    #[test]
    fn test_disabled_is_single_prime() {
        let settings = raft_settings(false);
        let out = generate_basement(&settings, 3, &CancelToken::new()).expect("basement");
        assert_eq!(out.gcode, vec![DISABLED_PRIME]);
        assert!(out.layers.is_empty());
        assert_eq!(out.time.total(), 0.0);
    }

    #[test]
    fn test_layers_are_negative_and_grow_outwards() {
        let settings = raft_settings(true);
        let out = generate_basement(&settings, 3, &CancelToken::new()).expect("basement");
        let indices: Vec<i32> = out.layers.keys().copied().collect();
        assert_eq!(indices, vec![-3, -2, -1]);

        for (n, layer) in out.layers.values().enumerate() {
            let expected = settings.raft.base_radius + n as f64 * settings.raft.radius_step;
            let extruded = layer
                .points
                .iter()
                .filter(|p| p.feature == FeatureType::Skirt);
            for point in extruded {
                let r = (point.x * point.x + point.y * point.y).sqrt();
                assert!((r - expected).abs() < 1e-9);
                assert!(point.z >= 2.0 * settings.line_width - 1e-9);
                assert!(point.z <= settings.raft.height + 1e-9);
            }

            let strands = layer
                .points
                .windows(2)
                .filter(|pair| pair.iter().all(|p| p.feature == FeatureType::Skirt));
            for pair in strands {
                assert!(
                    pair[1].z <= pair[0].z + 1e-9,
                    "strand rises from {} to {}",
                    pair[0].z,
                    pair[1].z
                );
            }
        }
        assert!(out.material.volume(0) > 0.0);
    }

    #[test]
    fn test_planar_machine_skips_basement() {
        let settings = mode_settings("planar", true);
        let out = generate_basement(&settings, 3, &CancelToken::new()).expect("basement");
        assert_eq!(out.gcode, vec![DISABLED_PRIME]);
        assert!(out.layers.is_empty());
    }

    #[test]
    fn test_cancelled_basement() {
        let settings = raft_settings(true);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            generate_basement(&settings, 2, &cancel),
            Err(SynthesisError::Cancelled)
        ));
    }
}
