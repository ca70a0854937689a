//! Motion writer shared by the synthesizer and the basement generator
//!
//! Owns everything that changes while points are written: the kinematic
//! transform, the emitter, the physical head position, the open layer, the
//! retraction state and the estimates. One writer lives for one run.

use nalgebra::{Point3, Vector3};

use rotaslice_core::{ExtruderIndex, FeatureType, MachinePosition};

use crate::emitter::{Emitter, Motion};
use crate::estimate::{MaterialEstimate, TimeEstimate};
use crate::kinematics::KinematicTransform;
use crate::layers::{LayerBuffer, LayerSet, ToolpathPoint};
use crate::settings::SynthesisSettings;

/// Everything a finished writer produced
#[derive(Debug)]
pub struct MotionOutput {
    pub lines: Vec<String>,
    pub layers: LayerSet,
    pub time: TimeEstimate,
    pub material: MaterialEstimate,
}

pub struct MotionWriter<'s> {
    settings: &'s SynthesisSettings,
    transform: KinematicTransform,
    emitter: Emitter,
    extruder: ExtruderIndex,
    physical: MachinePosition,
    normal: Vector3<f64>,
    feature: FeatureType,
    announced: Option<FeatureType>,
    feed_override: Option<f64>,
    retracted: bool,
    buffer: LayerBuffer,
    layers: LayerSet,
    time: TimeEstimate,
    material: MaterialEstimate,
}

impl<'s> MotionWriter<'s> {
    pub fn new(settings: &'s SynthesisSettings) -> Self {
        let extruder = settings.active_extruder;
        let transform =
            KinematicTransform::new(settings.mode, settings.gear_ratio_a, settings.gear_ratio_c);
        let emitter = Emitter::new(transform.has_rotary_axes(), extruder);
        Self {
            settings,
            transform,
            emitter,
            extruder,
            physical: MachinePosition::origin(settings.extruders.len()),
            normal: Vector3::z(),
            feature: FeatureType::None,
            announced: None,
            feed_override: None,
            retracted: false,
            buffer: LayerBuffer::default(),
            layers: LayerSet::new(),
            time: TimeEstimate::new(),
            material: MaterialEstimate::new(settings.extruders.len()),
        }
    }

    /// Current physical head position
    pub fn position(&self) -> Point3<f64> {
        Point3::new(self.physical.x, self.physical.y, self.physical.z)
    }

    /// Feature applied to following extrusions
    pub fn set_feature(&mut self, feature: FeatureType) {
        self.feature = feature;
    }

    /// Print speed in mm/s replacing the per-feature speeds, `None` to clear
    pub fn set_feed_override(&mut self, feed: Option<f64>) {
        self.feed_override = feed.filter(|f| *f > 0.0);
    }

    pub fn feature(&self) -> FeatureType {
        self.feature
    }

    pub fn is_retracted(&self) -> bool {
        self.retracted
    }

    /// Seconds accumulated so far
    pub fn elapsed(&self) -> f64 {
        self.time.total()
    }

    /// Close the open layer and start a new one
    pub fn begin_layer(&mut self, index: i32, height: f64, thickness: f64) {
        self.end_layer();
        self.emitter.comment(format!("LAYER:{}", index));
        let seed = [self.physical.x, self.physical.y, self.physical.z];
        self.buffer.begin(index, height, thickness, seed);
        tracing::debug!("Layer {} at {:.3} mm, thickness {:.3}", index, height, thickness);
    }

    /// Close the open layer, keeping it when it holds at least two points
    pub fn end_layer(&mut self) {
        if !self.buffer.is_open() {
            return;
        }
        if let Some(record) = self.buffer.flush() {
            self.layers.insert(record.index, record);
        }
        self.emitter
            .comment(format!("TIME_ELAPSED:{:.6}", self.time.total()));
    }

    /// Move without extruding, retracting and hopping when the travel is long
    pub fn travel_to(&mut self, point: Point3<f64>, normal: Vector3<f64>) {
        let settings = self.settings;
        let params = settings.active();
        let distance = (point - self.position()).norm();
        let retract = params.retraction_enable
            && params.retraction_amount > 0.0
            && distance > params.retraction_min_travel
            && self.feature.retracts_on_travel();

        if !retract {
            self.rapid(point, normal, FeatureType::Travel);
            return;
        }

        self.retract();
        let hop = if params.hop_enabled && params.hop_height > 0.0 {
            params.hop_height
        } else {
            0.0
        };
        if hop > 0.0 {
            let departure = self.normal;
            self.hop(self.position(), departure, hop);
            self.rapid(point, normal, FeatureType::Travel);
            self.hop(point, normal, hop);
        } else {
            self.rapid(point, normal, FeatureType::Travel);
        }
        self.prime();
    }

    /// Extrude a straight segment to `point`
    pub fn extrude_to(&mut self, point: Point3<f64>, normal: Vector3<f64>, thickness: f64) {
        if self.retracted {
            self.prime();
        }
        let settings = self.settings;
        let params = settings.active();
        let feed = self
            .feed_override
            .unwrap_or_else(|| settings.feeds.for_feature(self.feature));
        self.announce_feature();

        let length = (point - self.position()).norm();
        let volume = settings.line_width * thickness.max(0.0) * length;
        let e = self.physical.extruded(self.extruder) + volume / params.filament_area();
        self.material.add(self.extruder, volume);
        self.time.add(self.feature, point_time(length, feed));

        self.physical = self
            .physical
            .with_xyz(point.x, point.y, point.z)
            .with_extrusion(self.extruder, e)
            .with_feed(feed);
        self.normal = normal;
        self.buffer.push(ToolpathPoint {
            x: point.x,
            y: point.y,
            z: point.z,
            feature: self.feature,
            feed,
        });
        self.emit(Motion::Linear, feed);
    }

    /// Pull filament back
    pub fn retract(&mut self) {
        if self.retracted {
            return;
        }
        let settings = self.settings;
        let params = settings.active();
        let e = self.physical.extruded(self.extruder) - params.retraction_amount;
        self.physical = self.physical.with_extrusion(self.extruder, e);
        self.time.add(
            FeatureType::Retract,
            point_time(params.retraction_amount, params.retraction_speed),
        );
        self.retracted = true;
        self.emit(Motion::Linear, params.retraction_speed);
    }

    /// Push retracted filament back
    pub fn prime(&mut self) {
        if !self.retracted {
            return;
        }
        let settings = self.settings;
        let params = settings.active();
        let e = self.physical.extruded(self.extruder) + params.retraction_amount;
        self.physical = self.physical.with_extrusion(self.extruder, e);
        self.time.add(
            FeatureType::Retract,
            point_time(params.retraction_amount, params.prime_speed),
        );
        self.retracted = false;
        self.emit(Motion::Linear, params.prime_speed);
    }

    /// Append a comment line
    pub fn comment(&mut self, text: impl AsRef<str>) {
        self.emitter.comment(text);
    }

    /// Append a literal line
    pub fn raw(&mut self, line: impl Into<String>) {
        self.emitter.raw(line);
    }

    /// Close the open layer and hand over the results
    pub fn finish(mut self) -> MotionOutput {
        self.end_layer();
        MotionOutput {
            lines: self.emitter.into_lines(),
            layers: self.layers,
            time: self.time,
            material: self.material,
        }
    }

    fn rapid(&mut self, point: Point3<f64>, normal: Vector3<f64>, bucket: FeatureType) {
        let feed = self.settings.feeds.travel;
        let length = (point - self.position()).norm();
        self.time.add(bucket, point_time(length, feed));
        self.physical = self
            .physical
            .with_xyz(point.x, point.y, point.z)
            .with_feed(feed);
        self.normal = normal;
        if bucket == FeatureType::Travel {
            self.buffer.push(ToolpathPoint {
                x: point.x,
                y: point.y,
                z: point.z,
                feature: FeatureType::Travel,
                feed,
            });
        }
        self.emit(Motion::Rapid, feed);
    }

    /// Lift along `normal` and come back down to `at`
    fn hop(&mut self, at: Point3<f64>, normal: Vector3<f64>, height: f64) {
        self.rapid(at + unit_or_up(normal) * height, normal, FeatureType::Retract);
        self.rapid(at, normal, FeatureType::Retract);
    }

    fn announce_feature(&mut self) {
        if self.announced != Some(self.feature) {
            self.emitter
                .comment(format!("TYPE:{}", self.feature.marker_name()));
            self.announced = Some(self.feature);
        }
    }

    fn emit(&mut self, motion: Motion, feed_mm_s: f64) {
        let coords = self.transform.apply(self.position(), self.normal);
        let target = MachinePosition {
            x: coords.x,
            y: coords.y,
            z: coords.z,
            a: coords.a,
            c: coords.c,
            feed: feed_mm_s * 60.0,
            extrusion: self.physical.extrusion.clone(),
        };
        self.emitter.emit(motion, &target);
    }
}

/// Seconds for one point, doubled to approximate acceleration
fn point_time(length: f64, feed: f64) -> f64 {
    if feed > 0.0 {
        2.0 * length / feed
    } else {
        0.0
    }
}

fn unit_or_up(v: Vector3<f64>) -> Vector3<f64> {
    let norm = v.norm();
    if norm > f64::EPSILON {
        v / norm
    } else {
        Vector3::z()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotaslice_settings::SettingsSnapshot;

    fn settings(snapshot: SettingsSnapshot) -> SynthesisSettings {
        SynthesisSettings::from_snapshot(&snapshot).expect("valid settings")
    }

    #[test]
    fn test_short_travel_does_not_retract() {
        let settings = settings(SettingsSnapshot::defaults());
        let mut writer = MotionWriter::new(&settings);
        writer.set_feature(FeatureType::WallOuter);
        writer.travel_to(Point3::new(1.0, 0.0, 0.2), Vector3::z());
        let out = writer.finish();
        assert_eq!(out.lines.len(), 1);
        assert!(out.lines[0].starts_with("G0 "));
    }

    #[test]
    fn test_long_travel_retracts_hops_and_primes() {
        let settings = settings(SettingsSnapshot::defaults());
        let mut writer = MotionWriter::new(&settings);
        writer.set_feature(FeatureType::WallOuter);
        writer.travel_to(Point3::new(10.0, 0.0, 0.2), Vector3::z());
        assert!(!writer.is_retracted());
        let out = writer.finish();
        assert_eq!(
            out.lines,
            vec![
                "G1 X0.000 Y0.000 Z0.000 E-1.00000 F2100",
                "G0 Z0.400 F7200",
                "G0 Z0.000",
                "G0 X10.000 Z0.200",
                "G0 Z0.600",
                "G0 Z0.200",
                "G1 E0.00000 F1500",
            ]
        );
        assert!(out.time.get(FeatureType::Retract) > 0.0);
        assert!(out.time.get(FeatureType::Travel) > 0.0);
    }

    #[test]
    fn test_hop_follows_surface_normal_at_both_ends() {
        let snapshot = SettingsSnapshot::defaults().with("kinematic_mode", "cylindrical_full");
        let settings = settings(snapshot);
        let mut writer = MotionWriter::new(&settings);
        writer.set_feature(FeatureType::WallOuter);
        writer.extrude_to(Point3::new(10.0, 0.0, 0.0), Vector3::x(), 0.2);
        writer.travel_to(Point3::new(0.0, 10.0, 20.0), Vector3::y());
        let out = writer.finish();

        let rapids: Vec<&String> = out.lines.iter().filter(|l| l.starts_with("G0 ")).collect();
        assert_eq!(rapids.len(), 5, "{:?}", rapids);
        // each hop is a pure lift along the machine Z and back
        for (lift, lower) in [(rapids[0], rapids[1]), (rapids[3], rapids[4])] {
            assert!(lift.contains(" Z"), "{}", lift);
            assert!(!lift.contains('X') && !lift.contains('Y'), "{}", lift);
            assert!(!lower.contains('X') && !lower.contains('Y'), "{}", lower);
        }
    }

    #[test]
    fn test_infill_travel_never_retracts() {
        let settings = settings(SettingsSnapshot::defaults());
        let mut writer = MotionWriter::new(&settings);
        writer.set_feature(FeatureType::Infill);
        writer.travel_to(Point3::new(50.0, 0.0, 0.2), Vector3::z());
        let out = writer.finish();
        assert_eq!(out.lines.len(), 1);
    }

    #[test]
    fn test_extrusion_volume_and_time() {
        let settings = settings(SettingsSnapshot::defaults());
        let mut writer = MotionWriter::new(&settings);
        writer.set_feature(FeatureType::Skin);
        writer.extrude_to(Point3::new(10.0, 0.0, 0.0), Vector3::z(), 0.2);
        let out = writer.finish();

        assert!((out.material.volume(0) - 0.8).abs() < 1e-12);
        // 2 * 10 mm / 30 mm/s
        assert!((out.time.get(FeatureType::Skin) - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(out.lines[0], ";TYPE:SKIN");
        assert!(out.lines[1].starts_with("G1 X10.000"));
    }

    #[test]
    fn test_layer_comments_and_records() {
        let settings = settings(SettingsSnapshot::defaults());
        let mut writer = MotionWriter::new(&settings);
        writer.begin_layer(0, 0.2, 0.2);
        writer.set_feature(FeatureType::WallOuter);
        writer.extrude_to(Point3::new(1.0, 0.0, 0.2), Vector3::z(), 0.2);
        writer.begin_layer(1, 0.4, 0.2);
        let out = writer.finish();

        assert_eq!(out.layers.len(), 1);
        assert!(out.layers.contains_key(&0));
        assert_eq!(out.lines[0], ";LAYER:0");
        assert!(out.lines.iter().any(|l| l == ";LAYER:1"));
        assert_eq!(
            out.lines.iter().filter(|l| l.starts_with(";TIME_ELAPSED:")).count(),
            2
        );
    }
}
