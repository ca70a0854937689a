//! Typed synthesis parameters
//!
//! Built once per run from the flattened settings snapshot. Every bad key is
//! reported together through the snapshot reader.

use rotaslice_core::{ExtruderIndex, FeatureType, KinematicMode};
use rotaslice_settings::{SettingsResult, SettingsSnapshot};

/// Print speeds per feature in mm/s
#[derive(Debug, Clone, PartialEq)]
pub struct FeedRates {
    pub wall_outer: f64,
    pub wall_inner: f64,
    pub skin: f64,
    pub infill: f64,
    pub support: f64,
    pub support_interface: f64,
    pub skirt: f64,
    pub travel: f64,
}

impl FeedRates {
    /// Speed for a feature in mm/s
    pub fn for_feature(&self, feature: FeatureType) -> f64 {
        match feature {
            FeatureType::WallOuter => self.wall_outer,
            FeatureType::WallInner => self.wall_inner,
            FeatureType::Skin => self.skin,
            FeatureType::Infill => self.infill,
            FeatureType::Support => self.support,
            FeatureType::SupportInterface => self.support_interface,
            FeatureType::Skirt => self.skirt,
            FeatureType::Travel | FeatureType::Retract | FeatureType::None => self.travel,
        }
    }
}

/// Material and retraction parameters of one extruder
#[derive(Debug, Clone, PartialEq)]
pub struct ExtruderParams {
    pub enabled: bool,
    /// Filament diameter in mm
    pub filament_diameter: f64,
    /// Filament density in g/cm³
    pub filament_density: f64,
    pub print_temperature: f64,
    pub retraction_enable: bool,
    /// Retracted filament length in mm
    pub retraction_amount: f64,
    /// mm/s
    pub retraction_speed: f64,
    /// mm/s
    pub prime_speed: f64,
    /// Travel distance above which a retraction is performed
    pub retraction_min_travel: f64,
    pub hop_enabled: bool,
    pub hop_height: f64,
}

impl ExtruderParams {
    /// Filament cross-section in mm²
    pub fn filament_area(&self) -> f64 {
        let r = self.filament_diameter / 2.0;
        std::f64::consts::PI * r * r
    }
}

/// Basement generator parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RaftParams {
    pub enabled: bool,
    pub layers: usize,
    /// Radius of the innermost basement layer
    pub base_radius: f64,
    /// Radius growth per basement layer
    pub radius_step: f64,
    /// Height at which each helix sweep starts
    pub height: f64,
    /// Maximum chord deviation used to pick the angular step
    pub chordal_error: f64,
    /// mm/s
    pub speed: f64,
}

/// Everything one synthesis run needs
#[derive(Debug, Clone)]
pub struct SynthesisSettings {
    pub mode: KinematicMode,
    pub layer_height: f64,
    /// Layer thickness above which the fallback is used
    pub thickness_sanity_max: f64,
    pub thickness_fallback: f64,
    pub line_width: f64,
    pub feeds: FeedRates,
    pub extruders: Vec<ExtruderParams>,
    pub active_extruder: ExtruderIndex,
    pub gear_ratio_a: f64,
    pub gear_ratio_c: f64,
    pub raft: RaftParams,
    /// Tilt of each discrete segment in degrees
    pub discrete_tilts: Vec<f64>,
    pub jobname: String,
    /// Source values for template interpolation
    pub snapshot: SettingsSnapshot,
}

impl SynthesisSettings {
    /// Read and validate every synthesis parameter
    pub fn from_snapshot(snapshot: &SettingsSnapshot) -> SettingsResult<Self> {
        let mut reader = snapshot.reader();

        let mode = reader
            .parse::<KinematicMode>("kinematic_mode")
            .unwrap_or_default();
        let layer_height = reader.positive("layer_height");
        let thickness_sanity_max = reader.positive("layer_thickness_sanity_max");
        let thickness_fallback = reader.positive("layer_thickness_fallback");
        let line_width = reader.positive("line_width");

        let feeds = FeedRates {
            wall_outer: reader.positive("speed_wall_outer"),
            wall_inner: reader.positive("speed_wall_inner"),
            skin: reader.positive("speed_skin"),
            infill: reader.positive("speed_infill"),
            support: reader.positive("speed_support"),
            support_interface: reader.positive("speed_support_interface"),
            skirt: reader.positive("speed_skirt"),
            travel: reader.positive("speed_travel"),
        };

        let extruders = (0..snapshot.extruder_count())
            .map(|e| ExtruderParams {
                enabled: reader.extruder_boolean(e, "extruder_enabled"),
                filament_diameter: reader.extruder_positive(e, "filament_diameter"),
                filament_density: reader.extruder_positive(e, "filament_density"),
                print_temperature: reader.extruder_float(e, "print_temperature"),
                retraction_enable: reader.extruder_boolean(e, "retraction_enable"),
                retraction_amount: reader.extruder_float(e, "retraction_amount"),
                retraction_speed: reader.extruder_positive(e, "retraction_speed"),
                prime_speed: reader.extruder_positive(e, "retraction_prime_speed"),
                retraction_min_travel: reader.extruder_float(e, "retraction_min_travel"),
                hop_enabled: reader.extruder_boolean(e, "retraction_hop_enabled"),
                hop_height: reader.extruder_float(e, "retraction_hop"),
            })
            .collect::<Vec<_>>();

        let active_extruder = reader.count("active_extruder");
        let gear_ratio_a = reader.positive("gear_ratio_a");
        let gear_ratio_c = reader.positive("gear_ratio_c");

        let raft = RaftParams {
            enabled: reader.boolean("raft_enabled"),
            layers: reader.count("raft_layers"),
            base_radius: reader.positive("raft_base_radius"),
            radius_step: reader.float("raft_radius_step"),
            height: reader.positive("raft_height"),
            chordal_error: reader.positive("raft_chordal_error"),
            speed: reader.positive("raft_speed"),
        };

        let discrete_tilts = if mode == KinematicMode::Discrete {
            reader.float_list("discrete_tilt_angles")
        } else {
            Vec::new()
        };
        let jobname = reader.text("jobname");

        if active_extruder >= extruders.len() {
            reader.report(
                "active_extruder",
                format!(
                    "extruder {} does not exist ({} configured)",
                    active_extruder,
                    extruders.len()
                ),
            );
        }
        if mode == KinematicMode::Discrete && discrete_tilts.is_empty() {
            reader.report("discrete_tilt_angles", "at least one segment tilt is required");
        }
        reader.finish()?;

        Ok(Self {
            mode,
            layer_height,
            thickness_sanity_max,
            thickness_fallback,
            line_width,
            feeds,
            extruders,
            active_extruder,
            gear_ratio_a,
            gear_ratio_c,
            raft,
            discrete_tilts,
            jobname,
            snapshot: snapshot.clone(),
        })
    }

    /// Parameters of the extruder used for printing
    pub fn active(&self) -> &ExtruderParams {
        &self.extruders[self.active_extruder]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_parse() {
        let settings = SynthesisSettings::from_snapshot(&SettingsSnapshot::defaults())
            .expect("defaults are valid");
        assert_eq!(settings.mode, KinematicMode::Planar);
        assert_eq!(settings.extruders.len(), 1);
        assert!((settings.thickness_sanity_max - 0.4).abs() < 1e-12);
        assert!((settings.thickness_fallback - 0.2).abs() < 1e-12);
        assert!((settings.active().filament_area() - 2.405_281_7).abs() < 1e-6);
        assert_eq!(settings.feeds.for_feature(FeatureType::Retract), 120.0);
    }

    #[test]
    fn test_invalid_keys_are_reported_together() {
        let mut snapshot = SettingsSnapshot::defaults();
        snapshot.set("line_width", "0");
        snapshot.set("kinematic_mode", "polar");
        snapshot.set_extruder(0, "filament_diameter", "thick");

        let err = SynthesisSettings::from_snapshot(&snapshot).unwrap_err();
        let keys = err.keys();
        assert!(keys.contains(&"line_width".to_string()));
        assert!(keys.contains(&"kinematic_mode".to_string()));
        assert!(keys.contains(&"filament_diameter".to_string()));
    }

    #[test]
    fn test_discrete_requires_tilts() {
        let snapshot = SettingsSnapshot::defaults()
            .with("kinematic_mode", "discrete")
            .with("discrete_tilt_angles", "");
        let err = SynthesisSettings::from_snapshot(&snapshot).unwrap_err();
        assert_eq!(err.keys(), vec!["discrete_tilt_angles"]);
    }

    #[test]
    fn test_missing_extruder_is_rejected() {
        let snapshot = SettingsSnapshot::defaults().with("active_extruder", "2");
        let err = SynthesisSettings::from_snapshot(&snapshot).unwrap_err();
        assert_eq!(err.keys(), vec!["active_extruder"]);
    }
}
