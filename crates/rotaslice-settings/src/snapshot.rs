//! Flattened settings snapshots
//!
//! The settings inheritance system upstream resolves every profile, material
//! and object override into plain string values before slicing starts. A
//! [`SettingsSnapshot`] is that resolved view: one global map plus one map
//! per extruder. Extruder lookups fall back to the global map.
//!
//! Values are read through a [`SettingsReader`], which records every missing
//! or unparsable key instead of stopping at the first one so the user sees
//! all offending keys at once.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use rotaslice_core::ExtruderIndex;

use crate::error::{SettingIssue, SettingsError, SettingsResult};

/// Resolved global and per-extruder settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    /// Machine-wide values
    #[serde(default)]
    pub global: BTreeMap<String, String>,
    /// Values specific to each extruder
    #[serde(default)]
    pub extruders: Vec<BTreeMap<String, String>>,
}

impl SettingsSnapshot {
    /// Create an empty snapshot with a single extruder
    pub fn new() -> Self {
        Self {
            global: BTreeMap::new(),
            extruders: vec![BTreeMap::new()],
        }
    }

    /// Snapshot populated with the stock machine and material defaults
    pub fn defaults() -> Self {
        let mut snapshot = Self::new();
        for (key, value) in GLOBAL_DEFAULTS {
            snapshot.set(*key, *value);
        }
        for (key, value) in EXTRUDER_DEFAULTS {
            snapshot.set_extruder(0, *key, *value);
        }
        snapshot
    }

    /// Builder form of [`set`](Self::set)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Set a global value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.global.insert(key.into(), value.into());
    }

    /// Set a per-extruder value, adding extruders as needed
    pub fn set_extruder(
        &mut self,
        extruder: ExtruderIndex,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        if extruder >= self.extruders.len() {
            self.extruders.resize_with(extruder + 1, BTreeMap::new);
        }
        self.extruders[extruder].insert(key.into(), value.into());
    }

    /// Look up a global value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.global.get(key).map(String::as_str)
    }

    /// Look up an extruder value, falling back to the global map
    pub fn get_extruder(&self, extruder: ExtruderIndex, key: &str) -> Option<&str> {
        self.extruders
            .get(extruder)
            .and_then(|values| values.get(key))
            .map(String::as_str)
            .or_else(|| self.get(key))
    }

    /// Number of configured extruders, at least one
    pub fn extruder_count(&self) -> usize {
        self.extruders.len().max(1)
    }

    /// Overlay another snapshot on top of this one
    pub fn merge(&mut self, overrides: &SettingsSnapshot) {
        for (key, value) in &overrides.global {
            self.global.insert(key.clone(), value.clone());
        }
        for (index, values) in overrides.extruders.iter().enumerate() {
            for (key, value) in values {
                self.set_extruder(index, key.clone(), value.clone());
            }
        }
    }

    /// Start a typed read of this snapshot
    pub fn reader(&self) -> SettingsReader<'_> {
        SettingsReader {
            snapshot: self,
            issues: Vec::new(),
        }
    }
}

const GLOBAL_DEFAULTS: &[(&str, &str)] = &[
    ("kinematic_mode", "planar"),
    ("jobname", "rotaslice"),
    ("layer_height", "0.2"),
    ("layer_thickness_sanity_max", "0.4"),
    ("layer_thickness_fallback", "0.2"),
    ("line_width", "0.4"),
    ("speed_wall_outer", "30"),
    ("speed_wall_inner", "40"),
    ("speed_skin", "30"),
    ("speed_infill", "60"),
    ("speed_support", "50"),
    ("speed_support_interface", "40"),
    ("speed_skirt", "25"),
    ("speed_travel", "120"),
    ("gear_ratio_a", "1.0"),
    ("gear_ratio_c", "1.0"),
    ("bed_temperature", "60"),
    ("active_extruder", "0"),
    ("raft_enabled", "false"),
    ("raft_layers", "3"),
    ("raft_base_radius", "4.0"),
    ("raft_radius_step", "2.0"),
    ("raft_height", "6.0"),
    ("raft_chordal_error", "0.05"),
    ("raft_speed", "20"),
    ("discrete_tilt_angles", "0,45"),
    ("hybrid_core_radius", "10.0"),
    ("machine_width", "200"),
    ("machine_depth", "200"),
    ("machine_height", "200"),
    ("machine_max_temperature", "300"),
];

const EXTRUDER_DEFAULTS: &[(&str, &str)] = &[
    ("extruder_enabled", "true"),
    ("filament_diameter", "1.75"),
    ("filament_density", "1.24"),
    ("print_temperature", "210"),
    ("retraction_enable", "true"),
    ("retraction_amount", "1.0"),
    ("retraction_speed", "35"),
    ("retraction_prime_speed", "25"),
    ("retraction_min_travel", "1.5"),
    ("retraction_hop_enabled", "true"),
    ("retraction_hop", "0.4"),
];

/// Typed access to a snapshot that collects every bad key
///
/// Getters return a neutral value when a key is missing or invalid and
/// record a [`SettingIssue`]; call [`finish`](Self::finish) to turn the
/// collected issues into a single error.
#[derive(Debug)]
pub struct SettingsReader<'a> {
    snapshot: &'a SettingsSnapshot,
    issues: Vec<SettingIssue>,
}

impl<'a> SettingsReader<'a> {
    fn record(&mut self, key: &str, extruder: Option<ExtruderIndex>, reason: String) {
        self.issues.push(SettingIssue {
            key: key.to_string(),
            extruder,
            reason,
        });
    }

    fn lookup(&self, key: &str, extruder: Option<ExtruderIndex>) -> Option<&'a str> {
        match extruder {
            Some(index) => self.snapshot.get_extruder(index, key),
            None => self.snapshot.get(key),
        }
    }

    fn read<T>(&mut self, key: &str, extruder: Option<ExtruderIndex>) -> Option<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let Some(raw) = self.lookup(key, extruder) else {
            self.record(key, extruder, "missing".to_string());
            return None;
        };
        match raw.trim().parse::<T>() {
            Ok(value) => Some(value),
            Err(e) => {
                self.record(key, extruder, format!("invalid value '{}': {}", raw, e));
                None
            }
        }
    }

    /// Parse any `FromStr` value
    pub fn parse<T>(&mut self, key: &str) -> Option<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.read(key, None)
    }

    /// Global float
    pub fn float(&mut self, key: &str) -> f64 {
        self.read::<f64>(key, None)
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }

    /// Global float that must be strictly positive
    pub fn positive(&mut self, key: &str) -> f64 {
        let value = self.read::<f64>(key, None);
        self.require_positive(key, None, value)
    }

    /// Global float, `default` when the key is absent
    pub fn float_or(&mut self, key: &str, default: f64) -> f64 {
        if self.lookup(key, None).is_none() {
            return default;
        }
        self.float(key)
    }

    /// Per-extruder float that must be strictly positive
    pub fn extruder_positive(&mut self, extruder: ExtruderIndex, key: &str) -> f64 {
        let value = self.read::<f64>(key, Some(extruder));
        self.require_positive(key, Some(extruder), value)
    }

    /// Per-extruder float that may be zero
    pub fn extruder_float(&mut self, extruder: ExtruderIndex, key: &str) -> f64 {
        let value = self.read::<f64>(key, Some(extruder)).unwrap_or(0.0);
        if value < 0.0 {
            self.record(key, Some(extruder), format!("must not be negative, got {}", value));
            return 0.0;
        }
        value
    }

    /// Global boolean (`true`/`false`/`1`/`0`)
    pub fn boolean(&mut self, key: &str) -> bool {
        self.bool_at(key, None)
    }

    /// Per-extruder boolean
    pub fn extruder_boolean(&mut self, extruder: ExtruderIndex, key: &str) -> bool {
        self.bool_at(key, Some(extruder))
    }

    /// Global non-negative integer
    pub fn count(&mut self, key: &str) -> usize {
        self.read::<usize>(key, None).unwrap_or(0)
    }

    /// Global string, empty when missing
    pub fn text(&mut self, key: &str) -> String {
        match self.lookup(key, None) {
            Some(value) => value.to_string(),
            None => {
                self.record(key, None, "missing".to_string());
                String::new()
            }
        }
    }

    /// Comma separated list of floats
    pub fn float_list(&mut self, key: &str) -> Vec<f64> {
        let Some(raw) = self.lookup(key, None) else {
            self.record(key, None, "missing".to_string());
            return Vec::new();
        };
        let mut values = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.parse::<f64>() {
                Ok(value) => values.push(value),
                Err(_) => {
                    self.record(key, None, format!("invalid list entry '{}'", part));
                    return Vec::new();
                }
            }
        }
        values
    }

    /// Record a cross-key problem found by the caller
    pub fn report(&mut self, key: &str, reason: impl Into<String>) {
        self.record(key, None, reason.into());
    }

    /// Issues recorded so far
    pub fn issues(&self) -> &[SettingIssue] {
        &self.issues
    }

    /// Succeed when every read was valid
    pub fn finish(self) -> SettingsResult<()> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(SettingsError::InvalidSettings {
                issues: self.issues,
            })
        }
    }

    fn bool_at(&mut self, key: &str, extruder: Option<ExtruderIndex>) -> bool {
        let Some(raw) = self.lookup(key, extruder) else {
            self.record(key, extruder, "missing".to_string());
            return false;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => {
                self.record(key, extruder, format!("invalid boolean '{}'", raw));
                false
            }
        }
    }

    fn require_positive(
        &mut self,
        key: &str,
        extruder: Option<ExtruderIndex>,
        value: Option<f64>,
    ) -> f64 {
        match value {
            Some(v) if v.is_finite() && v > 0.0 => v,
            Some(v) => {
                self.record(key, extruder, format!("must be positive, got {}", v));
                0.0
            }
            None => 0.0,
        }
    }
}
