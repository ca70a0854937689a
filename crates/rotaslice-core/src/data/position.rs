//! Machine position records

use serde::{Deserialize, Serialize};

use super::ExtruderIndex;

/// Immutable snapshot of a machine position
///
/// Holds linear coordinates, the rotary A/C angles in degrees, the feed rate
/// in mm/min and the cumulative extruded filament length of every extruder.
/// Updates produce a new value through the `with_*` builders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachinePosition {
    /// X-axis position
    pub x: f64,
    /// Y-axis position
    pub y: f64,
    /// Z-axis position
    pub z: f64,
    /// A-axis (rotation about X) in degrees
    pub a: f64,
    /// C-axis (rotation about Z) in degrees
    pub c: f64,
    /// Feed rate in mm/min
    pub feed: f64,
    /// Cumulative filament length per extruder in mm
    pub extrusion: Vec<f64>,
}

impl MachinePosition {
    /// Origin position with `extruder_count` zeroed extruders
    pub fn origin(extruder_count: usize) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            a: 0.0,
            c: 0.0,
            feed: 0.0,
            extrusion: vec![0.0; extruder_count.max(1)],
        }
    }

    /// Copy with new linear coordinates
    pub fn with_xyz(&self, x: f64, y: f64, z: f64) -> Self {
        debug_assert!(
            x.is_finite() && y.is_finite() && z.is_finite(),
            "MachinePosition axes must be finite: x={x}, y={y}, z={z}"
        );
        Self {
            x,
            y,
            z,
            ..self.clone()
        }
    }

    /// Copy with new rotary angles
    pub fn with_rotary(&self, a: f64, c: f64) -> Self {
        Self {
            a,
            c,
            ..self.clone()
        }
    }

    /// Copy with a new feed rate
    pub fn with_feed(&self, feed: f64) -> Self {
        Self {
            feed,
            ..self.clone()
        }
    }

    /// Copy with a new cumulative length for one extruder
    pub fn with_extrusion(&self, extruder: ExtruderIndex, length: f64) -> Self {
        let mut extrusion = self.extrusion.clone();
        if extruder >= extrusion.len() {
            extrusion.resize(extruder + 1, 0.0);
        }
        extrusion[extruder] = length;
        Self {
            extrusion,
            ..self.clone()
        }
    }

    /// Cumulative filament length of one extruder
    pub fn extruded(&self, extruder: ExtruderIndex) -> f64 {
        self.extrusion.get(extruder).copied().unwrap_or(0.0)
    }

    /// Straight-line distance between the linear coordinates of two positions
    pub fn distance_to(&self, other: &MachinePosition) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl Default for MachinePosition {
    fn default() -> Self {
        Self::origin(1)
    }
}
