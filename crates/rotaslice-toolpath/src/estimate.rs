//! Print time and material estimates

use serde::{Deserialize, Serialize};

use rotaslice_core::{ExtruderIndex, FeatureType};

/// Seconds spent per feature type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeEstimate {
    buckets: [f64; FeatureType::ALL.len()],
}

impl TimeEstimate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add time to a feature bucket; negative or non-finite values are ignored
    pub fn add(&mut self, feature: FeatureType, seconds: f64) {
        if seconds.is_finite() && seconds > 0.0 {
            self.buckets[feature.index()] += seconds;
        }
    }

    /// Seconds attributed to a feature
    pub fn get(&self, feature: FeatureType) -> f64 {
        self.buckets[feature.index()]
    }

    /// Total seconds
    pub fn total(&self) -> f64 {
        self.buckets.iter().sum()
    }

    /// Merge another estimate into this one
    pub fn absorb(&mut self, other: &TimeEstimate) {
        for (mine, theirs) in self.buckets.iter_mut().zip(other.buckets.iter()) {
            *mine += theirs;
        }
    }
}

/// Extruded volume per extruder in mm³
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialEstimate {
    volumes: Vec<f64>,
}

impl MaterialEstimate {
    pub fn new(extruder_count: usize) -> Self {
        Self {
            volumes: vec![0.0; extruder_count],
        }
    }

    /// Add deposited volume; negative or non-finite values are ignored
    pub fn add(&mut self, extruder: ExtruderIndex, volume: f64) {
        if !(volume.is_finite() && volume > 0.0) {
            return;
        }
        if extruder >= self.volumes.len() {
            self.volumes.resize(extruder + 1, 0.0);
        }
        self.volumes[extruder] += volume;
    }

    /// Volume of one extruder in mm³
    pub fn volume(&self, extruder: ExtruderIndex) -> f64 {
        self.volumes.get(extruder).copied().unwrap_or(0.0)
    }

    /// Volumes of every extruder
    pub fn volumes(&self) -> &[f64] {
        &self.volumes
    }

    /// Filament length in mm for a filament cross-section in mm²
    pub fn length(&self, extruder: ExtruderIndex, filament_area: f64) -> f64 {
        if filament_area > 0.0 {
            self.volume(extruder) / filament_area
        } else {
            0.0
        }
    }

    /// Weight in grams for a density in g/cm³
    pub fn weight(&self, extruder: ExtruderIndex, density: f64) -> f64 {
        self.volume(extruder) / 1000.0 * density
    }

    /// Merge another estimate into this one
    pub fn absorb(&mut self, other: &MaterialEstimate) {
        for (extruder, volume) in other.volumes.iter().enumerate() {
            self.add(extruder, *volume);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_buckets() {
        let mut time = TimeEstimate::new();
        time.add(FeatureType::Infill, 2.0);
        time.add(FeatureType::Travel, 0.5);
        time.add(FeatureType::Travel, -4.0);
        time.add(FeatureType::Skin, f64::NAN);
        assert_eq!(time.get(FeatureType::Infill), 2.0);
        assert_eq!(time.total(), 2.5);
    }

    #[test]
    fn test_material_conversions() {
        let mut material = MaterialEstimate::new(1);
        material.add(0, 1000.0);
        material.add(2, 10.0);
        material.add(0, -5.0);
        assert_eq!(material.volumes().len(), 3);
        assert!((material.weight(0, 1.24) - 1.24).abs() < 1e-12);
        assert!((material.length(0, 2.0) - 500.0).abs() < 1e-12);
        assert_eq!(material.length(0, 0.0), 0.0);
    }
}
