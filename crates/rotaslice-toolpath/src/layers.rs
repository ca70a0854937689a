//! Layer records produced by synthesis

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use rotaslice_core::FeatureType;

/// A physical toolpath point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolpathPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub feature: FeatureType,
    /// mm/s, zero for seed points
    pub feed: f64,
}

/// Contiguous run of points sharing a feature, for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerPolyline {
    pub feature: FeatureType,
    pub points: Vec<[f64; 3]>,
}

/// Points of one layer in print order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRecord {
    /// Negative for basement layers
    pub index: i32,
    /// Cumulative height in mm
    pub height: f64,
    pub thickness: f64,
    pub points: Vec<ToolpathPoint>,
}

impl LayerRecord {
    /// Split the layer into same-feature polylines
    ///
    /// Each polyline starts at the last point of the previous one so the
    /// drawn path stays connected.
    pub fn polylines(&self) -> Vec<LayerPolyline> {
        let mut result: Vec<LayerPolyline> = Vec::new();
        let mut previous: Option<[f64; 3]> = None;

        for point in &self.points {
            let xyz = [point.x, point.y, point.z];
            match result.last_mut() {
                Some(current) if current.feature == point.feature => current.points.push(xyz),
                _ => {
                    let mut points = Vec::with_capacity(2);
                    points.extend(previous);
                    points.push(xyz);
                    result.push(LayerPolyline {
                        feature: point.feature,
                        points,
                    });
                }
            }
            previous = Some(xyz);
        }

        result.retain(|polyline| polyline.points.len() >= 2);
        result
    }
}

/// Layers keyed by index
pub type LayerSet = BTreeMap<i32, LayerRecord>;

/// Point buffer of the layer being synthesized
#[derive(Debug, Default)]
pub(crate) struct LayerBuffer {
    index: i32,
    height: f64,
    thickness: f64,
    points: Vec<ToolpathPoint>,
    open: bool,
}

impl LayerBuffer {
    /// Start a layer, seeded with the current head position
    pub(crate) fn begin(&mut self, index: i32, height: f64, thickness: f64, seed: [f64; 3]) {
        self.index = index;
        self.height = height;
        self.thickness = thickness;
        self.points.clear();
        self.points.push(ToolpathPoint {
            x: seed[0],
            y: seed[1],
            z: seed[2],
            feature: FeatureType::Travel,
            feed: 0.0,
        });
        self.open = true;
    }

    pub(crate) fn push(&mut self, point: ToolpathPoint) {
        if self.open {
            self.points.push(point);
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open
    }

    /// Close the layer; `None` when it has fewer than two points
    pub(crate) fn flush(&mut self) -> Option<LayerRecord> {
        if !self.open {
            return None;
        }
        self.open = false;
        let points = std::mem::take(&mut self.points);
        if points.len() < 2 {
            tracing::debug!("Discarding layer {} with {} points", self.index, points.len());
            return None;
        }
        Some(LayerRecord {
            index: self.index,
            height: self.height,
            thickness: self.thickness,
            points,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f64, feature: FeatureType) -> ToolpathPoint {
        ToolpathPoint {
            x,
            y: 0.0,
            z: 0.2,
            feature,
            feed: 30.0,
        }
    }

    #[test]
    fn test_seed_alone_is_discarded() {
        let mut buffer = LayerBuffer::default();
        buffer.begin(0, 0.2, 0.2, [0.0, 0.0, 0.0]);
        assert!(buffer.flush().is_none());
        assert!(!buffer.is_open());
    }

    #[test]
    fn test_push_outside_layer_is_ignored() {
        let mut buffer = LayerBuffer::default();
        buffer.push(point(1.0, FeatureType::Skin));
        assert!(buffer.flush().is_none());

        buffer.begin(3, 0.8, 0.2, [0.0, 0.0, 0.6]);
        buffer.push(point(1.0, FeatureType::Skin));
        let record = buffer.flush().expect("two points");
        assert_eq!(record.index, 3);
        assert_eq!(record.points.len(), 2);
    }

    #[test]
    fn test_polylines_split_by_feature() {
        let record = LayerRecord {
            index: 0,
            height: 0.2,
            thickness: 0.2,
            points: vec![
                point(0.0, FeatureType::Travel),
                point(1.0, FeatureType::WallOuter),
                point(2.0, FeatureType::WallOuter),
                point(3.0, FeatureType::Infill),
            ],
        };
        let polylines = record.polylines();
        // the lone travel seed forms no polyline of its own
        assert_eq!(polylines.len(), 2);
        assert_eq!(polylines[0].feature, FeatureType::WallOuter);
        assert_eq!(polylines[0].points.len(), 3);
        assert_eq!(polylines[1].points[0], [2.0, 0.0, 0.2]);
    }
}
