//! Scene intake
//!
//! The backend never owns the scene graph. It pulls what it needs through
//! [`SceneSource`] when a plate is prepared: the sliceable objects one at a
//! time, the settings snapshot, and whether anything blocks slicing.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use rotaslice_core::{BuildPlateId, ExtruderIndex};
use rotaslice_settings::SettingsSnapshot;

/// Geometry and per-object settings of one object, detached from the scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    pub name: String,
    pub extruder: ExtruderIndex,
    /// World-space vertices in mm
    pub vertices: Vec<[f64; 3]>,
    pub triangles: Vec<[u32; 3]>,
    /// Per-object setting overrides
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
}

impl ObjectSnapshot {
    pub fn new(name: impl Into<String>, extruder: ExtruderIndex) -> Self {
        Self {
            name: name.into(),
            extruder,
            vertices: Vec::new(),
            triangles: Vec::new(),
            overrides: BTreeMap::new(),
        }
    }

    /// Axis-aligned box spanning `min`..`max`
    pub fn cuboid(name: impl Into<String>, extruder: ExtruderIndex, min: [f64; 3], max: [f64; 3]) -> Self {
        let mut object = Self::new(name, extruder);
        for i in 0..8u32 {
            object.vertices.push([
                if i & 1 == 0 { min[0] } else { max[0] },
                if i & 2 == 0 { min[1] } else { max[1] },
                if i & 4 == 0 { min[2] } else { max[2] },
            ]);
        }
        object.triangles = vec![
            [0, 2, 1],
            [1, 2, 3],
            [4, 5, 6],
            [5, 7, 6],
            [0, 1, 4],
            [1, 5, 4],
            [2, 6, 3],
            [3, 6, 7],
            [0, 4, 2],
            [2, 4, 6],
            [1, 3, 5],
            [3, 7, 5],
        ];
        object
    }

    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    /// Whether there is a mesh to slice
    pub fn is_sliceable(&self) -> bool {
        !self.triangles.is_empty() && !self.vertices.is_empty()
    }

    /// Bounding box `(min, max)`, `None` without vertices
    pub fn bounds(&self) -> Option<([f64; 3], [f64; 3])> {
        let first = *self.vertices.first()?;
        Some(self.vertices.iter().fold((first, first), |(mut lo, mut hi), v| {
            for axis in 0..3 {
                lo[axis] = lo[axis].min(v[axis]);
                hi[axis] = hi[axis].max(v[axis]);
            }
            (lo, hi)
        }))
    }

    /// Smallest and largest distance from the Z axis
    pub fn radial_extent(&self) -> Option<(f64, f64)> {
        let first = self.vertices.first()?;
        let r0 = first[0].hypot(first[1]);
        Some(self.vertices.iter().fold((r0, r0), |(lo, hi), v| {
            let r = v[0].hypot(v[1]);
            (lo.min(r), hi.max(r))
        }))
    }
}

/// Pull cursor over the sliceable objects of a plate
pub trait ObjectCursor {
    fn next_sliceable_object(&mut self) -> Option<ObjectSnapshot>;
}

impl<I> ObjectCursor for I
where
    I: Iterator<Item = ObjectSnapshot>,
{
    fn next_sliceable_object(&mut self) -> Option<ObjectSnapshot> {
        self.next()
    }
}

/// Read access to the scene
pub trait SceneSource: Send + Sync {
    /// Cursor over the objects placed on `plate`
    fn objects(&self, plate: BuildPlateId) -> Box<dyn ObjectCursor + '_>;

    /// Settings for slicing `plate`, merged over the profile
    fn settings(&self, plate: BuildPlateId) -> SettingsSnapshot;

    /// Whether the plate holds anything the user placed
    fn has_placed_content(&self, plate: BuildPlateId) -> bool;

    /// Reason slicing is impossible right now, if any
    fn slicing_blocker(&self) -> Option<String> {
        None
    }
}

/// In-memory scene
#[derive(Debug, Default)]
pub struct StaticScene {
    plates: RwLock<HashMap<BuildPlateId, Vec<ObjectSnapshot>>>,
    settings: RwLock<SettingsSnapshot>,
    blocker: RwLock<Option<String>>,
}

impl StaticScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: SettingsSnapshot) -> Self {
        Self {
            settings: RwLock::new(settings),
            ..Self::default()
        }
    }

    pub fn add_object(&self, plate: BuildPlateId, object: ObjectSnapshot) {
        self.plates.write().entry(plate).or_default().push(object);
    }

    pub fn clear_plate(&self, plate: BuildPlateId) {
        self.plates.write().remove(&plate);
    }

    pub fn set_setting(&self, key: &str, value: &str) {
        self.settings.write().set(key, value);
    }

    pub fn set_blocker(&self, reason: Option<String>) {
        *self.blocker.write() = reason;
    }
}

impl SceneSource for StaticScene {
    fn objects(&self, plate: BuildPlateId) -> Box<dyn ObjectCursor + '_> {
        let objects = self.plates.read().get(&plate).cloned().unwrap_or_default();
        Box::new(objects.into_iter())
    }

    fn settings(&self, _plate: BuildPlateId) -> SettingsSnapshot {
        self.settings.read().clone()
    }

    fn has_placed_content(&self, plate: BuildPlateId) -> bool {
        self.plates
            .read()
            .get(&plate)
            .is_some_and(|objects| !objects.is_empty())
    }

    fn slicing_blocker(&self) -> Option<String> {
        self.blocker.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cuboid_bounds() {
        let cube = ObjectSnapshot::cuboid("cube", 0, [-1.0, -2.0, 0.0], [3.0, 4.0, 5.0]);
        assert!(cube.is_sliceable());
        assert_eq!(cube.bounds(), Some(([-1.0, -2.0, 0.0], [3.0, 4.0, 5.0])));
        let (lo, hi) = cube.radial_extent().expect("vertices");
        assert!((lo - 5f64.sqrt()).abs() < 1e-12);
        assert!((hi - 5.0).abs() < 1e-12);
        assert!(ObjectSnapshot::new("empty", 0).bounds().is_none());
    }

    #[test]
    fn test_static_scene_cursor() {
        let scene = StaticScene::new();
        assert!(!scene.has_placed_content(0));
        scene.add_object(0, ObjectSnapshot::cuboid("a", 0, [0.0; 3], [1.0; 3]));
        scene.add_object(0, ObjectSnapshot::new("b", 0));

        let mut cursor = scene.objects(0);
        assert_eq!(cursor.next_sliceable_object().map(|o| o.name), Some("a".into()));
        assert_eq!(cursor.next_sliceable_object().map(|o| o.name), Some("b".into()));
        assert!(cursor.next_sliceable_object().is_none());
        assert!(scene.has_placed_content(0));
        assert!(scene.objects(1).next_sliceable_object().is_none());
    }
}
