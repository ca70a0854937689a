//! Physical to machine coordinate transform
//!
//! The print head always deposits straight down in the machine frame. To
//! print on a tilted surface the part is rotated so the surface normal points
//! up: the A axis tilts about X by the normal's polar angle and the C axis
//! turns about Z by its azimuth. The machine point is the physical point
//! under the inverse of that rotation.
//!
//! The transform is stateful within one run. Rotations are only rebuilt when
//! the direction actually changes, and the C angle is unwrapped across the
//! ±180° seam with a winding counter so consecutive commands never spin the
//! table the long way round.

use nalgebra::{Point3, Rotation3, Vector3};
use rotaslice_core::KinematicMode;

const DIRECTION_EPSILON: f64 = 1e-5;
const C_BIAS_DEG: f64 = 90.0;

/// Machine axis values for one point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MachineCoords {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Degrees, already scaled by the A gear ratio
    pub a: f64,
    /// Degrees, already scaled by the C gear ratio
    pub c: f64,
}

/// Per-run kinematic transform state
#[derive(Debug, Clone)]
pub struct KinematicTransform {
    rotary: bool,
    gear_ratio_a: f64,
    gear_ratio_c: f64,
    last_direction: Option<Vector3<f64>>,
    last_raw_c: Option<f64>,
    winding: i32,
    a_deg: f64,
    c_deg: f64,
    rot_x: Rotation3<f64>,
    rot_z: Rotation3<f64>,
}

impl KinematicTransform {
    /// Transform for a machine running in `mode`
    pub fn new(mode: KinematicMode, gear_ratio_a: f64, gear_ratio_c: f64) -> Self {
        Self {
            rotary: mode.has_rotary_axes(),
            gear_ratio_a,
            gear_ratio_c,
            last_direction: None,
            last_raw_c: None,
            winding: 0,
            a_deg: 0.0,
            c_deg: 0.0,
            rot_x: Rotation3::identity(),
            rot_z: Rotation3::identity(),
        }
    }

    /// Identity transform for Cartesian machines
    pub fn planar() -> Self {
        Self::new(KinematicMode::Planar, 1.0, 1.0)
    }

    /// Whether A/C words are emitted
    pub fn has_rotary_axes(&self) -> bool {
        self.rotary
    }

    /// Map a physical point with surface direction to machine axes
    pub fn apply(&mut self, point: Point3<f64>, direction: Vector3<f64>) -> MachineCoords {
        if !self.rotary {
            return MachineCoords {
                x: point.x,
                y: point.y,
                z: point.z,
                a: 0.0,
                c: 0.0,
            };
        }

        // No radial component: i = j = 0 and the tilt stays where it was
        let direction = normalized(direction).unwrap_or_else(|| {
            Vector3::new(0.0, 0.0, self.last_direction.map_or(1.0, |d| d.z))
        });
        self.update_rotations(&direction);

        let machine = self.inverse_rotation() * point;
        MachineCoords {
            x: machine.x,
            y: machine.y,
            z: machine.z,
            a: self.a_deg * self.gear_ratio_a,
            c: self.c_deg * self.gear_ratio_c,
        }
    }

    /// Rotate a physical vector into the machine frame with the current state
    pub fn to_machine_vector(&self, v: Vector3<f64>) -> Vector3<f64> {
        if self.rotary {
            self.inverse_rotation() * v
        } else {
            v
        }
    }

    /// Current full turns applied to the C angle
    pub fn winding(&self) -> i32 {
        self.winding
    }

    fn inverse_rotation(&self) -> Rotation3<f64> {
        (self.rot_z * self.rot_x).inverse()
    }

    fn update_rotations(&mut self, d: &Vector3<f64>) {
        let (k_changed, ij_changed) = match self.last_direction {
            None => (true, true),
            Some(prev) => (
                (d.z - prev.z).abs() > DIRECTION_EPSILON,
                (d.x - prev.x).abs() > DIRECTION_EPSILON
                    || (d.y - prev.y).abs() > DIRECTION_EPSILON,
            ),
        };

        if k_changed {
            self.a_deg = d.z.clamp(-1.0, 1.0).acos().to_degrees();
            self.rot_x = Rotation3::from_axis_angle(&Vector3::x_axis(), -self.a_deg.to_radians());
        }

        if ij_changed {
            let raw = if d.x == 0.0 && d.y == 0.0 {
                0.0
            } else {
                d.y.atan2(d.x).to_degrees()
            };
            if let Some(prev) = self.last_raw_c {
                let jump = raw - prev;
                if jump > 180.0 {
                    self.winding -= 1;
                } else if jump < -180.0 {
                    self.winding += 1;
                }
            }
            self.last_raw_c = Some(raw);
            self.c_deg = raw + 360.0 * f64::from(self.winding) - C_BIAS_DEG;
            self.rot_z = Rotation3::from_axis_angle(&Vector3::z_axis(), self.c_deg.to_radians());
        }

        if k_changed || ij_changed {
            self.last_direction = Some(*d);
        }
    }
}

fn normalized(v: Vector3<f64>) -> Option<Vector3<f64>> {
    let norm = v.norm();
    (norm > f64::EPSILON && norm.is_finite()).then(|| v / norm)
}
