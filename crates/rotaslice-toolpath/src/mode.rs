//! Stream coordinate mapping
//!
//! Engines slice curved layers in a flattened `(u, v)` parameter space. The
//! layer height `h` selects the surface; the mapping turns the triple back
//! into a physical point and the outward surface normal.

use nalgebra::{Point3, Rotation3, Vector3};
use rotaslice_core::KinematicMode;

/// Mapping from `(u, v, h)` to physical space, fixed for one run
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModeMapping {
    /// `(u, v, h)` with normal `+Z`
    Planar,
    /// `u` along the rotary axis, `v` around it, `h` the radius
    Cylindrical,
    /// `u` polar angle, `v` azimuth, `h` the radius
    Spherical,
    /// Planar layers tilted about X
    Discrete {
        /// Segment tilt in degrees
        tilt_deg: f64,
    },
}

impl ModeMapping {
    /// Mapping of the curved region of `mode`
    pub fn for_mode(mode: KinematicMode) -> Self {
        match mode {
            KinematicMode::Planar => ModeMapping::Planar,
            KinematicMode::Cylindrical | KinematicMode::CylindricalFull => {
                ModeMapping::Cylindrical
            }
            KinematicMode::Spherical | KinematicMode::SphericalFull => ModeMapping::Spherical,
            KinematicMode::Discrete => ModeMapping::Discrete { tilt_deg: 0.0 },
        }
    }

    /// Physical point and unit normal for stream coordinates
    pub fn map(&self, u: f64, v: f64, h: f64) -> (Point3<f64>, Vector3<f64>) {
        match *self {
            ModeMapping::Planar => (Point3::new(u, v, h), Vector3::z()),
            ModeMapping::Cylindrical => {
                let p = Point3::new(h * v.cos(), h * v.sin(), u);
                let r = (p.x * p.x + p.y * p.y).sqrt();
                let n = if r > 0.0 {
                    Vector3::new(p.x / r, p.y / r, 0.0)
                } else {
                    Vector3::zeros()
                };
                (p, n)
            }
            ModeMapping::Spherical => {
                let p = Point3::new(
                    h * u.sin() * v.cos(),
                    h * u.sin() * v.sin(),
                    h * u.cos(),
                );
                let len = p.coords.norm();
                let n = if len > 0.0 {
                    p.coords / len
                } else {
                    Vector3::zeros()
                };
                (p, n)
            }
            ModeMapping::Discrete { tilt_deg } => {
                let tilt = Rotation3::from_axis_angle(&Vector3::x_axis(), tilt_deg.to_radians());
                (tilt * Point3::new(u, v, h), tilt * Vector3::z())
            }
        }
    }

    /// Stream coordinates of a physical point
    pub fn invert(&self, p: &Point3<f64>) -> (f64, f64, f64) {
        match *self {
            ModeMapping::Planar => (p.x, p.y, p.z),
            ModeMapping::Cylindrical => {
                let r = (p.x * p.x + p.y * p.y).sqrt();
                (p.z, p.y.atan2(p.x), r)
            }
            ModeMapping::Spherical => {
                let r = p.coords.norm();
                if r == 0.0 {
                    return (0.0, 0.0, 0.0);
                }
                ((p.z / r).clamp(-1.0, 1.0).acos(), p.y.atan2(p.x), r)
            }
            ModeMapping::Discrete { tilt_deg } => {
                let tilt = Rotation3::from_axis_angle(&Vector3::x_axis(), tilt_deg.to_radians());
                let q = tilt.inverse() * *p;
                (q.x, q.y, q.z)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_planar_passthrough() {
        let (p, n) = ModeMapping::Planar.map(3.0, 4.0, 0.6);
        assert_eq!(p, Point3::new(3.0, 4.0, 0.6));
        assert_eq!(n, Vector3::z());
    }

    #[test]
    fn test_cylindrical_normal_is_radial() {
        let (p, n) = ModeMapping::Cylindrical.map(7.0, FRAC_PI_2, 10.0);
        assert!((p - Point3::new(0.0, 10.0, 7.0)).norm() < 1e-12);
        assert!((n - Vector3::y()).norm() < 1e-12);
    }

    #[test]
    fn test_zero_radius_has_zero_normal() {
        let (_, n) = ModeMapping::Cylindrical.map(1.0, 0.3, 0.0);
        assert_eq!(n, Vector3::zeros());
        let (_, n) = ModeMapping::Spherical.map(1.0, 0.3, 0.0);
        assert_eq!(n, Vector3::zeros());
    }

    #[test]
    fn test_spherical_pole() {
        let (p, n) = ModeMapping::Spherical.map(0.0, 1.0, 5.0);
        assert!((p - Point3::new(0.0, 0.0, 5.0)).norm() < 1e-12);
        assert!((n - Vector3::z()).norm() < 1e-12);
    }

    #[test]
    fn test_discrete_tilts_normal() {
        let mapping = ModeMapping::Discrete { tilt_deg: 90.0 };
        let (p, n) = mapping.map(1.0, 2.0, 3.0);
        assert!((n - Vector3::new(0.0, -1.0, 0.0)).norm() < 1e-12);
        let (u, v, h) = mapping.invert(&p);
        assert!((u - 1.0).abs() < 1e-12 && (v - 2.0).abs() < 1e-12 && (h - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_mode_selection() {
        assert_eq!(
            ModeMapping::for_mode(KinematicMode::CylindricalFull),
            ModeMapping::Cylindrical
        );
        assert_eq!(
            ModeMapping::for_mode(KinematicMode::Spherical),
            ModeMapping::Spherical
        );
    }
}
