//! Data models shared across the slicing backend
//!
//! This module provides:
//! - Build plate and extruder identifiers
//! - Backend controller states and pipeline stage kinds
//! - Machine kinematic modes
//! - Toolpath feature classification
//! - Machine positions with rotary axes and per-extruder extrusion

pub mod feature;
pub mod position;

pub use feature::FeatureType;
pub use position::MachinePosition;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of an independently sliceable build plate
pub type BuildPlateId = u32;

/// Zero based extruder number
pub type ExtruderIndex = usize;

/// State of the backend controller as observed by the UI layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BackendState {
    /// Slicing is blocked by an unresolved upstream dependency
    Disabled,
    /// Idle, nothing in flight
    #[default]
    NotStarted,
    /// A build plate pipeline is running
    Processing,
    /// The last pipeline finished successfully
    Done,
    /// The last pipeline reported a user-facing failure
    Error,
}

impl BackendState {
    /// Check if a pipeline can be started from this state
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            BackendState::NotStarted | BackendState::Done | BackendState::Error
        )
    }
}

impl fmt::Display for BackendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendState::Disabled => write!(f, "Disabled"),
            BackendState::NotStarted => write!(f, "NotStarted"),
            BackendState::Processing => write!(f, "Processing"),
            BackendState::Done => write!(f, "Done"),
            BackendState::Error => write!(f, "Error"),
        }
    }
}

/// Stages of the per-plate job pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StageKind {
    /// Build-request preparation
    Prepare,
    /// External engine execution
    Execute,
    /// Toolpath synthesis from the engine output
    ExtractToolpath,
    /// Layer visualization extraction
    ExtractVisualization,
}

impl StageKind {
    /// All stages in execution order
    pub const ORDER: [StageKind; 4] = [
        StageKind::Prepare,
        StageKind::Execute,
        StageKind::ExtractToolpath,
        StageKind::ExtractVisualization,
    ];

    /// Share of the overall progress bar spent before this stage starts
    /// and the share this stage occupies
    pub fn progress_span(&self) -> (f64, f64) {
        match self {
            StageKind::Prepare => (0.0, 0.05),
            StageKind::Execute => (0.05, 0.75),
            StageKind::ExtractToolpath => (0.80, 0.15),
            StageKind::ExtractVisualization => (0.95, 0.05),
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Prepare => write!(f, "Prepare"),
            StageKind::Execute => write!(f, "Execute"),
            StageKind::ExtractToolpath => write!(f, "ExtractToolpath"),
            StageKind::ExtractVisualization => write!(f, "ExtractVisualization"),
        }
    }
}

/// Physical motion topology of the printer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KinematicMode {
    /// Plain Cartesian gantry
    #[default]
    Planar,
    /// Planar core plus a cylindrical shell around the rotary axis
    Cylindrical,
    /// Whole model printed in cylindrical layers
    CylindricalFull,
    /// Planar core plus a spherical shell
    Spherical,
    /// Whole model printed in spherical layers
    SphericalFull,
    /// Planar segments printed at discrete tilt angles
    Discrete,
}

impl KinematicMode {
    /// Every kinematic mode
    pub const ALL: [KinematicMode; 6] = [
        KinematicMode::Planar,
        KinematicMode::Cylindrical,
        KinematicMode::CylindricalFull,
        KinematicMode::Spherical,
        KinematicMode::SphericalFull,
        KinematicMode::Discrete,
    ];

    /// Setting value used in the flattened settings map
    pub fn as_str(&self) -> &'static str {
        match self {
            KinematicMode::Planar => "planar",
            KinematicMode::Cylindrical => "cylindrical",
            KinematicMode::CylindricalFull => "cylindrical_full",
            KinematicMode::Spherical => "spherical",
            KinematicMode::SphericalFull => "spherical_full",
            KinematicMode::Discrete => "discrete",
        }
    }

    /// Whether the machine carries rotary A/C axes in this mode
    pub fn has_rotary_axes(&self) -> bool {
        !matches!(self, KinematicMode::Planar)
    }

    /// Whether this mode runs more than one engine per build plate
    pub fn is_hybrid(&self) -> bool {
        matches!(
            self,
            KinematicMode::Cylindrical | KinematicMode::Spherical | KinematicMode::Discrete
        )
    }
}

impl fmt::Display for KinematicMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for KinematicMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KinematicMode::ALL
            .iter()
            .copied()
            .find(|mode| mode.as_str() == s.trim())
            .ok_or_else(|| format!("unknown kinematic mode '{}'", s))
    }
}
