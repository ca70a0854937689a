//! Toolpath feature classification

use serde::{Deserialize, Serialize};
use std::fmt;

/// Functional classification of a toolpath segment
///
/// Used for feed rate selection, retraction policy, time bucketing and
/// visualization coloring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FeatureType {
    /// Outermost perimeter
    WallOuter,
    /// Inner perimeters
    WallInner,
    /// Top/bottom solid fill
    Skin,
    /// Sparse infill
    Infill,
    /// Support structure
    Support,
    /// Dense support layer touching the model
    SupportInterface,
    /// Skirt, brim and basement priming paths
    Skirt,
    /// Non-extruding move
    Travel,
    /// Filament retract/prime and hop moves
    Retract,
    /// Unclassified
    None,
}

impl FeatureType {
    /// Every feature type, in bucket order
    pub const ALL: [FeatureType; 10] = [
        FeatureType::WallOuter,
        FeatureType::WallInner,
        FeatureType::Skin,
        FeatureType::Infill,
        FeatureType::Support,
        FeatureType::SupportInterface,
        FeatureType::Skirt,
        FeatureType::Travel,
        FeatureType::Retract,
        FeatureType::None,
    ];

    /// Stable index into per-feature arrays
    pub fn index(&self) -> usize {
        match self {
            FeatureType::WallOuter => 0,
            FeatureType::WallInner => 1,
            FeatureType::Skin => 2,
            FeatureType::Infill => 3,
            FeatureType::Support => 4,
            FeatureType::SupportInterface => 5,
            FeatureType::Skirt => 6,
            FeatureType::Travel => 7,
            FeatureType::Retract => 8,
            FeatureType::None => 9,
        }
    }

    /// Parse the name used in `;TYPE:` stream markers
    pub fn from_marker(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "WALL-OUTER" => Some(FeatureType::WallOuter),
            "WALL-INNER" => Some(FeatureType::WallInner),
            "SKIN" => Some(FeatureType::Skin),
            "FILL" | "INFILL" => Some(FeatureType::Infill),
            "SUPPORT" => Some(FeatureType::Support),
            "SUPPORT-INTERFACE" => Some(FeatureType::SupportInterface),
            "SKIRT" => Some(FeatureType::Skirt),
            _ => None,
        }
    }

    /// Name written to `;TYPE:` comments in the emitted g-code
    pub fn marker_name(&self) -> &'static str {
        match self {
            FeatureType::WallOuter => "WALL-OUTER",
            FeatureType::WallInner => "WALL-INNER",
            FeatureType::Skin => "SKIN",
            FeatureType::Infill => "FILL",
            FeatureType::Support => "SUPPORT",
            FeatureType::SupportInterface => "SUPPORT-INTERFACE",
            FeatureType::Skirt => "SKIRT",
            FeatureType::Travel => "TRAVEL",
            FeatureType::Retract => "RETRACT",
            FeatureType::None => "NONE",
        }
    }

    /// Whether segments of this type deposit material
    pub fn is_extrusion(&self) -> bool {
        !matches!(
            self,
            FeatureType::Travel | FeatureType::Retract | FeatureType::None
        )
    }

    /// Whether a long travel into this feature triggers a retraction
    ///
    /// Infill and support are hidden inside or removed from the part, so
    /// oozing there is accepted in exchange for fewer retractions.
    pub fn retracts_on_travel(&self) -> bool {
        !matches!(
            self,
            FeatureType::Infill | FeatureType::Support | FeatureType::SupportInterface
        )
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.marker_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_are_dense() {
        for (i, feature) in FeatureType::ALL.iter().enumerate() {
            assert_eq!(feature.index(), i);
        }
    }

    #[test]
    fn test_marker_parsing() {
        assert_eq!(FeatureType::from_marker("FILL"), Some(FeatureType::Infill));
        assert_eq!(
            FeatureType::from_marker(" wall-outer "),
            Some(FeatureType::WallOuter)
        );
        assert_eq!(FeatureType::from_marker("TRAVEL"), None);
        assert_eq!(
            FeatureType::from_marker(FeatureType::SupportInterface.marker_name()),
            Some(FeatureType::SupportInterface)
        );
    }

    #[test]
    fn test_retraction_policy() {
        assert!(FeatureType::WallOuter.retracts_on_travel());
        assert!(FeatureType::Skin.retracts_on_travel());
        assert!(!FeatureType::Infill.retracts_on_travel());
        assert!(!FeatureType::Support.retracts_on_travel());
    }
}
