//! Discrete strategy
//!
//! The part is printed in planar segments, each with the table tilted to
//! one of the configured angles.

use rotaslice_toolpath::{ModeMapping, SynthesisSettings};

use super::{EngineStrategy, Region, SubEngine};

/// One planar run per tilt segment
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscreteStrategy;

impl EngineStrategy for DiscreteStrategy {
    fn name(&self) -> &str {
        "discrete"
    }

    fn sub_engines(&self, settings: &SynthesisSettings) -> Vec<SubEngine> {
        settings
            .discrete_tilts
            .iter()
            .enumerate()
            .map(|(index, &tilt_deg)| {
                SubEngine::new(
                    format!("segment-{}", index),
                    Region::Segment { index, tilt_deg },
                    ModeMapping::Discrete { tilt_deg },
                )
            })
            .collect()
    }
}
