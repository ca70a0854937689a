//! Planar strategy

use rotaslice_toolpath::{ModeMapping, SynthesisSettings};

use super::{EngineStrategy, Region, SubEngine};

/// One planar engine run over the whole plate
#[derive(Debug, Default, Clone, Copy)]
pub struct PlanarStrategy;

impl EngineStrategy for PlanarStrategy {
    fn name(&self) -> &str {
        "planar"
    }

    fn sub_engines(&self, _settings: &SynthesisSettings) -> Vec<SubEngine> {
        vec![SubEngine::new("planar", Region::Whole, ModeMapping::Planar)]
    }
}
