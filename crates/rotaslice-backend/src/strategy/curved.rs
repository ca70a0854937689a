//! Curved strategies
//!
//! `*_full` modes slice everything on curved layers. The hybrid modes print
//! a planar core around the rotary axis first and wind the curved shell
//! over it; both runs go into the same synthesis so the shell layers
//! continue the core's layer numbering.

use rotaslice_toolpath::{ModeMapping, SynthesisSettings};

use super::{EngineStrategy, Region, SubEngine};

/// Single curved run over the whole plate
#[derive(Debug, Clone, Copy)]
pub struct CurvedStrategy {
    mapping: ModeMapping,
}

impl CurvedStrategy {
    pub fn new(mapping: ModeMapping) -> Self {
        Self { mapping }
    }
}

impl EngineStrategy for CurvedStrategy {
    fn name(&self) -> &str {
        "curved"
    }

    fn sub_engines(&self, _settings: &SynthesisSettings) -> Vec<SubEngine> {
        vec![SubEngine::new("shell", Region::Whole, self.mapping)]
    }
}

/// Planar core followed by a curved shell
#[derive(Debug, Clone, Copy)]
pub struct HybridStrategy {
    mapping: ModeMapping,
}

impl HybridStrategy {
    pub fn new(mapping: ModeMapping) -> Self {
        Self { mapping }
    }
}

impl EngineStrategy for HybridStrategy {
    fn name(&self) -> &str {
        "hybrid"
    }

    fn sub_engines(&self, settings: &SynthesisSettings) -> Vec<SubEngine> {
        let radius = settings
            .snapshot
            .get("hybrid_core_radius")
            .and_then(|value| value.trim().parse::<f64>().ok())
            .filter(|r| *r > 0.0)
            .unwrap_or(10.0);
        vec![
            SubEngine::new("core", Region::Core { radius }, ModeMapping::Planar),
            SubEngine::new("shell", Region::Shell { radius }, self.mapping),
        ]
    }
}
