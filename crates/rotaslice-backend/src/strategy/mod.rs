//! Engine strategies
//!
//! The pipeline is the same for every kinematic mode; what changes is how
//! many engine runs a plate needs and how their output is mapped back to
//! physical space. An [`EngineStrategy`] answers that:
//!
//! - [`planar`]: one planar engine run
//! - [`curved`]: one curved run (`*_full` modes), or a planar core plus a
//!   curved shell (`cylindrical`, `spherical`)
//! - [`discrete`]: one planar run per tilt segment

pub mod curved;
pub mod discrete;
pub mod planar;

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rotaslice_core::{KinematicMode, PipelineError, ResultCode};
use rotaslice_engine::{default_handlers, EngineCommand, MessageHandler};
use rotaslice_settings::EngineSettings;
use rotaslice_toolpath::{ModeMapping, SynthesisSettings};

use crate::request::SliceRequest;
use crate::scene::ObjectSnapshot;

pub use curved::{CurvedStrategy, HybridStrategy};
pub use discrete::DiscreteStrategy;
pub use planar::PlanarStrategy;

/// Which objects a sub-engine slices
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    /// Everything on the plate
    Whole,
    /// Material closer to the axis than the core radius
    Core { radius: f64 },
    /// Material reaching beyond the core radius
    Shell { radius: f64 },
    /// One tilted segment of a discrete print
    Segment { index: usize, tilt_deg: f64 },
}

impl Region {
    pub fn accepts(&self, object: &ObjectSnapshot) -> bool {
        match *self {
            Region::Whole | Region::Segment { .. } => true,
            Region::Core { radius } => object
                .radial_extent()
                .is_some_and(|(inner, _)| inner < radius),
            Region::Shell { radius } => object
                .radial_extent()
                .is_some_and(|(_, outer)| outer > radius),
        }
    }
}

/// One engine run of a plate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubEngine {
    /// Name used for files and logs
    pub name: String,
    pub region: Region,
    #[serde(skip)]
    pub mapping: ModeMapping,
}

impl SubEngine {
    pub fn new(name: impl Into<String>, region: Region, mapping: ModeMapping) -> Self {
        Self {
            name: name.into(),
            region,
            mapping,
        }
    }

    pub fn request_path(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(format!("{}.request.json", self.name))
    }

    pub fn output_path(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(format!("{}.stream", self.name))
    }
}

#[derive(Serialize)]
struct RequestFile<'a> {
    plate: u32,
    sub_engine: &'a SubEngine,
    settings: &'a rotaslice_settings::SettingsSnapshot,
    objects: Vec<&'a ObjectSnapshot>,
}

/// Per-mode behaviour of the pipeline
#[async_trait]
pub trait EngineStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Engine runs for a plate, in print order
    fn sub_engines(&self, settings: &SynthesisSettings) -> Vec<SubEngine>;

    /// Write the request file of one sub-engine
    ///
    /// Returns `NothingToSlice` when the sub-engine's region is empty.
    async fn prepare_request(
        &self,
        sub: &SubEngine,
        request: &SliceRequest,
        work_dir: &Path,
    ) -> Result<ResultCode, PipelineError> {
        write_request_file(sub, request, work_dir).await
    }

    /// Command line of one sub-engine
    fn spawn_command(&self, sub: &SubEngine, engine: &EngineSettings, work_dir: &Path) -> EngineCommand {
        default_command(sub, engine, work_dir)
    }

    /// Stdout message decoders
    fn message_handlers(&self) -> Vec<Arc<dyn MessageHandler>> {
        default_handlers()
    }
}

/// Serialize the objects the sub-engine accepts into its request file
pub async fn write_request_file(
    sub: &SubEngine,
    request: &SliceRequest,
    work_dir: &Path,
) -> Result<ResultCode, PipelineError> {
    let objects: Vec<&ObjectSnapshot> = request
        .objects
        .iter()
        .filter(|object| sub.region.accepts(object))
        .collect();
    if objects.is_empty() {
        tracing::debug!("Sub-engine {} has nothing to slice", sub.name);
        return Ok(ResultCode::NothingToSlice);
    }

    let file = RequestFile {
        plate: request.plate,
        sub_engine: sub,
        settings: &request.settings,
        objects,
    };
    let json = serde_json::to_vec_pretty(&file).map_err(|e| PipelineError::WorkDir {
        reason: e.to_string(),
    })?;
    let path = sub.request_path(work_dir);
    tokio::fs::write(&path, json)
        .await
        .map_err(|e| PipelineError::WorkDir {
            reason: format!("{}: {}", path.display(), e),
        })?;
    Ok(ResultCode::Finished)
}

/// `<executable> <extra args> slice -j <request> -o <output> --region <name>`
pub fn default_command(sub: &SubEngine, engine: &EngineSettings, work_dir: &Path) -> EngineCommand {
    let request = sub.request_path(work_dir);
    let output = sub.output_path(work_dir);
    EngineCommand::new(&engine.executable, work_dir)
        .args(engine.extra_args.iter().cloned())
        .arg("slice")
        .args(["-j".to_string(), request.display().to_string()])
        .args(["-o".to_string(), output.display().to_string()])
        .args(["--region".to_string(), sub.name.clone()])
        .with_output(output)
        .with_timeout(engine.timeout())
}

/// Strategy for a kinematic mode
pub fn strategy_for(mode: KinematicMode) -> Arc<dyn EngineStrategy> {
    match mode {
        KinematicMode::Planar => Arc::new(PlanarStrategy),
        KinematicMode::CylindricalFull | KinematicMode::SphericalFull => {
            Arc::new(CurvedStrategy::new(ModeMapping::for_mode(mode)))
        }
        KinematicMode::Cylindrical | KinematicMode::Spherical => {
            Arc::new(HybridStrategy::new(ModeMapping::for_mode(mode)))
        }
        KinematicMode::Discrete => Arc::new(DiscreteStrategy),
    }
}
