//! # rotaslice Toolpath
//!
//! Converts the intermediate layer-geometry stream produced by a slicing
//! engine into machine commands for printers with rotary axes.
//!
//! - [`kinematics`]: physical point + surface normal to machine X/Y/Z/A/C
//! - [`mode`]: `(u, v, height)` stream coordinates to physical points
//! - [`stream`]: the line-oriented intermediate stream parser
//! - [`synthesizer`]: layer handling, retraction and accounting
//! - [`basement`]: double-helix basement printed before curved layers
//! - [`template`]: prologue/epilogue templates and deferred tokens

pub mod basement;
pub mod emitter;
pub mod estimate;
pub mod kinematics;
pub mod layers;
pub mod mode;
pub mod motion;
pub mod settings;
pub mod stream;
pub mod synthesizer;
pub mod template;

pub use basement::generate_basement;
pub use estimate::{MaterialEstimate, TimeEstimate};
pub use kinematics::{KinematicTransform, MachineCoords};
pub use layers::{LayerPolyline, LayerRecord, LayerSet, ToolpathPoint};
pub use mode::ModeMapping;
pub use settings::{ExtruderParams, FeedRates, RaftParams, SynthesisSettings};
pub use stream::{ParseAnomaly, StreamParser, StreamRecord};
pub use synthesizer::{synthesize, SynthesisOutput, SynthesisRun};
pub use template::{DeferredValues, TemplateSet};
