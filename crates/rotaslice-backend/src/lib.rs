//! # rotaslice Backend
//!
//! Orchestrates slicing: pulls objects and settings from the scene, runs the
//! external engine through a per-mode [`EngineStrategy`], synthesizes the
//! machine toolpath and hands the result to a [`SliceOutputSink`].
//!
//! The [`controller`] owns the queue of build plates and the backend state
//! machine; the [`pipeline`] runs the stages of one plate.

pub mod controller;
pub mod output;
pub mod pipeline;
pub mod queue;
pub mod request;
pub mod scene;
pub mod state;
pub mod strategy;

pub use controller::{Backend, BackendHandle, Command};
pub use output::{GcodeFileSink, MemorySink, SliceOutput, SliceOutputSink, Visualization};
pub use pipeline::{synthesize_streams, Pipeline, PipelineRun, PlateOutcome, ProgressReporter};
pub use queue::BuildPlateQueue;
pub use request::{gather_objects, prepare_request, SliceRequest};
pub use scene::{ObjectCursor, ObjectSnapshot, SceneSource, StaticScene};
pub use state::{is_allowed, StateMachine};
pub use strategy::{
    default_command, strategy_for, write_request_file, CurvedStrategy, DiscreteStrategy,
    EngineStrategy, HybridStrategy, PlanarStrategy, Region, SubEngine,
};
