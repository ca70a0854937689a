//! # rotaslice Core
//!
//! Core types, result codes, cancellation and events shared by every
//! rotaslice crate. Provides the fundamental abstractions for the slicing
//! backend state machine, the job pipeline and toolpath synthesis.

pub mod core;
pub mod data;
pub mod error;
pub mod event_bus;
pub mod result_code;

pub use core::cancel::CancelToken;

pub use data::{
    BackendState, BuildPlateId, ExtruderIndex, FeatureType, KinematicMode, MachinePosition,
    StageKind,
};

pub use error::{EngineError, Error, PipelineError, Result, SynthesisError};

pub use result_code::ResultCode;

// Re-export event bus for convenience
pub use event_bus::{
    event_bus, AppEvent, EventBus, EventBusConfig, EventCategory, EventFilter, SubscriptionId,
};
