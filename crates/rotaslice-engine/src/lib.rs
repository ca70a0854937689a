//! # rotaslice Engine
//!
//! Runs an external slicing engine as a subprocess. The engine is opaque:
//! it is launched with a request file and flags, reports progress through
//! line-oriented stdout messages and leaves the intermediate geometry stream
//! in its work directory.
//!
//! Exactly one engine runs per backend. Every exit path (finish, cancel,
//! timeout, drop) terminates and reaps the child.

pub mod adapter;
pub mod messages;

pub use adapter::{spawn, wait_or_cancel, EngineCommand, EngineHandle, EngineOutcome};
pub use messages::{
    default_handlers, EngineMessage, LayerCountHandler, MessageDispatcher, MessageHandler,
    ProgressHandler, WarningHandler,
};
