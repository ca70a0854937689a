//! Runtime primitives shared by the pipeline and the synthesizer
//!
//! Provides:
//! - Cooperative cancellation tokens

pub mod cancel;
