//! # Event Bus Module
//!
//! Publish/subscribe distribution of backend, slice, engine and error
//! events between the controller, the pipeline and any observers.
//!
//! ## Overview
//!
//! - Publishers emit typed events without knowing subscribers
//! - Subscribers filter by category and receive events of interest
//! - Synchronous handlers run on the publishing thread, async consumers use
//!   a broadcast receiver
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rotaslice_core::event_bus::{event_bus, AppEvent, BackendEvent, EventFilter, EventCategory};
//!
//! let subscription = event_bus().subscribe(
//!     EventFilter::Categories(vec![EventCategory::Backend]),
//!     |event| {
//!         if let AppEvent::Backend(BackendEvent::StateChanged { to, .. }) = event {
//!             println!("backend is now {}", to);
//!         }
//!     },
//! );
//!
//! event_bus().unsubscribe(subscription);
//! ```

mod bus;
mod events;

pub use bus::*;
pub use events::*;
