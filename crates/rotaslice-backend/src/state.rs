//! Backend state machine
//!
//! ```text
//!            dequeue              finished
//! NotStarted ──────▶ Processing ──────────▶ Done ──┐ queue not empty
//!   ▲   │                │  failure               │
//!   │   │ blocked        └────────▶ Error         ▼
//!   │   ▼                                     Processing
//! Disabled     any state ──stop/cancel──▶ NotStarted
//! ```
//!
//! `Disabled` is only left through [`StateMachine::unblock`].

use std::sync::Arc;
use tokio::sync::watch;

use rotaslice_core::event_bus::BackendEvent;
use rotaslice_core::{AppEvent, BackendState, EventBus};

/// Whether `from -> to` is a legal transition
pub fn is_allowed(from: BackendState, to: BackendState) -> bool {
    use BackendState::*;
    match (from, to) {
        (Disabled, _) => false,
        (_, NotStarted) => true,
        (NotStarted, Processing) | (Done, Processing) => true,
        (Processing, Done) | (Processing, Error) => true,
        (NotStarted, Disabled) => true,
        _ => false,
    }
}

/// Current state, published on a watch channel and the event bus
#[derive(Debug)]
pub struct StateMachine {
    state: BackendState,
    tx: watch::Sender<BackendState>,
    bus: Arc<EventBus>,
}

impl StateMachine {
    pub fn new(bus: Arc<EventBus>) -> Self {
        let (tx, _) = watch::channel(BackendState::NotStarted);
        Self {
            state: BackendState::NotStarted,
            tx,
            bus,
        }
    }

    pub fn state(&self) -> BackendState {
        self.state
    }

    pub fn subscribe(&self) -> watch::Receiver<BackendState> {
        self.tx.subscribe()
    }

    /// Move to `to`; returns false for a rejected or no-op transition
    pub fn transition(&mut self, to: BackendState) -> bool {
        let from = self.state;
        if from == to {
            return false;
        }
        if !is_allowed(from, to) {
            tracing::warn!("Rejected backend transition {} -> {}", from, to);
            return false;
        }
        self.set(from, to);
        true
    }

    /// Leave `Disabled` after the blocker check came back clear
    pub fn unblock(&mut self) -> bool {
        if self.state != BackendState::Disabled {
            return false;
        }
        self.set(BackendState::Disabled, BackendState::NotStarted);
        true
    }

    fn set(&mut self, from: BackendState, to: BackendState) {
        tracing::info!("Backend state: {} -> {}", from, to);
        self.state = to;
        self.tx.send_replace(to);
        self.bus
            .publish(AppEvent::Backend(BackendEvent::StateChanged { from, to }));
    }
}
