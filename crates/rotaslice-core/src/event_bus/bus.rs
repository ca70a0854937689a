//! Event Bus implementation.
//!
//! Provides the `EventBus` struct used per backend instance and the global
//! instance for process-wide observers.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::events::{AppEvent, EventCategory};

/// Subscription handle for unsubscribing from events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

/// Filter to receive only specific event types
#[derive(Debug, Clone, Default)]
pub enum EventFilter {
    /// Receive all events.
    #[default]
    All,
    /// Receive events matching any of these categories.
    Categories(Vec<EventCategory>),
}

impl EventFilter {
    /// Check if an event matches this filter
    pub fn matches(&self, event: &AppEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Categories(categories) => categories.contains(&event.category()),
        }
    }
}

type EventHandler = Arc<dyn Fn(AppEvent) + Send + Sync>;

/// Configuration for the event bus
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Channel capacity for broadcast.
    pub channel_capacity: usize,
    /// Log every published event at trace level.
    pub trace_events: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            trace_events: false,
        }
    }
}

/// Event distribution hub
///
/// Synchronous handlers are invoked on the publishing thread; handlers are
/// snapshotted before dispatch so a handler may subscribe or unsubscribe
/// without deadlocking.
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
    handlers: RwLock<HashMap<SubscriptionId, (EventFilter, EventHandler)>>,
    config: EventBusConfig,
}

impl EventBus {
    /// Create a new event bus with default configuration
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Create a new event bus with custom configuration
    pub fn with_config(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            sender,
            handlers: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Publish an event to all subscribers
    ///
    /// Returns the number of handlers and receivers that saw the event. An
    /// event nobody listens to is simply dropped.
    pub fn publish(&self, event: AppEvent) -> usize {
        if self.config.trace_events {
            tracing::trace!("event: {}", event.description());
        }

        let matching: Vec<EventHandler> = self
            .handlers
            .read()
            .values()
            .filter(|(filter, _)| filter.matches(&event))
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in &matching {
            handler(event.clone());
        }

        matching.len() + self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to events with a synchronous handler
    ///
    /// The handler runs on the publishing thread and should return quickly.
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(AppEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.handlers.write().insert(id, (filter, Arc::new(handler)));
        tracing::debug!("Subscription {} added", id);
        id
    }

    /// Get a receiver for async event polling
    pub fn receiver(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    /// Unsubscribe from events
    ///
    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.handlers.write().remove(&id).is_some();
        if removed {
            tracing::debug!("Subscription {} removed", id);
        }
        removed
    }

    /// Get the number of active synchronous subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Get the current configuration
    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("config", &self.config)
            .finish()
    }
}

static EVENT_BUS: OnceLock<EventBus> = OnceLock::new();

/// Get or initialize the global event bus
pub fn event_bus() -> &'static EventBus {
    EVENT_BUS.get_or_init(EventBus::new)
}

/// Initialize the global event bus with custom configuration
///
/// Must be called before any call to `event_bus()`. Returns the rejected
/// configuration if the bus was already initialized.
pub fn init_event_bus(config: EventBusConfig) -> Result<(), EventBusConfig> {
    EVENT_BUS
        .set(EventBus::with_config(config))
        .map_err(|bus| bus.config.clone())
}

/// Publish an event to the global event bus
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::event_bus::event_bus().publish($event)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::BackendState;
    use crate::event_bus::events::{BackendEvent, EngineEvent};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn queued(plate: u32) -> AppEvent {
        AppEvent::Backend(BackendEvent::PlateQueued { plate })
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let bus = EventBus::new();

        let id = bus.subscribe(EventFilter::All, |_| {});
        assert_eq!(bus.subscriber_count(), 1);

        assert!(bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(), 0);
        assert!(!bus.unsubscribe(id));
    }

    #[test]
    fn test_publish_without_listeners_is_dropped() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(queued(0)), 0);
    }

    #[test]
    fn test_event_filtering() {
        let bus = EventBus::new();
        let backend_count = Arc::new(AtomicUsize::new(0));
        let engine_count = Arc::new(AtomicUsize::new(0));

        let bc = backend_count.clone();
        bus.subscribe(
            EventFilter::Categories(vec![EventCategory::Backend]),
            move |_| {
                bc.fetch_add(1, Ordering::SeqCst);
            },
        );

        let ec = engine_count.clone();
        bus.subscribe(
            EventFilter::Categories(vec![EventCategory::Engine]),
            move |_| {
                ec.fetch_add(1, Ordering::SeqCst);
            },
        );

        bus.publish(queued(1));
        bus.publish(AppEvent::Backend(BackendEvent::StateChanged {
            from: BackendState::NotStarted,
            to: BackendState::Processing,
        }));
        bus.publish(AppEvent::Engine(EngineEvent::Exited { code: Some(0) }));

        assert_eq!(backend_count.load(Ordering::SeqCst), 2);
        assert_eq!(engine_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let bus = Arc::new(EventBus::new());
        let slot: Arc<parking_lot::Mutex<Option<SubscriptionId>>> =
            Arc::new(parking_lot::Mutex::new(None));

        let bus_clone = bus.clone();
        let slot_clone = slot.clone();
        let id = bus.subscribe(EventFilter::All, move |_| {
            if let Some(id) = slot_clone.lock().take() {
                bus_clone.unsubscribe(id);
            }
        });
        *slot.lock() = Some(id);

        bus.publish(queued(2));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_async_receiver() {
        let bus = EventBus::new();
        let mut receiver = bus.receiver();

        assert_eq!(bus.publish(queued(7)), 1);

        match receiver.try_recv() {
            Ok(AppEvent::Backend(BackendEvent::PlateQueued { plate })) => assert_eq!(plate, 7),
            other => panic!("Wrong event received: {:?}", other),
        }
    }
}
