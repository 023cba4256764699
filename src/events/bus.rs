//! Event Bus
//!
//! Synchronous publish/subscribe over string topics and event categories.
//! Handlers run on the publishing thread, after the registry lock is
//! released, over a copy of the handler list. A handler may therefore
//! subscribe or unsubscribe from inside its own invocation.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{run_handler, HandlerResult};

/// Kind of event. `Generic` is the root category: type subscribers for
/// `Generic` receive every event.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    #[default]
    Generic,
    Workflow,
    Ui,
    Log,
    File,
}

impl EventCategory {
    /// Returns true if an event of this category is delivered to
    /// subscribers of `category`.
    pub fn is_a(&self, category: EventCategory) -> bool {
        category == EventCategory::Generic || *self == category
    }
}

/// A published event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Event {
    pub topic: String,
    pub category: EventCategory,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub source: Option<String>,
}

impl Event {
    /// Creates a generic event stamped with the current time.
    pub fn new(topic: impl Into<String>, data: Value) -> Self {
        Self {
            topic: topic.into(),
            category: EventCategory::Generic,
            data,
            timestamp: Utc::now(),
            source: None,
        }
    }

    pub fn workflow(topic: impl Into<String>, data: Value) -> Self {
        Self::new(topic, data).with_category(EventCategory::Workflow)
    }

    pub fn log(topic: impl Into<String>, data: Value) -> Self {
        Self::new(topic, data).with_category(EventCategory::Log)
    }

    pub fn file(topic: impl Into<String>, data: Value) -> Self {
        Self::new(topic, data).with_category(EventCategory::File)
    }

    pub fn ui(topic: impl Into<String>, data: Value) -> Self {
        Self::new(topic, data).with_category(EventCategory::Ui)
    }

    pub fn with_category(mut self, category: EventCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Handler invoked with each delivered event.
pub type EventHandler = Arc<dyn Fn(&Event) -> HandlerResult + Send + Sync>;

/// Identifies a subscription, for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Default)]
struct Registry {
    topics: HashMap<String, Vec<(HandlerId, EventHandler)>>,
    types: Vec<(EventCategory, HandlerId, EventHandler)>,
}

/// Topic and category based event dispatcher.
///
/// # Example
///
/// ```rust
/// use rocotoviewer::events::{Event, EventBus};
/// use serde_json::json;
///
/// let bus = EventBus::new();
/// let id = bus.subscribe("workflow_updated", |event| {
///     println!("{} changed", event.data["workflow_id"]);
///     Ok(())
/// });
/// bus.publish(Event::workflow("workflow_updated", json!({"workflow_id": "gfs"})));
/// bus.unsubscribe("workflow_updated", id);
/// ```
#[derive(Default)]
pub struct EventBus {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("EventBus")
            .field("topics", &registry.topics.len())
            .field("type_handlers", &registry.types.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_handler_id(&self) -> HandlerId {
        HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Subscribes a handler to a topic.
    pub fn subscribe<F>(&self, topic: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        let id = self.next_handler_id();
        let topic = topic.into();
        debug!("Subscribed handler {:?} to topic '{}'", id, topic);
        self.registry
            .lock()
            .topics
            .entry(topic)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Removes a topic subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, topic: &str, id: HandlerId) -> bool {
        let mut registry = self.registry.lock();
        let Some(handlers) = registry.topics.get_mut(topic) else {
            return false;
        };

        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            registry.topics.remove(topic);
        }
        removed
    }

    /// Subscribes a handler to every event of `category`, or to every
    /// event at all for [`EventCategory::Generic`].
    pub fn subscribe_to_type<F>(&self, category: EventCategory, handler: F) -> HandlerId
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        let id = self.next_handler_id();
        debug!("Subscribed handler {:?} to {:?} events", id, category);
        self.registry
            .lock()
            .types
            .push((category, id, Arc::new(handler)));
        id
    }

    /// Removes a category subscription. Unknown ids are ignored.
    pub fn unsubscribe_from_type(&self, id: HandlerId) -> bool {
        let mut registry = self.registry.lock();
        let before = registry.types.len();
        registry.types.retain(|(_, existing, _)| *existing != id);
        registry.types.len() != before
    }

    /// Delivers an event to its topic handlers, then to matching category
    /// handlers. Returns the number of handlers that completed without
    /// error.
    pub fn publish(&self, event: Event) -> usize {
        let handlers: Vec<EventHandler> = {
            let registry = self.registry.lock();
            let by_topic = registry
                .topics
                .get(&event.topic)
                .into_iter()
                .flatten()
                .map(|(_, handler)| Arc::clone(handler));
            let by_type = registry
                .types
                .iter()
                .filter(|(category, _, _)| event.category.is_a(*category))
                .map(|(_, _, handler)| Arc::clone(handler));
            by_topic.chain(by_type).collect()
        };

        debug!(
            "Publishing '{}' to {} handlers",
            event.topic,
            handlers.len()
        );

        handlers
            .iter()
            .filter(|handler| run_handler(&event.topic, || handler(&event)))
            .count()
    }

    /// Wraps a bare topic in a generic event and publishes it.
    pub fn publish_topic(&self, topic: &str, data: Value, source: Option<&str>) -> usize {
        let mut event = Event::new(topic, data);
        event.source = source.map(str::to_string);
        self.publish(event)
    }

    /// Removes every handler for `topic`, or every handler of any kind
    /// when `topic` is `None`.
    pub fn clear_subscribers(&self, topic: Option<&str>) {
        let mut registry = self.registry.lock();
        match topic {
            Some(topic) => {
                registry.topics.remove(topic);
            }
            None => {
                registry.topics.clear();
                registry.types.clear();
            }
        }
    }

    /// Number of handlers subscribed to `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.registry.lock().topics.get(topic).map_or(0, Vec::len)
    }

    /// Topics that currently have at least one handler.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.registry.lock().topics.keys().cloned().collect();
        topics.sort();
        topics
    }
}

static GLOBAL_BUS: Lazy<Arc<EventBus>> = Lazy::new(|| Arc::new(EventBus::new()));

/// Process-wide bus, created on first access.
pub fn global() -> Arc<EventBus> {
    Arc::clone(&GLOBAL_BUS)
}

/// Publishes on the process-wide bus.
pub fn publish_event(event: Event) -> usize {
    GLOBAL_BUS.publish(event)
}

/// Subscribes on the process-wide bus.
pub fn subscribe_to_event<F>(topic: impl Into<String>, handler: F) -> HandlerId
where
    F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
{
    GLOBAL_BUS.subscribe(topic, handler)
}
