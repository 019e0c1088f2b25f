//! Synchronous in-process event channel.
//!
//! Producers are the inventory facade and the location container system;
//! consumers are the persistence manager's dirty-flag handlers plus any
//! optional extensions. `emit` invokes every registered handler for the
//! event type immediately, in registration order. Events are never buffered:
//! with no handler registered they are logged and dropped.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

/// Every event type the core emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    ItemTaken,
    ItemDropped,
    ItemUsed,
    ItemGiven,
    EquipmentChange,
    ContainerUnlocked,
    ContainerItemAdded,
    ContainerItemRemoved,
    LocationChange,
    InventoryChange,
    WorldStateChange,
    SystemShutdown,
    PeriodicSave,
}

impl EventType {
    pub const ALL: [EventType; 13] = [
        Self::ItemTaken,
        Self::ItemDropped,
        Self::ItemUsed,
        Self::ItemGiven,
        Self::EquipmentChange,
        Self::ContainerUnlocked,
        Self::ContainerItemAdded,
        Self::ContainerItemRemoved,
        Self::LocationChange,
        Self::InventoryChange,
        Self::WorldStateChange,
        Self::SystemShutdown,
        Self::PeriodicSave,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ItemTaken => "item_taken",
            Self::ItemDropped => "item_dropped",
            Self::ItemUsed => "item_used",
            Self::ItemGiven => "item_given",
            Self::EquipmentChange => "equipment_change",
            Self::ContainerUnlocked => "container_unlocked",
            Self::ContainerItemAdded => "container_item_added",
            Self::ContainerItemRemoved => "container_item_removed",
            Self::LocationChange => "location_change",
            Self::InventoryChange => "inventory_change",
            Self::WorldStateChange => "world_state_change",
            Self::SystemShutdown => "system_shutdown",
            Self::PeriodicSave => "periodic_save",
        }
    }
}

/// Which subsystem emitted the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSystem {
    Inventory,
    Containers,
    Persistence,
    Engine,
}

impl SourceSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inventory => "inventory",
            Self::Containers => "containers",
            Self::Persistence => "persistence",
            Self::Engine => "engine",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GameEvent {
    pub event_type: EventType,
    pub source: SourceSystem,
    pub data: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

pub type EventHandler = Box<dyn Fn(&GameEvent) + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    handlers: HashMap<EventType, Vec<EventHandler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, event_type: EventType, handler: EventHandler) {
        self.handlers.entry(event_type).or_default().push(handler);
    }

    /// Deliver an event synchronously to every handler for its type.
    pub fn emit(&self, event_type: EventType, source: SourceSystem, data: Map<String, Value>) {
        let event = GameEvent {
            event_type,
            source,
            data,
            timestamp: Utc::now(),
        };

        match self.handlers.get(&event_type) {
            Some(handlers) => {
                debug!(
                    "event {} from {} -> {} handler(s)",
                    event_type.as_str(),
                    source.as_str(),
                    handlers.len()
                );
                for handler in handlers {
                    handler(&event);
                }
            }
            None => {
                debug!(
                    "event {} from {} dropped (no handlers)",
                    event_type.as_str(),
                    source.as_str()
                );
            }
        }
    }

    pub fn handler_count(&self, event_type: EventType) -> usize {
        self.handlers.get(&event_type).map_or(0, Vec::len)
    }
}

/// Build an event data map from key/value pairs.
pub fn event_data(pairs: Vec<(&str, Value)>) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in pairs {
        map.insert(key.to_string(), value);
    }
    map
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn emit_invokes_every_handler_in_order() {
        let mut bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = count.clone();
            bus.subscribe(
                EventType::ItemTaken,
                Box::new(move |_| {
                    count.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }

        bus.emit(EventType::ItemTaken, SourceSystem::Inventory, Map::new());
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn emit_without_handlers_is_dropped_silently() {
        let bus = EventBus::new();
        // Must not panic or queue anything.
        bus.emit(EventType::PeriodicSave, SourceSystem::Persistence, Map::new());
        assert_eq!(bus.handler_count(EventType::PeriodicSave), 0);
    }

    #[test]
    fn event_type_names_are_unique() {
        let names: std::collections::BTreeSet<&str> =
            EventType::ALL.iter().map(|e| e.as_str()).collect();
        assert_eq!(names.len(), EventType::ALL.len());
        assert!(names.contains("periodic_save"));
        assert!(names.contains("system_shutdown"));
    }

    #[test]
    fn handlers_receive_payload_and_source() {
        let mut bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();

        bus.subscribe(
            EventType::ContainerUnlocked,
            Box::new(move |event| {
                assert_eq!(event.source, SourceSystem::Containers);
                assert_eq!(
                    event.data.get("method").and_then(Value::as_str),
                    Some("key")
                );
                assert!(event.timestamp <= chrono::Utc::now());
                seen_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        bus.emit(
            EventType::ContainerUnlocked,
            SourceSystem::Containers,
            event_data(vec![("method", Value::String("key".into()))]),
        );
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
