//! Observer pattern used throughout the crate: explicit subscriber
//! registries rather than inheriting an event-target base. [`EventBus`] is a
//! plain subscriber list; nothing here dispatches implicitly.

use crate::warped_map::MapId;

/// One of the notifications a caller can subscribe to.
#[derive(Debug, Clone)]
pub enum Event {
    WarpedMapAdded { map_id: MapId },
    WarpedMapRemoved { map_id: MapId },
    ResourceMaskUpdated { map_id: MapId },
    TransformationChanged { map_id: MapId },
    TileFetched { map_id: MapId, url: String },
    TileFetchError { map_id: MapId, url: String },
    AllRequestedTilesLoaded,
    TexturesUpdated { map_id: MapId },
}

/// A plain publish/subscribe list. Held by [`crate::warped_map_list::WarpedMapList`]
/// and [`crate::cache::TileCache`] — each owns its own bus rather than sharing
/// a global dispatcher, so a caller wires them together explicitly if it
/// wants a single combined stream.
pub struct EventBus {
    subscribers: Vec<Box<dyn Fn(&Event) + Send + Sync>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscribers.len())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self { subscribers: Vec::new() }
    }

    pub fn subscribe(&mut self, listener: impl Fn(&Event) + Send + Sync + 'static) {
        self.subscribers.push(Box::new(listener));
    }

    pub fn publish(&self, event: Event) {
        for subscriber in &self.subscribers {
            subscriber(&event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
