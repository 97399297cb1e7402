//! Map and tile lifecycle events
//!
//! Events are queued while the map mutates state and dispatched to listeners
//! in [`EventManager::process_events`], so listeners never observe a half
//! finished transition.

use crate::layers::tile::loader::FetchError;
use crate::layers::tile::TileId;
use crate::prelude::{HashMap, VecDeque};

/// Events emitted by the map, its layers and their tiles
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    /// A move is starting; fired once per drag
    MoveStart { zoom_changed: bool },
    /// The view changed
    Move,
    /// A move finished; suppressed while dragging
    MoveEnd,
    ZoomEnd { zoom: f64 },
    /// A layer finished repositioning for a move
    LayerMoveEnd { layer_id: String, zoom_changed: bool },
    BaseLayerChange { layer_id: String },
    LayerAdd { layer_id: String },
    LayerRemove { layer_id: String },
    /// The first tile of a layer started loading
    LoadStart { layer_id: String },
    /// The last loading tile of a layer completed
    LoadEnd { layer_id: String },
    TileLoadStart { layer_id: String, tile: TileId },
    /// A tile stopped loading; `aborted` when it failed for good or was dropped mid-load
    TileLoaded { layer_id: String, tile: TileId, aborted: bool },
    TileError { layer_id: String, tile: TileId, error: FetchError },
    BackBufferRemoved { layer_id: String },
}

impl MapEvent {
    /// Listener key for this event
    pub fn event_type(&self) -> &'static str {
        match self {
            MapEvent::MoveStart { .. } => "movestart",
            MapEvent::Move => "move",
            MapEvent::MoveEnd => "moveend",
            MapEvent::ZoomEnd { .. } => "zoomend",
            MapEvent::LayerMoveEnd { .. } => "layermoveend",
            MapEvent::BaseLayerChange { .. } => "changebaselayer",
            MapEvent::LayerAdd { .. } => "addlayer",
            MapEvent::LayerRemove { .. } => "removelayer",
            MapEvent::LoadStart { .. } => "loadstart",
            MapEvent::LoadEnd { .. } => "loadend",
            MapEvent::TileLoadStart { .. } => "tileloadstart",
            MapEvent::TileLoaded { .. } => "tileloaded",
            MapEvent::TileError { .. } => "tileerror",
            MapEvent::BackBufferRemoved { .. } => "backbufferremoved",
        }
    }

    pub fn layer_id(&self) -> Option<&str> {
        match self {
            MapEvent::LayerMoveEnd { layer_id, .. }
            | MapEvent::BaseLayerChange { layer_id }
            | MapEvent::LayerAdd { layer_id }
            | MapEvent::LayerRemove { layer_id }
            | MapEvent::LoadStart { layer_id }
            | MapEvent::LoadEnd { layer_id }
            | MapEvent::TileLoadStart { layer_id, .. }
            | MapEvent::TileLoaded { layer_id, .. }
            | MapEvent::TileError { layer_id, .. }
            | MapEvent::BackBufferRemoved { layer_id } => Some(layer_id),
            MapEvent::MoveStart { .. } | MapEvent::Move | MapEvent::MoveEnd | MapEvent::ZoomEnd { .. } => {
                None
            }
        }
    }
}

/// Event listener callback type
pub type EventCallback = Box<dyn Fn(&MapEvent) + Send + Sync>;

/// Event management system for the map
#[derive(Default)]
pub struct EventManager {
    /// Event listeners by event type
    listeners: HashMap<String, Vec<EventCallback>>,
    /// Event queue for processing
    event_queue: VecDeque<MapEvent>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an event listener
    pub fn on<F>(&mut self, event_type: &str, callback: F)
    where
        F: Fn(&MapEvent) + Send + Sync + 'static,
    {
        self.listeners
            .entry(event_type.to_string())
            .or_default()
            .push(Box::new(callback));
    }

    /// Remove every listener registered for `event_type`
    pub fn off(&mut self, event_type: &str) {
        self.listeners.remove(event_type);
    }

    /// Emit an event to the queue
    pub fn emit(&mut self, event: MapEvent) {
        self.event_queue.push_back(event);
    }

    /// Dispatch all queued events to their listeners and return them
    pub fn process_events(&mut self) -> Vec<MapEvent> {
        let events: Vec<_> = self.event_queue.drain(..).collect();

        for event in &events {
            if let Some(callbacks) = self.listeners.get(event.event_type()) {
                for callback in callbacks {
                    callback(event);
                }
            }
        }

        events
    }

    /// Queued events, oldest first
    pub fn pending(&self) -> impl Iterator<Item = &MapEvent> {
        self.event_queue.iter()
    }

    /// Clear all events from the queue
    pub fn clear_events(&mut self) {
        self.event_queue.clear();
    }

    /// Get number of pending events
    pub fn pending_events(&self) -> usize {
        self.event_queue.len()
    }
}

impl std::fmt::Debug for EventManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventManager")
            .field("listeners", &self.listeners.keys().collect::<Vec<_>>())
            .field("event_queue", &self.event_queue)
            .finish()
    }
}
