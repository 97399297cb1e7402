use crate::core::bounds::Bounds;
use crate::core::events::{EventManager, MapEvent};
use crate::core::viewport::Viewport;
use crate::prelude::Instant;

pub use crate::traits::LayerOperations as LayerTrait;

pub type LayerId = String;

#[derive(Debug, Clone, PartialEq)]
pub struct LayerProperties {
    pub id: LayerId,
    pub name: String,
    pub z_index: i32,
    pub opacity: f32,
    pub visible: bool,
    pub is_base_layer: bool,
    pub in_range: bool,
}

impl LayerProperties {
    pub fn new(id: String, name: String, is_base_layer: bool) -> Self {
        Self {
            id,
            name,
            z_index: 0,
            opacity: 1.0,
            visible: true,
            is_base_layer,
            in_range: true,
        }
    }
}

/// What a layer learns from the map it joins
#[derive(Debug, Clone, PartialEq)]
pub struct LayerAttachment {
    pub projection: String,
    pub reverse_axis: bool,
    pub max_extent: Bounds,
}

/// Map state lent to a layer for the duration of one call
pub struct LayerContext<'a> {
    pub viewport: &'a Viewport,
    pub events: &'a mut EventManager,
    pub now: Instant,
}

impl<'a> LayerContext<'a> {
    pub fn new(viewport: &'a Viewport, events: &'a mut EventManager, now: Instant) -> Self {
        Self {
            viewport,
            events,
            now,
        }
    }

    /// World bounds for antimeridian-aware tests, if the base layer wraps
    pub fn world_bounds(&self) -> Option<&'a Bounds> {
        self.viewport.world_bounds()
    }

    pub fn emit(&mut self, event: MapEvent) {
        self.events.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::Size;
    use crate::impl_layer_trait;

    struct StubLayer {
        properties: LayerProperties,
        moves: usize,
    }

    impl LayerTrait for StubLayer {
        impl_layer_trait!(StubLayer, properties);

        fn move_to(&mut self, _bounds: &Bounds, _zoom_changed: bool, _dragging: bool, ctx: &mut LayerContext<'_>) {
            self.moves += 1;
            ctx.emit(MapEvent::Move);
        }
    }

    #[test]
    fn test_layer_properties() {
        let props = LayerProperties::new("osm".to_string(), "OpenStreetMap".to_string(), true);
        assert_eq!(props.id, "osm");
        assert_eq!(props.z_index, 0);
        assert_eq!(props.opacity, 1.0);
        assert!(props.visible);
        assert!(props.in_range);
    }

    #[test]
    fn test_macro_accessors_and_context() {
        let mut layer = StubLayer {
            properties: LayerProperties::new("a".to_string(), "A".to_string(), false),
            moves: 0,
        };
        layer.set_opacity(1.5);
        assert_eq!(layer.opacity(), 1.0);
        layer.set_visible(false);
        assert!(!layer.is_visible());
        assert!(!layer.is_base_layer());
        assert!(layer.calculate_in_range(1.0));

        let viewport = Viewport::new(Size::square(256.0), Bounds::new(0.0, 0.0, 1.0, 1.0));
        let mut events = EventManager::new();
        let mut ctx = LayerContext::new(&viewport, &mut events, Instant::now());
        assert!(ctx.world_bounds().is_none());
        layer.move_to(&Bounds::default(), false, false, &mut ctx);
        assert_eq!(layer.moves, 1);
        assert_eq!(events.pending_events(), 1);
        assert!(layer.as_any().downcast_ref::<StubLayer>().is_some());
    }
}
