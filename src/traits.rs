//! Shared trait abstractions
//!
//! [`LayerOperations`] is what the map needs from any layer; [`TiledLayer`]
//! is the extra capability of layers backed by a tile grid.

use crate::core::bounds::Bounds;
use crate::core::geo::{PixelPoint, Point};
use crate::core::resolution::ResolutionLadder;
use crate::core::viewport::Viewport;
use crate::layers::base::{LayerAttachment, LayerContext};
use crate::Result;

/// Trait for layer-like objects driven by the map
pub trait LayerOperations: Send + Sync {
    /// Get layer ID
    fn id(&self) -> &str;

    /// Get layer name
    fn name(&self) -> &str;

    /// Get layer z-index for ordering
    fn z_index(&self) -> i32;

    /// Set layer z-index
    fn set_z_index(&mut self, z_index: i32);

    /// Get layer opacity (0.0 to 1.0)
    fn opacity(&self) -> f32;

    /// Set layer opacity
    fn set_opacity(&mut self, opacity: f32);

    /// Check if layer is visible
    fn is_visible(&self) -> bool;

    /// Set layer visibility
    fn set_visible(&mut self, visible: bool);

    fn is_base_layer(&self) -> bool;

    /// Whether the last move left the layer inside its display range
    fn in_range(&self) -> bool;

    fn set_in_range(&mut self, in_range: bool);

    /// Display range check for `resolution`
    fn calculate_in_range(&self, _resolution: f64) -> bool {
        true
    }

    /// Ladder the map adopts while this layer is the base layer
    fn resolutions(&self) -> Option<&ResolutionLadder> {
        None
    }

    /// The map wraps around the antimeridian while this layer is the base layer
    fn wraps_date_line(&self) -> bool {
        false
    }

    /// Called once when the layer joins a map
    fn attach(&mut self, _attachment: &LayerAttachment) -> Result<()> {
        Ok(())
    }

    /// Follow a map move to `bounds`
    fn move_to(&mut self, bounds: &Bounds, zoom_changed: bool, dragging: bool, ctx: &mut LayerContext<'_>);

    /// Follow a pixel pan of the map
    fn move_by_px(&mut self, _dx: f64, _dy: f64, _ctx: &mut LayerContext<'_>) {}

    fn on_map_resize(&mut self) {}

    /// Apply finished asynchronous work; returns how many results were handled
    fn process_responses(&mut self, _ctx: &mut LayerContext<'_>) -> usize {
        0
    }

    /// Time-driven housekeeping
    fn update(&mut self, _ctx: &mut LayerContext<'_>) {}

    fn is_loading(&self) -> bool {
        false
    }

    /// Release everything before the layer leaves the map
    fn destroy(&mut self, _ctx: &mut LayerContext<'_>) {}

    /// Dynamic casting support
    fn as_any(&self) -> &dyn std::any::Any;
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

/// Capability of layers that cover the map with a tile grid
pub trait TiledLayer {
    /// Bounds of the tile under a viewport pixel, aligned to the layer max extent
    fn tile_bounds_at(&self, viewport_px: PixelPoint, viewport: &Viewport) -> Option<Bounds>;

    /// Request URL for a tile, `None` when nothing should be requested
    fn tile_url(&self, bounds: &Bounds, viewport: &Viewport) -> Option<String>;

    /// Resolution tiles are requested at while the map shows `resolution`
    fn server_resolution(&self, resolution: f64) -> f64;

    /// Zoom level in the service's numbering for the current view
    fn server_zoom(&self, viewport: &Viewport) -> Option<i64>;
}

/// Unified interpolation trait
pub trait Lerp {
    fn lerp(&self, other: &Self, t: f64) -> Self;
}

impl Lerp for f64 {
    fn lerp(&self, other: &Self, t: f64) -> Self {
        self + (other - self) * t
    }
}

impl Lerp for Point {
    fn lerp(&self, other: &Self, t: f64) -> Self {
        Point::new(self.x.lerp(&other.x, t), self.y.lerp(&other.y, t))
    }
}

impl Lerp for PixelPoint {
    fn lerp(&self, other: &Self, t: f64) -> Self {
        PixelPoint::new(self.x.lerp(&other.x, t), self.y.lerp(&other.y, t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lerp() {
        assert_eq!(2.0f64.lerp(&4.0, 0.5), 3.0);
        let p = Point::new(0.0, 10.0).lerp(&Point::new(10.0, 0.0), 0.25);
        assert_eq!(p, Point::new(2.5, 7.5));
        let px = PixelPoint::new(0.0, 0.0).lerp(&PixelPoint::new(-8.0, 4.0), 1.0);
        assert_eq!(px, PixelPoint::new(-8.0, 4.0));
    }
}
