//! Map orchestrator
//!
//! A [`Map`] owns the viewport, the ordered layer stack and the event queue.
//! Every transition goes through [`Map::move_to`] or [`Map::move_by_px`],
//! which update the viewport first and then hand each layer a
//! [`LayerContext`] lending it read access to the new viewport state.

use crate::core::animation::{Easing, PanStep, PanTween};
use crate::core::bounds::Bounds;
use crate::core::config::MapOptions;
use crate::core::events::{EventManager, MapEvent};
use crate::core::geo::{PixelPoint, Point, Size};
use crate::core::projection::ProjectionRegistry;
use crate::core::resolution::ResolutionLadder;
use crate::core::viewport::{MoveOptions, Viewport};
use crate::layers::base::{LayerAttachment, LayerContext, LayerTrait};
use crate::prelude::{Arc, Instant};
use crate::{MapError, Result};

/// Flags for [`Map::pan`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PanOptions {
    /// Tween to the new center instead of jumping
    pub animate: bool,
    /// The pan is one step of a drag
    pub dragging: bool,
}

pub struct Map {
    options: MapOptions,
    registry: Arc<ProjectionRegistry>,
    viewport: Viewport,
    /// Ladder used while the base layer brings none of its own
    default_ladder: ResolutionLadder,
    layers: Vec<Box<dyn LayerTrait>>,
    base_layer: Option<String>,
    events: EventManager,
    pan_tween: Option<PanTween>,
    pan_easing: Easing,
}

impl Map {
    pub fn new(options: MapOptions, registry: Arc<ProjectionRegistry>) -> Result<Self> {
        let options = options.with_projection_defaults(&registry)?;
        let units = options.units.ok_or_else(|| {
            MapError::Projection(format!("no units known for {}", options.projection))
        })?;
        let max_extent = options.max_extent.clone().ok_or_else(|| {
            MapError::Projection(format!("no max extent known for {}", options.projection))
        })?;
        let default_ladder = options.resolutions.build(units, &max_extent, options.size)?;

        let viewport = Viewport::new(options.size, max_extent)
            .with_restricted_extent(options.restricted_extent.clone())
            .with_fractional_zoom(options.fractional_zoom)
            .with_zoom_limits(options.min_zoom, options.max_zoom);

        Ok(Self {
            pan_easing: Easing::from(options.pan_easing),
            options,
            registry,
            viewport,
            default_ladder,
            layers: Vec::new(),
            base_layer: None,
            events: EventManager::new(),
            pan_tween: None,
        })
    }

    /// A map on a registry preloaded with the geographic and mercator families
    pub fn with_default_registry(options: MapOptions) -> Result<Self> {
        Self::new(options, Arc::new(ProjectionRegistry::with_defaults()))
    }

    pub fn options(&self) -> &MapOptions {
        &self.options
    }

    pub fn registry(&self) -> &ProjectionRegistry {
        &self.registry
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn center(&self) -> Option<Point> {
        self.viewport.center()
    }

    pub fn zoom(&self) -> f64 {
        self.viewport.zoom()
    }

    pub fn resolution(&self) -> Option<f64> {
        self.viewport.resolution()
    }

    pub fn extent(&self) -> Option<Bounds> {
        self.viewport.extent()
    }

    /// Scale denominator at the current resolution
    pub fn scale(&self) -> Option<f64> {
        let units = self.options.units?;
        Some(units.scale_from_resolution(self.viewport.resolution()?))
    }

    pub fn size(&self) -> Size {
        self.viewport.size()
    }

    // Layers

    pub fn layers(&self) -> impl Iterator<Item = &dyn LayerTrait> {
        self.layers.iter().map(|layer| layer.as_ref())
    }

    pub fn layer(&self, id: &str) -> Option<&dyn LayerTrait> {
        self.layers
            .iter()
            .find(|layer| layer.id() == id)
            .map(|layer| layer.as_ref())
    }

    pub fn layer_mut(&mut self, id: &str) -> Option<&mut (dyn LayerTrait + 'static)> {
        self.layers
            .iter_mut()
            .find(|layer| layer.id() == id)
            .map(|layer| layer.as_mut())
    }

    /// Typed access to a layer, e.g. `map.layer_as::<GridLayer>("osm")`
    pub fn layer_as<T: 'static>(&self, id: &str) -> Option<&T> {
        self.layer(id)?.as_any().downcast_ref::<T>()
    }

    pub fn layer_as_mut<T: 'static>(&mut self, id: &str) -> Option<&mut T> {
        self.layer_mut(id)?.as_any_mut().downcast_mut::<T>()
    }

    pub fn base_layer(&self) -> Option<&dyn LayerTrait> {
        self.layer(self.base_layer.as_deref()?)
    }

    pub fn base_layer_id(&self) -> Option<&str> {
        self.base_layer.as_deref()
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.layers.iter().position(|layer| layer.id() == id)
    }

    fn base_index(&self) -> Option<usize> {
        self.index_of(self.base_layer.as_deref()?)
    }

    pub fn add_layer(&mut self, mut layer: Box<dyn LayerTrait>) -> Result<()> {
        if self.index_of(layer.id()).is_some() {
            return Err(MapError::Layer(format!("layer {} is already on the map", layer.id())));
        }
        layer.attach(&LayerAttachment {
            projection: self.options.projection.clone(),
            reverse_axis: self.registry.reverse_axis(&self.options.projection),
            max_extent: self.viewport.max_extent().clone(),
        })?;

        let id = layer.id().to_string();
        let is_base = layer.is_base_layer();
        if is_base && self.base_layer.is_some() {
            layer.set_visible(false);
        }
        layer.set_z_index(self.layers.len() as i32);
        self.layers.push(layer);

        if is_base {
            if self.base_layer.is_none() {
                self.set_base_layer(&id)?;
            }
        } else {
            self.redraw_layer(self.layers.len() - 1);
        }
        self.events.emit(MapEvent::LayerAdd { layer_id: id });
        Ok(())
    }

    /// Detaches a layer, aborting its in-flight tiles
    ///
    /// Removing the base layer promotes the first remaining base layer.
    pub fn remove_layer(&mut self, id: &str) -> Result<Box<dyn LayerTrait>> {
        let index = self
            .index_of(id)
            .ok_or_else(|| MapError::Layer(format!("no layer {} on the map", id)))?;
        {
            let mut ctx = LayerContext::new(&self.viewport, &mut self.events, Instant::now());
            self.layers[index].destroy(&mut ctx);
        }
        let layer = self.layers.remove(index);
        self.renumber_layers();

        if self.base_layer.as_deref() == Some(id) {
            self.base_layer = None;
            let next = self
                .layers
                .iter()
                .find(|layer| layer.is_base_layer())
                .map(|layer| layer.id().to_string());
            if let Some(next) = next {
                self.set_base_layer(&next)?;
            }
        }
        self.events.emit(MapEvent::LayerRemove {
            layer_id: id.to_string(),
        });
        Ok(layer)
    }

    pub fn set_base_layer(&mut self, id: &str) -> Result<()> {
        let index = self
            .index_of(id)
            .ok_or_else(|| MapError::Layer(format!("no layer {} on the map", id)))?;
        if !self.layers[index].is_base_layer() {
            return Err(MapError::Layer(format!("layer {} is not a base layer", id)));
        }
        if self.base_layer.as_deref() == Some(id) {
            return Ok(());
        }

        let center = self.viewport.center();
        let old_resolution = self.viewport.resolution();
        if let Some(old) = self.base_index() {
            self.layers[old].set_visible(false);
        }

        let layer = &mut self.layers[index];
        layer.set_visible(true);
        let ladder = layer
            .resolutions()
            .cloned()
            .unwrap_or_else(|| self.default_ladder.clone());
        self.viewport.set_ladder(Some(ladder));
        self.viewport.set_wrap_date_line(layer.wraps_date_line());
        self.base_layer = Some(id.to_string());
        log::info!("base layer is now {}", id);

        let force = MoveOptions {
            force_zoom_change: true,
            ..Default::default()
        };
        match (center, old_resolution) {
            (Some(center), Some(resolution)) => {
                let zoom = self.viewport.zoom_for_resolution(resolution, true);
                self.move_to(Some(center), zoom, force);
            }
            _ if self.options.center.is_some() || self.options.zoom.is_some() => {
                let zoom = self.options.zoom.unwrap_or(0.0);
                self.move_to(self.options.center, Some(zoom), force);
            }
            _ => {}
        }

        self.events.emit(MapEvent::BaseLayerChange {
            layer_id: id.to_string(),
        });
        Ok(())
    }

    /// Shows or hides an overlay, redrawing it when it becomes visible
    pub fn set_layer_visible(&mut self, id: &str, visible: bool) -> Result<()> {
        let index = self
            .index_of(id)
            .ok_or_else(|| MapError::Layer(format!("no layer {} on the map", id)))?;
        if self.layers[index].is_visible() == visible {
            return Ok(());
        }
        self.layers[index].set_visible(visible);
        if visible {
            self.redraw_layer(index);
        }
        Ok(())
    }

    /// Moves a layer to `index` in the stack; later layers draw on top
    pub fn set_layer_index(&mut self, id: &str, index: usize) -> Result<()> {
        let from = self
            .index_of(id)
            .ok_or_else(|| MapError::Layer(format!("no layer {} on the map", id)))?;
        let layer = self.layers.remove(from);
        let to = index.min(self.layers.len());
        self.layers.insert(to, layer);
        self.renumber_layers();
        Ok(())
    }

    fn renumber_layers(&mut self) {
        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.set_z_index(i as i32);
        }
    }

    /// Brings a single layer up to date with the current view
    fn redraw_layer(&mut self, index: usize) {
        let (Some(bounds), Some(resolution)) = (self.viewport.extent(), self.viewport.resolution()) else {
            return;
        };
        let layer = &mut self.layers[index];
        if !layer.is_base_layer() {
            let in_range = layer.calculate_in_range(resolution);
            layer.set_in_range(in_range);
        }
        if !(layer.is_visible() && layer.in_range()) {
            return;
        }
        let mut ctx = LayerContext::new(&self.viewport, &mut self.events, Instant::now());
        layer.move_to(&bounds, true, false, &mut ctx);
        self.events.emit(MapEvent::LayerMoveEnd {
            layer_id: layer.id().to_string(),
            zoom_changed: true,
        });
    }

    /// Base layer first, then overlays in stack order
    fn draw_order(&self) -> Vec<usize> {
        let base = self.base_index();
        base.into_iter()
            .chain((0..self.layers.len()).filter(|&i| Some(i) != base))
            .collect()
    }

    // Movement

    /// Moves the view and every layer with it
    ///
    /// Returns whether anything moved. Events fire in this order:
    /// `MoveStart` (not while dragging), `LayerMoveEnd` per drawn layer,
    /// `Move`, `MoveEnd` (not while dragging), then `ZoomEnd` on a zoom change.
    pub fn move_to(&mut self, lonlat: Option<Point>, zoom: Option<f64>, options: MoveOptions) -> bool {
        let Some(transition) = self.viewport.move_to(lonlat, zoom, options) else {
            return false;
        };
        let now = Instant::now();

        if transition.fires_movestart() {
            self.events.emit(MapEvent::MoveStart {
                zoom_changed: transition.zoom_changed,
            });
        }

        if let (Some(bounds), Some(resolution)) = (self.viewport.extent(), self.viewport.resolution()) {
            let base = self.base_index();
            for index in self.draw_order() {
                let layer = &mut self.layers[index];
                if Some(index) != base {
                    let in_range = layer.calculate_in_range(resolution);
                    layer.set_in_range(in_range);
                }
                if !(layer.is_visible() && layer.in_range()) {
                    continue;
                }
                let mut ctx = LayerContext::new(&self.viewport, &mut self.events, now);
                layer.move_to(&bounds, transition.zoom_changed, transition.layer_dragging, &mut ctx);
                if !transition.layer_dragging {
                    self.events.emit(MapEvent::LayerMoveEnd {
                        layer_id: layer.id().to_string(),
                        zoom_changed: transition.zoom_changed,
                    });
                }
            }
        }

        self.events.emit(MapEvent::Move);
        if !transition.dragging {
            self.events.emit(MapEvent::MoveEnd);
        }
        if transition.zoom_changed {
            self.events.emit(MapEvent::ZoomEnd {
                zoom: self.viewport.zoom(),
            });
        }
        true
    }

    /// Pans by pixels as one step of a drag
    ///
    /// Layers shift their grids without retiling. Returns whether the view moved.
    pub fn move_by_px(&mut self, dx: f64, dy: f64) -> bool {
        let Some(moved) = self.viewport.move_by_px(dx, dy) else {
            return false;
        };
        if moved.movestart {
            self.events.emit(MapEvent::MoveStart { zoom_changed: false });
        }
        let now = Instant::now();
        for index in self.draw_order() {
            let layer = &mut self.layers[index];
            if !(layer.is_visible() && layer.in_range()) {
                continue;
            }
            let mut ctx = LayerContext::new(&self.viewport, &mut self.events, now);
            layer.move_by_px(moved.dx, moved.dy, &mut ctx);
        }
        self.events.emit(MapEvent::Move);
        true
    }

    /// Settles a drag: one last full move, then `MoveEnd`
    pub fn end_drag(&mut self) {
        if !self.viewport.is_dragging() {
            return;
        }
        let center = self.viewport.center();
        self.move_to(center, None, MoveOptions::default());
        self.viewport.set_dragging(false);
        self.events.emit(MapEvent::MoveEnd);
    }

    /// Pans by a pixel offset of the center
    pub fn pan(&mut self, dx: f64, dy: f64, options: PanOptions) -> bool {
        if options.dragging {
            return self.move_by_px(dx, dy);
        }
        let Some(center) = self.viewport.center() else {
            return false;
        };
        let Some(center_px) = self.viewport.lonlat_to_viewport_px(&center) else {
            return false;
        };
        let target_px = center_px.add(dx, dy);
        if target_px == center_px {
            return false;
        }
        let Some(target) = self.viewport.viewport_px_to_lonlat(target_px) else {
            return false;
        };
        if options.animate {
            self.pan_to(target);
            true
        } else {
            self.set_center(target, None)
        }
    }

    /// Recenters, cancelling any running pan animation
    pub fn set_center(&mut self, center: Point, zoom: Option<f64>) -> bool {
        self.pan_tween = None;
        self.move_to(Some(center), zoom, MoveOptions::default())
    }

    /// Zooms to `zoom` around the current center; invalid zooms are ignored
    pub fn zoom_to(&mut self, zoom: f64) -> bool {
        if !self.viewport.is_valid_zoom(zoom) {
            return false;
        }
        self.pan_tween = None;
        self.move_to(None, Some(zoom), MoveOptions::default())
    }

    pub fn zoom_in(&mut self) -> bool {
        self.zoom_to(self.viewport.zoom() + 1.0)
    }

    pub fn zoom_out(&mut self) -> bool {
        self.zoom_to(self.viewport.zoom() - 1.0)
    }

    /// Centers on `bounds` at the deepest zoom that still shows all of it
    pub fn zoom_to_extent(&mut self, bounds: &Bounds, closest: bool) -> bool {
        let mut center = bounds.center();
        if let Some(world) = self.viewport.world_bounds() {
            if bounds.left() > bounds.right() {
                center.x = (bounds.left() + bounds.right() + world.width()) / 2.0;
                if center.x > world.right() {
                    center.x -= world.width();
                }
            }
        }
        let Some(zoom) = self.viewport.zoom_for_extent(bounds, closest) else {
            return false;
        };
        self.set_center(center, Some(zoom))
    }

    /// Shows the restricted extent if one is set, else the max extent
    pub fn zoom_to_max_extent(&mut self) -> bool {
        let extent = self
            .viewport
            .restricted_extent()
            .unwrap_or(self.viewport.max_extent())
            .clone();
        self.zoom_to_extent(&extent, false)
    }

    /// Resizes the viewport; the view is rebuilt around the same center
    pub fn update_size(&mut self, size: Size) -> bool {
        if !self.viewport.set_size(size) {
            return false;
        }
        for layer in &mut self.layers {
            layer.on_map_resize();
        }
        let Some(center) = self.viewport.center() else {
            return true;
        };
        let zoom = self.viewport.zoom();
        self.move_to(
            Some(center),
            Some(zoom),
            MoveOptions {
                force_zoom_change: true,
                ..Default::default()
            },
        );
        true
    }

    /// Glides to `lonlat` when it is close by, otherwise jumps there
    ///
    /// The glide runs in [`Map::update`]; it is used when the target lies
    /// inside the current extent scaled by the configured pan ratio.
    pub fn pan_to(&mut self, lonlat: Point) {
        let (Some(center), Some(extent)) = (self.viewport.center(), self.viewport.extent()) else {
            self.set_center(lonlat, None);
            return;
        };
        let (Some(from), Some(to)) = (
            self.viewport.lonlat_to_viewport_px(&center),
            self.viewport.lonlat_to_viewport_px(&lonlat),
        ) else {
            return;
        };
        let vector = PixelPoint::new(to.x - from.x, to.y - from.y);
        if vector.x == 0.0 && vector.y == 0.0 {
            return;
        }

        let nearby = extent
            .scale(self.options.pan_ratio, None)
            .contains_point(&lonlat, true);
        let duration = self.options.pan_duration();
        if nearby && !duration.is_zero() {
            self.pan_tween = Some(PanTween::new(
                lonlat,
                vector,
                Instant::now(),
                duration,
                self.pan_easing.clone(),
            ));
        } else {
            self.set_center(lonlat, None);
        }
    }

    pub fn set_pan_easing(&mut self, easing: Easing) {
        self.pan_easing = easing;
    }

    pub fn is_animating(&self) -> bool {
        self.pan_tween.is_some()
    }

    pub fn stop_animation(&mut self) {
        self.pan_tween = None;
    }

    /// Advances animation and drains finished tile work
    ///
    /// Returns how many tile responses were applied.
    pub fn update(&mut self, now: Instant) -> usize {
        match self.pan_tween.as_mut().map(|tween| tween.step(now)) {
            Some(PanStep::Move { dx, dy }) => {
                self.move_by_px(dx, dy);
            }
            Some(PanStep::Done { target }) => {
                self.pan_tween = None;
                let dragging = self.viewport.is_dragging();
                self.move_to(Some(target), None, MoveOptions::default());
                if dragging {
                    self.viewport.set_dragging(false);
                    self.events.emit(MapEvent::MoveEnd);
                }
            }
            None => {}
        }

        let mut handled = 0;
        for layer in &mut self.layers {
            let mut ctx = LayerContext::new(&self.viewport, &mut self.events, now);
            handled += layer.process_responses(&mut ctx);
            layer.update(&mut ctx);
        }
        handled
    }

    /// Any layer still waiting on tiles
    pub fn is_loading(&self) -> bool {
        self.layers.iter().any(|layer| layer.is_loading())
    }

    // Events

    pub fn on<F>(&mut self, event_type: &str, callback: F)
    where
        F: Fn(&MapEvent) + Send + Sync + 'static,
    {
        self.events.on(event_type, callback);
    }

    pub fn off(&mut self, event_type: &str) {
        self.events.off(event_type);
    }

    /// Dispatches queued events to listeners and returns them
    pub fn process_events(&mut self) -> Vec<MapEvent> {
        self.events.process_events()
    }

    pub fn events(&self) -> &EventManager {
        &self.events
    }
}

impl std::fmt::Debug for Map {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Map")
            .field("viewport", &self.viewport)
            .field("layers", &self.layers.iter().map(|l| l.id()).collect::<Vec<_>>())
            .field("base_layer", &self.base_layer)
            .field("animating", &self.pan_tween.is_some())
            .finish()
    }
}
