//! Grid-backed tile layer
//!
//! `GridLayer` ties a [`TileGrid`] to a URL scheme, a fetcher and an optional
//! byte cache. It follows map moves by either shifting the grid or retiling
//! it, draws tiles nearest the center first, counts in-flight loads and
//! reports their lifecycle as map events.

use crate::core::bounds::{Bounds, IntersectOptions, WrapTolerance};
use crate::core::config::{GridLayerOptions, TransitionEffect};
use crate::core::events::MapEvent;
use crate::core::geo::{PixelPoint, Point};
use crate::core::resolution::ResolutionLadder;
use crate::core::viewport::Viewport;
use crate::impl_layer_trait;
use crate::layers::base::{LayerAttachment, LayerContext, LayerProperties, LayerTrait};
use crate::layers::tile::backbuffer::BackBuffer;
use crate::layers::tile::cache::TileCache;
use crate::layers::tile::grid::{GridUpdate, TileGrid};
use crate::layers::tile::loader::{TileCompletion, TileFetcher, TileResponse};
use crate::layers::tile::source::{TileRequestContext, TileService, TileUrlBuilder};
use crate::layers::tile::tile::{LoadOutcome, Tile, TileId};
use crate::prelude::Arc;
use crate::traits::TiledLayer;
use crate::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};

pub struct GridLayer {
    pub(crate) properties: LayerProperties,
    pub(crate) options: GridLayerOptions,
    pub(crate) service: TileService,
    pub(crate) fetcher: Arc<dyn TileFetcher>,
    pub(crate) cache: Option<TileCache>,
    pub(crate) grid: TileGrid,
    pub(crate) back_buffer: Option<BackBuffer>,
    pub(crate) resolutions: Option<ResolutionLadder>,
    pub(crate) server_resolutions: Option<ResolutionLadder>,
    pub(crate) max_extent: Option<Bounds>,
    pub(crate) projection: String,
    pub(crate) reverse_axis: bool,

    pub(crate) num_loading: usize,
    /// `LoadStart` was emitted and `LoadEnd` is still owed
    pub(crate) loading: bool,
    /// A batch of draws is running; load-end handling waits for it
    pub(crate) drawing: bool,

    pub(crate) response_tx: Sender<TileResponse>,
    pub(crate) response_rx: Receiver<TileResponse>,
}

impl GridLayer {
    pub fn new(options: GridLayerOptions, service: TileService, fetcher: Arc<dyn TileFetcher>) -> Result<Self> {
        options.validate()?;

        let properties = LayerProperties::new(options.id.clone(), options.name.clone(), options.is_base_layer);
        let resolutions = options.resolutions.clone().map(ResolutionLadder::new).transpose()?;
        let server_resolutions = options
            .server_resolutions
            .clone()
            .map(ResolutionLadder::new)
            .transpose()?;
        let cache = TileCache::with_capacity(options.loading.cache_size);
        let grid = TileGrid::new(
            options.tile_size,
            options.buffer(),
            options.tile_origin.unwrap_or_default(),
            options.tile_origin_corner.row_sign(),
        );
        let (response_tx, response_rx) = unbounded();

        Ok(Self {
            properties: LayerProperties {
                visible: options.visible,
                ..properties
            },
            max_extent: options.max_extent.clone(),
            options,
            service,
            fetcher,
            cache,
            grid,
            back_buffer: None,
            resolutions,
            server_resolutions,
            projection: String::new(),
            reverse_axis: false,
            num_loading: 0,
            loading: false,
            drawing: false,
            response_tx,
            response_rx,
        })
    }

    /// Share a byte cache with other layers
    pub fn with_cache(mut self, cache: Option<TileCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn options(&self) -> &GridLayerOptions {
        &self.options
    }

    pub fn service(&self) -> &TileService {
        &self.service
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.grid.tiles()
    }

    pub fn back_buffer(&self) -> Option<&BackBuffer> {
        self.back_buffer.as_ref()
    }

    pub fn cache(&self) -> Option<&TileCache> {
        self.cache.as_ref()
    }

    /// Tiles currently waiting on a fetch
    pub fn num_loading(&self) -> usize {
        self.num_loading
    }

    pub fn max_extent(&self) -> Option<&Bounds> {
        self.max_extent.as_ref()
    }

    /// Tiles are requested only where they overlap the max extent, edges excluded
    pub fn should_draw(&self, bounds: &Bounds, world_bounds: Option<&Bounds>) -> bool {
        if self.options.display_outside_max_extent {
            return true;
        }
        match &self.max_extent {
            Some(max_extent) => bounds.intersects_bounds(
                max_extent,
                IntersectOptions {
                    inclusive: false,
                    world_bounds,
                },
            ),
            None => true,
        }
    }

    fn draw_tile(&mut self, id: TileId, ctx: &mut LayerContext<'_>) {
        let Some(bounds) = self.grid.find(id).map(|tile| tile.bounds().clone()) else {
            return;
        };
        let url = if self.should_draw(&bounds, ctx.world_bounds()) {
            self.tile_url(&bounds, ctx.viewport)
        } else {
            None
        };
        let cached = url
            .as_deref()
            .and_then(|url| self.cache.as_ref().and_then(|cache| cache.get(url)));
        let max_retries = self.options.loading.max_retries;

        let Some(tile) = self.grid.find_mut(id) else {
            return;
        };
        let Some(url) = url else {
            if tile.unload() {
                self.finish_tile(id, true, ctx);
            } else {
                tile.clear();
            }
            return;
        };

        tile.clear();
        let restarted = tile.begin_load(url.clone());
        let generation = tile.generation();
        if !restarted {
            self.start_tile(id, ctx);
        }

        match cached {
            Some(data) => {
                if let Some(tile) = self.grid.find_mut(id) {
                    tile.complete(generation, Ok(data), max_retries);
                }
                self.finish_tile(id, false, ctx);
            }
            None => self.fetcher.fetch(TileCompletion::new(
                id,
                generation,
                url,
                self.response_tx.clone(),
            )),
        }
    }

    fn start_tile(&mut self, id: TileId, ctx: &mut LayerContext<'_>) {
        if !self.loading {
            self.loading = true;
            ctx.emit(MapEvent::LoadStart {
                layer_id: self.properties.id.clone(),
            });
        }
        self.num_loading += 1;
        ctx.emit(MapEvent::TileLoadStart {
            layer_id: self.properties.id.clone(),
            tile: id,
        });
    }

    fn finish_tile(&mut self, id: TileId, aborted: bool, ctx: &mut LayerContext<'_>) {
        self.num_loading = self.num_loading.saturating_sub(1);
        ctx.emit(MapEvent::TileLoaded {
            layer_id: self.properties.id.clone(),
            tile: id,
            aborted,
        });
        if self.num_loading == 0 && !self.drawing {
            self.end_loading(ctx);
        }
    }

    fn end_loading(&mut self, ctx: &mut LayerContext<'_>) {
        self.settle_back_buffer(ctx);
        if self.loading {
            self.loading = false;
            ctx.emit(MapEvent::LoadEnd {
                layer_id: self.properties.id.clone(),
            });
        }
    }

    fn destroy_tile(&mut self, mut tile: Tile, ctx: &mut LayerContext<'_>) {
        if tile.unload() {
            self.finish_tile(tile.id(), true, ctx);
        }
    }

    fn apply_update(&mut self, update: GridUpdate, ctx: &mut LayerContext<'_>) {
        self.drawing = true;
        for tile in update.removed {
            self.destroy_tile(tile, ctx);
        }
        for id in update.redraw {
            self.draw_tile(id, ctx);
        }
        self.drawing = false;
        if self.num_loading == 0 {
            self.end_loading(ctx);
        }
    }

    fn apply_back_buffer(&mut self, resolution: f64, ctx: &mut LayerContext<'_>) {
        if self
            .back_buffer
            .as_ref()
            .map_or(false, BackBuffer::is_removal_pending)
        {
            self.remove_back_buffer(ctx);
        }
        if self.back_buffer.is_none() {
            self.back_buffer = BackBuffer::from_grid(&self.grid);
            if let Some(buffer) = &self.back_buffer {
                log::debug!(
                    "layer {}: back buffer of {} tiles at resolution {}",
                    self.properties.id,
                    buffer.tiles().len(),
                    buffer.resolution()
                );
            }
        }
        if let Some(buffer) = self.back_buffer.as_mut() {
            buffer.apply(resolution, ctx.viewport);
        }
    }

    /// Schedules removal of the back buffer once nothing is loading
    fn settle_back_buffer(&mut self, ctx: &mut LayerContext<'_>) {
        let delay = self.options.loading.removal_delay();
        let Some(buffer) = self.back_buffer.as_mut() else {
            return;
        };
        if buffer.is_removal_pending() {
            return;
        }
        if buffer.is_empty() || delay.is_zero() {
            self.remove_back_buffer(ctx);
        } else {
            buffer.schedule_removal(ctx.now + delay);
        }
    }

    fn remove_back_buffer(&mut self, ctx: &mut LayerContext<'_>) {
        if self.back_buffer.take().is_some() {
            log::debug!("layer {}: back buffer removed", self.properties.id);
            ctx.emit(MapEvent::BackBufferRemoved {
                layer_id: self.properties.id.clone(),
            });
        }
    }

    fn retry(&mut self, id: TileId, generation: u64, url: String) {
        self.fetcher.fetch(TileCompletion::new(
            id,
            generation,
            url,
            self.response_tx.clone(),
        ));
    }
}

impl TiledLayer for GridLayer {
    fn tile_bounds_at(&self, viewport_px: PixelPoint, viewport: &Viewport) -> Option<Bounds> {
        let max_extent = self.max_extent.as_ref().unwrap_or(viewport.max_extent());
        let resolution = self.server_resolution(viewport.resolution()?);
        let tile_w = resolution * self.options.tile_size.width;
        let tile_h = resolution * self.options.tile_size.height;
        let point = viewport.viewport_px_to_lonlat(viewport_px)?;
        let left = max_extent.left() + tile_w * ((point.x - max_extent.left()) / tile_w).floor();
        let bottom = max_extent.bottom() + tile_h * ((point.y - max_extent.bottom()) / tile_h).floor();
        Some(Bounds::new(left, bottom, left + tile_w, bottom + tile_h))
    }

    fn tile_url(&self, bounds: &Bounds, viewport: &Viewport) -> Option<String> {
        let resolution = viewport.resolution()?;
        let max_extent = self.max_extent.as_ref().unwrap_or(viewport.max_extent());
        let bounds = if self.options.wrap_date_line {
            bounds.wrap_date_line(max_extent, WrapTolerance::uniform(resolution))
        } else {
            bounds.clone()
        };
        let ctx = TileRequestContext {
            resolution,
            server_resolution: self.server_resolution(resolution),
            server_zoom: self.server_zoom(viewport)?,
            max_extent,
            tile_size: self.options.tile_size,
            wrap_date_line: self.options.wrap_date_line,
            projection: &self.projection,
            reverse_axis: self.reverse_axis,
        };
        self.service.url(&bounds, &ctx)
    }

    fn server_resolution(&self, resolution: f64) -> f64 {
        self.server_resolutions
            .as_ref()
            .map_or(resolution, |ladder| ladder.closest(resolution))
    }

    fn server_zoom(&self, viewport: &Viewport) -> Option<i64> {
        let resolution = self.server_resolution(viewport.resolution()?);
        match &self.server_resolutions {
            Some(ladder) => ladder.index_of(resolution).map(|i| i as i64),
            None => {
                let zoom = viewport.zoom_for_resolution(resolution, false)?;
                Some(zoom.round() as i64 + self.options.zoom_offset as i64)
            }
        }
    }
}

impl LayerTrait for GridLayer {
    impl_layer_trait!(GridLayer, properties);

    fn calculate_in_range(&self, resolution: f64) -> bool {
        self.options.in_range(resolution)
    }

    fn resolutions(&self) -> Option<&ResolutionLadder> {
        self.resolutions.as_ref()
    }

    fn wraps_date_line(&self) -> bool {
        self.options.wrap_date_line
    }

    fn attach(&mut self, attachment: &LayerAttachment) -> Result<()> {
        let max_extent = self
            .options
            .max_extent
            .clone()
            .unwrap_or_else(|| attachment.max_extent.clone());
        let origin: Point = self
            .options
            .tile_origin
            .unwrap_or_else(|| self.options.tile_origin_corner.point(&max_extent));
        self.grid
            .set_origin(origin, self.options.tile_origin_corner.row_sign());
        self.max_extent = Some(max_extent);
        self.projection = attachment.projection.clone();
        self.reverse_axis = attachment.reverse_axis;
        Ok(())
    }

    fn move_to(&mut self, bounds: &Bounds, zoom_changed: bool, _dragging: bool, ctx: &mut LayerContext<'_>) {
        let Some(resolution) = ctx.viewport.resolution() else {
            return;
        };
        let server_resolution = self.server_resolution(resolution);
        let force = self.grid.is_empty() || zoom_changed;
        let retile = force
            || self.grid.tiles_bounds().map_or(true, |tiles| {
                !tiles.intersects_bounds(
                    bounds,
                    IntersectOptions {
                        inclusive: true,
                        world_bounds: ctx.world_bounds(),
                    },
                )
            });

        if !retile {
            let update = self.grid.move_gridded(ctx.viewport, server_resolution);
            if update.shifts > 0 {
                log::debug!("layer {}: {} grid shifts", self.properties.id, update.shifts);
            }
            self.apply_update(update, ctx);
            return;
        }

        if force
            && !self.grid.is_empty()
            && self.options.transition_effect == TransitionEffect::Resize
        {
            self.apply_back_buffer(resolution, ctx);
        }
        if let Some(update) = self.grid.init(bounds, ctx.viewport, server_resolution) {
            log::debug!(
                "layer {}: retiled {}x{} grid at resolution {} ({} new tiles)",
                self.properties.id,
                self.grid.row_count(),
                self.grid.col_count(),
                server_resolution,
                update.created
            );
            self.apply_update(update, ctx);
        }
    }

    /// A drag step shifts the grid, or retiles once the grid has left the view
    fn move_by_px(&mut self, _dx: f64, _dy: f64, ctx: &mut LayerContext<'_>) {
        if self.grid.is_empty() {
            return;
        }
        let Some(bounds) = ctx.viewport.extent() else {
            return;
        };
        self.move_to(&bounds, false, true, ctx);
    }

    fn process_responses(&mut self, ctx: &mut LayerContext<'_>) -> usize {
        let responses: Vec<TileResponse> = self.response_rx.try_iter().collect();
        let max_retries = self.options.loading.max_retries;
        let count = responses.len();

        for response in responses {
            let Some(tile) = self.grid.find_mut(response.tile) else {
                log::trace!("layer {}: response for dropped {}", self.properties.id, response.tile);
                continue;
            };
            match tile.complete(response.generation, response.result.clone(), max_retries) {
                LoadOutcome::Stale => {
                    log::trace!(
                        "layer {}: stale response for {} (generation {})",
                        self.properties.id,
                        response.tile,
                        response.generation
                    );
                }
                LoadOutcome::Loaded => {
                    if let (Some(cache), Ok(data)) = (&self.cache, &response.result) {
                        cache.insert(response.url.clone(), data.clone());
                    }
                    self.finish_tile(response.tile, false, ctx);
                }
                LoadOutcome::Retry { generation, url } => {
                    log::warn!(
                        "layer {}: retrying {} ({}/{}) after error",
                        self.properties.id,
                        response.tile,
                        tile.retries(),
                        max_retries
                    );
                    self.retry(response.tile, generation, url);
                }
                LoadOutcome::Failed(error) => {
                    log::warn!(
                        "layer {}: {} failed for good: {}",
                        self.properties.id,
                        response.tile,
                        error
                    );
                    ctx.emit(MapEvent::TileError {
                        layer_id: self.properties.id.clone(),
                        tile: response.tile,
                        error,
                    });
                    self.finish_tile(response.tile, true, ctx);
                }
            }
        }
        count
    }

    fn update(&mut self, ctx: &mut LayerContext<'_>) {
        if self
            .back_buffer
            .as_ref()
            .map_or(false, |buffer| buffer.is_expired(ctx.now))
        {
            self.remove_back_buffer(ctx);
        }
    }

    fn is_loading(&self) -> bool {
        self.num_loading > 0
    }

    fn destroy(&mut self, ctx: &mut LayerContext<'_>) {
        self.drawing = true;
        for tile in self.grid.clear() {
            self.destroy_tile(tile, ctx);
        }
        self.drawing = false;
        self.remove_back_buffer(ctx);
        self.num_loading = 0;
        if self.loading {
            self.loading = false;
            ctx.emit(MapEvent::LoadEnd {
                layer_id: self.properties.id.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::EventManager;
    use crate::core::geo::Size;
    use crate::core::viewport::MoveOptions;
    use crate::layers::tile::loader::QueuedFetcher;
    use crate::layers::tile::source::XyzService;
    use crate::prelude::Instant;

    const EXTENT: f64 = 1024.0;

    fn viewport() -> Viewport {
        let ladder = ResolutionLadder::new(vec![4.0, 2.0, 1.0]).unwrap();
        let mut viewport = Viewport::new(
            Size::square(512.0),
            Bounds::new(-EXTENT, -EXTENT, EXTENT, EXTENT),
        )
        .with_ladder(ladder);
        viewport.move_to(Some(Point::new(0.0, 0.0)), Some(2.0), MoveOptions::default());
        viewport
    }

    fn grid_layer(options: GridLayerOptions) -> (GridLayer, QueuedFetcher) {
        let fetcher = QueuedFetcher::new();
        let mut layer = GridLayer::new(
            options,
            TileService::Xyz(XyzService::new("{z}/{x}/{y}")),
            Arc::new(fetcher.clone()),
        )
        .unwrap();
        layer
            .attach(&LayerAttachment {
                projection: "EPSG:3857".to_string(),
                reverse_axis: false,
                max_extent: Bounds::new(-EXTENT, -EXTENT, EXTENT, EXTENT),
            })
            .unwrap();
        (layer, fetcher)
    }

    #[test]
    fn test_rejects_invalid_options() {
        let options = GridLayerOptions {
            buffer: -1,
            ..GridLayerOptions::new("bad")
        };
        let result = GridLayer::new(options, TileService::default(), Arc::new(QueuedFetcher::new()));
        assert!(result.is_err());
    }

    #[test]
    fn test_should_draw_excludes_touching_edges() {
        let (layer, _) = grid_layer(GridLayerOptions::new("a"));
        assert!(layer.should_draw(&Bounds::new(0.0, 0.0, 256.0, 256.0), None));
        assert!(!layer.should_draw(&Bounds::new(EXTENT, 0.0, EXTENT + 256.0, 256.0), None));

        let (outside, _) = grid_layer(GridLayerOptions {
            display_outside_max_extent: true,
            ..GridLayerOptions::new("b")
        });
        assert!(outside.should_draw(&Bounds::new(EXTENT, 0.0, EXTENT + 256.0, 256.0), None));
    }

    #[test]
    fn test_server_resolution_and_zoom() {
        let viewport = viewport();
        let (plain, _) = grid_layer(GridLayerOptions {
            zoom_offset: 3,
            ..GridLayerOptions::new("a")
        });
        assert_eq!(plain.server_resolution(1.0), 1.0);
        assert_eq!(plain.server_zoom(&viewport), Some(5));

        let (served, _) = grid_layer(GridLayerOptions {
            server_resolutions: Some(vec![8.0, 2.0]),
            ..GridLayerOptions::new("b")
        });
        assert_eq!(served.server_resolution(1.0), 2.0);
        assert_eq!(served.server_zoom(&viewport), Some(1));
    }

    #[test]
    fn test_tile_bounds_at_pixel() {
        let viewport = viewport();
        let (layer, _) = grid_layer(GridLayerOptions::new("a"));
        let bounds = layer
            .tile_bounds_at(PixelPoint::new(300.0, 300.0), &viewport)
            .unwrap();
        assert_eq!(bounds, Bounds::new(0.0, -256.0, 256.0, 0.0));
    }

    #[test]
    fn test_move_to_draws_and_completes() {
        let viewport = viewport();
        let (mut layer, fetcher) = grid_layer(GridLayerOptions::new("a"));
        let mut events = EventManager::new();
        let mut ctx = LayerContext::new(&viewport, &mut events, Instant::now());

        layer.move_to(&viewport.extent().unwrap(), true, false, &mut ctx);
        let requested = fetcher.pending_count();
        assert!(requested > 0);
        assert_eq!(layer.num_loading(), requested);
        assert!(layer.is_loading());

        fetcher.complete_all(|_| Ok(Arc::new(vec![1])));
        assert_eq!(layer.process_responses(&mut ctx), requested);
        assert_eq!(layer.num_loading(), 0);
        assert_eq!(layer.cache().map(|c| c.len()), Some(requested));

        let events: Vec<MapEvent> = events.process_events();
        assert!(matches!(events.first(), Some(MapEvent::LoadStart { .. })));
        assert!(matches!(events.last(), Some(MapEvent::LoadEnd { .. })));
    }

    #[test]
    fn test_tiles_outside_extent_are_not_requested() {
        let viewport = viewport();
        let (mut layer, fetcher) = grid_layer(GridLayerOptions {
            max_extent: Some(Bounds::new(0.0, 0.0, 1024.0, 1024.0)),
            ..GridLayerOptions::new("a")
        });
        let mut events = EventManager::new();
        let mut ctx = LayerContext::new(&viewport, &mut events, Instant::now());
        layer.move_to(&viewport.extent().unwrap(), true, false, &mut ctx);

        for url in fetcher.pending_urls() {
            assert!(!url.is_empty());
        }
        let drawn = layer.tiles().filter(|t| t.url().is_some()).count();
        assert_eq!(drawn, fetcher.pending_count());
        assert!(layer
            .tiles()
            .filter(|t| t.url().is_some())
            .all(|t| t.bounds().left() >= 0.0 && t.bounds().bottom() >= 0.0));
    }

    #[test]
    fn test_layer_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GridLayer>();
    }

    #[test]
    fn test_long_drag_retiles_instead_of_cycling() {
        let wide = Bounds::new(-65536.0, -65536.0, 65536.0, 65536.0);
        let mut viewport = Viewport::new(Size::square(512.0), wide.clone())
            .with_ladder(ResolutionLadder::new(vec![2.0, 1.0]).unwrap());
        viewport.move_to(Some(Point::new(0.0, 0.0)), Some(1.0), MoveOptions::default());
        let (mut layer, fetcher) = grid_layer(GridLayerOptions {
            buffer: 1,
            max_extent: Some(wide),
            ..GridLayerOptions::new("a")
        });
        let mut events = EventManager::new();
        {
            let mut ctx = LayerContext::new(&viewport, &mut events, Instant::now());
            layer.move_to(&viewport.extent().unwrap(), true, false, &mut ctx);
        }
        assert_eq!(fetcher.pending_count(), layer.tiles().count());
        fetcher.complete_all(|_| Ok(Arc::new(vec![1])));

        viewport.move_by_px(-20000.0, 0.0).unwrap();
        let mut ctx = LayerContext::new(&viewport, &mut events, Instant::now());
        layer.process_responses(&mut ctx);
        layer.move_by_px(-20000.0, 0.0, &mut ctx);

        assert!(fetcher.pending_count() <= layer.tiles().count());
        let covered = layer.grid().tiles_bounds().unwrap();
        assert!(covered.contains_bounds(&viewport.extent().unwrap(), false, true));
    }
}
