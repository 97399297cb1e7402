//! Back buffer for the resize transition
//!
//! When a layer retiles, the tiles it had already loaded are snapshotted
//! and kept on screen, scaled to the new resolution, until the new tiles
//! finish loading. The buffer is anchored on the map position of the old
//! grid's top-left corner so it stays put under zooms and pans.

use crate::core::bounds::Bounds;
use crate::core::geo::{round_half_up, PixelPoint, Point, Size};
use crate::core::viewport::Viewport;
use crate::layers::tile::grid::TileGrid;
use crate::layers::tile::tile::{TileId, TileState};
use crate::prelude::{Arc, Instant};

#[derive(Debug, Clone)]
pub struct BackBufferTile {
    pub tile: TileId,
    pub row: usize,
    pub col: usize,
    pub bounds: Bounds,
    pub data: Arc<Vec<u8>>,
    /// Offset from the buffer position, in viewport pixels
    pub offset: PixelPoint,
    pub size: Size,
}

#[derive(Debug, Clone)]
pub struct BackBuffer {
    anchor: Point,
    resolution: f64,
    tile_size: Size,
    tiles: Vec<BackBufferTile>,
    position: PixelPoint,
    ratio: f64,
    removal_deadline: Option<Instant>,
}

impl BackBuffer {
    /// Snapshots the loaded tiles of `grid`
    ///
    /// Returns `None` for an empty grid or one that was never laid out.
    pub fn from_grid(grid: &TileGrid) -> Option<Self> {
        let resolution = grid.map_resolution()?;
        let anchor = grid.tile(0, 0)?.bounds().top_left();
        let tile_size = grid.tile(0, 0)?.size();

        let tiles = grid
            .rows()
            .enumerate()
            .flat_map(|(row, tiles)| {
                tiles.iter().enumerate().filter_map(move |(col, tile)| {
                    if tile.state() != TileState::Loaded {
                        return None;
                    }
                    Some(BackBufferTile {
                        tile: tile.id(),
                        row,
                        col,
                        bounds: tile.bounds().clone(),
                        data: tile.data()?.clone(),
                        offset: PixelPoint::default(),
                        size: tile_size,
                    })
                })
            })
            .collect();

        Some(Self {
            anchor,
            resolution,
            tile_size,
            tiles,
            position: PixelPoint::default(),
            ratio: 1.0,
            removal_deadline: None,
        })
    }

    /// Scales and positions the snapshot for display at `resolution`
    pub fn apply(&mut self, resolution: f64, viewport: &Viewport) {
        let ratio = self.resolution / resolution;
        self.ratio = ratio;
        let size = Size::new(
            round_half_up(ratio * self.tile_size.width),
            round_half_up(ratio * self.tile_size.height),
        );
        for tile in &mut self.tiles {
            tile.offset = PixelPoint::new(
                (ratio * tile.col as f64 * self.tile_size.width).trunc(),
                (ratio * tile.row as f64 * self.tile_size.height).trunc(),
            );
            tile.size = size;
        }

        if let Some(px) = viewport.lonlat_to_viewport_px_at(&self.anchor, resolution) {
            let origin = viewport.origin_px();
            self.position = PixelPoint::new(
                round_half_up(px.x - origin.x),
                round_half_up(px.y - origin.y),
            );
        }
    }

    pub fn anchor(&self) -> Point {
        self.anchor
    }

    /// Resolution the snapshot was taken at
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Scale factor of the last [`BackBuffer::apply`]
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Top-left of the buffer in layer pixels
    pub fn position(&self) -> PixelPoint {
        self.position
    }

    pub fn tiles(&self) -> &[BackBufferTile] {
        &self.tiles
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn schedule_removal(&mut self, deadline: Instant) {
        self.removal_deadline = Some(deadline);
    }

    pub fn is_removal_pending(&self) -> bool {
        self.removal_deadline.is_some()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.removal_deadline.map_or(false, |deadline| now >= deadline)
    }
}
