//! Tile grid bookkeeping
//!
//! The grid is a rectangular block of [`Tile`] records covering the viewport
//! plus a buffer ring. Row 0 is the top row and column 0 the left column
//! regardless of the tile origin corner; `row_sign` maps grid rows onto the
//! service's row numbering.
//!
//! Panning recycles records instead of recreating them: a column (or row)
//! that scrolled off one edge is moved to the opposite edge, repositioned
//! and handed back for a redraw.

use crate::core::bounds::Bounds;
use crate::core::geo::{round_half_up, PixelPoint, Point, Size};
use crate::core::viewport::Viewport;
use crate::layers::tile::tile::{Tile, TileId};
use crate::prelude::VecDeque;

/// Placement of grid cell (0, 0) in tile units relative to the tile origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    /// Tile width in map units at the server resolution
    pub tilelon: f64,
    /// Tile height in map units at the server resolution
    pub tilelat: f64,
    pub startcol: i64,
    pub startrow: i64,
}

/// Work produced by a grid change that the owning layer must carry out
#[derive(Debug, Default)]
pub struct GridUpdate {
    /// Tiles to (re)draw, nearest to the map center first after an init
    pub redraw: Vec<TileId>,
    /// Records dropped from the grid; in-flight loads must be aborted
    pub removed: Vec<Tile>,
    pub created: usize,
    /// Number of row or column shifts performed
    pub shifts: usize,
}

#[derive(Debug, Clone)]
pub struct TileGrid {
    rows: VecDeque<VecDeque<Tile>>,
    layout: Option<GridLayout>,
    tile_size: Size,
    buffer: usize,
    origin: Point,
    row_sign: f64,
    /// Server resolution the grid was built at
    resolution: Option<f64>,
    /// Map resolution the grid was laid out for
    map_resolution: Option<f64>,
    next_id: u64,
    tiles_created: u64,
}

impl TileGrid {
    pub fn new(tile_size: Size, buffer: usize, origin: Point, row_sign: f64) -> Self {
        Self {
            rows: VecDeque::new(),
            layout: None,
            tile_size,
            buffer,
            origin,
            row_sign,
            resolution: None,
            map_resolution: None,
            next_id: 0,
            tiles_created: 0,
        }
    }

    pub fn set_origin(&mut self, origin: Point, row_sign: f64) {
        self.origin = origin;
        self.row_sign = row_sign;
    }

    pub fn origin(&self) -> Point {
        self.origin
    }

    pub fn layout(&self) -> Option<&GridLayout> {
        self.layout.as_ref()
    }

    pub fn resolution(&self) -> Option<f64> {
        self.resolution
    }

    pub fn map_resolution(&self) -> Option<f64> {
        self.map_resolution
    }

    pub fn tile_size(&self) -> Size {
        self.tile_size
    }

    pub fn buffer(&self) -> usize {
        self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn col_count(&self) -> usize {
        self.rows.front().map_or(0, |row| row.len())
    }

    /// Total tile records ever created by this grid
    pub fn tiles_created(&self) -> u64 {
        self.tiles_created
    }

    pub fn tile(&self, row: usize, col: usize) -> Option<&Tile> {
        self.rows.get(row)?.get(col)
    }

    pub fn rows(&self) -> impl Iterator<Item = &VecDeque<Tile>> {
        self.rows.iter()
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.rows.iter().flat_map(|row| row.iter())
    }

    pub fn find(&self, id: TileId) -> Option<&Tile> {
        self.tiles().find(|tile| tile.id() == id)
    }

    pub fn find_mut(&mut self, id: TileId) -> Option<&mut Tile> {
        self.rows
            .iter_mut()
            .flat_map(|row| row.iter_mut())
            .find(|tile| tile.id() == id)
    }

    /// Grid cell currently holding the tile record `id`
    pub fn position_of(&self, id: TileId) -> Option<(usize, usize)> {
        self.rows.iter().enumerate().find_map(|(r, row)| {
            row.iter()
                .position(|tile| tile.id() == id)
                .map(|c| (r, c))
        })
    }

    /// Layout of the grid whose cell (0, 0) covers `bounds`' top-left corner plus the buffer
    pub fn calculate_layout(&self, bounds: &Bounds, resolution: f64) -> GridLayout {
        let tilelon = resolution * self.tile_size.width;
        let tilelat = resolution * self.tile_size.height;

        let offsetlon = bounds.left() - self.origin.x;
        let startcol = (offsetlon / tilelon).floor() as i64 - self.buffer as i64;

        let offsetlat = self.row_sign * (self.origin.y - bounds.top() + tilelat);
        let rows = offsetlat / tilelat;
        let rows = if self.row_sign > 0.0 { rows.floor() } else { rows.ceil() };
        let startrow = rows as i64 - self.buffer as i64 * self.row_sign as i64;

        GridLayout {
            tilelon,
            tilelat,
            startcol,
            startrow,
        }
    }

    fn bounds_in(&self, layout: &GridLayout, row: usize, col: usize) -> Bounds {
        let (ox, oy) = (self.origin.x, self.origin.y);
        let rs = self.row_sign;
        let col = (layout.startcol + col as i64) as f64;
        let row = row as f64;
        let startrow = layout.startrow as f64;
        Bounds::new(
            ox + col * layout.tilelon,
            oy - (startrow + row * rs) * layout.tilelat * rs,
            ox + (col + 1.0) * layout.tilelon,
            oy - (startrow + (row - 1.0) * rs) * layout.tilelat * rs,
        )
    }

    /// Map bounds of grid cell (`row`, `col`) under the current layout
    pub fn bounds_for_index(&self, row: usize, col: usize) -> Option<Bounds> {
        self.layout
            .as_ref()
            .map(|layout| self.bounds_in(layout, row, col))
    }

    /// Area covered by the whole grid
    pub fn tiles_bounds(&self) -> Option<Bounds> {
        let first = self.rows.back()?.front()?.bounds();
        let width = self.col_count() as f64 * first.width();
        let height = self.row_count() as f64 * first.height();
        Some(Bounds::new(
            first.left(),
            first.bottom(),
            first.left() + width,
            first.bottom() + height,
        ))
    }

    fn new_tile(&mut self, bounds: Bounds, position: PixelPoint, size: Size) -> Tile {
        self.next_id += 1;
        self.tiles_created += 1;
        Tile::new(TileId(self.next_id), bounds, position, size)
    }

    /// Lays the grid out afresh over `bounds`, reusing existing records where possible
    ///
    /// `resolution` is the server resolution tiles are requested at; the
    /// viewport supplies the map resolution they are displayed at.
    pub fn init(&mut self, bounds: &Bounds, viewport: &Viewport, resolution: f64) -> Option<GridUpdate> {
        let map_resolution = viewport.resolution()?;
        let center = viewport.center()?;
        let view = viewport.size();

        let ratio = map_resolution / resolution;
        let tile_px = Size::new(self.tile_size.width / ratio, self.tile_size.height / ratio);
        let step = Size::new(round_half_up(tile_px.width), round_half_up(tile_px.height));
        let min_rows = (view.height / tile_px.height).ceil() as usize + 2 * self.buffer + 1;
        let min_cols = (view.width / tile_px.width).ceil() as usize + 2 * self.buffer + 1;

        let layout = self.calculate_layout(bounds, resolution);
        self.layout = Some(layout);

        let origin_px = viewport.origin_px();
        let top_left = self.bounds_in(&layout, 0, 0).top_left();
        let start = viewport.lonlat_to_viewport_px(&top_left)?.round();
        let start = PixelPoint::new(start.x - origin_px.x, start.y - origin_px.y);

        let mut update = GridUpdate::default();
        let mut ordered: Vec<(TileId, f64)> = Vec::new();
        let buffer = self.buffer as f64;
        let mut rowidx = 0;
        let mut colidx;
        loop {
            if self.rows.len() <= rowidx {
                self.rows.push_back(VecDeque::new());
            }
            colidx = 0;
            let mut tile_bounds;
            loop {
                tile_bounds = self.bounds_in(&layout, rowidx, colidx);
                let px = start.add(colidx as f64 * step.width, rowidx as f64 * step.height);
                let id = if colidx < self.rows[rowidx].len() {
                    let tile = &mut self.rows[rowidx][colidx];
                    tile.move_to(tile_bounds.clone(), px, step);
                    tile.id()
                } else {
                    let tile = self.new_tile(tile_bounds.clone(), px, step);
                    let id = tile.id();
                    self.rows[rowidx].push_back(tile);
                    update.created += 1;
                    id
                };
                let c = tile_bounds.center();
                ordered.push((id, (c.x - center.x).powi(2) + (c.y - center.y).powi(2)));

                colidx += 1;
                if !(tile_bounds.right() <= bounds.right() + layout.tilelon * buffer || colidx < min_cols) {
                    break;
                }
            }
            rowidx += 1;
            if !(tile_bounds.bottom() >= bounds.bottom() - layout.tilelat * buffer || rowidx < min_rows) {
                break;
            }
        }

        update.removed = self.remove_excess(rowidx, colidx);
        self.resolution = Some(resolution);
        self.map_resolution = Some(map_resolution);

        ordered.sort_by(|a, b| a.1.total_cmp(&b.1));
        update.redraw = ordered.into_iter().map(|(id, _)| id).collect();
        Some(update)
    }

    fn remove_excess(&mut self, rows: usize, cols: usize) -> Vec<Tile> {
        let mut removed = Vec::new();
        while self.rows.len() > rows {
            if let Some(row) = self.rows.pop_back() {
                removed.extend(row);
            }
        }
        for row in self.rows.iter_mut() {
            while row.len() > cols {
                if let Some(tile) = row.pop_back() {
                    removed.push(tile);
                }
            }
        }
        removed
    }

    /// Recycles edge rows and columns until the top-left tile sits inside the buffer ring
    pub fn move_gridded(&mut self, viewport: &Viewport, resolution: f64) -> GridUpdate {
        let mut update = GridUpdate::default();
        let Some(map_resolution) = viewport.resolution() else {
            return update;
        };
        if self.layout.is_none() || self.col_count() == 0 {
            return update;
        }

        let buffer = self.buffer as f64 + 1.0;
        let ratio = resolution / map_resolution;
        let step = Size::new(
            round_half_up(self.tile_size.width * ratio),
            round_half_up(self.tile_size.height * ratio),
        );
        if !step.is_positive() {
            return update;
        }
        let origin_px = viewport.origin_px();

        loop {
            let Some(top_left) = self.tile(0, 0).map(|tile| tile.position()) else {
                break;
            };
            let x = top_left.x + origin_px.x;
            let y = top_left.y + origin_px.y;
            if x > -step.width * (buffer - 1.0) {
                self.shift_column(true, step.width, &mut update);
            } else if x < -step.width * buffer {
                self.shift_column(false, step.width, &mut update);
            } else if y > -step.height * (buffer - 1.0) {
                self.shift_row(true, step.height, &mut update);
            } else if y < -step.height * buffer {
                self.shift_row(false, step.height, &mut update);
            } else {
                break;
            }
        }
        update
    }

    fn shift_column(&mut self, prepend: bool, width: f64, update: &mut GridUpdate) {
        let Some(mut layout) = self.layout else {
            return;
        };
        let sign = if prepend { -1 } else { 1 };
        layout.startcol += sign;
        self.layout = Some(layout);

        let col_index = if prepend { 0 } else { self.col_count() - 1 };
        for i in 0..self.rows.len() {
            let bounds = self.bounds_in(&layout, i, col_index);
            let row = &mut self.rows[i];
            let Some(model) = row.get(col_index).map(|tile| tile.position()) else {
                continue;
            };
            let tile = if prepend { row.pop_back() } else { row.pop_front() };
            let Some(mut tile) = tile else {
                continue;
            };
            let size = tile.size();
            tile.move_to(bounds, model.add(width * sign as f64, 0.0), size);
            update.redraw.push(tile.id());
            if prepend {
                row.push_front(tile);
            } else {
                row.push_back(tile);
            }
        }
        update.shifts += 1;
    }

    fn shift_row(&mut self, prepend: bool, height: f64, update: &mut GridUpdate) {
        let Some(mut layout) = self.layout else {
            return;
        };
        let sign = if prepend { -1 } else { 1 };
        layout.startrow += sign * self.row_sign as i64;
        self.layout = Some(layout);

        let row_index = if prepend { 0 } else { self.rows.len() - 1 };
        let model: Vec<PixelPoint> = self.rows[row_index]
            .iter()
            .map(|tile| tile.position())
            .collect();
        let row = if prepend {
            self.rows.pop_back()
        } else {
            self.rows.pop_front()
        };
        let Some(mut row) = row else {
            return;
        };
        for (i, tile) in row.iter_mut().enumerate() {
            let bounds = self.bounds_in(&layout, row_index, i);
            let size = tile.size();
            tile.move_to(bounds, model[i].add(0.0, height * sign as f64), size);
            update.redraw.push(tile.id());
        }
        if prepend {
            self.rows.push_front(row);
        } else {
            self.rows.push_back(row);
        }
        update.shifts += 1;
    }

    /// Drops every record, returning them so in-flight loads can be aborted
    pub fn clear(&mut self) -> Vec<Tile> {
        self.layout = None;
        self.resolution = None;
        self.map_resolution = None;
        self.rows.drain(..).flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resolution::ResolutionLadder;
    use crate::core::viewport::MoveOptions;

    const EXTENT: f64 = 10_000.0;

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

    fn top_left_grid() -> TileGrid {
        TileGrid::new(Size::square(256.0), 1, Point::new(-EXTENT, EXTENT), 1.0)
    }

    #[test]
    fn test_layout_top_left_origin() {
        let grid = top_left_grid();
        let layout = grid.calculate_layout(&Bounds::new(-256.0, -256.0, 256.0, 256.0), 1.0);
        assert_eq!(layout.startcol, 37);
        assert_eq!(layout.startrow, 38);
        assert_eq!(layout.tilelon, 256.0);
    }

    #[test]
    fn test_layout_bottom_left_origin() {
        let grid = TileGrid::new(Size::square(256.0), 0, Point::new(-EXTENT, -EXTENT), -1.0);
        let bounds = Bounds::new(-256.0, -256.0, 256.0, 256.0);
        let layout = grid.calculate_layout(&bounds, 1.0);
        let grid = TileGrid {
            layout: Some(layout),
            ..grid
        };
        let first = grid.bounds_for_index(0, 0).unwrap();
        assert!(first.contains(-256.0, 256.0, true));
        assert_eq!(first.height(), 256.0);
        let below = grid.bounds_for_index(1, 0).unwrap();
        assert_eq!(below.top(), first.bottom());
    }

    #[test]
    fn test_init_covers_viewport_with_buffer() {
        let viewport = viewport();
        let bounds = viewport.extent().unwrap();
        let mut grid = top_left_grid();
        let update = grid.init(&bounds, &viewport, 1.0).unwrap();

        assert_eq!(grid.row_count(), 5);
        assert_eq!(grid.col_count(), 5);
        assert_eq!(update.created, 25);
        assert_eq!(update.redraw.len(), 25);
        assert!(update.removed.is_empty());

        let first = grid.tile(0, 0).unwrap();
        assert_eq!(first.position(), PixelPoint::new(-272.0, -272.0));
        assert_eq!(first.bounds(), &Bounds::new(-528.0, 272.0, -272.0, 528.0));
        assert!(grid.tiles_bounds().unwrap().contains_bounds(&bounds, false, true));
    }

    #[test]
    fn test_init_draws_center_tiles_first() {
        let viewport = viewport();
        let mut grid = top_left_grid();
        let update = grid.init(&viewport.extent().unwrap(), &viewport, 1.0).unwrap();
        let first = grid.find(update.redraw[0]).unwrap();
        let last = grid.find(*update.redraw.last().unwrap()).unwrap();
        let center = Point::new(0.0, 0.0);
        assert!(first.bounds().center().distance_to(&center) <= last.bounds().center().distance_to(&center));
    }

    #[test]
    fn test_pan_shifts_one_column() {
        let mut viewport = viewport();
        let mut grid = top_left_grid();
        grid.init(&viewport.extent().unwrap(), &viewport, 1.0);
        let ids: Vec<TileId> = grid.tiles().map(|t| t.id()).collect();
        let leftmost: Vec<TileId> = grid.rows().map(|row| row[0].id()).collect();

        viewport.move_by_px(300.0, 0.0).unwrap();
        let update = grid.move_gridded(&viewport, 1.0);

        assert_eq!(update.shifts, 1);
        assert_eq!(update.redraw, leftmost);
        assert_eq!(grid.tiles_created(), 25);
        let mut after: Vec<TileId> = grid.tiles().map(|t| t.id()).collect();
        let mut before = ids;
        after.sort();
        before.sort();
        assert_eq!(after, before);

        assert_eq!(grid.layout().unwrap().startcol, 38);
        assert_eq!(grid.tile(0, 0).unwrap().position().x, -16.0);
        let moved = grid.tile(0, 4).unwrap();
        assert_eq!(moved.id(), leftmost[0]);
        assert_eq!(moved.position().x, 1008.0);
    }

    #[test]
    fn test_shift_matches_fresh_init() {
        let mut viewport = viewport();
        let mut grid = top_left_grid();
        grid.init(&viewport.extent().unwrap(), &viewport, 1.0);
        viewport.move_by_px(300.0, 0.0).unwrap();
        grid.move_gridded(&viewport, 1.0);

        let mut fresh = top_left_grid();
        fresh.init(&viewport.extent().unwrap(), &viewport, 1.0);

        assert_eq!(grid.layout(), fresh.layout());
        for r in 0..grid.row_count() {
            for c in 0..grid.col_count() {
                let a = grid.tile(r, c).unwrap();
                let b = fresh.tile(r, c).unwrap();
                assert_eq!(a.bounds(), b.bounds(), "bounds at ({}, {})", r, c);
                assert_eq!(a.position(), b.position(), "position at ({}, {})", r, c);
            }
        }
    }

    #[test]
    fn test_bottom_left_shifts_match_fresh_init() {
        let bottom_left = || TileGrid::new(Size::square(256.0), 1, Point::new(-EXTENT, -EXTENT), -1.0);
        let mut viewport = viewport();
        let mut grid = bottom_left();
        grid.init(&viewport.extent().unwrap(), &viewport, 1.0);

        let pans = [(0.0, 300.0), (0.0, -300.0), (300.0, 300.0), (-300.0, 280.0), (700.0, -650.0), (1300.0, 0.0)];
        for (dx, dy) in pans {
            viewport.move_by_px(dx, dy).unwrap();
            grid.move_gridded(&viewport, 1.0);

            let mut fresh = bottom_left();
            fresh.init(&viewport.extent().unwrap(), &viewport, 1.0);

            assert_eq!(grid.layout(), fresh.layout(), "layout after ({}, {})", dx, dy);
            assert_eq!(grid.row_count(), fresh.row_count());
            assert_eq!(grid.col_count(), fresh.col_count());
            for r in 0..grid.row_count() {
                for c in 0..grid.col_count() {
                    let a = grid.tile(r, c).unwrap();
                    let b = fresh.tile(r, c).unwrap();
                    assert_eq!(a.bounds(), b.bounds(), "bounds at ({}, {}) after ({}, {})", r, c, dx, dy);
                    assert_eq!(a.position(), b.position(), "position at ({}, {}) after ({}, {})", r, c, dx, dy);
                }
            }
        }
        assert_eq!(grid.tiles_created(), 25);
    }

    #[test]
    fn test_vertical_pan_shifts_rows() {
        let mut viewport = viewport();
        let mut grid = top_left_grid();
        grid.init(&viewport.extent().unwrap(), &viewport, 1.0);
        let top_row: Vec<TileId> = grid.rows().next().unwrap().iter().map(|t| t.id()).collect();

        viewport.move_by_px(0.0, 300.0).unwrap();
        let update = grid.move_gridded(&viewport, 1.0);

        assert_eq!(update.shifts, 1);
        let bottom: Vec<TileId> = grid.rows().last().unwrap().iter().map(|t| t.id()).collect();
        assert_eq!(bottom, top_row);
        assert_eq!(grid.layout().unwrap().startrow, 39);
    }

    #[test]
    fn test_reinit_reuses_records_and_drops_excess() {
        let viewport = viewport();
        let mut grid = top_left_grid();
        grid.init(&viewport.extent().unwrap(), &viewport, 1.0);

        let mut small = viewport.clone();
        small.set_size(Size::square(256.0));
        let update = grid.init(&small.extent().unwrap(), &small, 1.0).unwrap();
        assert_eq!(update.created, 0);
        assert_eq!(grid.row_count() * grid.col_count(), 25 - update.removed.len());
        assert_eq!(grid.tiles_created(), 25);
    }

    #[test]
    fn test_clear_returns_records() {
        let viewport = viewport();
        let mut grid = top_left_grid();
        grid.init(&viewport.extent().unwrap(), &viewport, 1.0);
        assert_eq!(grid.clear().len(), 25);
        assert!(grid.is_empty());
        assert!(grid.layout().is_none());
    }
}
