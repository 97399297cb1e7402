//! Viewport state machine
//!
//! Owns center, zoom, resolution and the resolution ladder of the active
//! base layer, and converts between map units and two pixel spaces:
//!
//! - viewport pixels, origin at the top-left corner of the visible area
//! - layer pixels, viewport pixels minus the layer container origin; tile
//!   positions are stored in this space so panning never touches them
//!
//! Every query that needs a resolution or center returns `None` until the
//! first successful [`Viewport::move_to`], so a map without a base layer stays
//! renderable.

use crate::core::bounds::Bounds;
use crate::core::geo::{round_half_up, PixelPoint, Point, Size};
use crate::core::resolution::ResolutionLadder;

/// Flags for [`Viewport::move_to`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MoveOptions {
    /// The move is one step of a drag; layers may defer expensive work
    pub dragging: bool,
    /// Treat the move as a zoom change even when the zoom is unchanged
    pub force_zoom_change: bool,
}

/// What a successful [`Viewport::move_to`] changed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveTransition {
    pub zoom_changed: bool,
    pub center_changed: bool,
    /// The move happened during a drag; `moveend` and `movestart` are withheld
    pub dragging: bool,
    /// The caller flagged this move as a drag step
    pub layer_dragging: bool,
}

impl MoveTransition {
    pub fn fires_movestart(&self) -> bool {
        !self.dragging
    }
}

/// Result of a pixel pan that actually moved the view
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelMove {
    pub dx: f64,
    pub dy: f64,
    /// First move of a drag
    pub movestart: bool,
}

#[derive(Debug, Clone)]
pub struct Viewport {
    size: Size,
    center: Option<Point>,
    zoom: f64,
    resolution: Option<f64>,
    fractional_zoom: bool,
    ladder: Option<ResolutionLadder>,
    max_extent: Bounds,
    restricted_extent: Option<Bounds>,
    wrap_date_line: bool,
    min_zoom: Option<f64>,
    max_zoom: Option<f64>,
    origin: Option<Point>,
    origin_px: PixelPoint,
    min_px: Option<PixelPoint>,
    max_px: Option<PixelPoint>,
    dragging: bool,
}

impl Viewport {
    pub fn new(size: Size, max_extent: Bounds) -> Self {
        Self {
            size,
            center: None,
            zoom: 0.0,
            resolution: None,
            fractional_zoom: false,
            ladder: None,
            max_extent,
            restricted_extent: None,
            wrap_date_line: false,
            min_zoom: None,
            max_zoom: None,
            origin: None,
            origin_px: PixelPoint::default(),
            min_px: None,
            max_px: None,
            dragging: false,
        }
    }

    pub fn with_ladder(mut self, ladder: ResolutionLadder) -> Self {
        self.ladder = Some(ladder);
        self
    }

    pub fn with_restricted_extent(mut self, extent: Option<Bounds>) -> Self {
        self.restricted_extent = extent;
        self
    }

    pub fn with_fractional_zoom(mut self, fractional: bool) -> Self {
        self.fractional_zoom = fractional;
        self
    }

    pub fn with_zoom_limits(mut self, min_zoom: Option<f64>, max_zoom: Option<f64>) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// Sets a new size, returning whether it changed
    pub fn set_size(&mut self, size: Size) -> bool {
        if !size.is_positive() || size == self.size {
            return false;
        }
        self.size = size;
        true
    }

    pub fn center(&self) -> Option<Point> {
        self.center
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn resolution(&self) -> Option<f64> {
        self.resolution
    }

    pub fn is_fractional_zoom(&self) -> bool {
        self.fractional_zoom
    }

    pub fn ladder(&self) -> Option<&ResolutionLadder> {
        self.ladder.as_ref()
    }

    /// Installs the ladder of a new base layer, or removes it
    pub fn set_ladder(&mut self, ladder: Option<ResolutionLadder>) {
        self.ladder = ladder;
    }

    pub fn max_extent(&self) -> &Bounds {
        &self.max_extent
    }

    pub fn restricted_extent(&self) -> Option<&Bounds> {
        self.restricted_extent.as_ref()
    }

    pub fn set_restricted_extent(&mut self, extent: Option<Bounds>) {
        self.restricted_extent = extent;
    }

    /// Extent the pixel bounds are measured against
    pub fn pixel_extent(&self) -> &Bounds {
        self.restricted_extent.as_ref().unwrap_or(&self.max_extent)
    }

    pub fn wraps_date_line(&self) -> bool {
        self.wrap_date_line
    }

    pub fn set_wrap_date_line(&mut self, wrap: bool) {
        self.wrap_date_line = wrap;
    }

    /// World bounds used for antimeridian-aware tests, when wrapping
    pub fn world_bounds(&self) -> Option<&Bounds> {
        self.wrap_date_line.then_some(&self.max_extent)
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn set_dragging(&mut self, dragging: bool) {
        self.dragging = dragging;
    }

    pub fn origin_px(&self) -> PixelPoint {
        self.origin_px
    }

    pub fn min_px(&self) -> Option<PixelPoint> {
        self.min_px
    }

    pub fn max_px(&self) -> Option<PixelPoint> {
        self.max_px
    }

    pub fn num_zoom_levels(&self) -> usize {
        self.ladder.as_ref().map_or(0, ResolutionLadder::len)
    }

    pub fn resolution_for_zoom(&self, zoom: f64) -> Option<f64> {
        self.ladder
            .as_ref()?
            .resolution_for_zoom(zoom, self.fractional_zoom)
    }

    pub fn zoom_for_resolution(&self, resolution: f64, closest: bool) -> Option<f64> {
        self.ladder
            .as_ref()?
            .zoom_for_resolution(resolution, closest, self.fractional_zoom)
    }

    /// Zoom at which `bounds` fits the viewport
    pub fn zoom_for_extent(&self, bounds: &Bounds, closest: bool) -> Option<f64> {
        if !self.size.is_positive() {
            return None;
        }
        let ideal = (bounds.width() / self.size.width).max(bounds.height() / self.size.height);
        self.zoom_for_resolution(ideal, closest)
    }

    pub fn is_valid_zoom(&self, zoom: f64) -> bool {
        zoom.is_finite()
            && zoom >= 0.0
            && zoom <= self.num_zoom_levels() as f64 - 1.0
            && self.min_zoom.map_or(true, |min| zoom >= min)
            && self.max_zoom.map_or(true, |max| zoom <= max)
    }

    /// Inside the max extent, wrapping first when the viewport wraps
    pub fn is_valid_lonlat(&self, lonlat: &Point) -> bool {
        lonlat.is_finite()
            && self
                .max_extent
                .contains_point_wrapped(lonlat, self.world_bounds())
    }

    /// Extent of a viewport-sized area around `center` at `resolution`
    pub fn calculate_bounds(&self, center: Point, resolution: f64) -> Bounds {
        Bounds::from_center(
            center,
            self.size.width * resolution,
            self.size.height * resolution,
        )
    }

    /// Currently visible extent
    pub fn extent(&self) -> Option<Bounds> {
        Some(self.calculate_bounds(self.center?, self.resolution?))
    }

    fn clamp_zoom(&self, zoom: f64) -> f64 {
        let mut zoom = zoom;
        if let Some(min) = self.min_zoom {
            zoom = zoom.max(min);
        }
        if let Some(max) = self.max_zoom {
            zoom = zoom.min(max);
        }
        zoom
    }

    /// Coarsest zoom a wrapping viewport may use: one world no wider than the viewport
    fn adjust_zoom(&self, zoom: f64) -> f64 {
        if !self.wrap_date_line || !self.size.is_positive() {
            return zoom;
        }
        let Some(ladder) = self.ladder.as_ref() else {
            return zoom;
        };
        let max_resolution = self.max_extent.width() / self.size.width;
        match self.resolution_for_zoom(zoom) {
            Some(res) if res > max_resolution => {
                if self.fractional_zoom {
                    ladder
                        .zoom_for_resolution(max_resolution, false, true)
                        .unwrap_or(zoom)
                } else {
                    let start = zoom.max(0.0) as usize;
                    ladder.as_slice()[start.min(ladder.len())..]
                        .iter()
                        .position(|r| *r <= max_resolution)
                        .map(|i| (start + i) as f64)
                        .unwrap_or(zoom)
                }
            }
            _ => zoom,
        }
    }

    /// Moves the view to `lonlat` and `zoom`, either of which may be omitted
    ///
    /// Returns `None` when the viewport has no ladder yet or when nothing
    /// changed and no drag is in progress.
    pub fn move_to(
        &mut self,
        lonlat: Option<Point>,
        zoom: Option<f64>,
        options: MoveOptions,
    ) -> Option<MoveTransition> {
        self.ladder.as_ref()?;
        if !self.size.is_positive() {
            return None;
        }

        let mut lonlat = lonlat;
        let mut zoom = zoom.filter(|z| z.is_finite()).map(|z| {
            let z = if self.fractional_zoom { z } else { z.round() };
            self.clamp_zoom(z)
        });
        if let Some(requested) = zoom {
            let adjusted = self.adjust_zoom(requested);
            if adjusted != requested {
                // keep the old center so the zoom adjustment does not also pan
                lonlat = self.center;
                zoom = Some(adjusted);
            }
        }

        let dragging = options.dragging || self.dragging;

        if self.center.is_none() && !lonlat.map_or(false, |p| self.is_valid_lonlat(&p)) {
            lonlat = Some(self.max_extent.center());
        }

        if let Some(restricted) = self.restricted_extent.clone() {
            let candidate = lonlat.or(self.center);
            let res = self.resolution_for_zoom(zoom.unwrap_or(self.zoom));
            if let (Some(candidate), Some(res)) = (candidate, res) {
                lonlat = Some(self.clamp_to_restricted(candidate, res, &restricted));
            }
        }

        let target_zoom = zoom.unwrap_or(self.zoom);
        let zoom_valid = self.is_valid_zoom(target_zoom);
        let zoom_changed = zoom_valid
            && (options.force_zoom_change
                || self.resolution.is_none()
                || target_zoom != self.zoom);
        let new_center = lonlat.filter(|p| self.is_valid_lonlat(p));
        let center_changed = new_center.map_or(false, |p| Some(p) != self.center);

        if !(zoom_changed || center_changed || dragging) {
            return None;
        }

        let res = if zoom_changed {
            self.resolution_for_zoom(target_zoom)
        } else {
            self.resolution
        }?;

        if center_changed {
            if let Some(new_center) = new_center {
                if !zoom_changed {
                    if let Some(old_center) = self.center {
                        self.center_layer_container(old_center, new_center, res);
                    }
                }
                self.center = Some(new_center);
            }
        }

        let center = self.center?;
        if zoom_changed || self.origin.is_none() {
            self.origin = Some(center);
            self.origin_px = PixelPoint::default();
            self.compute_pixel_bounds(center, res);
        }

        if zoom_changed {
            self.zoom = target_zoom;
            self.resolution = Some(res);
        }

        Some(MoveTransition {
            zoom_changed,
            center_changed,
            dragging,
            layer_dragging: options.dragging,
        })
    }

    /// Nudges `center` per axis so the extent at `res` stays inside `restricted`
    fn clamp_to_restricted(&self, center: Point, res: f64, restricted: &Bounds) -> Point {
        let extent = self.calculate_bounds(center, res);
        if restricted.contains_bounds(&extent, false, true) {
            return center;
        }
        let restricted_center = restricted.center();
        let mut clamped = center;
        if extent.width() > restricted.width() {
            clamped.x = restricted_center.x;
        } else if extent.left() < restricted.left() {
            clamped.x += restricted.left() - extent.left();
        } else if extent.right() > restricted.right() {
            clamped.x += restricted.right() - extent.right();
        }
        if extent.height() > restricted.height() {
            clamped.y = restricted_center.y;
        } else if extent.bottom() < restricted.bottom() {
            clamped.y += restricted.bottom() - extent.bottom();
        } else if extent.top() > restricted.top() {
            clamped.y += restricted.top() - extent.top();
        }
        clamped
    }

    /// Slides the layer container for a pan without a zoom change
    ///
    /// The container origin snaps to whole pixels; the pixel bounds follow
    /// the exact center so conversions stay inverse to each other.
    fn center_layer_container(&mut self, old_center: Point, new_center: Point, res: f64) {
        if let Some(origin) = self.origin {
            self.origin_px =
                PixelPoint::new((origin.x - new_center.x) / res, (new_center.y - origin.y) / res)
                    .round();
        }
        let dx = (new_center.x - old_center.x) / res;
        let dy = (old_center.y - new_center.y) / res;
        self.shift_pixel_bounds(dx, dy);
    }

    fn compute_pixel_bounds(&mut self, center: Point, res: f64) {
        let extent = self.pixel_extent();
        let min = PixelPoint::new(
            self.size.width / 2.0 - (center.x - extent.left()) / res,
            self.size.height / 2.0 - (extent.top() - center.y) / res,
        );
        let max = min.add(extent.width() / res, extent.height() / res);
        self.min_px = Some(min);
        self.max_px = Some(max);
    }

    fn shift_pixel_bounds(&mut self, dx: f64, dy: f64) {
        if let Some(min) = self.min_px.as_mut() {
            min.x -= dx;
            min.y -= dy;
        }
        if let Some(max) = self.max_px.as_mut() {
            max.x -= dx;
            max.y -= dy;
        }
    }

    /// Pans by whole pixels, clamping so the center stays inside the pixel bounds
    ///
    /// The x axis is not clamped while wrapping the date line without a
    /// restricted extent. A pan that clamps to zero on both axes is a no-op.
    pub fn move_by_px(&mut self, dx: f64, dy: f64) -> Option<PixelMove> {
        let (min, max) = (self.min_px?, self.max_px?);
        self.resolution?;
        let hw = self.size.width / 2.0;
        let hh = self.size.height / 2.0;
        let (x_restriction, y_restriction, wrap) = if self.restricted_extent.is_some() {
            (hw, hh, false)
        } else {
            (0.0, 0.0, self.wrap_date_line)
        };

        let dx = if wrap {
            round_half_up(dx)
        } else {
            clamp_delta(hw, dx, min.x + x_restriction, max.x - x_restriction)
        };
        let dy = clamp_delta(hh, dy, min.y + y_restriction, max.y - y_restriction);
        if dx == 0.0 && dy == 0.0 {
            return None;
        }

        let movestart = !self.dragging;
        self.dragging = true;
        self.origin_px.x -= dx;
        self.origin_px.y -= dy;
        self.shift_pixel_bounds(dx, dy);
        self.center = self.viewport_px_to_lonlat(PixelPoint::new(hw, hh));
        Some(PixelMove { dx, dy, movestart })
    }

    /// Viewport pixel of `lonlat` at the current resolution
    pub fn lonlat_to_viewport_px(&self, lonlat: &Point) -> Option<PixelPoint> {
        self.lonlat_to_viewport_px_at(lonlat, self.resolution?)
    }

    /// Viewport pixel of `lonlat` if the current center were shown at `resolution`
    pub fn lonlat_to_viewport_px_at(&self, lonlat: &Point, resolution: f64) -> Option<PixelPoint> {
        let extent = self.calculate_bounds(self.center?, resolution);
        Some(PixelPoint::new(
            (lonlat.x - extent.left()) / resolution,
            (extent.top() - lonlat.y) / resolution,
        ))
    }

    pub fn viewport_px_to_lonlat(&self, px: PixelPoint) -> Option<Point> {
        let min = self.min_px?;
        let res = self.resolution?;
        let extent = self.pixel_extent();
        let lonlat = Point::new(
            (px.x - min.x) * res + extent.left(),
            (min.y - px.y) * res + extent.top(),
        );
        Some(if self.wrap_date_line {
            lonlat.wrap_date_line(&self.max_extent)
        } else {
            lonlat
        })
    }

    pub fn viewport_px_to_layer_px(&self, px: PixelPoint) -> PixelPoint {
        PixelPoint::new(px.x - self.origin_px.x, px.y - self.origin_px.y)
    }

    pub fn layer_px_to_viewport_px(&self, px: PixelPoint) -> PixelPoint {
        px.offset(&self.origin_px)
    }

    pub fn lonlat_to_layer_px(&self, lonlat: &Point) -> Option<PixelPoint> {
        self.lonlat_to_viewport_px(lonlat)
            .map(|px| self.viewport_px_to_layer_px(px))
    }

    pub fn layer_px_to_lonlat(&self, px: PixelPoint) -> Option<Point> {
        self.viewport_px_to_lonlat(self.layer_px_to_viewport_px(px))
    }
}

/// Clamps `half + delta` into `[lo, hi]` and returns the pixel delta actually applied
///
/// A clamped delta never moves against the request and is truncated so the
/// result stays inside the range.
fn clamp_delta(half: f64, delta: f64, lo: f64, hi: f64) -> f64 {
    if delta == 0.0 || lo > hi {
        return 0.0;
    }
    let target = half + delta;
    if target >= lo && target <= hi {
        return round_half_up(delta);
    }
    let clamped = target.max(lo).min(hi) - half;
    if clamped.signum() != delta.signum() {
        return 0.0;
    }
    clamped.trunc()
}
