use crate::core::bounds::Bounds;
use serde::{Deserialize, Serialize};

/// A position in map units (lon/lat for geographic projections, x/y otherwise)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Creates a point from longitude and latitude
    pub fn lon_lat(lon: f64, lat: f64) -> Self {
        Self::new(lon, lat)
    }

    pub fn lon(&self) -> f64 {
        self.x
    }

    pub fn lat(&self) -> f64 {
        self.y
    }

    /// Returns a new point offset by the given deltas
    pub fn add(&self, dx: f64, dy: f64) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }

    pub fn subtract(&self, other: &Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Both coordinates are finite numbers
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Shifts the longitude by whole world widths until it lies inside `max_extent`
    pub fn wrap_date_line(&self, max_extent: &Bounds) -> Point {
        let width = max_extent.width();
        let mut wrapped = *self;
        if width <= 0.0 || !wrapped.x.is_finite() {
            return wrapped;
        }
        if wrapped.x < max_extent.left() {
            wrapped.x += ((max_extent.left() - wrapped.x) / width).ceil() * width;
        }
        if wrapped.x > max_extent.right() {
            wrapped.x -= ((wrapped.x - max_extent.right()) / width).ceil() * width;
        }
        wrapped
    }
}

/// Points where every coordinate is NaN compare equal; map edges use that as a sentinel
impl PartialEq for Point {
    fn eq(&self, other: &Self) -> bool {
        (self.x == other.x && self.y == other.y)
            || (self.x.is_nan() && self.y.is_nan() && other.x.is_nan() && other.y.is_nan())
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// A position in screen pixels, relative to the viewport or to the layer container
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(&self, dx: f64, dy: f64) -> PixelPoint {
        PixelPoint::new(self.x + dx, self.y + dy)
    }

    pub fn offset(&self, other: &PixelPoint) -> PixelPoint {
        PixelPoint::new(self.x + other.x, self.y + other.y)
    }

    pub fn distance_to(&self, other: &PixelPoint) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn round(&self) -> PixelPoint {
        PixelPoint::new(round_half_up(self.x), round_half_up(self.y))
    }
}

impl PartialEq for PixelPoint {
    fn eq(&self, other: &Self) -> bool {
        (self.x == other.x && self.y == other.y)
            || (self.x.is_nan() && self.y.is_nan() && other.x.is_nan() && other.y.is_nan())
    }
}

impl Default for PixelPoint {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Width and height, in pixels or map units depending on context
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn square(side: f64) -> Self {
        Self::new(side, side)
    }

    /// Both dimensions are finite and strictly positive
    pub fn is_positive(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    pub fn scale(&self, factor: f64) -> Size {
        Size::new(self.width * factor, self.height * factor)
    }
}

impl Default for Size {
    fn default() -> Self {
        Self::square(crate::core::constants::TILE_SIZE as f64)
    }
}

/// Rounds half away from negative infinity, matching pixel snapping in browsers
pub fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}
