use crate::core::geo::Point;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in map units: left, bottom, right, top
///
/// The center is computed lazily and cached; every mutating method drops the
/// cached value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Bounds {
    left: f64,
    bottom: f64,
    right: f64,
    top: f64,
    centre: OnceCell<Point>,
}

/// Options for [`Bounds::intersects_bounds`]
#[derive(Debug, Clone, Copy)]
pub struct IntersectOptions<'a> {
    /// Count shared edges as an intersection
    pub inclusive: bool,
    /// World extent used to wrap operands across the antimeridian
    pub world_bounds: Option<&'a Bounds>,
}

impl Default for IntersectOptions<'_> {
    fn default() -> Self {
        Self {
            inclusive: true,
            world_bounds: None,
        }
    }
}

/// Tolerances for [`Bounds::wrap_date_line`], in map units
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WrapTolerance {
    pub left: f64,
    pub right: f64,
}

impl WrapTolerance {
    pub fn uniform(tolerance: f64) -> Self {
        Self {
            left: tolerance,
            right: tolerance,
        }
    }
}

impl Bounds {
    pub fn new(left: f64, bottom: f64, right: f64, top: f64) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
            centre: OnceCell::new(),
        }
    }

    /// Builds bounds from any two corners, putting the smaller values left/bottom
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self::new(a.x.min(b.x), a.y.min(b.y), a.x.max(b.x), a.y.max(b.y))
    }

    /// Bounds of `size` map units centred on `center`
    pub fn from_center(center: Point, width: f64, height: f64) -> Self {
        Self::new(
            center.x - width / 2.0,
            center.y - height / 2.0,
            center.x + width / 2.0,
            center.y + height / 2.0,
        )
    }

    pub fn left(&self) -> f64 {
        self.left
    }

    pub fn bottom(&self) -> f64 {
        self.bottom
    }

    pub fn right(&self) -> f64 {
        self.right
    }

    pub fn top(&self) -> f64 {
        self.top
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    pub fn top_left(&self) -> Point {
        Point::new(self.left, self.top)
    }

    pub fn bottom_left(&self) -> Point {
        Point::new(self.left, self.bottom)
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.left, self.bottom, self.right, self.top]
    }

    /// Center point, cached until the next mutation
    pub fn center(&self) -> Point {
        *self.centre.get_or_init(|| {
            Point::new(
                (self.left + self.right) / 2.0,
                (self.bottom + self.top) / 2.0,
            )
        })
    }

    /// True when left <= right and bottom <= top
    pub fn is_normalized(&self) -> bool {
        self.left <= self.right && self.bottom <= self.top
    }

    /// Returns a copy with swapped edges put back in order
    pub fn normalized(&self) -> Bounds {
        Bounds::new(
            self.left.min(self.right),
            self.bottom.min(self.top),
            self.left.max(self.right),
            self.bottom.max(self.top),
        )
    }

    /// Returns a new bounds translated by (x, y)
    pub fn add(&self, x: f64, y: f64) -> Bounds {
        Bounds::new(self.left + x, self.bottom + y, self.right + x, self.top + y)
    }

    /// Grows the bounds in place to include `other`
    pub fn extend(&mut self, other: &Bounds) {
        self.left = self.left.min(other.left);
        self.bottom = self.bottom.min(other.bottom);
        self.right = self.right.max(other.right);
        self.top = self.top.max(other.top);
        self.centre.take();
    }

    /// Grows the bounds in place to include `point`
    pub fn extend_point(&mut self, point: &Point) {
        self.left = self.left.min(point.x);
        self.bottom = self.bottom.min(point.y);
        self.right = self.right.max(point.x);
        self.top = self.top.max(point.y);
        self.centre.take();
    }

    /// Scales the bounds by `ratio` around `origin`, or around the center
    pub fn scale(&self, ratio: f64, origin: Option<Point>) -> Bounds {
        let origin = origin.unwrap_or_else(|| self.center());
        Bounds::new(
            (self.left - origin.x) * ratio + origin.x,
            (self.bottom - origin.y) * ratio + origin.y,
            (self.right - origin.x) * ratio + origin.x,
            (self.top - origin.y) * ratio + origin.y,
        )
    }

    pub fn contains(&self, x: f64, y: f64, inclusive: bool) -> bool {
        if inclusive {
            x >= self.left && x <= self.right && y >= self.bottom && y <= self.top
        } else {
            x > self.left && x < self.right && y > self.bottom && y < self.top
        }
    }

    pub fn contains_point(&self, point: &Point, inclusive: bool) -> bool {
        self.contains(point.x, point.y, inclusive)
    }

    /// Like [`Bounds::contains_point`], first wrapping the point into `world_bounds`
    pub fn contains_point_wrapped(&self, point: &Point, world_bounds: Option<&Bounds>) -> bool {
        match world_bounds {
            Some(world) => {
                let wrapped = point.wrap_date_line(world);
                self.contains_point(&wrapped, true)
            }
            None => self.contains_point(point, true),
        }
    }

    /// Corner containment test; `partial` accepts any corner, otherwise all four
    pub fn contains_bounds(&self, other: &Bounds, partial: bool, inclusive: bool) -> bool {
        let corners = [
            self.contains(other.left, other.bottom, inclusive),
            self.contains(other.left, other.top, inclusive),
            self.contains(other.right, other.bottom, inclusive),
            self.contains(other.right, other.top, inclusive),
        ];
        if partial {
            corners.iter().any(|c| *c)
        } else {
            corners.iter().all(|c| *c)
        }
    }

    fn intersects_plain(&self, other: &Bounds, inclusive: bool) -> bool {
        let might_touch = self.left == other.right
            || self.right == other.left
            || self.top == other.bottom
            || self.bottom == other.top;
        if !inclusive && might_touch {
            return false;
        }
        let in_bottom = (other.bottom >= self.bottom && other.bottom <= self.top)
            || (self.bottom >= other.bottom && self.bottom <= other.top);
        let in_top = (other.top >= self.bottom && other.top <= self.top)
            || (self.top > other.bottom && self.top < other.top);
        let in_left = (other.left >= self.left && other.left <= self.right)
            || (self.left >= other.left && self.left <= other.right);
        let in_right = (other.right >= self.left && other.right <= self.right)
            || (self.right >= other.left && self.right <= other.right);
        (in_bottom || in_top) && (in_left || in_right)
    }

    /// Intersection test, optionally antimeridian-aware
    ///
    /// With `world_bounds`, an operand lying entirely outside the world is
    /// wrapped back before testing. If that still fails and exactly one
    /// operand crosses the world edge, the other is shifted one world width
    /// to the left and tested again.
    pub fn intersects_bounds(&self, other: &Bounds, options: IntersectOptions<'_>) -> bool {
        let Some(world) = options.world_bounds else {
            return self.intersects_plain(other, options.inclusive);
        };

        let this = self.wrap_date_line(world, WrapTolerance::default());
        let that = other.wrap_date_line(world, WrapTolerance::default());
        if this.intersects_plain(&that, options.inclusive) {
            return true;
        }

        let width = world.width();
        let this_crosses = !world.contains_bounds(&this, false, true);
        let that_crosses = !world.contains_bounds(&that, false, true);
        if this_crosses && !that_crosses {
            this.intersects_plain(&that.add(-width, 0.0), options.inclusive)
        } else if that_crosses && !this_crosses {
            that.intersects_plain(&this.add(-width, 0.0), options.inclusive)
        } else {
            false
        }
    }

    /// Shifts the bounds by whole world widths so they overlap `max_extent`
    ///
    /// Bounds entirely left or right of the world are moved back in; bounds
    /// that cross only the right edge are moved so they cross the left edge
    /// instead. Bounds already intersecting the world are returned unchanged
    /// apart from that last normalization.
    pub fn wrap_date_line(&self, max_extent: &Bounds, tolerance: WrapTolerance) -> Bounds {
        let width = max_extent.width();
        let mut wrapped = self.clone();
        if width <= 0.0 || !self.left.is_finite() || !self.right.is_finite() {
            return wrapped;
        }

        // whole world widths that carry an edge strictly across a gap, or just onto it
        let past = |gap: f64| (gap / width).floor() + 1.0;
        let reach = |gap: f64| (gap / width).ceil();

        if wrapped.left < max_extent.left && wrapped.right - tolerance.right <= max_extent.left {
            let steps = past(max_extent.left - (wrapped.right - tolerance.right))
                .min(reach(max_extent.left - wrapped.left));
            wrapped = wrapped.add(steps * width, 0.0);
        }
        if wrapped.left + tolerance.left >= max_extent.right && wrapped.right > max_extent.right {
            let steps = past(wrapped.left + tolerance.left - max_extent.right)
                .min(reach(wrapped.right - max_extent.right));
            wrapped = wrapped.add(-steps * width, 0.0);
        }

        let new_left = wrapped.left + tolerance.left;
        if new_left < max_extent.right
            && new_left > max_extent.left
            && wrapped.right - tolerance.right > max_extent.right
        {
            wrapped = wrapped.add(-width, 0.0);
        }
        wrapped
    }

    /// Comma separated `left,bottom,right,top`, rounded to `decimals` places
    pub fn to_bbox_string(&self, decimals: u32, reverse_axis: bool) -> String {
        let mult = 10f64.powi(decimals as i32);
        let r = |v: f64| (v * mult).round() / mult;
        if reverse_axis {
            format!("{},{},{},{}", r(self.bottom), r(self.left), r(self.top), r(self.right))
        } else {
            format!("{},{},{},{}", r(self.left), r(self.bottom), r(self.right), r(self.top))
        }
    }
}

impl PartialEq for Bounds {
    fn eq(&self, other: &Self) -> bool {
        self.left == other.left
            && self.bottom == other.bottom
            && self.right == other.right
            && self.top == other.top
    }
}

impl From<[f64; 4]> for Bounds {
    fn from(values: [f64; 4]) -> Self {
        Bounds::new(values[0], values[1], values[2], values[3])
    }
}

impl From<Bounds> for [f64; 4] {
    fn from(bounds: Bounds) -> Self {
        bounds.to_array()
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> Bounds {
        Bounds::new(-180.0, -90.0, 180.0, 90.0)
    }

    #[test]
    fn test_bounds_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Bounds>();
    }

    #[test]
    fn test_wrap_date_line_far_outside() {
        let far_left = Bounds::new(-1e13 - 5.0, -10.0, -1e13, 10.0);
        let wrapped = far_left.wrap_date_line(&world(), WrapTolerance::default());
        assert_eq!(wrapped, Bounds::new(75.0, -10.0, 80.0, 10.0));

        let far_right = Bounds::new(1e13, -10.0, 1e13 + 5.0, 10.0);
        let wrapped = far_right.wrap_date_line(&world(), WrapTolerance::default());
        assert!(wrapped.left() >= -180.0 && wrapped.right() <= 180.0);

        let wrapped = Bounds::new(-1e300, 0.0, -1e300, 1.0).wrap_date_line(&world(), WrapTolerance::default());
        assert!(wrapped.left().is_finite());
    }

    #[test]
    fn test_bounds_add_round_trip() {
        let b = Bounds::new(-12.5, 3.0, 40.25, 17.0);
        assert_eq!(b.add(33.0, -8.5).add(-33.0, 8.5), b);
    }

    #[test]
    fn test_center_cache_invalidated_on_extend() {
        let mut b = Bounds::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(b.center(), Point::new(5.0, 5.0));
        b.extend(&Bounds::new(0.0, 0.0, 30.0, 20.0));
        assert_eq!(b.center(), Point::new(15.0, 10.0));
        b.extend_point(&Point::new(-30.0, 0.0));
        assert_eq!(b.center(), Point::new(0.0, 10.0));
    }

    #[test]
    fn test_degenerate_bounds() {
        let point = Bounds::new(5.0, 5.0, 5.0, 5.0);
        assert!(point.is_normalized());
        assert!(point.contains(5.0, 5.0, true));
        assert!(!point.contains(5.0, 5.0, false));
        assert_eq!(point.width(), 0.0);
    }

    #[test]
    fn test_wrap_date_line_outside_left() {
        let b = Bounds::new(-190.0, -10.0, -185.0, 10.0);
        let wrapped = b.wrap_date_line(&world(), WrapTolerance::default());
        assert_eq!(wrapped, Bounds::new(170.0, -10.0, 175.0, 10.0));
    }

    #[test]
    fn test_wrap_date_line_intersecting_unchanged() {
        let b = Bounds::new(-100.0, -10.0, 100.0, 10.0);
        assert_eq!(b.wrap_date_line(&world(), WrapTolerance::default()), b);
    }

    #[test]
    fn test_wrap_date_line_crossing_right_edge_moves_left() {
        let b = Bounds::new(170.0, 0.0, 190.0, 10.0);
        let wrapped = b.wrap_date_line(&world(), WrapTolerance::default());
        assert_eq!(wrapped, Bounds::new(-190.0, 0.0, -170.0, 10.0));
    }

    #[test]
    fn test_wrap_date_line_touching_edge_tolerance() {
        // right edge exactly on the world's left edge counts as outside
        let b = Bounds::new(-200.0, 0.0, -180.0, 10.0);
        let wrapped = b.wrap_date_line(&world(), WrapTolerance::default());
        assert_eq!(wrapped, Bounds::new(160.0, 0.0, 180.0, 10.0));

        // a one unit tolerance also moves a tile overlapping by less than that
        let b = Bounds::new(-200.0, 0.0, -179.5, 10.0);
        let wrapped = b.wrap_date_line(&world(), WrapTolerance::uniform(1.0));
        assert_eq!(wrapped, Bounds::new(160.0, 0.0, 180.5, 10.0));
    }

    #[test]
    fn test_intersects_exclusive_edges() {
        let a = Bounds::new(0.0, 0.0, 10.0, 10.0);
        let b = Bounds::new(10.0, 0.0, 20.0, 10.0);
        assert!(a.intersects_bounds(&b, IntersectOptions::default()));
        let exclusive = IntersectOptions {
            inclusive: false,
            world_bounds: None,
        };
        assert!(!a.intersects_bounds(&b, exclusive));
    }

    #[test]
    fn test_intersects_across_antimeridian() {
        let w = world();
        let tile = Bounds::new(-200.0, 0.0, -190.0, 10.0);
        let area = Bounds::new(165.0, 0.0, 175.0, 10.0);
        let with_world = IntersectOptions {
            inclusive: true,
            world_bounds: Some(&w),
        };
        assert!(!tile.intersects_bounds(&area, IntersectOptions::default()));
        assert!(tile.intersects_bounds(&area, with_world));
        let far = Bounds::new(0.0, 0.0, 10.0, 10.0);
        assert!(!tile.intersects_bounds(&far, with_world));
    }

    #[test]
    fn test_intersects_with_straddling_operand() {
        let w = world();
        let straddling = Bounds::new(170.0, 0.0, 190.0, 10.0);
        let east_of_meridian = Bounds::new(-179.0, 0.0, -175.0, 10.0);
        let with_world = IntersectOptions {
            inclusive: true,
            world_bounds: Some(&w),
        };
        assert!(straddling.intersects_bounds(&east_of_meridian, with_world));
    }

    #[test]
    fn test_contains_bounds_partial() {
        let outer = Bounds::new(0.0, 0.0, 10.0, 10.0);
        let overlapping = Bounds::new(5.0, 5.0, 15.0, 15.0);
        assert!(!outer.contains_bounds(&overlapping, false, true));
        assert!(outer.contains_bounds(&overlapping, true, true));
        assert!(outer.contains_bounds(&Bounds::new(1.0, 1.0, 2.0, 2.0), false, true));
    }

    #[test]
    fn test_scale_around_origin() {
        let b = Bounds::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(b.scale(2.0, None), Bounds::new(-5.0, -5.0, 15.0, 15.0));
        assert_eq!(
            b.scale(2.0, Some(Point::new(0.0, 0.0))),
            Bounds::new(0.0, 0.0, 20.0, 20.0)
        );
    }

    #[test]
    fn test_bbox_string() {
        let b = Bounds::new(-180.0, -90.0, 0.1234567, 90.0);
        assert_eq!(b.to_bbox_string(6, false), "-180,-90,0.123457,90");
        assert_eq!(b.to_bbox_string(6, true), "-90,-180,90,0.123457");
    }

    #[test]
    fn test_serde_as_array() {
        let b: Bounds = serde_json::from_str("[-1.0, -2.0, 3.0, 4.0]").unwrap();
        assert_eq!(b, Bounds::new(-1.0, -2.0, 3.0, 4.0));
        assert_eq!(serde_json::to_string(&b).unwrap(), "[-1.0,-2.0,3.0,4.0]");
    }
}
