//! Projection registry
//!
//! Holds coordinate reference system metadata and direct point transforms
//! between pairs of CRS codes. The registry is built once at startup and
//! shared with maps through an `Arc`. Only one hop is ever looked up: a pair
//! without a registered edge transforms as a no-op.

use crate::core::bounds::Bounds;
use crate::core::constants::MERCATOR_POLE;
use crate::core::geo::Point;
use crate::core::resolution::Units;
use crate::prelude::{Arc, HashMap};
use std::fmt;

/// In-place point transform between two CRS codes
pub type TransformFn = Arc<dyn Fn(&mut Point) + Send + Sync>;

/// A registered edge in the projection graph
#[derive(Clone)]
pub enum Transform {
    /// The two codes name the same CRS; coordinates pass through unchanged
    Null,
    Custom(TransformFn),
}

impl Transform {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&mut Point) + Send + Sync + 'static,
    {
        Transform::Custom(Arc::new(f))
    }

    fn apply(&self, point: &mut Point) {
        match self {
            Transform::Null => {}
            Transform::Custom(f) => f(point),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Transform::Null)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Null => write!(f, "Transform::Null"),
            Transform::Custom(_) => write!(f, "Transform::Custom(..)"),
        }
    }
}

/// Metadata the map falls back on when its options leave them out
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionDefaults {
    pub units: Option<Units>,
    pub max_extent: Option<Bounds>,
    /// Axis order is latitude first (y, x) in protocols that honour it
    pub reverse_axis: bool,
}

#[derive(Debug, Default)]
pub struct ProjectionRegistry {
    transforms: HashMap<String, HashMap<String, Transform>>,
    defaults: HashMap<String, ProjectionDefaults>,
}

const MERCATOR_CODES: [&str; 4] = ["EPSG:900913", "EPSG:3857", "EPSG:102113", "EPSG:102100"];
const GEOGRAPHIC_CODES: [&str; 3] = ["CRS:84", "urn:ogc:def:crs:EPSG:6.6:4326", "EPSG:4326"];

/// Geographic degrees to spherical mercator metres
pub fn forward_mercator(point: &mut Point) {
    point.x = point.x * MERCATOR_POLE / 180.0;
    let y = ((90.0 + point.y) * std::f64::consts::PI / 360.0).tan().ln() / std::f64::consts::PI
        * MERCATOR_POLE;
    point.y = y.clamp(-MERCATOR_POLE, MERCATOR_POLE);
}

/// Spherical mercator metres to geographic degrees
pub fn inverse_mercator(point: &mut Point) {
    use std::f64::consts::PI;
    point.x = 180.0 * point.x / MERCATOR_POLE;
    point.y = 180.0 / PI * (2.0 * ((point.y / MERCATOR_POLE) * PI).exp().atan() - PI / 2.0);
}

impl ProjectionRegistry {
    /// An empty registry with no metadata and no transforms
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the geographic and spherical mercator families
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.install_defaults();
        registry
    }

    /// Drops every registered transform and all CRS metadata
    pub fn clear(&mut self) {
        self.transforms.clear();
        self.defaults.clear();
    }

    fn install_defaults(&mut self) {
        let world = Bounds::new(-180.0, -90.0, 180.0, 90.0);
        self.set_defaults(
            "EPSG:4326",
            ProjectionDefaults {
                units: Some(Units::Degrees),
                max_extent: Some(world.clone()),
                reverse_axis: true,
            },
        );
        self.set_defaults(
            "CRS:84",
            ProjectionDefaults {
                units: Some(Units::Degrees),
                max_extent: Some(world),
                reverse_axis: false,
            },
        );
        self.set_defaults(
            "EPSG:900913",
            ProjectionDefaults {
                units: Some(Units::M),
                max_extent: Some(Bounds::new(
                    -MERCATOR_POLE,
                    -MERCATOR_POLE,
                    MERCATOR_POLE,
                    MERCATOR_POLE,
                )),
                reverse_axis: false,
            },
        );

        let forward = Transform::custom(forward_mercator);
        let inverse = Transform::custom(inverse_mercator);
        for family in [&MERCATOR_CODES[..], &GEOGRAPHIC_CODES[..]] {
            for (i, code) in family.iter().enumerate() {
                for other in &family[i + 1..] {
                    self.add_transform(code, other, Transform::Null);
                    self.add_transform(other, code, Transform::Null);
                }
            }
        }
        for geo in GEOGRAPHIC_CODES {
            for merc in MERCATOR_CODES {
                self.add_transform(geo, merc, forward.clone());
                self.add_transform(merc, geo, inverse.clone());
            }
        }
    }

    pub fn set_defaults(&mut self, code: &str, defaults: ProjectionDefaults) {
        self.defaults.insert(code.to_string(), defaults);
    }

    pub fn defaults(&self, code: &str) -> Option<&ProjectionDefaults> {
        self.defaults.get(code)
    }

    pub fn units(&self, code: &str) -> Option<Units> {
        self.defaults(code).and_then(|d| d.units)
    }

    pub fn max_extent(&self, code: &str) -> Option<Bounds> {
        self.defaults(code).and_then(|d| d.max_extent.clone())
    }

    pub fn reverse_axis(&self, code: &str) -> bool {
        self.defaults(code).map(|d| d.reverse_axis).unwrap_or(false)
    }

    /// Registers a direct edge `from -> to`, replacing any previous one
    ///
    /// A null edge also hands `from`'s metadata to `to` when `to` has none.
    pub fn add_transform(&mut self, from: &str, to: &str, transform: Transform) {
        if transform.is_null() && !self.defaults.contains_key(to) {
            if let Some(defaults) = self.defaults.get(from).cloned() {
                self.defaults.insert(to.to_string(), defaults);
            }
        }
        self.transforms
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string(), transform);
    }

    pub fn has_transform(&self, from: &str, to: &str) -> bool {
        self.edge(from, to).is_some()
    }

    fn edge(&self, from: &str, to: &str) -> Option<&Transform> {
        self.transforms.get(from).and_then(|edges| edges.get(to))
    }

    /// Same code, or connected by a direct null edge
    pub fn equals(&self, a: &str, b: &str) -> bool {
        a == b || self.edge(a, b).map(Transform::is_null).unwrap_or(false)
    }

    /// Transforms `point` in place and returns it
    pub fn transform<'a>(&self, point: &'a mut Point, source: &str, dest: &str) -> &'a mut Point {
        if source != dest {
            match self.edge(source, dest) {
                Some(transform) => transform.apply(point),
                None => log::trace!("no transform from {} to {}, leaving point as is", source, dest),
            }
        }
        point
    }

    /// By-value form of [`ProjectionRegistry::transform`]
    pub fn transform_point(&self, mut point: Point, source: &str, dest: &str) -> Point {
        self.transform(&mut point, source, dest);
        point
    }

    /// Transforms the four corners and returns their envelope
    pub fn transform_bounds(&self, bounds: &Bounds, source: &str, dest: &str) -> Bounds {
        if self.equals(source, dest) {
            return bounds.clone();
        }
        let corners = [
            Point::new(bounds.left(), bounds.bottom()),
            Point::new(bounds.right(), bounds.bottom()),
            Point::new(bounds.right(), bounds.top()),
            Point::new(bounds.left(), bounds.top()),
        ];
        let mut iter = corners
            .into_iter()
            .map(|corner| self.transform_point(corner, source, dest));
        let mut out = match iter.next() {
            Some(first) => Bounds::new(first.x, first.y, first.x, first.y),
            None => return bounds.clone(),
        };
        for p in iter {
            out.extend_point(&p);
        }
        out
    }
}
