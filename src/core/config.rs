//! Configuration for maps and grid layers
//!
//! Options are plain serde structs so a host can load them from JSON. Tile
//! loading behaviour comes from presets, in the same way performance
//! profiles resolve to concrete settings.

use crate::core::animation::EasingType;
use crate::core::bounds::Bounds;
use crate::core::constants::{
    DEFAULT_NUM_ZOOM_LEVELS, DEFAULT_PAN_DURATION_MS, DEFAULT_PAN_RATIO, DEFAULT_PROJECTION,
};
use crate::core::geo::{Point, Size};
use crate::core::projection::ProjectionRegistry;
use crate::core::resolution::{ResolutionLadder, Units};
use crate::{MapError, Result};
use serde::{Deserialize, Serialize};

/// Preset tile loading behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TileLoadingProfile {
    #[default]
    Balanced,
    LowResource,
    HighPerformance,
    Custom(TileLoadingConfig),
}

impl TileLoadingProfile {
    pub fn resolve(&self) -> TileLoadingConfig {
        match self {
            Self::Balanced => TileLoadingConfig {
                max_retries: 3,
                cache_size: 1024,
                back_buffer_removal_delay_ms: 2500,
            },
            Self::LowResource => TileLoadingConfig {
                max_retries: 1,
                cache_size: 256,
                back_buffer_removal_delay_ms: 0,
            },
            Self::HighPerformance => TileLoadingConfig {
                max_retries: 5,
                cache_size: 4096,
                back_buffer_removal_delay_ms: 2500,
            },
            Self::Custom(config) => config.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileLoadingConfig {
    /// Retries after the first failed load before a tile is marked errored
    pub max_retries: u32,
    /// Entries in the per-layer tile byte cache; zero disables caching
    pub cache_size: usize,
    /// How long the back buffer stays after the last tile finished loading
    pub back_buffer_removal_delay_ms: u64,
}

impl TileLoadingConfig {
    pub fn removal_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.back_buffer_removal_delay_ms)
    }
}

impl Default for TileLoadingConfig {
    fn default() -> Self {
        TileLoadingProfile::default().resolve()
    }
}

/// Where the resolution ladder of a map comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionSource {
    Resolutions {
        values: Vec<f64>,
    },
    Scales {
        values: Vec<f64>,
    },
    Range {
        #[serde(default)]
        max_resolution: Option<f64>,
        #[serde(default)]
        min_resolution: Option<f64>,
        num_zoom_levels: usize,
    },
    /// Coarsest level fits the max extent into the viewport
    Auto {
        num_zoom_levels: usize,
    },
}

impl Default for ResolutionSource {
    fn default() -> Self {
        ResolutionSource::Auto {
            num_zoom_levels: DEFAULT_NUM_ZOOM_LEVELS,
        }
    }
}

impl ResolutionSource {
    pub fn build(&self, units: Units, max_extent: &Bounds, size: Size) -> Result<ResolutionLadder> {
        match self {
            Self::Resolutions { values } => ResolutionLadder::new(values.clone()),
            Self::Scales { values } => ResolutionLadder::from_scales(values, units),
            Self::Range {
                max_resolution,
                min_resolution,
                num_zoom_levels,
            } => ResolutionLadder::from_range(*max_resolution, *min_resolution, *num_zoom_levels),
            Self::Auto { num_zoom_levels } => {
                ResolutionLadder::auto_fit(max_extent, size, *num_zoom_levels)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapOptions {
    pub projection: String,
    pub units: Option<Units>,
    pub max_extent: Option<Bounds>,
    pub restricted_extent: Option<Bounds>,
    pub resolutions: ResolutionSource,
    pub fractional_zoom: bool,
    pub min_zoom: Option<f64>,
    pub max_zoom: Option<f64>,
    /// Viewport size in pixels
    pub size: Size,
    /// Initial view, applied once the first base layer is added
    pub center: Option<Point>,
    pub zoom: Option<f64>,
    /// `pan_to` animates only when the target lies within the extent scaled by this ratio
    pub pan_ratio: f64,
    pub pan_duration_ms: u64,
    pub pan_easing: EasingType,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            projection: DEFAULT_PROJECTION.to_string(),
            units: None,
            max_extent: None,
            restricted_extent: None,
            resolutions: ResolutionSource::default(),
            fractional_zoom: false,
            min_zoom: None,
            max_zoom: None,
            size: Size::new(512.0, 512.0),
            center: None,
            zoom: None,
            pan_ratio: DEFAULT_PAN_RATIO,
            pan_duration_ms: DEFAULT_PAN_DURATION_MS,
            pan_easing: EasingType::EaseOut,
        }
    }
}

impl MapOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Fills `units` and `max_extent` from the projection's registered defaults
    pub fn with_projection_defaults(mut self, registry: &ProjectionRegistry) -> Result<Self> {
        if self.units.is_none() {
            self.units = registry.units(&self.projection);
        }
        if self.max_extent.is_none() {
            self.max_extent = registry.max_extent(&self.projection);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(center) = self.center {
            if !center.is_finite() {
                return Err(MapError::InvalidCoordinates(format!(
                    "map center ({}, {}) is not finite",
                    center.x, center.y
                )));
            }
        }
        if self.units.is_none() {
            return Err(MapError::InvalidConfig(format!(
                "no units configured or registered for {}",
                self.projection
            )));
        }
        match &self.max_extent {
            Some(extent) if extent.is_normalized() && extent.width() > 0.0 && extent.height() > 0.0 => {}
            Some(_) => {
                return Err(MapError::InvalidConfig(
                    "max extent must have a positive width and height".to_string(),
                ))
            }
            None => {
                return Err(MapError::InvalidConfig(format!(
                    "no max extent configured or registered for {}",
                    self.projection
                )))
            }
        }
        if let Some(restricted) = &self.restricted_extent {
            if !restricted.is_normalized() {
                return Err(MapError::InvalidConfig(
                    "restricted extent is not normalized".to_string(),
                ));
            }
        }
        if let (Some(min), Some(max)) = (self.min_zoom, self.max_zoom) {
            if min > max {
                return Err(MapError::InvalidConfig(format!(
                    "min zoom {} is above max zoom {}",
                    min, max
                )));
            }
        }
        if !(self.pan_ratio.is_finite() && self.pan_ratio > 0.0) {
            return Err(MapError::InvalidConfig(
                "pan ratio must be positive".to_string(),
            ));
        }
        if !self.size.is_positive() {
            return Err(MapError::InvalidConfig(
                "viewport size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn pan_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.pan_duration_ms)
    }
}

/// Which corner of the max extent anchors the tile grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TileOriginCorner {
    #[default]
    Bl,
    Br,
    Tl,
    Tr,
}

impl TileOriginCorner {
    pub fn point(self, extent: &Bounds) -> Point {
        match self {
            Self::Bl => Point::new(extent.left(), extent.bottom()),
            Self::Br => Point::new(extent.right(), extent.bottom()),
            Self::Tl => Point::new(extent.left(), extent.top()),
            Self::Tr => Point::new(extent.right(), extent.top()),
        }
    }

    /// +1 when rows count downwards from a top corner
    pub fn row_sign(self) -> f64 {
        match self {
            Self::Tl | Self::Tr => 1.0,
            Self::Bl | Self::Br => -1.0,
        }
    }
}

/// Visual transition on zoom changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransitionEffect {
    #[default]
    Resize,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridLayerOptions {
    pub id: String,
    pub name: String,
    pub tile_size: Size,
    /// Extra rows and columns kept around the viewport
    pub buffer: i32,
    pub is_base_layer: bool,
    pub visible: bool,
    pub wrap_date_line: bool,
    pub max_extent: Option<Bounds>,
    pub tile_origin: Option<Point>,
    pub tile_origin_corner: TileOriginCorner,
    pub server_resolutions: Option<Vec<f64>>,
    pub zoom_offset: i32,
    /// Ladder installed on the map while this layer is the base layer
    pub resolutions: Option<Vec<f64>>,
    pub min_resolution: Option<f64>,
    pub max_resolution: Option<f64>,
    pub display_outside_max_extent: bool,
    pub transition_effect: TransitionEffect,
    pub loading: TileLoadingConfig,
}

impl Default for GridLayerOptions {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            tile_size: Size::default(),
            buffer: 0,
            is_base_layer: true,
            visible: true,
            wrap_date_line: false,
            max_extent: None,
            tile_origin: None,
            tile_origin_corner: TileOriginCorner::default(),
            server_resolutions: None,
            zoom_offset: 0,
            resolutions: None,
            min_resolution: None,
            max_resolution: None,
            display_outside_max_extent: false,
            transition_effect: TransitionEffect::default(),
            loading: TileLoadingConfig::default(),
        }
    }
}

impl GridLayerOptions {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            ..Default::default()
        }
    }

    pub fn overlay(id: impl Into<String>) -> Self {
        Self {
            is_base_layer: false,
            ..Self::new(id)
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(MapError::InvalidConfig("layer id must not be empty".to_string()));
        }
        if self.buffer < 0 {
            return Err(MapError::InvalidConfig(format!(
                "layer {}: buffer must not be negative, got {}",
                self.id, self.buffer
            )));
        }
        if !self.tile_size.is_positive() {
            return Err(MapError::InvalidConfig(format!(
                "layer {}: tile size must be positive",
                self.id
            )));
        }
        if let Some(origin) = self.tile_origin {
            if !origin.is_finite() {
                return Err(MapError::InvalidCoordinates(format!(
                    "layer {}: tile origin ({}, {}) is not finite",
                    self.id, origin.x, origin.y
                )));
            }
        }
        if let Some(server) = &self.server_resolutions {
            ResolutionLadder::new(server.clone())?;
        }
        if let Some(resolutions) = &self.resolutions {
            ResolutionLadder::new(resolutions.clone())?;
        }
        if let (Some(min), Some(max)) = (self.min_resolution, self.max_resolution) {
            if min > max {
                return Err(MapError::InvalidConfig(format!(
                    "layer {}: min resolution {} is above max resolution {}",
                    self.id, min, max
                )));
            }
        }
        Ok(())
    }

    pub fn buffer(&self) -> usize {
        self.buffer.max(0) as usize
    }

    /// Resolution range check for overlays with a display range
    pub fn in_range(&self, resolution: f64) -> bool {
        self.min_resolution.map_or(true, |min| resolution >= min)
            && self.max_resolution.map_or(true, |max| resolution <= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_resolve() {
        let balanced = TileLoadingProfile::Balanced.resolve();
        assert_eq!(balanced.max_retries, 3);
        assert_eq!(TileLoadingConfig::default(), balanced);
        let custom = TileLoadingConfig {
            max_retries: 7,
            cache_size: 0,
            back_buffer_removal_delay_ms: 10,
        };
        assert_eq!(TileLoadingProfile::Custom(custom.clone()).resolve(), custom);
        assert_eq!(TileLoadingProfile::LowResource.resolve().back_buffer_removal_delay_ms, 0);
    }

    #[test]
    fn test_negative_buffer_rejected() {
        let options = GridLayerOptions {
            buffer: -1,
            ..GridLayerOptions::new("osm")
        };
        assert!(matches!(options.validate(), Err(MapError::InvalidConfig(_))));
    }

    #[test]
    fn test_degenerate_tile_size_rejected() {
        let options = GridLayerOptions {
            tile_size: Size::new(0.0, 256.0),
            ..GridLayerOptions::new("osm")
        };
        assert!(options.validate().is_err());
        let options = GridLayerOptions {
            tile_size: Size::new(f64::NAN, 256.0),
            ..GridLayerOptions::new("osm")
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_map_options_from_json_with_defaults() {
        let json = r#"{
            "projection": "EPSG:4326",
            "resolutions": { "kind": "resolutions", "values": [0.17578125, 0.703125, 0.3515625] },
            "size": { "width": 800.0, "height": 600.0 }
        }"#;
        let options = MapOptions::from_json(json)
            .unwrap()
            .with_projection_defaults(&ProjectionRegistry::with_defaults())
            .unwrap();
        assert_eq!(options.units, Some(Units::Degrees));
        assert_eq!(options.max_extent, Some(Bounds::new(-180.0, -90.0, 180.0, 90.0)));
        assert_eq!(options.pan_ratio, DEFAULT_PAN_RATIO);
        let ladder = options
            .resolutions
            .build(Units::Degrees, &Bounds::new(-180.0, -90.0, 180.0, 90.0), options.size)
            .unwrap();
        assert_eq!(ladder.coarsest(), 0.703125);
    }

    #[test]
    fn test_unknown_projection_needs_extent() {
        let options = MapOptions {
            projection: "EPSG:32633".to_string(),
            ..Default::default()
        };
        assert!(options
            .with_projection_defaults(&ProjectionRegistry::with_defaults())
            .is_err());
    }

    #[test]
    fn test_non_finite_coordinates_rejected() {
        let options = MapOptions {
            center: Some(Point::new(f64::NAN, 0.0)),
            ..Default::default()
        };
        assert!(matches!(
            options.with_projection_defaults(&ProjectionRegistry::with_defaults()),
            Err(MapError::InvalidCoordinates(_))
        ));

        let layer = GridLayerOptions {
            tile_origin: Some(Point::new(0.0, f64::INFINITY)),
            ..GridLayerOptions::new("a")
        };
        assert!(matches!(layer.validate(), Err(MapError::InvalidCoordinates(_))));
    }

    #[test]
    fn test_malformed_json_is_serialization_error() {
        assert!(matches!(
            MapOptions::from_json("{ not json"),
            Err(MapError::Serialization(_))
        ));
    }

    #[test]
    fn test_layer_options_json() {
        let options = GridLayerOptions::from_json(
            r#"{ "id": "wms", "buffer": 2, "is_base_layer": false, "tile_origin_corner": "tl",
                 "transition_effect": "none", "loading": { "max_retries": 1 } }"#,
        )
        .unwrap();
        assert_eq!(options.buffer(), 2);
        assert_eq!(options.tile_origin_corner, TileOriginCorner::Tl);
        assert_eq!(options.transition_effect, TransitionEffect::None);
        assert_eq!(options.loading.max_retries, 1);
        assert_eq!(options.loading.cache_size, 1024);
        assert_eq!(options.tile_size, Size::square(256.0));
    }

    #[test]
    fn test_display_range() {
        let options = GridLayerOptions {
            min_resolution: Some(1.0),
            max_resolution: Some(10.0),
            ..GridLayerOptions::overlay("labels")
        };
        assert!(options.in_range(5.0));
        assert!(!options.in_range(0.5));
        assert!(!options.in_range(20.0));
    }
}
