//! # Tessera
//!
//! A headless tiled web-map engine.
//!
//! The library keeps a viewport (center, resolution ladder, pixel origin)
//! and moves a stack of tiled layers with it. Each layer covers the view
//! with a recycling grid of tiles, builds request URLs for XYZ, WMS or WMTS
//! services, and reports loading through map events. Rendering and I/O are
//! left to the host: tiles are fetched through an injected fetcher and the
//! resulting state is read back from the layers.

pub mod core;
pub mod layers;
pub mod prelude;
pub mod traits;
pub use crate::core::constants;

// Re-export public API
pub use core::{
    animation::{Easing, EasingType},
    bounds::Bounds,
    config::{GridLayerOptions, MapOptions, TileLoadingConfig, TileLoadingProfile},
    events::{EventManager, MapEvent},
    geo::{PixelPoint, Point, Size},
    map::Map,
    projection::ProjectionRegistry,
    resolution::{ResolutionLadder, Units},
    viewport::Viewport,
};

pub use layers::{
    base::LayerTrait,
    tile::{FetchError, GridLayer, QueuedFetcher, TileFetcher, TileService},
};

pub use traits::TiledLayer;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, MapError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("Projection error: {0}")]
    Projection(String),

    #[error("Layer error: {0}")]
    Layer(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Error type alias for convenience
pub type Error = MapError;
