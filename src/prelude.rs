//! Prelude module for common tessera types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use tessera::prelude::*;`

pub use crate::core::{
    animation::{Easing, EasingType},
    bounds::{Bounds, IntersectOptions, WrapTolerance},
    config::{
        GridLayerOptions, MapOptions, ResolutionSource, TileLoadingConfig, TileLoadingProfile,
        TileOriginCorner, TransitionEffect,
    },
    events::{EventManager, MapEvent},
    geo::{PixelPoint, Point, Size},
    map::{Map, PanOptions},
    projection::ProjectionRegistry,
    resolution::{ResolutionLadder, Units},
    viewport::{MoveOptions, Viewport},
};

pub use crate::layers::{
    base::{LayerAttachment, LayerContext, LayerProperties, LayerTrait},
    tile::{
        AsyncTileSource, FetchError, GridLayer, HttpSource, QueuedFetcher, TileCache, TileFetcher,
        Tile, TileId, TileService, TileState, TileUrlBuilder, WmsService, WmtsService, XyzService,
    },
};

#[cfg(feature = "tokio-runtime")]
pub use crate::layers::tile::SpawnFetcher;

pub use crate::traits::{Lerp, TiledLayer};

pub use crate::{MapError, Result};

pub use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

pub use instant::Instant;

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet, FxHasher};

#[cfg(feature = "tokio-runtime")]
pub use futures::Future;
