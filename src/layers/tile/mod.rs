//! Tiled layers
//!
//! This module provides the grid machinery behind tiled layers:
//! - Tile records with generation-checked loads
//! - A recycling grid that shifts as the map pans
//! - URL builders for XYZ, WMS and WMTS services
//! - Pluggable fetchers and an LRU byte cache
//! - A back buffer that covers zoom transitions

pub mod backbuffer;
pub mod cache;
pub mod grid;
pub mod layer;
pub mod loader;
pub mod source;
pub mod tile;

pub use backbuffer::{BackBuffer, BackBufferTile};
pub use cache::TileCache;
pub use grid::{GridLayout, GridUpdate, TileGrid};
pub use layer::GridLayer;
#[cfg(feature = "tokio-runtime")]
pub use loader::SpawnFetcher;
pub use loader::{
    AsyncTileSource, FetchError, FetchResult, HttpSource, QueuedFetcher, TileCompletion, TileFetcher,
    TileResponse,
};
pub use source::{
    TileRequestContext, TileService, TileUrlBuilder, WmsService, WmtsEncoding, WmtsMatrix, WmtsService,
    XyzService,
};
pub use tile::{LoadOutcome, Tile, TileId, TileState};
