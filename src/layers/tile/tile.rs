use crate::core::bounds::Bounds;
use crate::core::geo::{PixelPoint, Size};
use crate::layers::tile::loader::{FetchError, FetchResult};
use crate::prelude::Arc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a tile record inside its grid
///
/// Tiles are recycled when the grid shifts, so the id follows the record and
/// not the (row, col) cell it currently occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId(pub u64);

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tile#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    /// Positioned but not requested, or cleared for a redraw
    Idle,
    Loading,
    Loaded,
    /// Failed after every retry; rendered as a load-failed placeholder
    Errored,
    /// Dropped while a request was still in flight
    Unloaded,
}

/// Result of committing a fetch response to a tile
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// The response belongs to a superseded request and was ignored
    Stale,
    Loaded,
    /// The request failed and must be issued again under a new generation
    Retry { generation: u64, url: String },
    /// The request failed and no retries are left
    Failed(FetchError),
}

#[derive(Debug, Clone)]
pub struct Tile {
    id: TileId,
    bounds: Bounds,
    position: PixelPoint,
    size: Size,
    state: TileState,
    url: Option<String>,
    retries: u32,
    generation: u64,
    data: Option<Arc<Vec<u8>>>,
    error: Option<FetchError>,
}

impl Tile {
    pub fn new(id: TileId, bounds: Bounds, position: PixelPoint, size: Size) -> Self {
        Self {
            id,
            bounds,
            position,
            size,
            state: TileState::Idle,
            url: None,
            retries: 0,
            generation: 0,
            data: None,
            error: None,
        }
    }

    pub fn id(&self) -> TileId {
        self.id
    }

    /// Bounds in map units
    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Top-left corner in layer pixels
    pub fn position(&self) -> PixelPoint {
        self.position
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn state(&self) -> TileState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == TileState::Loading
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Id of the request currently allowed to complete this tile
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn data(&self) -> Option<&Arc<Vec<u8>>> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.error.as_ref()
    }

    /// Repositions the record for a new cell; loading state is left to the next draw
    pub(crate) fn move_to(&mut self, bounds: Bounds, position: PixelPoint, size: Size) {
        self.bounds = bounds;
        self.position = position;
        self.size = size;
    }

    /// Drops displayed content ahead of a redraw
    pub(crate) fn clear(&mut self) {
        self.data = None;
        self.error = None;
        if !self.is_loading() {
            self.state = TileState::Idle;
        }
    }

    /// Issues a request for `url` under a fresh generation
    ///
    /// Returns whether the tile was already loading, in which case the
    /// earlier request is superseded without ending the load.
    pub(crate) fn begin_load(&mut self, url: String) -> bool {
        let was_loading = self.is_loading();
        self.generation += 1;
        self.retries = 0;
        self.url = Some(url);
        self.data = None;
        self.error = None;
        self.state = TileState::Loading;
        was_loading
    }

    /// Commits a fetch response, checking its generation first
    pub(crate) fn complete(&mut self, generation: u64, result: FetchResult, max_retries: u32) -> LoadOutcome {
        if !self.is_loading() || generation != self.generation {
            return LoadOutcome::Stale;
        }
        match result {
            Ok(data) => {
                self.data = Some(data);
                self.state = TileState::Loaded;
                LoadOutcome::Loaded
            }
            Err(error) => match self.url.clone() {
                Some(url) if self.retries < max_retries => {
                    self.retries += 1;
                    self.generation += 1;
                    LoadOutcome::Retry {
                        generation: self.generation,
                        url,
                    }
                }
                _ => {
                    self.state = TileState::Errored;
                    self.error = Some(error.clone());
                    LoadOutcome::Failed(error)
                }
            },
        }
    }

    /// Abandons an in-flight request; returns whether one was in flight
    pub(crate) fn unload(&mut self) -> bool {
        if !self.is_loading() {
            return false;
        }
        self.generation += 1;
        self.state = TileState::Unloaded;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile() -> Tile {
        Tile::new(
            TileId(1),
            Bounds::new(0.0, 0.0, 256.0, 256.0),
            PixelPoint::new(0.0, 0.0),
            Size::square(256.0),
        )
    }

    fn bytes() -> Arc<Vec<u8>> {
        Arc::new(vec![1, 2, 3])
    }

    #[test]
    fn test_load_success() {
        let mut t = tile();
        assert!(!t.begin_load("a".to_string()));
        let gen = t.generation();
        assert_eq!(t.complete(gen, Ok(bytes()), 3), LoadOutcome::Loaded);
        assert_eq!(t.state(), TileState::Loaded);
        assert_eq!(t.data().map(|d| d.len()), Some(3));
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let mut t = tile();
        t.begin_load("a".to_string());
        let old = t.generation();
        assert!(t.begin_load("b".to_string()));
        assert_eq!(t.complete(old, Ok(bytes()), 3), LoadOutcome::Stale);
        assert!(t.is_loading());
        assert_eq!(t.url(), Some("b"));
    }

    #[test]
    fn test_retries_then_fails() {
        let mut t = tile();
        t.begin_load("a".to_string());
        let mut failures = 0;
        loop {
            failures += 1;
            match t.complete(t.generation(), Err(FetchError::Http(500)), 3) {
                LoadOutcome::Retry { generation, url } => {
                    assert_eq!(generation, t.generation());
                    assert_eq!(url, "a");
                }
                LoadOutcome::Failed(err) => {
                    assert_eq!(err, FetchError::Http(500));
                    break;
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(failures, 4);
        assert_eq!(t.state(), TileState::Errored);
        assert_eq!(t.complete(t.generation(), Ok(bytes()), 3), LoadOutcome::Stale);
    }

    #[test]
    fn test_unload_only_when_loading() {
        let mut t = tile();
        assert!(!t.unload());
        t.begin_load("a".to_string());
        let gen = t.generation();
        assert!(t.unload());
        assert_eq!(t.state(), TileState::Unloaded);
        assert_eq!(t.complete(gen, Ok(bytes()), 0), LoadOutcome::Stale);
    }

    #[test]
    fn test_clear_keeps_loading_state() {
        let mut t = tile();
        t.begin_load("a".to_string());
        t.clear();
        assert!(t.is_loading());
        let gen = t.generation();
        t.complete(gen, Err(FetchError::Cancelled), 0);
        t.clear();
        assert_eq!(t.state(), TileState::Idle);
    }
}
