//! Tile fetching
//!
//! The grid never performs I/O itself. It hands a [`TileCompletion`] to an
//! injected [`TileFetcher`]; whatever fetches the bytes completes it, which
//! sends a [`TileResponse`] back to the owning layer over a channel. The
//! layer drains that channel on its own thread and checks each response's
//! generation before touching the tile.

use crate::layers::tile::TileId;
use crate::prelude::{Arc, Mutex, VecDeque};
use crossbeam_channel::Sender;
use once_cell::sync::Lazy;

/// Why a tile request failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("server answered with HTTP {0}")]
    Http(u16),
    #[error("network error: {0}")]
    Network(String),
    #[error("request cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => FetchError::Http(status.as_u16()),
            None => FetchError::Network(err.to_string()),
        }
    }
}

pub type FetchResult = std::result::Result<Arc<Vec<u8>>, FetchError>;

/// A finished request, routed back to the layer that issued it
#[derive(Debug, Clone)]
pub struct TileResponse {
    pub tile: TileId,
    pub generation: u64,
    pub url: String,
    pub result: FetchResult,
}

/// One-shot completion handle for an issued tile request
#[derive(Debug)]
pub struct TileCompletion {
    tile: TileId,
    generation: u64,
    url: String,
    tx: Sender<TileResponse>,
}

impl TileCompletion {
    pub(crate) fn new(tile: TileId, generation: u64, url: String, tx: Sender<TileResponse>) -> Self {
        Self {
            tile,
            generation,
            url,
            tx,
        }
    }

    pub fn tile(&self) -> TileId {
        self.tile
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn complete(self, result: FetchResult) {
        let response = TileResponse {
            tile: self.tile,
            generation: self.generation,
            url: self.url,
            result,
        };
        if self.tx.send(response).is_err() {
            log::trace!("layer went away before {} completed", self.tile);
        }
    }

    pub fn succeed(self, data: Vec<u8>) {
        self.complete(Ok(Arc::new(data)));
    }

    pub fn fail(self, error: FetchError) {
        self.complete(Err(error));
    }
}

/// Fetches tile bytes for a URL and completes the request when done
///
/// Implementations must not block; completions may arrive in any order.
pub trait TileFetcher: Send + Sync {
    fn fetch(&self, completion: TileCompletion);
}

/// Fetcher that only queues requests; the host completes them by hand
///
/// Useful for hosts with their own I/O loop and for tests. Clones share the
/// same queue.
#[derive(Debug, Clone, Default)]
pub struct QueuedFetcher {
    queue: Arc<Mutex<VecDeque<TileCompletion>>>,
}

impl QueuedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn pending_urls(&self) -> Vec<String> {
        self.queue
            .lock()
            .map(|q| q.iter().map(|c| c.url.clone()).collect())
            .unwrap_or_default()
    }

    /// Oldest queued request
    pub fn take_next(&self) -> Option<TileCompletion> {
        self.queue.lock().ok()?.pop_front()
    }

    /// Oldest queued request for `url`
    pub fn take_url(&self, url: &str) -> Option<TileCompletion> {
        let mut queue = self.queue.lock().ok()?;
        let index = queue.iter().position(|c| c.url == url)?;
        queue.remove(index)
    }

    pub fn take_all(&self) -> Vec<TileCompletion> {
        self.queue
            .lock()
            .map(|mut q| q.drain(..).collect())
            .unwrap_or_default()
    }

    /// Completes every queued request with `respond(url)`, returning how many
    pub fn complete_all<F>(&self, respond: F) -> usize
    where
        F: Fn(&str) -> FetchResult,
    {
        let pending = self.take_all();
        let count = pending.len();
        for completion in pending {
            let result = respond(completion.url());
            completion.complete(result);
        }
        count
    }
}

impl TileFetcher for QueuedFetcher {
    fn fetch(&self, completion: TileCompletion) {
        match self.queue.lock() {
            Ok(mut queue) => queue.push_back(completion),
            Err(_) => completion.fail(FetchError::Cancelled),
        }
    }
}

/// Asynchronous byte source used by [`SpawnFetcher`]
#[async_trait::async_trait]
pub trait AsyncTileSource: Send + Sync + 'static {
    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError>;
}

/// Shared async HTTP client for tile fetching
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(concat!("tessera/", env!("CARGO_PKG_VERSION")))
        .tcp_keepalive(std::time::Duration::from_secs(30))
        .pool_idle_timeout(std::time::Duration::from_secs(90))
        .pool_max_idle_per_host(16)
        .build()
        .unwrap_or_else(|err| {
            log::warn!("falling back to a default HTTP client: {}", err);
            reqwest::Client::new()
        })
});

/// HTTP(S) byte source, on the shared client unless given its own
#[derive(Debug, Clone)]
pub struct HttpSource {
    timeout: std::time::Duration,
    client: Option<reqwest::Client>,
}

impl HttpSource {
    pub fn new(timeout: std::time::Duration) -> Self {
        Self {
            timeout,
            client: None,
        }
    }

    /// A source with a dedicated client identifying itself as `user_agent`
    pub fn with_user_agent(user_agent: &str, timeout: std::time::Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .tcp_keepalive(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            timeout,
            client: Some(client),
        })
    }

    fn client(&self) -> &reqwest::Client {
        self.client.as_ref().unwrap_or(&HTTP_CLIENT)
    }
}

impl Default for HttpSource {
    fn default() -> Self {
        Self::new(std::time::Duration::from_secs(10))
    }
}

#[async_trait::async_trait]
impl AsyncTileSource for HttpSource {
    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
        let response = self
            .client()
            .get(url)
            .timeout(self.timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FetchError::Http(response.status().as_u16()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Fetcher that spawns one task per request on a tokio runtime
#[cfg(feature = "tokio-runtime")]
pub struct SpawnFetcher<S: AsyncTileSource> {
    source: Arc<S>,
    handle: tokio::runtime::Handle,
}

#[cfg(feature = "tokio-runtime")]
impl<S: AsyncTileSource> SpawnFetcher<S> {
    pub fn new(source: S, handle: tokio::runtime::Handle) -> Self {
        Self {
            source: Arc::new(source),
            handle,
        }
    }

    /// Spawns onto the runtime the caller is running in
    pub fn current(source: S) -> crate::Result<Self> {
        let handle = tokio::runtime::Handle::try_current().map_err(|err| {
            crate::MapError::InvalidConfig(format!("no tokio runtime for tile fetching: {}", err))
        })?;
        Ok(Self::new(source, handle))
    }
}

#[cfg(feature = "tokio-runtime")]
impl<S: AsyncTileSource> TileFetcher for SpawnFetcher<S> {
    fn fetch(&self, completion: TileCompletion) {
        let source = self.source.clone();
        self.handle.spawn(async move {
            let url = completion.url().to_string();
            let result = source.fetch(&url).await.map(Arc::new);
            if let Err(err) = &result {
                log::debug!("fetch of {} failed: {}", url, err);
            }
            completion.complete(result);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_completion_sends_response() {
        let (tx, rx) = unbounded();
        let completion = TileCompletion::new(TileId(4), 2, "u".to_string(), tx);
        completion.succeed(vec![9]);
        let response = rx.try_recv().unwrap();
        assert_eq!(response.tile, TileId(4));
        assert_eq!(response.generation, 2);
        assert_eq!(response.result.unwrap().as_slice(), &[9]);
    }

    #[test]
    fn test_http_source_user_agent() {
        let timeout = std::time::Duration::from_secs(5);
        assert!(HttpSource::with_user_agent("tessera-test/1.0", timeout).is_ok());
        let bad = HttpSource::with_user_agent("bad\nagent", timeout);
        assert!(matches!(bad, Err(crate::MapError::Network(_))));
    }

    #[test]
    fn test_completion_after_receiver_dropped() {
        let (tx, rx) = unbounded();
        drop(rx);
        TileCompletion::new(TileId(1), 1, "u".to_string(), tx).fail(FetchError::Cancelled);
    }

    #[test]
    fn test_queued_fetcher() {
        let (tx, rx) = unbounded();
        let fetcher = QueuedFetcher::new();
        fetcher.fetch(TileCompletion::new(TileId(1), 1, "a".to_string(), tx.clone()));
        fetcher.fetch(TileCompletion::new(TileId(2), 1, "b".to_string(), tx));
        assert_eq!(fetcher.pending_urls(), vec!["a".to_string(), "b".to_string()]);

        fetcher.take_url("b").unwrap().fail(FetchError::Http(404));
        assert_eq!(fetcher.pending_count(), 1);
        assert_eq!(fetcher.complete_all(|_| Ok(Arc::new(vec![]))), 1);

        let results: Vec<_> = rx.try_iter().collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].result, Err(FetchError::Http(404)));
        assert!(results[1].result.is_ok());
    }

    struct EchoSource;

    #[async_trait::async_trait]
    impl AsyncTileSource for EchoSource {
        async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
            match url {
                "missing" => Err(FetchError::Http(404)),
                _ => Ok(url.as_bytes().to_vec()),
            }
        }
    }

    #[test]
    fn test_async_source_contract() {
        let source = EchoSource;
        let bytes = futures::executor::block_on(source.fetch("1/0/0")).unwrap();
        assert_eq!(bytes, b"1/0/0".to_vec());
        let missing = futures::executor::block_on(source.fetch("missing"));
        assert_eq!(missing, Err(FetchError::Http(404)));
    }
}
