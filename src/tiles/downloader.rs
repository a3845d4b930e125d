use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::core::geo::TileCoord;
use crate::Result;

/// Single best-effort attempt per tile; a timed-out fetch is simply dropped.
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared blocking HTTP client with a custom User-Agent so that public tile
/// servers (e.g. OpenStreetMap) don't reject the request. Building the client
/// once avoids the cost of TLS and connection pool setup for every tile.
pub(crate) static HTTP_CLIENT: Lazy<reqwest::blocking::Client> = Lazy::new(|| {
    reqwest::blocking::Client::builder()
        .user_agent("tilekit/0.1 (+https://github.com/PoHsuanLai/tilekit)")
        .timeout(FETCH_TIMEOUT)
        .build()
        .expect("failed to build reqwest blocking client")
});

/// Fetches raw tile bytes for a URL.
///
/// The seam between the downloader and the network: production uses
/// [`HttpBackend`], tests inject a fake.
pub trait FetchBackend: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Backend that performs a real HTTP GET through the shared client
pub struct HttpBackend;

impl FetchBackend for HttpBackend {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let resp = HTTP_CLIENT.get(url).send()?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()).into());
        }
        Ok(resp.bytes()?.to_vec())
    }
}

/// Configuration for the tile downloader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloaderConfig {
    /// Number of worker threads. Two serializes network load enough to stay
    /// polite to public tile servers while hiding fetch latency.
    pub workers: usize,
    /// Root directory of the on-disk tile cache, created on first use
    pub cache_dir: PathBuf,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            cache_dir: PathBuf::from("cache"),
        }
    }
}

/// A fetch job handed to a worker
struct FetchJob {
    coord: TileCoord,
    url: String,
    cache_path: PathBuf,
}

/// A successfully resolved tile: its coordinate and local cache path
#[derive(Debug, Clone)]
pub struct TileCompletion {
    pub coord: TileCoord,
    pub path: PathBuf,
}

/// Bounded-concurrency tile fetch service.
///
/// A small fixed pool of worker threads pulls jobs from a shared queue. A
/// worker first probes the disk cache and completes immediately on a hit;
/// otherwise it fetches the URL once, writes the bytes to the cache file, and
/// reports the path. Failures are logged and swallowed — the tile simply
/// never completes. Completions accumulate in a channel until the consumer
/// drains them; [`Downloader::drain`] never blocks.
///
/// Workers exit when the `Downloader` is dropped and the job queue
/// disconnects. In-flight requests run to completion; their results are
/// discarded by the consumer's stale-completion guard.
pub struct Downloader {
    job_tx: Sender<FetchJob>,
    result_rx: Receiver<TileCompletion>,
    config: DownloaderConfig,
}

impl Downloader {
    /// Create a downloader fetching over HTTP
    pub fn new(config: DownloaderConfig) -> Self {
        Self::with_backend(config, Arc::new(HttpBackend))
    }

    /// Create a downloader with an injected fetch backend
    pub fn with_backend(config: DownloaderConfig, backend: Arc<dyn FetchBackend>) -> Self {
        if let Err(e) = fs::create_dir_all(&config.cache_dir) {
            log::warn!("could not create cache dir {:?}: {}", config.cache_dir, e);
        }

        let (job_tx, job_rx) = unbounded::<FetchJob>();
        let (result_tx, result_rx) = unbounded();

        for _ in 0..config.workers.max(1) {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let backend = Arc::clone(&backend);
            thread::spawn(move || worker_loop(job_rx, result_tx, backend));
        }

        Self {
            job_tx,
            result_rx,
            config,
        }
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    pub fn cache_dir(&self) -> &Path {
        &self.config.cache_dir
    }

    /// Queue a tile fetch. The URL must already be formatted for the
    /// provider's conventions; `cache_path` is where the bytes land.
    pub fn submit(&self, coord: TileCoord, url: String, cache_path: PathBuf) {
        let _ = self.job_tx.send(FetchJob {
            coord,
            url,
            cache_path,
        });
    }

    /// Collect completed jobs without blocking. Safe to call on every frame;
    /// returns whatever has finished since the last call, in completion
    /// order (which carries no ordering guarantee between tiles).
    pub fn drain(&self) -> Vec<TileCompletion> {
        self.result_rx.try_iter().collect()
    }
}

fn worker_loop(
    job_rx: Receiver<FetchJob>,
    result_tx: Sender<TileCompletion>,
    backend: Arc<dyn FetchBackend>,
) {
    for job in job_rx.iter() {
        match resolve_job(&*backend, &job) {
            Ok(path) => {
                let _ = result_tx.send(TileCompletion {
                    coord: job.coord,
                    path,
                });
            }
            Err(e) => log::warn!("tile {:?} fetch failed: {}", job.coord, e),
        }
    }
}

fn resolve_job(backend: &dyn FetchBackend, job: &FetchJob) -> Result<PathBuf> {
    if job.cache_path.exists() {
        return Ok(job.cache_path.clone());
    }

    let bytes = backend.fetch(&job.url)?;
    if let Some(parent) = job.cache_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&job.cache_path, &bytes)?;
    log::debug!("downloaded tile {:?} ({} bytes)", job.coord, bytes.len());
    Ok(job.cache_path.clone())
}
