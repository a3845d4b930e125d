//! # Tilekit
//!
//! A headless slippy-map tile engine.
//!
//! Tilekit does the hard parts of a pannable, zoomable raster map without
//! owning a pixel: Web Mercator projection between geographic and tile-pixel
//! space, viewport tile-set management (visibility, eviction, center-out
//! spiral load ordering, zoom-anchored re-centering), and a bounded worker
//! pool that resolves tiles from a local disk cache before reaching for the
//! network. Drawing is left to the embedding renderer, which consumes
//! `(coordinate, screen position, file path)` tuples drained from the view.

pub mod core;
pub mod tiles;

// Re-export public API
pub use crate::core::{
    geo::{LatLng, Point, TileCoord},
    map::{MapView, ReadyTile},
};

pub use crate::tiles::{
    downloader::{Downloader, DownloaderConfig, FetchBackend, HttpBackend},
    source::{MapSource, MapSourceConfig},
    Tile, TileState,
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Error type alias for convenience
pub type Error = MapError;
