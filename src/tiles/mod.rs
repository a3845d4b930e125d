pub mod downloader;
pub mod source;

use std::path::PathBuf;

use crate::core::geo::{Point, TileCoord};

/// Lifecycle of a tile in the active viewport set.
///
/// Transitions are monotonic: `Pending -> Loading -> Done`. A tile that is
/// already `Done` never goes back; late completions for it are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    /// Created by a visibility pass, not yet handed to the fetch service
    Pending,
    /// Submitted to the fetch service, waiting for a completion
    Loading,
    /// Content resolved (or the tile was evicted and terminated)
    Done,
}

/// A tile tracked by the active viewport set.
///
/// Identity is the coordinate; the screen position is derived from it and
/// owned by the viewport manager, never touched by the fetch path.
#[derive(Debug, Clone)]
pub struct Tile {
    pub coord: TileCoord,
    pub state: TileState,
    pub screen_position: Point,
    /// Local cache file path, set once content is available
    pub source_path: Option<PathBuf>,
}

impl Tile {
    pub fn new(coord: TileCoord, tile_size: u32) -> Self {
        Self {
            coord,
            state: TileState::Pending,
            screen_position: Point::new(
                coord.x as f64 * tile_size as f64,
                coord.y as f64 * tile_size as f64,
            ),
            source_path: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == TileState::Done
    }
}
