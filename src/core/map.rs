use std::path::PathBuf;
use std::sync::Arc;

use fxhash::FxHashSet;

use crate::core::geo::{LatLng, Point, TileCoord, MAX_LATITUDE, MAX_LONGITUDE, MIN_LATITUDE, MIN_LONGITUDE};
use crate::tiles::downloader::{Downloader, DownloaderConfig};
use crate::tiles::source::{MapSource, MapSourceConfig};
use crate::tiles::{Tile, TileState};
use crate::Result;

/// A tile whose content just became available, for the external renderer to
/// paint at `screen_position` in map pixel space
#[derive(Debug, Clone)]
pub struct ReadyTile {
    pub coord: TileCoord,
    pub screen_position: Point,
    pub path: PathBuf,
}

/// Half-open rectangle of visible tile indices at one zoom level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TileRect {
    pub x_first: u32,
    pub x_last: u32,
    pub y_first: u32,
    pub y_last: u32,
}

impl TileRect {
    fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x_first && x < self.x_last && y >= self.y_first && y < self.y_last
    }
}

/// Visits every cell of the rectangle exactly once, spiraling outward from
/// the approximate center in unit arms (right, down, left, up), the arm
/// growing by one every second turn. Cells the spiral wanders through
/// outside the rectangle are skipped.
///
/// The order prioritizes the tiles nearest the viewport center, which the
/// worker pool then fetches first.
pub(crate) fn spiral_order(rect: TileRect) -> Vec<(u32, u32)> {
    const DIRS: [i64; 5] = [0, 1, 0, -1, 0];

    let x_count = (rect.x_last - rect.x_first) as i64;
    let y_count = (rect.y_last - rect.y_first) as i64;
    let mut cells = Vec::with_capacity((x_count * y_count) as usize);

    let mut x = rect.x_first as i64 + x_count / 2 - 1;
    let mut y = rect.y_first as i64 + y_count / 2 - 1;
    let arm_max = x_count.max(y_count) + 2;
    let mut arm_size = 1;
    let mut turn = 0;

    while arm_size < arm_max {
        for _ in 0..arm_size {
            if x >= rect.x_first as i64
                && x < rect.x_last as i64
                && y >= rect.y_first as i64
                && y < rect.y_last as i64
            {
                cells.push((x as u32, y as u32));
            }

            x += DIRS[turn % 4 + 1];
            y += DIRS[turn % 4];
        }

        if turn % 2 == 1 {
            arm_size += 1;
        }

        turn += 1;
    }

    cells
}

/// The viewport tile manager and composition root.
///
/// Owns the map source, the fetch service, the viewport state, and the
/// active tile set for the current zoom level. All methods run on the
/// consumer (render/interaction) thread and never block; the only handoff
/// from the worker pool is [`MapView::drain`].
pub struct MapView {
    source: Arc<MapSource>,
    downloader: Downloader,
    zoom: u8,
    viewport_x: f64,
    viewport_y: f64,
    width: f64,
    height: f64,
    lat: f64,
    lng: f64,
    /// Active tiles, valid for the current zoom only
    tiles: Vec<Tile>,
    /// Row-major keys (`y * col_count + x`) of the active tiles
    tile_map: FxHashSet<u64>,
    /// Cache hits resolved synchronously, delivered on the next drain
    ready: Vec<ReadyTile>,
}

impl MapView {
    /// Create a view fetching over HTTP
    pub fn new(
        config: MapSourceConfig,
        downloader_config: DownloaderConfig,
        zoom: u8,
        width: f64,
        height: f64,
    ) -> Result<Self> {
        Self::with_downloader(config, Downloader::new(downloader_config), zoom, width, height)
    }

    /// Create a view around an explicitly constructed downloader
    pub fn with_downloader(
        config: MapSourceConfig,
        downloader: Downloader,
        zoom: u8,
        width: f64,
        height: f64,
    ) -> Result<Self> {
        let source = config.resolve()?;
        let zoom = source.clamp_zoom(zoom);

        let mut view = Self {
            source: Arc::new(source),
            downloader,
            zoom,
            viewport_x: 0.0,
            viewport_y: 0.0,
            width,
            height,
            lat: 0.0,
            lng: 0.0,
            tiles: Vec::new(),
            tile_map: FxHashSet::default(),
            ready: Vec::new(),
        };
        view.update_coords(0.0, 0.0);
        view.load_visible_tiles(false);
        Ok(view)
    }

    // Public API

    /// Center the map on the coordinate `(lat, lng)`
    pub fn center_on(&mut self, lat: f64, lng: f64) {
        let lat = lat.clamp(MIN_LATITUDE, MAX_LATITUDE);
        let lng = lng.clamp(MIN_LONGITUDE, MAX_LONGITUDE);
        let x = self.source.pixel_x(self.zoom, lng) - self.width / 2.0;
        let y = self.source.pixel_y(self.zoom, lat) - self.height / 2.0;
        self.update_coords(x, y);
        self.remove_all_tiles();
        self.load_visible_tiles(false);
    }

    /// Set the zoom level, leaving the geographic point under `(x, y)` at
    /// the exact same position in the view.
    ///
    /// Row/column numbering is zoom-specific, so the active set is
    /// invalidated wholesale.
    pub fn set_zoom_at(&mut self, zoom: u8, x: f64, y: f64) {
        let zoom = self.source.clamp_zoom(zoom);
        if zoom == self.zoom {
            return;
        }

        let delta_zoom = 2_f64.powi(zoom as i32 - self.zoom as i32);
        let nx = (self.viewport_x + x) * delta_zoom - x;
        let ny = (self.viewport_y + y) * delta_zoom - y;

        self.zoom = zoom;
        self.update_coords(nx, ny);
        self.remove_all_tiles();
        self.load_visible_tiles(false);
    }

    /// Shift the viewport offset by `(dx, dy)` pixels
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.update_coords(self.viewport_x + dx, self.viewport_y + dy);
        self.load_visible_tiles(true);
    }

    /// Resize the visible area, keeping the geographic center fixed
    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
        let (lat, lng) = (self.lat, self.lng);
        self.center_on(lat, lng);
    }

    /// Clear the active tile set. Neither the disk cache nor in-flight
    /// fetch jobs are affected; late completions are discarded on drain.
    pub fn unload(&mut self) {
        self.remove_all_tiles();
    }

    /// Swap the map source at runtime; invalidates the active set
    pub fn set_map_source(&mut self, config: MapSourceConfig) -> Result<()> {
        let source = config.resolve()?;
        self.zoom = source.clamp_zoom(self.zoom);
        self.source = Arc::new(source);
        self.remove_all_tiles();
        self.load_visible_tiles(false);
        Ok(())
    }

    /// Collect the tiles that became ready since the last call, matching
    /// fetch completions against the active set. Non-blocking; meant to run
    /// on a fixed cadence (e.g. once per frame).
    pub fn drain(&mut self) -> Vec<ReadyTile> {
        let mut ready = std::mem::take(&mut self.ready);

        for completion in self.downloader.drain() {
            // Stale guard: the tile may have been evicted or the zoom may
            // have changed while the fetch was in flight
            let tile = self
                .tiles
                .iter_mut()
                .find(|tile| tile.coord == completion.coord);
            match tile {
                Some(tile) if tile.state == TileState::Loading => {
                    tile.state = TileState::Done;
                    tile.source_path = Some(completion.path.clone());
                    ready.push(ReadyTile {
                        coord: tile.coord,
                        screen_position: tile.screen_position,
                        path: completion.path,
                    });
                }
                _ => log::debug!("discarding stale completion for {:?}", completion.coord),
            }
        }

        ready
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// The geographic coordinate at the viewport center
    pub fn center(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }

    /// The viewport offset in map pixel space at the current zoom
    pub fn viewport_offset(&self) -> Point {
        Point::new(self.viewport_x, self.viewport_y)
    }

    pub fn viewport_size(&self) -> Point {
        Point::new(self.width, self.height)
    }

    /// The active tile set, for the external renderer to walk
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn map_source(&self) -> &MapSource {
        &self.source
    }

    pub fn attribution(&self) -> &str {
        &self.source.attribution
    }

    // Private API

    fn update_coords(&mut self, x: f64, y: f64) {
        self.viewport_x = x;
        self.viewport_y = y;
        self.lng = self.source.lng_from_pixel(self.zoom, x + self.width / 2.0);
        self.lat = self.source.lat_from_pixel(self.zoom, y + self.height / 2.0);
    }

    fn tile_key(&self, x: u32, y: u32) -> u64 {
        y as u64 * self.source.col_count(self.zoom) as u64 + x as u64
    }

    fn visible_rect(&self) -> TileRect {
        let size = self.source.tile_size as f64;
        let max_x = self.source.col_count(self.zoom);
        let max_y = self.source.row_count(self.zoom);

        // One extra row and column of margin avoids visible gaps while the
        // offset sits between tile boundaries
        let x_count = (self.width / size).ceil() as u32 + 1;
        let y_count = (self.height / size).ceil() as u32 + 1;

        let x_first = (self.viewport_x / size).clamp(0.0, max_x as f64) as u32;
        let y_first = (self.viewport_y / size).clamp(0.0, max_y as f64) as u32;

        TileRect {
            x_first,
            x_last: (x_first + x_count).min(max_x),
            y_first,
            y_last: (y_first + y_count).min(max_y),
        }
    }

    fn load_visible_tiles(&mut self, relocate: bool) {
        let rect = self.visible_rect();
        let size = self.source.tile_size as f64;
        let col_count = self.source.col_count(self.zoom) as u64;

        // Get rid of old tiles first
        let tile_map = &mut self.tile_map;
        self.tiles.retain_mut(|tile| {
            let TileCoord { x, y, .. } = tile.coord;
            if !rect.contains(x, y) {
                tile.state = TileState::Done;
                tile_map.remove(&(y as u64 * col_count + x as u64));
                false
            } else {
                if relocate {
                    tile.screen_position = Point::new(x as f64 * size, y as f64 * size);
                }
                true
            }
        });

        // Load new tiles if needed, nearest the viewport center first
        for (x, y) in spiral_order(rect) {
            if !self.tile_map.contains(&self.tile_key(x, y)) {
                self.load_tile(x, y);
            }
        }
    }

    fn load_tile(&mut self, x: u32, y: u32) {
        let coord = TileCoord::new(x, y, self.zoom);
        let mut tile = Tile::new(coord, self.source.tile_size);
        let cache_path = self.source.cache_path(self.downloader.cache_dir(), coord);

        if cache_path.exists() {
            tile.state = TileState::Done;
            tile.source_path = Some(cache_path.clone());
            self.ready.push(ReadyTile {
                coord,
                screen_position: tile.screen_position,
                path: cache_path,
            });
            log::debug!("tile {:?} resolved from cache", coord);
        } else {
            tile.state = TileState::Loading;
            self.downloader
                .submit(coord, self.source.tile_url(coord), cache_path);
        }

        self.tile_map.insert(self.tile_key(x, y));
        self.tiles.push(tile);
    }

    fn remove_all_tiles(&mut self) {
        for tile in &mut self.tiles {
            tile.state = TileState::Done;
        }
        self.tiles.clear();
        self.tile_map.clear();
        self.ready.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::downloader::FetchBackend;
    use std::collections::HashSet;
    use std::path::Path;

    /// Backend for tests that never resolves a fetch
    struct NullBackend;

    impl FetchBackend for NullBackend {
        fn fetch(&self, _url: &str) -> crate::Result<Vec<u8>> {
            Err("no network in tests".into())
        }
    }

    fn test_view(cache_dir: &Path, zoom: u8, width: f64, height: f64) -> MapView {
        let downloader = Downloader::with_backend(
            DownloaderConfig {
                workers: 1,
                cache_dir: cache_dir.to_path_buf(),
            },
            Arc::new(NullBackend),
        );
        MapView::with_downloader(MapSourceConfig::default(), downloader, zoom, width, height)
            .unwrap()
    }

    fn tile_coords(view: &MapView) -> HashSet<(u32, u32)> {
        view.tiles().iter().map(|t| (t.coord.x, t.coord.y)).collect()
    }

    #[test]
    fn test_visible_rectangle_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let view = test_view(dir.path(), 5, 800.0, 600.0);

        // ceil(800/256)+1 = 5 columns, ceil(600/256)+1 = 4 rows
        assert_eq!(view.tiles().len(), 20);
        let coords = tile_coords(&view);
        for x in 0..5 {
            for y in 0..4 {
                assert!(coords.contains(&(x, y)), "missing tile ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn test_pan_evicts_out_of_range_columns() {
        let dir = tempfile::tempdir().unwrap();
        let mut view = test_view(dir.path(), 5, 800.0, 600.0);

        view.pan_by(300.0, 0.0);

        let coords = tile_coords(&view);
        assert!(coords.iter().all(|&(x, _)| x >= 1), "column 0 not evicted");
        assert!(coords.iter().any(|&(x, _)| x == 5), "column 5 not loaded");
        assert_eq!(view.tiles().len(), 20);
    }

    #[test]
    fn test_rect_stays_in_bounds_at_world_edges() {
        let dir = tempfile::tempdir().unwrap();

        // A viewport larger than the whole world at low zoom
        let view = test_view(dir.path(), 1, 800.0, 600.0);
        assert!(view.tiles().iter().all(|t| t.coord.is_valid()));
        assert_eq!(view.tiles().len(), 4);

        // Corners of the world
        let mut view = test_view(dir.path(), 5, 800.0, 600.0);
        for &(lat, lng) in &[(89.9, 179.9), (-89.9, -179.9), (90.0, 180.0), (-90.0, -180.0)] {
            view.center_on(lat, lng);
            assert!(
                view.tiles().iter().all(|t| t.coord.is_valid()),
                "out-of-range tile after center_on({}, {})",
                lat,
                lng
            );
        }
    }

    #[test]
    fn test_spiral_visits_every_cell_once() {
        for &(x_first, y_first, x_count, y_count) in &[
            (0, 0, 1, 1),
            (0, 0, 2, 2),
            (0, 0, 5, 4),
            (0, 0, 1, 10),
            (3, 7, 7, 3),
            (12, 2, 4, 4),
        ] {
            let rect = TileRect {
                x_first,
                x_last: x_first + x_count,
                y_first,
                y_last: y_first + y_count,
            };
            let cells = spiral_order(rect);

            assert_eq!(
                cells.len(),
                (x_count * y_count) as usize,
                "wrong cell count for {:?}",
                rect
            );
            let unique: HashSet<_> = cells.iter().collect();
            assert_eq!(unique.len(), cells.len(), "duplicate cells for {:?}", rect);
            assert!(
                cells.iter().all(|&(x, y)| rect.contains(x, y)),
                "cell outside {:?}",
                rect
            );
        }
    }

    #[test]
    fn test_spiral_starts_at_center() {
        let rect = TileRect {
            x_first: 0,
            x_last: 5,
            y_first: 0,
            y_last: 4,
        };
        assert_eq!(spiral_order(rect)[0], (1, 1));
    }

    #[test]
    fn test_center_on_matches_projection() {
        let dir = tempfile::tempdir().unwrap();
        let mut view = test_view(dir.path(), 5, 800.0, 600.0);

        view.center_on(50.6394, 3.057);

        let source = view.map_source();
        let expected_x = source.pixel_x(5, 3.057) - 400.0;
        let expected_y = source.pixel_y(5, 50.6394) - 300.0;
        let offset = view.viewport_offset();
        assert!((offset.x - expected_x).abs() < 1e-9);
        assert!((offset.y - expected_y).abs() < 1e-9);

        let center = view.center();
        assert!((center.lat - 50.6394).abs() < 1e-9);
        assert!((center.lng - 3.057).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_at_keeps_anchor_fixed() {
        let dir = tempfile::tempdir().unwrap();
        let mut view = test_view(dir.path(), 5, 800.0, 600.0);
        view.center_on(50.6394, 3.057);

        let (ax, ay) = (200.0, 150.0);
        let offset = view.viewport_offset();
        let source = view.map_source();
        let anchor_lng = source.lng_from_pixel(5, offset.x + ax);
        let anchor_lat = source.lat_from_pixel(5, offset.y + ay);

        view.set_zoom_at(6, ax, ay);
        assert_eq!(view.zoom(), 6);

        let offset = view.viewport_offset();
        let source = view.map_source();
        let sx = source.pixel_x(6, anchor_lng) - offset.x;
        let sy = source.pixel_y(6, anchor_lat) - offset.y;
        assert!((sx - ax).abs() < 1e-6, "anchor drifted horizontally: {}", sx);
        assert!((sy - ay).abs() < 1e-6, "anchor drifted vertically: {}", sy);
    }

    #[test]
    fn test_zoom_change_invalidates_active_set() {
        let dir = tempfile::tempdir().unwrap();
        let mut view = test_view(dir.path(), 5, 800.0, 600.0);
        view.center_on(50.6394, 3.057);

        view.set_zoom_at(6, 400.0, 300.0);
        assert!(view.tiles().iter().all(|t| t.coord.z == 6));

        // Same zoom is a no-op and keeps the set intact
        let before = view.tiles().len();
        view.set_zoom_at(6, 400.0, 300.0);
        assert_eq!(view.tiles().len(), before);
    }

    #[test]
    fn test_zoom_clamped_to_source_range() {
        let dir = tempfile::tempdir().unwrap();
        let mut view = test_view(dir.path(), 5, 800.0, 600.0);

        view.set_zoom_at(63, 400.0, 300.0);
        assert_eq!(view.zoom(), view.map_source().max_zoom);
    }

    #[test]
    fn test_cached_tiles_need_no_fetch() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingBackend(AtomicUsize);
        impl FetchBackend for CountingBackend {
            fn fetch(&self, _url: &str) -> crate::Result<Vec<u8>> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(vec![0])
            }
        }

        let dir = tempfile::tempdir().unwrap();
        // Pre-populate the disk cache for the whole visible rectangle
        for x in 0..5 {
            for y in 0..4 {
                std::fs::write(dir.path().join(format!("osm_5_{}_{}.png", x, y)), b"tile")
                    .unwrap();
            }
        }

        let backend = Arc::new(CountingBackend(AtomicUsize::new(0)));
        let downloader = Downloader::with_backend(
            DownloaderConfig {
                workers: 1,
                cache_dir: dir.path().to_path_buf(),
            },
            backend.clone(),
        );
        let mut view =
            MapView::with_downloader(MapSourceConfig::default(), downloader, 5, 800.0, 600.0)
                .unwrap();

        // Every tile resolved synchronously from the cache
        assert!(view.tiles().iter().all(|t| t.state == TileState::Done));
        assert_eq!(view.drain().len(), 20);
        assert_eq!(backend.0.load(Ordering::SeqCst), 0);

        // A repeated visibility pass issues no new work
        view.pan_by(0.0, 0.0);
        assert_eq!(view.tiles().len(), 20);
        assert!(view.drain().is_empty());
        assert_eq!(backend.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unload_clears_active_set_only() {
        let dir = tempfile::tempdir().unwrap();
        let cached = dir.path().join("osm_5_0_0.png");
        std::fs::write(&cached, b"tile").unwrap();

        let mut view = test_view(dir.path(), 5, 800.0, 600.0);
        assert!(!view.tiles().is_empty());

        view.unload();
        assert!(view.tiles().is_empty());
        assert!(view.drain().is_empty());
        assert!(cached.exists());
    }

    #[test]
    fn test_set_map_source_swaps_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let mut view = test_view(dir.path(), 19, 800.0, 600.0);
        assert_eq!(view.zoom(), 19);

        view.set_map_source(MapSourceConfig::Preset("osm-de".to_string()))
            .unwrap();
        // osm-de tops out at 18, so the zoom is re-clamped
        assert_eq!(view.zoom(), 18);
        assert_eq!(view.map_source().cache_key, "osm-de");
        assert!(view.tiles().iter().all(|t| t.coord.z == 18));

        assert!(view
            .set_map_source(MapSourceConfig::Preset("bogus".to_string()))
            .is_err());
    }

    #[test]
    fn test_resize_keeps_geographic_center() {
        let dir = tempfile::tempdir().unwrap();
        let mut view = test_view(dir.path(), 5, 800.0, 600.0);
        view.center_on(50.6394, 3.057);

        view.resize(1024.0, 768.0);

        let center = view.center();
        assert!((center.lat - 50.6394).abs() < 1e-9);
        assert!((center.lng - 3.057).abs() < 1e-9);
        assert_eq!(view.viewport_size(), Point::new(1024.0, 768.0));
    }
}
