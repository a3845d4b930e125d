use serde::{Deserialize, Serialize};

/// Valid geographic coordinate range. Projection inputs are clamped into
/// this range rather than rejected, so panning past the map edge degrades
/// gracefully.
pub const MIN_LATITUDE: f64 = -90.0;
pub const MAX_LATITUDE: f64 = 90.0;
pub const MIN_LONGITUDE: f64 = -180.0;
pub const MAX_LONGITUDE: f64 = 180.0;

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Validates that the coordinates are within valid ranges
    pub fn is_valid(&self) -> bool {
        self.lat >= MIN_LATITUDE
            && self.lat <= MAX_LATITUDE
            && self.lng >= MIN_LONGITUDE
            && self.lng <= MAX_LONGITUDE
    }

    /// Returns the coordinate clamped into the valid geographic range
    pub fn clamped(&self) -> Self {
        Self {
            lat: self.lat.clamp(MIN_LATITUDE, MAX_LATITUDE),
            lng: self.lng.clamp(MIN_LONGITUDE, MAX_LONGITUDE),
        }
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Represents a point in screen or projected pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(&self, other: &Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn subtract(&self, other: &Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn multiply(&self, scalar: f64) -> Point {
        Point::new(self.x * scalar, self.y * scalar)
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Represents a tile coordinate in the slippy map tile pyramid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileCoord {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Checks that the column and row exist at this zoom level
    pub fn is_valid(&self) -> bool {
        let max_coord = if self.z == 0 { 1 } else { 2_u32.pow(self.z as u32) };
        self.x < max_coord && self.y < max_coord
    }
}
