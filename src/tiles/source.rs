use std::collections::HashMap;
use std::f64::consts::PI;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::core::geo::{TileCoord, MAX_LATITUDE, MAX_LONGITUDE, MIN_LATITUDE, MIN_LONGITUDE};
use crate::{MapError, Result};

/// A named tile-provider preset
struct Provider {
    min_zoom: u8,
    max_zoom: u8,
    url_template: &'static str,
    attribution: &'static str,
    /// One subdomain character per mirror host; `None` means the default "abc"
    subdomains: Option<&'static str>,
    image_ext: Option<&'static str>,
}

/// Registry of known tile providers, keyed by cache key.
///
/// More can be found at
/// https://github.com/leaflet-extras/leaflet-providers/blob/master/leaflet-providers.js
static PROVIDERS: Lazy<HashMap<&'static str, Provider>> = Lazy::new(|| {
    let simple: [(&str, u8, u8, &str, &str); 10] = [
        (
            "osm",
            0,
            19,
            "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png",
            "",
        ),
        (
            "osm-hot",
            0,
            19,
            "https://{s}.tile.openstreetmap.fr/hot/{z}/{x}/{y}.png",
            "",
        ),
        (
            "osm-de",
            0,
            18,
            "https://{s}.tile.openstreetmap.de/tiles/osmde/{z}/{x}/{y}.png",
            "Tiles @ OSM DE",
        ),
        (
            "osm-fr",
            0,
            20,
            "https://{s}.tile.openstreetmap.fr/osmfr/{z}/{x}/{y}.png",
            "Tiles @ OSM France",
        ),
        (
            "cyclemap",
            0,
            17,
            "http://{s}.tile.opencyclemap.org/cycle/{z}/{x}/{y}.png",
            "Tiles @ Andy Allan",
        ),
        (
            "openseamap",
            0,
            19,
            "http://tiles.openseamap.org/seamark/{z}/{x}/{y}.png",
            "Map data @ OpenSeaMap contributors",
        ),
        (
            "thunderforest-cycle",
            0,
            19,
            "http://{s}.tile.thunderforest.com/cycle/{z}/{x}/{y}.png",
            "@ OpenCycleMap via OpenStreetMap",
        ),
        (
            "thunderforest-transport",
            0,
            19,
            "http://{s}.tile.thunderforest.com/transport/{z}/{x}/{y}.png",
            "@ OpenCycleMap via OpenStreetMap",
        ),
        (
            "thunderforest-landscape",
            0,
            19,
            "http://{s}.tile.thunderforest.com/landscape/{z}/{x}/{y}.png",
            "@ OpenCycleMap via OpenStreetMap",
        ),
        (
            "thunderforest-outdoors",
            0,
            19,
            "http://{s}.tile.thunderforest.com/outdoors/{z}/{x}/{y}.png",
            "@ OpenCycleMap via OpenStreetMap",
        ),
    ];

    let mut providers: HashMap<&'static str, Provider> = simple
        .into_iter()
        .map(|(key, min_zoom, max_zoom, url_template, attribution)| {
            (
                key,
                Provider {
                    min_zoom,
                    max_zoom,
                    url_template,
                    attribution,
                    subdomains: None,
                    image_ext: None,
                },
            )
        })
        .collect();

    providers.insert(
        "mapquest-osm",
        Provider {
            min_zoom: 0,
            max_zoom: 19,
            url_template: "http://otile{s}.mqcdn.com/tiles/1.0.0/map/{z}/{x}/{y}.jpeg",
            attribution: "Tiles Courtesy of Mapquest",
            subdomains: Some("1234"),
            image_ext: Some("jpeg"),
        },
    );
    providers.insert(
        "mapquest-aerial",
        Provider {
            min_zoom: 0,
            max_zoom: 19,
            url_template: "http://oatile{s}.mqcdn.com/tiles/1.0.0/sat/{z}/{x}/{y}.jpeg",
            attribution: "Tiles Courtesy of Mapquest",
            subdomains: Some("1234"),
            image_ext: Some("jpeg"),
        },
    );

    providers
});

fn default_subdomains() -> Vec<String> {
    vec!["a".to_string(), "b".to_string(), "c".to_string()]
}

/// An immutable tile source: provider configuration plus the pure projection
/// functions between geographic coordinates and map pixel space.
///
/// `(0, 0)` in pixel space is the top-left of the map; y grows downward while
/// latitude grows upward, hence the sign flip inside [`MapSource::pixel_y`].
/// All projection functions clamp geographic inputs and outputs into the
/// valid range instead of failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapSource {
    pub url_template: String,
    pub cache_key: String,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub tile_size: u32,
    pub image_ext: String,
    pub attribution: String,
    pub subdomains: Vec<String>,
}

impl Default for MapSource {
    fn default() -> Self {
        Self {
            url_template: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            cache_key: "osm".to_string(),
            min_zoom: 0,
            max_zoom: 19,
            tile_size: 256,
            image_ext: "png".to_string(),
            attribution: String::new(),
            subdomains: default_subdomains(),
        }
    }
}

impl MapSource {
    /// Looks up a provider preset by its cache key
    pub fn from_provider(key: &str) -> Result<Self> {
        let provider = PROVIDERS
            .get(key)
            .ok_or_else(|| MapError::Config(format!("unknown map source provider {:?}", key)))?;

        Ok(Self {
            url_template: provider.url_template.to_string(),
            cache_key: key.to_string(),
            min_zoom: provider.min_zoom,
            max_zoom: provider.max_zoom,
            tile_size: 256,
            image_ext: provider.image_ext.unwrap_or("png").to_string(),
            attribution: provider.attribution.to_string(),
            subdomains: provider
                .subdomains
                .map(|s| s.chars().map(|c| c.to_string()).collect())
                .unwrap_or_else(default_subdomains),
        })
    }

    /// The names of all registered provider presets
    pub fn provider_keys() -> Vec<&'static str> {
        PROVIDERS.keys().copied().collect()
    }

    fn validate(self) -> Result<Self> {
        if self.min_zoom > self.max_zoom {
            return Err(MapError::Config(format!(
                "min_zoom {} exceeds max_zoom {}",
                self.min_zoom, self.max_zoom
            ))
            .into());
        }
        if self.max_zoom > 30 {
            return Err(MapError::Config(format!(
                "max_zoom {} exceeds the supported pyramid depth",
                self.max_zoom
            ))
            .into());
        }
        if self.tile_size == 0 {
            return Err(MapError::Config("tile_size must be positive".to_string()).into());
        }
        if self.subdomains.is_empty() {
            return Err(MapError::Config("subdomains must not be empty".to_string()).into());
        }
        Ok(self)
    }

    /// Get the x position on the map in this source's projection.
    /// Out-of-range longitudes are clamped to the map edge.
    pub fn pixel_x(&self, zoom: u8, lng: f64) -> f64 {
        let lng = lng.clamp(MIN_LONGITUDE, MAX_LONGITUDE);
        ((lng + 180.0) / 360.0 * 2_f64.powi(zoom as i32)) * self.tile_size as f64
    }

    /// Get the y position on the map in this source's projection.
    /// Out-of-range latitudes are clamped to the map edge.
    pub fn pixel_y(&self, zoom: u8, lat: f64) -> f64 {
        let lat = (-lat).clamp(MIN_LATITUDE, MAX_LATITUDE).to_radians();
        ((1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * 2_f64.powi(zoom as i32))
            * self.tile_size as f64
    }

    /// Get the longitude of an x position in this source's projection
    pub fn lng_from_pixel(&self, zoom: u8, x: f64) -> f64 {
        let dx = x / self.tile_size as f64;
        let lng = dx / 2_f64.powi(zoom as i32) * 360.0 - 180.0;
        lng.clamp(MIN_LONGITUDE, MAX_LONGITUDE)
    }

    /// Get the latitude of a y position in this source's projection
    pub fn lat_from_pixel(&self, zoom: u8, y: f64) -> f64 {
        let dy = y / self.tile_size as f64;
        let n = PI - 2.0 * PI * dy / 2_f64.powi(zoom as i32);
        let lat = -180.0 / PI * n.sinh().atan();
        lat.clamp(MIN_LATITUDE, MAX_LATITUDE)
    }

    /// The number of tile columns at this zoom level
    pub fn col_count(&self, zoom: u8) -> u32 {
        if zoom == 0 {
            1
        } else {
            2_u32.pow(zoom as u32)
        }
    }

    /// The number of tile rows at this zoom level
    pub fn row_count(&self, zoom: u8) -> u32 {
        self.col_count(zoom)
    }

    /// Clamps a zoom level into this source's valid range
    pub fn clamp_zoom(&self, zoom: u8) -> u8 {
        zoom.clamp(self.min_zoom, self.max_zoom)
    }

    /// Builds the request URL for a tile.
    ///
    /// The provider row convention indexes row 0 at the bottom of the map
    /// while the projection's row 0 is at the top, so the row is inverted
    /// here. The subdomain is picked deterministically from the coordinate to
    /// spread load across mirror hosts.
    pub fn tile_url(&self, coord: TileCoord) -> String {
        let provider_y = self.row_count(coord.z) - coord.y - 1;
        let idx = ((coord.x + coord.y) % self.subdomains.len() as u32) as usize;

        self.url_template
            .replace("{z}", &coord.z.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &provider_y.to_string())
            .replace("{s}", &self.subdomains[idx])
    }

    /// The cache file name for a tile, collision-free across distinct
    /// `(cache_key, z, x, y)` tuples
    pub fn cache_file_name(&self, coord: TileCoord) -> String {
        format!(
            "{}_{}_{}_{}.{}",
            self.cache_key, coord.z, coord.x, coord.y, self.image_ext
        )
    }

    /// The full local cache path for a tile under `cache_dir`
    pub fn cache_path(&self, cache_dir: &Path, coord: TileCoord) -> PathBuf {
        cache_dir.join(self.cache_file_name(coord))
    }
}

/// How to construct a [`MapSource`].
///
/// Resolved once at construction into a canonical source value; an
/// unrecognized preset key is a fatal configuration error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MapSourceConfig {
    /// A named preset from the provider registry
    Preset(String),
    /// An explicit provider definition
    Custom {
        cache_key: String,
        min_zoom: u8,
        max_zoom: u8,
        url_template: String,
        #[serde(default)]
        attribution: String,
        #[serde(default)]
        subdomains: Option<Vec<String>>,
        #[serde(default)]
        image_ext: Option<String>,
    },
    /// A fully-formed source value
    Source(MapSource),
}

impl MapSourceConfig {
    /// Resolves this configuration into a validated [`MapSource`]
    pub fn resolve(self) -> Result<MapSource> {
        match self {
            Self::Preset(key) => MapSource::from_provider(&key),
            Self::Custom {
                cache_key,
                min_zoom,
                max_zoom,
                url_template,
                attribution,
                subdomains,
                image_ext,
            } => MapSource {
                url_template,
                cache_key,
                min_zoom,
                max_zoom,
                tile_size: 256,
                image_ext: image_ext.unwrap_or_else(|| "png".to_string()),
                attribution,
                subdomains: subdomains.unwrap_or_else(default_subdomains),
            }
            .validate(),
            Self::Source(source) => source.validate(),
        }
    }
}

impl Default for MapSourceConfig {
    fn default() -> Self {
        Self::Source(MapSource::default())
    }
}
