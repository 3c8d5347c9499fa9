//! Build configuration.
//!
//! Everything region-specific lives here rather than in the engine:
//! geographic bounds, grid dimensions, reservoir and lake boxes, the name
//! variants of the designated major river, always-shallow sea regions and
//! the landmark validation table. Defaults target the Ukraine map the
//! pipeline was first tuned for; callers retarget by deserializing a
//! different JSON file.

use serde::{Deserialize, Serialize};

use crate::error::MapError;
use crate::geo::GeoBounds;
use crate::sources::GeoBox;

/// A named geographic point with expected elevation, checked informationally
/// after quantization.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Landmark {
    pub name: String,
    pub lon: f64,
    pub lat: f64,
    pub expected_meters: (f32, f32),
    pub expected_level: (i8, i8),
}

impl Landmark {
    fn new(
        name: &str,
        lon: f64,
        lat: f64,
        expected_meters: (f32, f32),
        expected_level: (i8, i8),
    ) -> Self {
        Self {
            name: name.to_string(),
            lon,
            lat,
            expected_meters,
            expected_level,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub bounds: GeoBounds,
    pub width: usize,
    pub height: usize,

    /// Central meridian of the metric projection, degrees east.
    pub central_meridian_deg: f64,

    /// Level assigned to NODATA and otherwise unclassifiable samples.
    pub ocean_default_level: i8,
    /// Distance-to-land (hex steps) at or below which ocean is shallow.
    pub shallow_water_distance: u32,
    /// Distance-to-land at or below which ocean is medium depth.
    pub medium_water_distance: u32,
    /// Adjacent land above this raw elevation (meters) demotes shallow
    /// water to medium.
    pub cliff_elevation_m: f32,
    /// Regions that are always shallow regardless of distance to land.
    pub always_shallow: Vec<GeoBox>,

    /// Land hexes with NODATA elevation above this fraction abort the build.
    pub max_nodata_fraction: f64,

    /// Name variants identifying the designated major watercourse.
    pub major_river_names: Vec<String>,
    /// Reservoir boxes: rasterized river hexes inside become lake terrain.
    pub reservoirs: Vec<GeoBox>,
    /// Natural lake boxes: all contained land hexes become lake terrain.
    pub lakes: Vec<GeoBox>,
    /// Connected river components smaller than this are discarded as noise.
    pub min_river_component: usize,
    /// Maximum endpoint gap (hex steps) bridged during river repair.
    pub max_river_gap: u32,

    /// Biome variant used when no biome source value is available
    /// (7 = temperate).
    pub default_biome_variant: u8,
    /// Terrain type names in target-artifact index order.
    pub terrain_order: Vec<String>,

    /// Informational elevation checks; never abort the run.
    pub landmarks: Vec<Landmark>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            bounds: GeoBounds {
                min_lon: 22.0,
                max_lon: 40.5,
                min_lat: 44.0,
                max_lat: 52.5,
            },
            width: 150,
            height: 88,
            // UTM zone 36N central meridian.
            central_meridian_deg: 33.0,

            ocean_default_level: -2,
            shallow_water_distance: 3,
            medium_water_distance: 6,
            cliff_elevation_m: 100.0,
            always_shallow: vec![GeoBox::new("Sea of Azov", 34.5, 45.0, 39.5, 47.5)],

            max_nodata_fraction: 0.5,

            major_river_names: vec![
                "Dnieper".into(),
                "Dnipro".into(),
                "Dnepr".into(),
                "Dniepr".into(),
                "Дніпро".into(),
                "Днепр".into(),
                "Дняпро".into(),
            ],
            reservoirs: vec![
                GeoBox::new("Kyiv", 30.0, 50.35, 31.2, 51.4),
                GeoBox::new("Kaniv", 31.2, 49.55, 31.7, 50.35),
                GeoBox::new("Kremenchuk", 32.0, 48.85, 33.8, 49.55),
                GeoBox::new("Kamenskoye", 34.0, 48.35, 35.0, 48.85),
                GeoBox::new("Dnipro", 34.8, 47.65, 35.3, 48.35),
                GeoBox::new("Kakhovka", 33.5, 46.65, 35.2, 47.65),
            ],
            lakes: vec![
                GeoBox::new("Sasyk", 29.75, 45.85, 30.0, 46.1),
                GeoBox::new("Yalpuh", 28.55, 45.25, 28.85, 45.55),
                GeoBox::new("Kahul", 28.2, 45.35, 28.55, 45.65),
                GeoBox::new("Katlabuh", 28.4, 45.55, 28.7, 45.85),
                GeoBox::new("Svitjaz", 23.8, 51.45, 23.95, 51.55),
            ],
            min_river_component: 3,
            max_river_gap: 3,

            default_biome_variant: 7,
            terrain_order: crate::terrain::DEFAULT_TERRAIN_ORDER
                .iter()
                .map(|s| s.to_string())
                .collect(),

            landmarks: vec![
                Landmark::new("Hoverla (Carpathians)", 24.5003, 48.1603, (1800.0, 2100.0), (12, 12)),
                Landmark::new("Ai-Petri (Crimea)", 34.0587, 44.4508, (1000.0, 1300.0), (9, 10)),
                Landmark::new("Kyiv", 30.5234, 50.4501, (150.0, 200.0), (3, 3)),
                Landmark::new("Odesa", 30.7233, 46.4825, (0.0, 80.0), (0, 1)),
                Landmark::new("Kharkiv", 36.2304, 49.9935, (100.0, 200.0), (2, 3)),
                Landmark::new("Dnipro", 35.0462, 48.4647, (50.0, 150.0), (1, 2)),
            ],
        }
    }
}

impl BuildConfig {
    /// Parse a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, MapError> {
        let config: BuildConfig = serde_json::from_str(json)
            .map_err(|e| MapError::Precondition(format!("bad config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MapError> {
        self.bounds.validate()?;
        if self.width == 0 || self.height == 0 {
            return Err(MapError::Precondition(format!(
                "grid dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.shallow_water_distance > self.medium_water_distance {
            return Err(MapError::Precondition(
                "shallow water distance exceeds medium water distance".into(),
            ));
        }
        Ok(())
    }
}
