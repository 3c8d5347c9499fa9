//! Elevation quantization and ocean depth modeling.
//!
//! Raw elevation samples are quantized to the 16 game levels (-3 to 12)
//! through a fixed meter-range table. Ocean hexes get their depth class not
//! from bathymetry (which the elevation source rarely has) but from distance
//! to land: one breadth-first search seeded simultaneously at every land hex
//! produces a distance-to-land for the whole grid, and depth bands follow
//! from it. Configured always-shallow regions (enclosed shelf seas) override
//! the distance rule.

use std::collections::{BTreeMap, VecDeque};

use log::{info, warn};
use rayon::prelude::*;

use crate::config::{BuildConfig, Landmark};
use crate::error::MapError;
use crate::grid::HexMap;
use crate::sources::{is_nodata, ElevationSource};

/// Meter ranges mapped to game elevation levels. Half-open `[min, max)`.
pub const ELEVATION_THRESHOLDS: [(f32, f32, i8); 16] = [
    (-9999.0, -100.0, -3), // deep ocean
    (-100.0, -50.0, -2),   // ocean shelf
    (-50.0, 0.0, -1),      // shallow water
    (0.0, 50.0, 0),        // coastal lowlands
    (50.0, 100.0, 1),      // low plains
    (100.0, 150.0, 2),     // plains
    (150.0, 200.0, 3),     // rolling plains
    (200.0, 300.0, 4),     // low hills
    (300.0, 400.0, 5),     // hills
    (400.0, 600.0, 6),     // high hills
    (600.0, 800.0, 7),     // low mountains
    (800.0, 1000.0, 8),    // mountains
    (1000.0, 1200.0, 9),   // high mountains
    (1200.0, 1500.0, 10),  // alpine
    (1500.0, 1800.0, 11),  // high alpine
    (1800.0, 10000.0, 12), // peaks
];

pub const LEVEL_SHALLOW: i8 = -1;
pub const LEVEL_MEDIUM: i8 = -2;
pub const LEVEL_DEEP: i8 = -3;

/// Distance value for hexes unreachable from any land.
pub const UNREACHABLE: u32 = u32::MAX;

/// Quantize a raw elevation in meters to a game level.
///
/// NODATA and values outside the table fall back to `ocean_default_level`.
pub fn quantize_elevation(meters: f32, ocean_default_level: i8) -> i8 {
    if is_nodata(meters) {
        return ocean_default_level;
    }
    for &(min_m, max_m, level) in ELEVATION_THRESHOLDS.iter() {
        if meters >= min_m && meters < max_m {
            return level;
        }
    }
    if meters >= 1800.0 {
        return 12;
    }
    ocean_default_level
}

/// Distance to the nearest land hex, in hex steps, for every hex.
///
/// Multi-source BFS: every land hex is a seed at distance 0, propagation
/// runs over hex adjacency. Ocean hexes not connected to any land keep
/// [`UNREACHABLE`].
pub fn distance_from_land(land: &HexMap<bool>) -> HexMap<u32> {
    let mut distance = HexMap::new_with(land.width, land.height, UNREACHABLE);
    let mut queue = VecDeque::new();

    for (col, row, &is_land) in land.iter() {
        if is_land {
            distance.set(col, row, 0);
            queue.push_back((col, row));
        }
    }

    while let Some((col, row)) = queue.pop_front() {
        let next = *distance.get(col, row) + 1;
        for (nc, nr) in land.neighbors(col, row) {
            if *distance.get(nc, nr) > next {
                distance.set(nc, nr, next);
                queue.push_back((nc, nr));
            }
        }
    }

    distance
}

/// Distribution summary of a quantized elevation grid.
#[derive(Clone, Debug, Default)]
pub struct ElevationStats {
    pub level_counts: BTreeMap<i8, usize>,
    pub total_hexes: usize,
    pub raw_min: f32,
    pub raw_max: f32,
    pub raw_mean: f32,
    pub nodata_count: usize,
    pub ocean_shallow: usize,
    pub ocean_medium: usize,
    pub ocean_deep: usize,
}

impl ElevationStats {
    pub fn log_summary(&self) {
        info!(
            "elevation: raw range {:.0}m to {:.0}m (mean {:.0}m), {} NODATA hexes",
            self.raw_min, self.raw_max, self.raw_mean, self.nodata_count
        );
        for (level, count) in &self.level_counts {
            let pct = 100.0 * *count as f64 / self.total_hexes.max(1) as f64;
            info!("  level {level:3}: {count:5} hexes ({pct:4.1}%)");
        }
        let ocean_total = self.ocean_shallow + self.ocean_medium + self.ocean_deep;
        if ocean_total > 0 {
            info!(
                "ocean depth: {} shallow, {} medium, {} deep",
                self.ocean_shallow, self.ocean_medium, self.ocean_deep
            );
        }
    }
}

/// Result of checking one landmark against the quantizer.
#[derive(Clone, Debug)]
pub struct LandmarkCheck {
    pub name: String,
    pub meters: f32,
    pub level: i8,
    pub expected_meters: (f32, f32),
    pub expected_level: (i8, i8),
}

impl LandmarkCheck {
    pub fn meters_ok(&self) -> bool {
        self.meters >= self.expected_meters.0 && self.meters <= self.expected_meters.1
    }

    pub fn level_ok(&self) -> bool {
        self.level >= self.expected_level.0 && self.level <= self.expected_level.1
    }

    pub fn ok(&self) -> bool {
        self.meters_ok() && self.level_ok()
    }
}

/// Maps raw elevation samples to game levels and assigns ocean depth.
pub struct ElevationQuantizer<'a> {
    config: &'a BuildConfig,
}

impl<'a> ElevationQuantizer<'a> {
    pub fn new(config: &'a BuildConfig) -> Self {
        Self { config }
    }

    /// Quantize a full raw grid.
    ///
    /// With a land mask, ocean hexes get depth classes from distance to
    /// land and land hexes are table-quantized; without one every hex is
    /// table-quantized. Fails when NODATA covers more than the configured
    /// fraction of the land hexes, since everything downstream would run on
    /// a default-filled grid.
    pub fn quantize_grid(
        &self,
        raw: &HexMap<f32>,
        land: Option<&HexMap<bool>>,
    ) -> Result<(HexMap<i8>, ElevationStats), MapError> {
        let width = raw.width;
        let height = raw.height;

        if let Some(mask) = land {
            let land_total = mask.count();
            let land_nodata = mask
                .iter()
                .filter(|&(c, r, &is_land)| is_land && is_nodata(*raw.get(c, r)))
                .count();
            if land_total > 0 {
                let fraction = land_nodata as f64 / land_total as f64;
                if fraction > self.config.max_nodata_fraction {
                    return Err(MapError::DataQuality(format!(
                        "elevation NODATA covers {:.0}% of land hexes \
                         (limit {:.0}%)",
                        fraction * 100.0,
                        self.config.max_nodata_fraction * 100.0
                    )));
                }
            }
        }

        let distance = land.map(distance_from_land);

        // Per-hex pass: independent once the distance grid exists.
        let levels_vec: Vec<i8> = (0..width * height)
            .into_par_iter()
            .map(|idx| {
                let col = idx % width;
                let row = idx / width;
                let meters = *raw.get(col, row);

                match (land, &distance) {
                    (Some(mask), Some(dist)) if !*mask.get(col, row) => {
                        self.ocean_depth(col, row, mask, raw, dist)
                    }
                    _ => quantize_elevation(meters, self.config.ocean_default_level),
                }
            })
            .collect();
        let levels = HexMap::from_vec(width, height, levels_vec);

        let stats = self.collect_stats(raw, &levels, land);
        Ok((levels, stats))
    }

    /// Depth class for one ocean hex.
    fn ocean_depth(
        &self,
        col: usize,
        row: usize,
        land: &HexMap<bool>,
        raw: &HexMap<f32>,
        distance: &HexMap<u32>,
    ) -> i8 {
        let (lon, lat) = self
            .config
            .bounds
            .cell_to_geo(col, row, land.width, land.height);

        // Enclosed shelf seas stay shallow no matter how far from shore.
        if self.config.always_shallow.iter().any(|b| b.contains(lon, lat)) {
            return LEVEL_SHALLOW;
        }

        let dist = *distance.get(col, row);

        if dist <= self.config.shallow_water_distance {
            // Water under a cliff shore drops straight to medium depth.
            if self.max_adjacent_land_elevation(col, row, land, raw) > self.config.cliff_elevation_m
            {
                return LEVEL_MEDIUM;
            }
            LEVEL_SHALLOW
        } else if dist <= self.config.medium_water_distance {
            LEVEL_MEDIUM
        } else {
            LEVEL_DEEP
        }
    }

    fn max_adjacent_land_elevation(
        &self,
        col: usize,
        row: usize,
        land: &HexMap<bool>,
        raw: &HexMap<f32>,
    ) -> f32 {
        let mut max_elev = 0.0f32;
        for (nc, nr) in land.neighbors(col, row) {
            if *land.get(nc, nr) {
                let elev = *raw.get(nc, nr);
                if !is_nodata(elev) && elev > max_elev {
                    max_elev = elev;
                }
            }
        }
        max_elev
    }

    fn collect_stats(
        &self,
        raw: &HexMap<f32>,
        levels: &HexMap<i8>,
        land: Option<&HexMap<bool>>,
    ) -> ElevationStats {
        let mut stats = ElevationStats {
            raw_min: f32::MAX,
            raw_max: f32::MIN,
            ..Default::default()
        };

        let mut valid_sum = 0.0f64;
        let mut valid_count = 0usize;

        for (col, row, &level) in levels.iter() {
            stats.total_hexes += 1;
            *stats.level_counts.entry(level).or_insert(0) += 1;

            let meters = *raw.get(col, row);
            if is_nodata(meters) {
                stats.nodata_count += 1;
            } else {
                stats.raw_min = stats.raw_min.min(meters);
                stats.raw_max = stats.raw_max.max(meters);
                valid_sum += meters as f64;
                valid_count += 1;
            }

            if let Some(mask) = land {
                if !*mask.get(col, row) {
                    match level {
                        LEVEL_SHALLOW => stats.ocean_shallow += 1,
                        LEVEL_MEDIUM => stats.ocean_medium += 1,
                        LEVEL_DEEP => stats.ocean_deep += 1,
                        _ => {}
                    }
                }
            }
        }

        if valid_count > 0 {
            stats.raw_mean = (valid_sum / valid_count as f64) as f32;
        } else {
            stats.raw_min = 0.0;
            stats.raw_max = 0.0;
        }

        stats
    }

    /// Check the configured landmarks against the elevation source.
    ///
    /// Informational only: mismatches are logged, never fatal.
    pub fn validate_landmarks(
        &self,
        source: &dyn ElevationSource,
        landmarks: &[Landmark],
    ) -> Vec<LandmarkCheck> {
        let mut checks = Vec::with_capacity(landmarks.len());

        for landmark in landmarks {
            let meters = source.elevation_at(landmark.lon, landmark.lat);
            let level = quantize_elevation(meters, self.config.ocean_default_level);
            let check = LandmarkCheck {
                name: landmark.name.clone(),
                meters,
                level,
                expected_meters: landmark.expected_meters,
                expected_level: landmark.expected_level,
            };

            if check.ok() {
                info!("landmark {}: {:.0}m -> level {} ok", check.name, meters, level);
            } else {
                warn!(
                    "landmark {}: {:.0}m -> level {} (expected {:.0}-{:.0}m, level {}..{})",
                    check.name,
                    meters,
                    level,
                    landmark.expected_meters.0,
                    landmark.expected_meters.1,
                    landmark.expected_level.0,
                    landmark.expected_level.1
                );
            }
            checks.push(check);
        }

        checks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::NODATA;

    #[test]
    fn test_quantization_table() {
        assert_eq!(quantize_elevation(-200.0, -2), -3);
        assert_eq!(quantize_elevation(-75.0, -2), -2);
        assert_eq!(quantize_elevation(-10.0, -2), -1);
        assert_eq!(quantize_elevation(0.0, -2), 0);
        assert_eq!(quantize_elevation(120.0, -2), 2);
        assert_eq!(quantize_elevation(500.0, -2), 6);
        assert_eq!(quantize_elevation(950.0, -2), 8);
        assert_eq!(quantize_elevation(2061.0, -2), 12);
    }

    #[test]
    fn test_quantization_monotonic() {
        let samples: Vec<f32> = (-120..2000).step_by(7).map(|m| m as f32).collect();
        let mut prev = i8::MIN;
        for meters in samples {
            let level = quantize_elevation(meters, -2);
            assert!(level >= prev, "level dropped at {meters}m");
            prev = level;
        }
    }

    #[test]
    fn test_nodata_uses_default() {
        assert_eq!(quantize_elevation(NODATA, -2), -2);
        assert_eq!(quantize_elevation(-9500.0, -3), -3);
    }

    #[test]
    fn test_distance_from_land() {
        // Single land hex in the middle of a 5x5 ocean.
        let mut land = HexMap::new_with(5, 5, false);
        land.set(2, 2, true);

        let distance = distance_from_land(&land);
        assert_eq!(*distance.get(2, 2), 0);
        for (nc, nr) in land.neighbors(2, 2) {
            assert_eq!(*distance.get(nc, nr), 1);
        }
        // Far corner is further out than any direct neighbor.
        assert!(*distance.get(4, 4) > 1);
    }

    #[test]
    fn test_all_land_is_distance_zero() {
        let land = HexMap::new_with(4, 4, true);
        let distance = distance_from_land(&land);
        assert!(distance.iter().all(|(_, _, &d)| d == 0));
    }

    fn small_config(width: usize, height: usize) -> BuildConfig {
        BuildConfig {
            width,
            height,
            always_shallow: vec![],
            ..Default::default()
        }
    }

    #[test]
    fn test_ocean_depth_bands() {
        // One land column on the west edge of a wide strip.
        let width = 12;
        let config = small_config(width, 1);
        let quantizer = ElevationQuantizer::new(&config);

        let mut land = HexMap::new_with(width, 1, false);
        land.set(0, 0, true);
        let raw = HexMap::new_with(width, 1, 50.0f32);

        let (levels, _) = quantizer.quantize_grid(&raw, Some(&land)).unwrap();
        assert_eq!(*levels.get(1, 0), LEVEL_SHALLOW); // distance 1
        assert_eq!(*levels.get(3, 0), LEVEL_SHALLOW); // distance 3
        assert_eq!(*levels.get(5, 0), LEVEL_MEDIUM); // distance 5
        assert_eq!(*levels.get(9, 0), LEVEL_DEEP); // distance 9
    }

    #[test]
    fn test_cliff_demotes_shallow_to_medium() {
        let config = small_config(3, 1);
        let quantizer = ElevationQuantizer::new(&config);

        let mut land = HexMap::new_with(3, 1, false);
        land.set(0, 0, true);
        let mut raw = HexMap::new_with(3, 1, -20.0f32);
        raw.set(0, 0, 250.0); // cliff shore

        let (levels, _) = quantizer.quantize_grid(&raw, Some(&land)).unwrap();
        assert_eq!(*levels.get(1, 0), LEVEL_MEDIUM);
    }

    #[test]
    fn test_excess_nodata_is_fatal() {
        let config = small_config(4, 4);
        let quantizer = ElevationQuantizer::new(&config);

        let land = HexMap::new_with(4, 4, true);
        let raw = HexMap::new_with(4, 4, NODATA);

        let err = quantizer.quantize_grid(&raw, Some(&land)).unwrap_err();
        assert!(matches!(err, MapError::DataQuality(_)));
    }
}
