//! Synthetic data sources.
//!
//! Deterministic, seedable stand-ins for the real raster and vector inputs,
//! used by the demo binary and by end-to-end tests. Elevation is multi-scale
//! Perlin terrain with a southward slope into a sea, the land mask follows
//! sea level, and rivers are jittered north-to-south walks that end when
//! they reach water.

use noise::{NoiseFn, Perlin, Seedable};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::geo::GeoBounds;
use crate::grid::HexMap;
use crate::sources::{
    BiomeSource, ElevationSource, LandCoverSource, LandWaterSource, Polyline, RiverLine,
    RiverSource,
};

pub struct SyntheticWorld {
    seed: u64,
    bounds: GeoBounds,
    terrain_noise: Perlin,
    cover_noise: Perlin,
    major_river_name: String,
    river_count: usize,
}

impl SyntheticWorld {
    pub fn new(seed: u64, bounds: GeoBounds) -> Self {
        Self {
            seed,
            bounds,
            terrain_noise: Perlin::new(1).set_seed(seed as u32),
            cover_noise: Perlin::new(1).set_seed(seed.wrapping_add(0xC0FE) as u32),
            major_river_name: "Dnipro".to_string(),
            river_count: 6,
        }
    }

    pub fn with_major_river_name(mut self, name: &str) -> Self {
        self.major_river_name = name.to_string();
        self
    }

    /// Raw synthetic elevation in meters at a geographic point.
    ///
    /// Multi-octave noise over a southward slope: the north of the bounds
    /// trends to uplands, the south dips below sea level. A ridge in the
    /// southwest corner stands in for a mountain range so the snow and
    /// mountain bands get exercised.
    fn terrain_height(&self, lon: f64, lat: f64) -> f32 {
        let nx = (lon - self.bounds.min_lon) / (self.bounds.max_lon - self.bounds.min_lon);
        let ny = (lat - self.bounds.min_lat) / (self.bounds.max_lat - self.bounds.min_lat);

        let continental = self.terrain_noise.get([nx * 3.0, ny * 3.0, 0.0]) * 0.6;
        let regional = self.terrain_noise.get([nx * 8.0, ny * 8.0, 1.0]) * 0.3;
        let local = self.terrain_noise.get([nx * 20.0, ny * 20.0, 2.0]) * 0.1;
        let rolling = (continental + regional + local) * 0.5 + 0.5;

        // ny = 0 at the south edge: slope down into the sea.
        let slope = ny * 1.2 - 0.25;

        // Southwest ridge.
        let ridge_dx = nx - 0.12;
        let ridge_dy = ny - 0.35;
        let ridge_dist = (ridge_dx * ridge_dx + ridge_dy * ridge_dy).sqrt();
        let ridge = (1.0 - (ridge_dist / 0.18).min(1.0)) * 2200.0;

        (rolling * 500.0 + slope * 600.0 + ridge - 100.0) as f32
    }
}

impl ElevationSource for SyntheticWorld {
    fn elevation_at(&self, lon: f64, lat: f64) -> f32 {
        self.terrain_height(lon, lat)
    }
}

impl LandWaterSource for SyntheticWorld {
    fn land_mask(&self, bounds: &GeoBounds, width: usize, height: usize) -> HexMap<bool> {
        let mut mask = HexMap::new_with(width, height, false);
        for row in 0..height {
            for col in 0..width {
                let (lon, lat) = bounds.cell_to_geo(col, row, width, height);
                mask.set(col, row, self.terrain_height(lon, lat) > 0.0);
            }
        }
        mask
    }
}

impl LandCoverSource for SyntheticWorld {
    fn sample_grid(&self, bounds: &GeoBounds, width: usize, height: usize) -> HexMap<u16> {
        let mut grid = HexMap::new_with(width, height, 0u16);
        for row in 0..height {
            for col in 0..width {
                let (lon, lat) = bounds.cell_to_geo(col, row, width, height);
                let meters = self.terrain_height(lon, lat);
                let nx = (lon - bounds.min_lon) / (bounds.max_lon - bounds.min_lon);
                let ny = (lat - bounds.min_lat) / (bounds.max_lat - bounds.min_lat);
                let moisture = self.cover_noise.get([nx * 6.0, ny * 6.0, 0.0]);

                let code: u16 = if meters <= 0.0 {
                    200 // open water
                } else if meters > 1800.0 {
                    70 // snow and ice
                } else if meters > 1200.0 {
                    60 // bare rock
                } else if moisture > 0.35 {
                    114 // closed deciduous forest
                } else if moisture > 0.1 {
                    124 // open forest
                } else if moisture < -0.4 {
                    20 // shrubland steppe
                } else {
                    40 // cropland
                };
                grid.set(col, row, code);
            }
        }
        grid
    }
}

impl RiverSource for SyntheticWorld {
    /// Jittered southward walks from random inland starts. The first line
    /// carries the designated major-river name, the rest get numbered names.
    fn rivers(&self) -> Vec<RiverLine> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(0x51BE8));
        let mut rivers = Vec::with_capacity(self.river_count);

        let lon_span = self.bounds.max_lon - self.bounds.min_lon;
        let lat_span = self.bounds.max_lat - self.bounds.min_lat;
        let step = lat_span / 60.0;

        for i in 0..self.river_count {
            let mut lon = self.bounds.min_lon + lon_span * rng.gen_range(0.2..0.8);
            let mut lat = self.bounds.max_lat - lat_span * rng.gen_range(0.05..0.25);

            let mut points = vec![(lon, lat)];
            while lat > self.bounds.min_lat + step {
                lat = (lat - step * rng.gen_range(0.6..1.4)).max(self.bounds.min_lat);
                lon += lon_span * rng.gen_range(-0.02..0.02);
                lon = lon.clamp(self.bounds.min_lon, self.bounds.max_lon);
                points.push((lon, lat));
                if self.terrain_height(lon, lat) <= 0.0 {
                    break; // reached the sea
                }
            }

            let name = if i == 0 {
                self.major_river_name.clone()
            } else {
                format!("River {i}")
            };
            rivers.push(RiverLine {
                name,
                line: Polyline::new(points),
            });
        }

        rivers
    }
}

impl BiomeSource for SyntheticWorld {
    /// Latitude bands with noise jitter, mapped into biome variants 3-8.
    fn biome_map(&self, bounds: &GeoBounds, width: usize, height: usize) -> HexMap<u8> {
        let mut grid = HexMap::new_with(width, height, 7u8);
        for row in 0..height {
            for col in 0..width {
                let (lon, lat) = bounds.cell_to_geo(col, row, width, height);
                let nx = (lon - bounds.min_lon) / (bounds.max_lon - bounds.min_lon);
                let ny = (lat - bounds.min_lat) / (bounds.max_lat - bounds.min_lat);
                let jitter = self.cover_noise.get([nx * 4.0, ny * 4.0, 5.0]) * 1.5;
                let band = 3.0 + ny * 5.0 + jitter;
                grid.set(col, row, (band.round() as i64).clamp(3, 8) as u8);
            }
        }
        grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_bounds() -> GeoBounds {
        GeoBounds {
            min_lon: 22.0,
            max_lon: 40.0,
            min_lat: 44.0,
            max_lat: 52.5,
        }
    }

    #[test]
    fn test_deterministic_per_seed() {
        let a = SyntheticWorld::new(42, test_bounds());
        let b = SyntheticWorld::new(42, test_bounds());
        assert_eq!(a.elevation_at(30.0, 48.0), b.elevation_at(30.0, 48.0));
        assert_eq!(a.rivers().len(), b.rivers().len());
        assert_eq!(a.rivers()[1].line.points, b.rivers()[1].line.points);
    }

    #[test]
    fn test_land_mask_matches_elevation_sign() {
        let world = SyntheticWorld::new(7, test_bounds());
        let bounds = test_bounds();
        let mask = world.land_mask(&bounds, 30, 20);

        for (col, row, &is_land) in mask.iter() {
            let (lon, lat) = bounds.cell_to_geo(col, row, 30, 20);
            assert_eq!(is_land, world.elevation_at(lon, lat) > 0.0);
        }
    }

    #[test]
    fn test_has_both_land_and_sea() {
        let world = SyntheticWorld::new(3, test_bounds());
        let mask = world.land_mask(&test_bounds(), 40, 24);
        let land = mask.count();
        assert!(land > 0, "all sea");
        assert!(land < 40 * 24, "all land");
    }

    #[test]
    fn test_first_river_carries_major_name() {
        let world = SyntheticWorld::new(5, test_bounds()).with_major_river_name("Dnieper");
        let rivers = world.rivers();
        assert_eq!(rivers[0].name, "Dnieper");
        assert!(rivers.iter().all(|r| r.line.points.len() >= 2));
    }

    #[test]
    fn test_rivers_stay_in_bounds() {
        let world = SyntheticWorld::new(11, test_bounds());
        let bounds = test_bounds();
        for river in world.rivers() {
            for &(lon, lat) in &river.line.points {
                assert!(lon >= bounds.min_lon && lon <= bounds.max_lon);
                assert!(lat >= bounds.min_lat - 1e-9 && lat <= bounds.max_lat);
            }
        }
    }

    #[test]
    fn test_biome_variants_in_range() {
        let world = SyntheticWorld::new(9, test_bounds());
        let biomes = world.biome_map(&test_bounds(), 20, 12);
        assert!(biomes.iter().all(|(_, _, &b)| (3..=8).contains(&b)));
    }
}
