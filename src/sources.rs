//! External data source interfaces.
//!
//! The fusion engine never touches the network or the filesystem; it
//! consumes these traits. Concrete implementations (raster readers, vector
//! datasets, cached downloads) live with the caller. The geometry surface
//! the engine needs from a vector library is deliberately narrow: box
//! containment and sampling along a polyline.

use serde::{Deserialize, Serialize};

use crate::geo::GeoBounds;
use crate::grid::HexMap;

/// Sentinel for missing elevation samples.
pub const NODATA: f32 = -9999.0;

/// True when a sample should be treated as missing.
pub fn is_nodata(meters: f32) -> bool {
    meters <= -9000.0
}

/// A named axis-aligned geographic box, used for reservoirs, lakes and
/// always-shallow sea regions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeoBox {
    pub name: String,
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl GeoBox {
    pub fn new(name: &str, min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            name: name.to_string(),
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }
}

/// A line geometry in geographic coordinates.
#[derive(Clone, Debug, Default)]
pub struct Polyline {
    pub points: Vec<(f64, f64)>,
}

impl Polyline {
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self { points }
    }

    /// Total length in degrees (planar approximation, adequate at the
    /// sampling resolutions involved).
    pub fn length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| {
                let (x0, y0) = w[0];
                let (x1, y1) = w[1];
                ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt()
            })
            .sum()
    }

    /// Point at a fraction `t` in [0, 1] of the line's length.
    pub fn interpolate(&self, t: f64) -> (f64, f64) {
        if self.points.len() == 1 {
            return self.points[0];
        }
        let target = self.length() * t.clamp(0.0, 1.0);
        let mut walked = 0.0;
        for w in self.points.windows(2) {
            let (x0, y0) = w[0];
            let (x1, y1) = w[1];
            let seg = ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt();
            if walked + seg >= target && seg > 0.0 {
                let f = (target - walked) / seg;
                return (x0 + (x1 - x0) * f, y0 + (y1 - y0) * f);
            }
            walked += seg;
        }
        *self.points.last().expect("polyline has points")
    }

    /// Evenly spaced samples along the line, no coarser than `interval`
    /// (in degrees). Always includes both endpoints.
    pub fn sample_along(&self, interval: f64) -> Vec<(f64, f64)> {
        let length = self.length();
        if length == 0.0 || self.points.is_empty() {
            return self.points.clone();
        }
        let num_samples = ((length / interval) as usize + 1).max(2);
        (0..=num_samples)
            .map(|i| self.interpolate(i as f64 / num_samples as f64))
            .collect()
    }
}

/// A named river line, pre-clipped to the region of interest.
#[derive(Clone, Debug)]
pub struct RiverLine {
    pub name: String,
    pub line: Polyline,
}

/// Authoritative land/ocean state per hex. Dominates any water inference
/// from land-cover data.
pub trait LandWaterSource {
    fn land_mask(&self, bounds: &GeoBounds, width: usize, height: usize) -> HexMap<bool>;
}

/// Raw elevation in meters, or [`NODATA`].
pub trait ElevationSource {
    fn elevation_at(&self, lon: f64, lat: f64) -> f32;

    /// Sample one value per grid cell over `bounds` (linear cell mapping,
    /// row 0 north).
    fn sample_grid(&self, bounds: &GeoBounds, width: usize, height: usize) -> HexMap<f32> {
        let mut grid = HexMap::new_with(width, height, NODATA);
        for row in 0..height {
            for col in 0..width {
                let (lon, lat) = bounds.cell_to_geo(col, row, width, height);
                grid.set(col, row, self.elevation_at(lon, lat));
            }
        }
        grid
    }
}

/// Categorical land-cover code per hex (Copernicus-style class values).
pub trait LandCoverSource {
    fn sample_grid(&self, bounds: &GeoBounds, width: usize, height: usize) -> HexMap<u16>;
}

/// Named river line geometries for the region.
pub trait RiverSource {
    fn rivers(&self) -> Vec<RiverLine>;
}

/// Externally computed biome variant (0-9) per hex, territory-level.
pub trait BiomeSource {
    fn biome_map(&self, bounds: &GeoBounds, width: usize, height: usize) -> HexMap<u8>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nodata_sentinel() {
        assert!(is_nodata(NODATA));
        assert!(is_nodata(-9000.1));
        assert!(!is_nodata(-100.0));
        assert!(!is_nodata(0.0));
    }

    #[test]
    fn test_polyline_sampling_density() {
        let line = Polyline::new(vec![(0.0, 0.0), (1.0, 0.0)]);
        let samples = line.sample_along(0.1);
        assert!(samples.len() >= 11);
        assert_eq!(samples[0], (0.0, 0.0));
        let last = samples.last().unwrap();
        assert!((last.0 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_polyline_interpolate_midpoint() {
        let line = Polyline::new(vec![(0.0, 0.0), (2.0, 0.0), (2.0, 2.0)]);
        let (x, y) = line.interpolate(0.5);
        assert!((x - 2.0).abs() < 1e-9 && (y - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_geobox_contains() {
        let b = GeoBox::new("azov", 34.5, 45.0, 39.5, 47.5);
        assert!(b.contains(36.0, 46.0));
        assert!(!b.contains(30.0, 46.0));
    }
}
