//! Geographic coordinate to hex grid mapping.
//!
//! Converts between lat/lon, a locally accurate metric projection, and hex
//! grid addresses. The grid is sized so it fits entirely inside the
//! projected bounds and is centered within them. Latitude increases
//! northward while grid rows increase southward, so the vertical axis is
//! inverted between the two conventions.

use serde::{Deserialize, Serialize};

use crate::error::MapError;
use crate::hexgrid::{HexAddress, HexGrid};

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Scale factor on the central meridian (UTM convention).
const TM_SCALE: f64 = 0.9996;

/// False easting so projected x stays positive across the zone.
const TM_FALSE_EASTING: f64 = 500_000.0;

/// Geographic bounding box in degrees. Invariant: min < max on both axes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl GeoBounds {
    pub fn new(min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64) -> Result<Self, MapError> {
        let bounds = Self {
            min_lon,
            max_lon,
            min_lat,
            max_lat,
        };
        bounds.validate()?;
        Ok(bounds)
    }

    pub fn validate(&self) -> Result<(), MapError> {
        if !(self.min_lon < self.max_lon && self.min_lat < self.max_lat) {
            return Err(MapError::Precondition(format!(
                "degenerate bounds: lon [{}, {}], lat [{}, {}]",
                self.min_lon, self.max_lon, self.min_lat, self.max_lat
            )));
        }
        Ok(())
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    /// Geographic coordinates of a cell center under a plain linear mapping
    /// of the bounds onto a `width` x `height` grid (row 0 is the north
    /// edge). Raster-style sources and the region containment checks use
    /// this mapping.
    pub fn cell_to_geo(&self, col: usize, row: usize, width: usize, height: usize) -> (f64, f64) {
        let lon = self.min_lon + (col as f64 / width as f64) * (self.max_lon - self.min_lon);
        let lat = self.max_lat - (row as f64 / height as f64) * (self.max_lat - self.min_lat);
        (lon, lat)
    }

    /// Inverse of [`cell_to_geo`](Self::cell_to_geo); may land outside
    /// `[0, width) x [0, height)` for coordinates outside the bounds.
    pub fn geo_to_cell(&self, lon: f64, lat: f64, width: usize, height: usize) -> (i32, i32) {
        let col = (lon - self.min_lon) / (self.max_lon - self.min_lon) * width as f64;
        let row = (self.max_lat - lat) / (self.max_lat - self.min_lat) * height as f64;
        (col as i32, row as i32)
    }
}

/// Spherical transverse Mercator projection about a configurable central
/// meridian. Locally near-conformal, which keeps hex sizes meaningful in
/// meters across a regional map.
#[derive(Clone, Copy, Debug)]
pub struct TransverseMercator {
    central_meridian_rad: f64,
}

impl TransverseMercator {
    pub fn new(central_meridian_deg: f64) -> Self {
        Self {
            central_meridian_rad: central_meridian_deg.to_radians(),
        }
    }

    /// Forward projection: degrees to meters.
    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        let phi = lat.to_radians();
        let dlam = lon.to_radians() - self.central_meridian_rad;

        let b = phi.cos() * dlam.sin();
        let x = 0.5 * TM_SCALE * EARTH_RADIUS_M * ((1.0 + b) / (1.0 - b)).ln();
        let y = TM_SCALE * EARTH_RADIUS_M * (phi.tan() / dlam.cos()).atan();

        (x + TM_FALSE_EASTING, y)
    }

    /// Inverse projection: meters back to degrees.
    pub fn unproject(&self, x: f64, y: f64) -> (f64, f64) {
        let xn = (x - TM_FALSE_EASTING) / (TM_SCALE * EARTH_RADIUS_M);
        let yn = y / (TM_SCALE * EARTH_RADIUS_M);

        let lat = (yn.sin() / xn.cosh()).asin().to_degrees();
        let lon = (self.central_meridian_rad + (xn.sinh() / yn.cos()).atan()).to_degrees();

        (lon, lat)
    }
}

/// Maps between geographic coordinates and hex grid addresses.
pub struct GeoHexMapper {
    pub bounds: GeoBounds,
    pub grid: HexGrid,
    projection: TransverseMercator,
    min_y: f64,
    max_y: f64,
    offset_x: f64,
    offset_y: f64,
}

impl GeoHexMapper {
    /// Build a mapper for a `width` x `height` grid fitted to `bounds`.
    ///
    /// One isotropic hex size is chosen: the smaller of the size that fits
    /// the projected width and the size that fits the projected height, so
    /// the whole grid stays inside the bounds. The grid is then translated
    /// so grid and bounds share a center.
    pub fn new(
        width: usize,
        height: usize,
        bounds: GeoBounds,
        central_meridian_deg: f64,
    ) -> Result<Self, MapError> {
        bounds.validate()?;
        if width == 0 || height == 0 {
            return Err(MapError::Precondition(format!(
                "grid dimensions must be positive, got {width}x{height}"
            )));
        }

        let projection = TransverseMercator::new(central_meridian_deg);
        let (min_x, min_y) = projection.project(bounds.min_lon, bounds.min_lat);
        let (max_x, max_y) = projection.project(bounds.max_lon, bounds.max_lat);

        let width_m = max_x - min_x;
        let height_m = max_y - min_y;

        // Grid footprint: width * 0.75 * hex_width + 0.25 * hex_width wide,
        // (height + 0.5) * hex_height tall (the odd-column half shift).
        // Solving each constraint for hex_size and taking the minimum keeps
        // the grid inside the bounds on both axes.
        let size_from_width = width_m / ((width as f64 * 0.75 + 0.25) * 2.0);
        let size_from_height = height_m / ((height as f64 + 0.5) * 3.0_f64.sqrt());
        let hex_size = size_from_width.min(size_from_height);

        let grid = HexGrid::new(width, height, hex_size);

        let (gmin_x, gmin_y, gmax_x, gmax_y) = grid.pixel_bounds();
        let grid_width = gmax_x - gmin_x;
        let grid_height = gmax_y - gmin_y;

        let offset_x = min_x + (width_m - grid_width) / 2.0 - gmin_x;
        let offset_y = min_y + (height_m - grid_height) / 2.0 - gmin_y;

        Ok(Self {
            bounds,
            grid,
            projection,
            min_y,
            max_y,
            offset_x,
            offset_y,
        })
    }

    /// Hex radius in meters.
    pub fn hex_size_m(&self) -> f64 {
        self.grid.hex_size
    }

    pub fn hex_size_km(&self) -> f64 {
        self.grid.hex_size / 1000.0
    }

    pub fn latlon_to_projected(&self, lon: f64, lat: f64) -> (f64, f64) {
        self.projection.project(lon, lat)
    }

    pub fn projected_to_latlon(&self, x: f64, y: f64) -> (f64, f64) {
        self.projection.unproject(x, y)
    }

    /// Geographic coordinates to a hex address. May be out of grid bounds
    /// for coordinates outside the fitted area.
    pub fn latlon_to_hex(&self, lon: f64, lat: f64) -> HexAddress {
        let (x, y) = self.projection.project(lon, lat);

        // North-up to row-down: reflect y across the bounds.
        let y_inverted = self.max_y - y + self.min_y;

        self.grid
            .pixel_to_offset(x - self.offset_x, y_inverted - self.offset_y)
    }

    /// Geographic coordinates of a hex center.
    pub fn hex_to_latlon(&self, col: i32, row: i32) -> (f64, f64) {
        let (x, y) = self.grid.hex_center(col, row);
        let x = x + self.offset_x;
        let y = y + self.offset_y;
        let y_geo = self.max_y - y + self.min_y;
        self.projection.unproject(x, y_geo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region_bounds() -> GeoBounds {
        GeoBounds::new(22.0, 40.0, 44.0, 52.5).unwrap()
    }

    #[test]
    fn test_rejects_degenerate_bounds() {
        assert!(GeoBounds::new(30.0, 30.0, 44.0, 52.0).is_err());
        assert!(GeoBounds::new(22.0, 40.0, 52.0, 44.0).is_err());
        assert!(GeoHexMapper::new(0, 10, region_bounds(), 33.0).is_err());
    }

    #[test]
    fn test_projection_round_trip() {
        let proj = TransverseMercator::new(33.0);
        for &(lon, lat) in &[(30.5, 50.4), (24.5, 48.2), (36.2, 45.0)] {
            let (x, y) = proj.project(lon, lat);
            let (lon2, lat2) = proj.unproject(x, y);
            assert!((lon - lon2).abs() < 1e-6, "lon {lon} -> {lon2}");
            assert!((lat - lat2).abs() < 1e-6, "lat {lat} -> {lat2}");
        }
    }

    #[test]
    fn test_hex_round_trip_within_one_hex() {
        let mapper = GeoHexMapper::new(150, 88, region_bounds(), 33.0).unwrap();
        let grid = &mapper.grid;

        for &(col, row) in &[(10, 10), (75, 44), (140, 80)] {
            let (lon, lat) = mapper.hex_to_latlon(col, row);
            let addr = mapper.latlon_to_hex(lon, lat);
            let dist = grid.hex_distance(addr, HexAddress::new(col, row));
            assert!(dist <= 1, "({col}, {row}) came back as {addr:?}");
        }
    }

    #[test]
    fn test_grid_fits_inside_bounds() {
        let mapper = GeoHexMapper::new(150, 88, region_bounds(), 33.0).unwrap();
        let proj = TransverseMercator::new(33.0);
        let (min_x, _) = proj.project(22.0, 44.0);
        let (max_x, _) = proj.project(40.0, 52.5);
        let width_m = max_x - min_x;

        let (gmin_x, _, gmax_x, _) = mapper.grid.pixel_bounds();
        assert!(gmax_x - gmin_x <= width_m + 1.0);
    }

    #[test]
    fn test_row_zero_is_north() {
        let mapper = GeoHexMapper::new(150, 88, region_bounds(), 33.0).unwrap();
        let (_, lat_north) = mapper.hex_to_latlon(75, 0);
        let (_, lat_south) = mapper.hex_to_latlon(75, 87);
        assert!(lat_north > lat_south);
    }
}
