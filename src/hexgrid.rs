//! Flat-top hexagon geometry with odd-q offset coordinates.
//!
//! Three coordinate systems are involved:
//! - Offset `(col, row)`: grid addresses, 0-based, odd columns shifted down
//!   by half a hex height.
//! - Pixel `(x, y)`: continuous coordinates in the projected plane.
//! - Cube `(q, r, s)`: redundant 3-axis form with `q + r + s = 0`, used for
//!   exact hex distances.
//!
//! Neighbor offset tables are row-parity based. Two direction encodings are
//! in use and must not be conflated: river exit edges (NE=0, E=1, SE=2,
//! SW=3, W=4, NW=5) and mountain-mask bits (NW=0, NE=1, W=2, E=3, SW=4,
//! SE=5).
//!
//! The row-parity tables define the traversal adjacency the network
//! algorithms walk. That adjacency does not coincide with odd-q cube
//! adjacency everywhere: odd columns shift down while the tables key on
//! row parity, so a table neighbor can sit at cube distance 2. Distances
//! from [`HexGrid::hex_distance`] are always odd-q cube distances.

/// Offset hex address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HexAddress {
    pub col: i32,
    pub row: i32,
}

impl HexAddress {
    pub fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }
}

/// Cube hex address. Invariant: `q + r + s == 0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CubeAddress {
    pub q: i32,
    pub r: i32,
    pub s: i32,
}

/// Neighbor offsets in river exit-edge order (NE, E, SE, SW, W, NW)
/// for even and odd rows respectively.
const EDGE_OFFSETS_EVEN: [(i32, i32); 6] =
    [(0, -1), (1, 0), (0, 1), (-1, 1), (-1, 0), (-1, -1)];
const EDGE_OFFSETS_ODD: [(i32, i32); 6] =
    [(1, -1), (1, 0), (1, 1), (0, 1), (-1, 0), (0, -1)];

/// Neighbor offsets in mountain-mask bit order (NW, NE, W, E, SW, SE).
const MASK_OFFSETS_EVEN: [(i32, i32); 6] =
    [(-1, -1), (0, -1), (-1, 0), (1, 0), (-1, 1), (0, 1)];
const MASK_OFFSETS_ODD: [(i32, i32); 6] =
    [(0, -1), (1, -1), (-1, 0), (1, 0), (0, 1), (1, 1)];

/// Eastern-side neighbors (NE, E, SE), used for bank elevation lookups.
const EAST_OFFSETS_EVEN: [(i32, i32); 3] = [(0, -1), (1, 0), (0, 1)];
const EAST_OFFSETS_ODD: [(i32, i32); 3] = [(1, -1), (1, 0), (1, 1)];

/// Western-side neighbors (NW, W, SW).
const WEST_OFFSETS_EVEN: [(i32, i32); 3] = [(-1, -1), (-1, 0), (-1, 1)];
const WEST_OFFSETS_ODD: [(i32, i32); 3] = [(0, -1), (-1, 0), (0, 1)];

pub fn edge_neighbor_offsets(row: usize) -> &'static [(i32, i32); 6] {
    if row % 2 == 0 {
        &EDGE_OFFSETS_EVEN
    } else {
        &EDGE_OFFSETS_ODD
    }
}

pub fn mask_neighbor_offsets(row: usize) -> &'static [(i32, i32); 6] {
    if row % 2 == 0 {
        &MASK_OFFSETS_EVEN
    } else {
        &MASK_OFFSETS_ODD
    }
}

pub fn east_neighbor_offsets(row: usize) -> &'static [(i32, i32); 3] {
    if row % 2 == 0 {
        &EAST_OFFSETS_EVEN
    } else {
        &EAST_OFFSETS_ODD
    }
}

pub fn west_neighbor_offsets(row: usize) -> &'static [(i32, i32); 3] {
    if row % 2 == 0 {
        &WEST_OFFSETS_EVEN
    } else {
        &WEST_OFFSETS_ODD
    }
}

/// Hexagonal grid with flat-top orientation and odd-q offset layout.
#[derive(Clone, Debug)]
pub struct HexGrid {
    pub width: usize,
    pub height: usize,
    /// Hexagon radius: distance from center to vertex.
    pub hex_size: f64,
}

impl HexGrid {
    pub fn new(width: usize, height: usize, hex_size: f64) -> Self {
        Self {
            width,
            height,
            hex_size,
        }
    }

    /// Hexagon width, flat edge to flat edge horizontally.
    pub fn hex_width(&self) -> f64 {
        self.hex_size * 2.0
    }

    /// Hexagon height, point to point vertically.
    pub fn hex_height(&self) -> f64 {
        self.hex_size * 3.0_f64.sqrt()
    }

    /// Pixel coordinates of a hex center.
    ///
    /// Horizontal spacing is 0.75 x hex_width per column; odd columns are
    /// shifted down by half a hex height.
    pub fn hex_center(&self, col: i32, row: i32) -> (f64, f64) {
        let x = self.hex_width() * 0.75 * col as f64 + self.hex_width() * 0.5;
        let y = if col % 2 != 0 {
            self.hex_height() * (row as f64 + 1.0)
        } else {
            self.hex_height() * (row as f64 + 0.5)
        };
        (x, y)
    }

    /// The 6 corner points of a hex, at 0, 60, ..., 300 degrees from center.
    pub fn hex_corners(&self, col: i32, row: i32) -> [(f64, f64); 6] {
        let (cx, cy) = self.hex_center(col, row);
        let mut corners = [(0.0, 0.0); 6];
        for (i, corner) in corners.iter_mut().enumerate() {
            let angle = i as f64 * std::f64::consts::PI / 3.0;
            *corner = (
                cx + self.hex_size * angle.cos(),
                cy + self.hex_size * angle.sin(),
            );
        }
        corners
    }

    /// Convert pixel coordinates to the nearest offset hex address.
    ///
    /// Approximates the column from the spacing formula, then tries both the
    /// floor and ceiling candidates with their parity-dependent row formula
    /// and keeps whichever candidate center is closest to the query point.
    pub fn pixel_to_offset(&self, x: f64, y: f64) -> HexAddress {
        let col_approx = (x - self.hex_width() * 0.5) / (self.hex_width() * 0.75);

        let mut best: Option<(f64, i32, i32)> = None;
        for col in [col_approx.floor() as i32, col_approx.ceil() as i32] {
            let row_f = if col % 2 != 0 {
                y / self.hex_height() - 1.0
            } else {
                y / self.hex_height() - 0.5
            };
            let row = row_f.round() as i32;

            let (cx, cy) = self.hex_center(col, row);
            let dist = ((x - cx).powi(2) + (y - cy).powi(2)).sqrt();
            if best.map_or(true, |(d, _, _)| dist < d) {
                best = Some((dist, col, row));
            }
        }

        let (_, col, row) = best.expect("two candidates always evaluated");
        HexAddress::new(col, row)
    }

    /// Odd-q offset to cube conversion.
    pub fn offset_to_cube(&self, col: i32, row: i32) -> CubeAddress {
        let q = col;
        let r = row - (col - (col & 1)) / 2;
        CubeAddress { q, r, s: -q - r }
    }

    /// Cube to odd-q offset conversion.
    pub fn cube_to_offset(&self, cube: CubeAddress) -> HexAddress {
        let col = cube.q;
        let row = cube.r + (cube.q - (cube.q & 1)) / 2;
        HexAddress::new(col, row)
    }

    /// Distance between two hexes in hex steps.
    pub fn hex_distance(&self, a: HexAddress, b: HexAddress) -> i32 {
        let ca = self.offset_to_cube(a.col, a.row);
        let cb = self.offset_to_cube(b.col, b.row);
        ((ca.q - cb.q).abs() + (ca.r - cb.r).abs() + (ca.s - cb.s).abs()) / 2
    }

    /// Bounding box of all hex corners in pixel coordinates:
    /// `(min_x, min_y, max_x, max_y)`.
    pub fn pixel_bounds(&self) -> (f64, f64, f64, f64) {
        let mut min_x = f64::MAX;
        let mut min_y = f64::MAX;
        let mut max_x = f64::MIN;
        let mut max_y = f64::MIN;

        for row in 0..self.height as i32 {
            for col in 0..self.width as i32 {
                for (x, y) in self.hex_corners(col, row) {
                    min_x = min_x.min(x);
                    min_y = min_y.min(y);
                    max_x = max_x.max(x);
                    max_y = max_y.max(y);
                }
            }
        }

        (min_x, min_y, max_x, max_y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_round_trip() {
        let grid = HexGrid::new(12, 9, 10.0);
        for row in 0..9 {
            for col in 0..12 {
                let (x, y) = grid.hex_center(col, row);
                let addr = grid.pixel_to_offset(x, y);
                assert_eq!(addr, HexAddress::new(col, row), "round trip at ({col}, {row})");
            }
        }
    }

    #[test]
    fn test_cube_invariant() {
        let grid = HexGrid::new(20, 20, 1.0);
        for row in 0..20 {
            for col in 0..20 {
                let cube = grid.offset_to_cube(col, row);
                assert_eq!(cube.q + cube.r + cube.s, 0);
                let back = grid.cube_to_offset(cube);
                assert_eq!(back, HexAddress::new(col, row));
            }
        }
    }

    #[test]
    fn test_hex_distance_properties() {
        let grid = HexGrid::new(20, 20, 1.0);
        let a = HexAddress::new(3, 4);
        let b = HexAddress::new(9, 11);
        assert_eq!(grid.hex_distance(a, b), grid.hex_distance(b, a));
        assert_eq!(grid.hex_distance(a, a), 0);
    }

    #[test]
    fn test_known_distances() {
        let grid = HexGrid::new(20, 20, 1.0);
        let origin = HexAddress::new(0, 0);
        assert_eq!(grid.hex_distance(origin, HexAddress::new(0, 3)), 3);
        assert_eq!(grid.hex_distance(origin, HexAddress::new(2, 0)), 2);
        assert_eq!(grid.hex_distance(origin, HexAddress::new(1, 0)), 1);
        assert_eq!(
            grid.hex_distance(HexAddress::new(3, 4), HexAddress::new(4, 4)),
            1
        );
    }

    #[test]
    fn test_geometric_neighbors_are_distance_one() {
        // Odd-q cube adjacency: odd columns shift down, so the six
        // geometric neighbors differ between even and odd columns.
        let grid = HexGrid::new(20, 20, 1.0);
        let cases = [
            ((2, 2), [(2, 1), (2, 3), (1, 1), (1, 2), (3, 1), (3, 2)]),
            ((3, 3), [(3, 2), (3, 4), (2, 3), (2, 4), (4, 3), (4, 4)]),
        ];
        for ((col, row), neighbors) in cases {
            let center = HexAddress::new(col, row);
            for (nc, nr) in neighbors {
                assert_eq!(
                    grid.hex_distance(center, HexAddress::new(nc, nr)),
                    1,
                    "({col}, {row}) -> ({nc}, {nr})"
                );
            }
        }
    }

    #[test]
    fn test_mask_offsets_cover_same_cells_as_edge_offsets() {
        for row in [2usize, 3] {
            let mut edge: Vec<_> = edge_neighbor_offsets(row).to_vec();
            let mut mask: Vec<_> = mask_neighbor_offsets(row).to_vec();
            edge.sort();
            mask.sort();
            assert_eq!(edge, mask);
        }
    }

    #[test]
    fn test_side_offsets_partition_neighbors() {
        for row in [2usize, 3] {
            let mut sides: Vec<_> = east_neighbor_offsets(row)
                .iter()
                .chain(west_neighbor_offsets(row).iter())
                .copied()
                .collect();
            let mut all: Vec<_> = edge_neighbor_offsets(row).to_vec();
            sides.sort();
            all.sort();
            assert_eq!(sides, all);
        }
    }
}
