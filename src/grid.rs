//! Fixed-size per-hex storage.
//!
//! A `HexMap<T>` holds one value per grid cell, indexed by `row * width + col`.
//! Neighbor lookups are computed from offset tables rather than looked up in a
//! hash structure, so graph traversals (distance propagation, gap repair,
//! chain construction) run over a stable, fully materialized adjacency.

use crate::hexgrid::{edge_neighbor_offsets, mask_neighbor_offsets};

/// A 2D per-hex value grid. Does not wrap on any edge.
#[derive(Clone, Debug)]
pub struct HexMap<T> {
    pub width: usize,
    pub height: usize,
    data: Vec<T>,
}

impl<T: Clone + Default> HexMap<T> {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![T::default(); width * height],
        }
    }
}

impl<T: Clone> HexMap<T> {
    pub fn new_with(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Wrap a row-major buffer. Panics if the length does not match.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(data.len(), width * height);
        Self {
            width,
            height,
            data,
        }
    }

    fn index(&self, col: usize, row: usize) -> usize {
        debug_assert!(col < self.width && row < self.height);
        row * self.width + col
    }

    pub fn get(&self, col: usize, row: usize) -> &T {
        &self.data[self.index(col, row)]
    }

    pub fn get_mut(&mut self, col: usize, row: usize) -> &mut T {
        let idx = self.index(col, row);
        &mut self.data[idx]
    }

    pub fn set(&mut self, col: usize, row: usize, value: T) {
        let idx = self.index(col, row);
        self.data[idx] = value;
    }

    pub fn in_bounds(&self, col: i32, row: i32) -> bool {
        col >= 0 && row >= 0 && (col as usize) < self.width && (row as usize) < self.height
    }

    /// Iterate over all cells with their coordinates, row-major.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &T)> {
        self.data.iter().enumerate().map(move |(idx, val)| {
            let col = idx % self.width;
            let row = idx / self.width;
            (col, row, val)
        })
    }

    /// In-bounds hex neighbors in river edge-direction order (NE, E, SE, SW, W, NW),
    /// each paired with its exit-edge index 0-5.
    pub fn edge_neighbors(&self, col: usize, row: usize) -> Vec<(usize, usize, u8)> {
        let mut result = Vec::with_capacity(6);
        for (edge, (dc, dr)) in edge_neighbor_offsets(row).iter().enumerate() {
            let nc = col as i32 + dc;
            let nr = row as i32 + dr;
            if self.in_bounds(nc, nr) {
                result.push((nc as usize, nr as usize, edge as u8));
            }
        }
        result
    }

    /// In-bounds hex neighbors without direction labels.
    pub fn neighbors(&self, col: usize, row: usize) -> Vec<(usize, usize)> {
        self.edge_neighbors(col, row)
            .into_iter()
            .map(|(nc, nr, _)| (nc, nr))
            .collect()
    }

    /// In-bounds hex neighbors in mountain-mask bit order (NW, NE, W, E, SW, SE),
    /// each paired with its bit index 0-5.
    pub fn mask_neighbors(&self, col: usize, row: usize) -> Vec<(usize, usize, u8)> {
        let mut result = Vec::with_capacity(6);
        for (bit, (dc, dr)) in mask_neighbor_offsets(row).iter().enumerate() {
            let nc = col as i32 + dc;
            let nr = row as i32 + dr;
            if self.in_bounds(nc, nr) {
                result.push((nc as usize, nr as usize, bit as u8));
            }
        }
        result
    }
}

impl HexMap<bool> {
    /// Count cells set to true.
    pub fn count(&self) -> usize {
        self.iter().filter(|&(_, _, &v)| v).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_major_indexing() {
        let mut map = HexMap::new_with(4, 3, 0u8);
        map.set(3, 2, 7);
        assert_eq!(*map.get(3, 2), 7);
        assert_eq!(map.iter().filter(|&(_, _, &v)| v == 7).count(), 1);
    }

    #[test]
    fn test_neighbors_respect_bounds() {
        let map = HexMap::new_with(3, 3, ());
        // Corner hex has fewer than 6 neighbors.
        assert!(map.neighbors(0, 0).len() < 6);
        // Interior hex of a large-enough grid has all 6.
        let big = HexMap::new_with(5, 5, ());
        assert_eq!(big.neighbors(2, 2).len(), 6);
    }

    #[test]
    fn test_edge_neighbor_direction_labels() {
        let map = HexMap::new_with(5, 5, ());
        // Even row: east neighbor (edge 1) is (col+1, row).
        let neighbors = map.edge_neighbors(2, 2);
        let east = neighbors.iter().find(|&&(_, _, e)| e == 1).unwrap();
        assert_eq!((east.0, east.1), (3, 2));
        // Odd row: west neighbor (edge 4) is (col-1, row).
        let neighbors = map.edge_neighbors(2, 3);
        let west = neighbors.iter().find(|&&(_, _, e)| e == 4).unwrap();
        assert_eq!((west.0, west.1), (1, 3));
    }
}
