//! River network rasterization, repair and classification.
//!
//! Vector river lines are rasterized onto the hex grid, cleaned up (noise
//! components removed, endpoint gaps bridged), then partitioned into three
//! disjoint sets: the designated major river rendered as one ordered,
//! fully-adjacent chain, lake terrain (natural lakes plus reservoirs), and
//! regular rivers. The chain additionally gets per-hex bank elevations, and
//! regular rivers get per-hex flow-direction segments for rendering.
//!
//! Exit edges use the river direction encoding (NE=0, E=1, SE=2, SW=3,
//! W=4, NW=5). The fallback flow direction for hexes without a downhill
//! neighbor splits the grid at its center column: east of center flows SW,
//! west of center flows SE. This mirrors real drainage toward a southern
//! sea only approximately; with no ground-truth flow data available it is
//! kept as is.

use std::collections::{HashMap, HashSet, VecDeque};

use log::{info, warn};

use crate::config::BuildConfig;
use crate::grid::HexMap;
use crate::hexgrid::{east_neighbor_offsets, edge_neighbor_offsets, west_neighbor_offsets};
use crate::sources::RiverLine;

/// Sentinel segment id for hexes carrying no river flow.
pub const NO_RIVER_SEGMENT: u8 = 255;
/// Sentinel exit edge for hexes carrying no river flow.
pub const NO_RIVER_EDGE: u8 = 6;

/// Partition of water hexes produced by [`RiverNetworkClassifier::classify`].
///
/// The three sets are pairwise disjoint. `chain` is ordered north to south
/// and every consecutive pair is hex-adjacent.
#[derive(Clone, Debug, Default)]
pub struct RiverClassification {
    pub regular_rivers: HashSet<(usize, usize)>,
    pub lakes: HashSet<(usize, usize)>,
    pub chain: Vec<(usize, usize)>,
    chain_members: HashSet<(usize, usize)>,
}

impl RiverClassification {
    pub fn chain_members(&self) -> &HashSet<(usize, usize)> {
        &self.chain_members
    }

    /// True when the hex renders as lake terrain (chain or lake).
    pub fn is_lake_terrain(&self, col: usize, row: usize) -> bool {
        self.chain_members.contains(&(col, row)) || self.lakes.contains(&(col, row))
    }

    pub fn is_regular_river(&self, col: usize, row: usize) -> bool {
        self.regular_rivers.contains(&(col, row))
    }
}

/// One maximal connected river run, ordered along the traced path.
/// Each entry is `(col, row, exit_edge)`.
#[derive(Clone, Debug)]
pub struct RiverSegment {
    pub hexes: Vec<(usize, usize, u8)>,
}

/// Final per-hex flow encoding, 8-bit fields throughout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowHex {
    pub col: usize,
    pub row: usize,
    pub segment_id: u8,
    pub position: u8,
    pub exit_edge: u8,
}

pub struct RiverNetworkClassifier<'a> {
    config: &'a BuildConfig,
}

impl<'a> RiverNetworkClassifier<'a> {
    pub fn new(config: &'a BuildConfig) -> Self {
        Self { config }
    }

    fn width(&self) -> usize {
        self.config.width
    }

    fn height(&self) -> usize {
        self.config.height
    }

    fn neighbors(&self, col: usize, row: usize) -> Vec<(usize, usize, u8)> {
        let mut out = Vec::with_capacity(6);
        for (edge, &(dc, dr)) in edge_neighbor_offsets(row).iter().enumerate() {
            let nc = col as i32 + dc;
            let nr = row as i32 + dr;
            if nc >= 0 && nr >= 0 && (nc as usize) < self.width() && (nr as usize) < self.height() {
                out.push((nc as usize, nr as usize, edge as u8));
            }
        }
        out
    }

    fn is_land(land: Option<&HexMap<bool>>, col: usize, row: usize) -> bool {
        land.map_or(true, |mask| *mask.get(col, row))
    }

    /// Full classification pass.
    pub fn classify(
        &self,
        rivers: &[RiverLine],
        land: Option<&HexMap<bool>>,
    ) -> RiverClassification {
        let mut all_river_hexes = self.rasterize(rivers.iter());
        info!("rivers: {} rasterized hexes", all_river_hexes.len());

        self.cleanup(&mut all_river_hexes);

        if let Some(mask) = land {
            all_river_hexes.retain(|&(c, r)| *mask.get(c, r));
        }

        // The designated major river is traced from its own named lines and
        // rebuilt as an ordered chain.
        let major_lines: Vec<&RiverLine> = rivers
            .iter()
            .filter(|r| self.config.major_river_names.iter().any(|n| n == &r.name))
            .collect();
        if major_lines.is_empty() {
            info!("rivers: no major river lines matched by name");
        }
        let mut major_raw = self.rasterize(major_lines.into_iter());
        if let Some(mask) = land {
            major_raw.retain(|&(c, r)| *mask.get(c, r));
        }
        info!("rivers: {} raw major-river hexes on land", major_raw.len());

        let chain = self.build_chain(&major_raw, land);
        let chain_members: HashSet<(usize, usize)> = chain.iter().copied().collect();

        let mut lakes = self.lake_hexes(land);
        let reservoir_hexes: HashSet<(usize, usize)> = all_river_hexes
            .iter()
            .copied()
            .filter(|&(c, r)| {
                let (lon, lat) = self.config.bounds.cell_to_geo(c, r, self.width(), self.height());
                self.config.reservoirs.iter().any(|b| b.contains(lon, lat))
            })
            .collect();
        lakes.extend(reservoir_hexes);
        lakes.retain(|h| !chain_members.contains(h));

        let regular_rivers: HashSet<(usize, usize)> = all_river_hexes
            .iter()
            .copied()
            .filter(|h| !lakes.contains(h) && !chain_members.contains(h))
            .collect();

        info!(
            "rivers: {} regular, {} lake, {} chain hexes",
            regular_rivers.len(),
            lakes.len(),
            chain.len()
        );

        RiverClassification {
            regular_rivers,
            lakes,
            chain,
            chain_members,
        }
    }

    /// Rasterize line geometries onto the grid.
    ///
    /// Samples each line at half a hex's angular size; when consecutive
    /// samples land in non-adjacent cells the run between them is filled by
    /// integer interpolation so traced paths have no holes.
    pub fn rasterize<'r>(
        &self,
        lines: impl Iterator<Item = &'r RiverLine>,
    ) -> HashSet<(usize, usize)> {
        let bounds = &self.config.bounds;
        let hex_width_deg = (bounds.max_lon - bounds.min_lon) / self.width() as f64;
        let hex_height_deg = (bounds.max_lat - bounds.min_lat) / self.height() as f64;
        let interval = hex_width_deg.min(hex_height_deg) * 0.5;

        let mut hexes = HashSet::new();

        for river in lines {
            let samples = river.line.sample_along(interval);
            let mut prev: Option<(i32, i32)> = None;

            for (lon, lat) in samples {
                let (col, row) = bounds.geo_to_cell(lon, lat, self.width(), self.height());
                if col < 0 || row < 0 || col as usize >= self.width() || row as usize >= self.height()
                {
                    continue;
                }
                hexes.insert((col as usize, row as usize));

                if let Some((pc, pr)) = prev {
                    if (col - pc).abs() > 1 || (row - pr).abs() > 1 {
                        let steps = (col - pc).abs().max((row - pr).abs());
                        for step in 1..steps {
                            let ic = pc + (col - pc) * step / steps;
                            let ir = pr + (row - pr) * step / steps;
                            if ic >= 0
                                && ir >= 0
                                && (ic as usize) < self.width()
                                && (ir as usize) < self.height()
                            {
                                hexes.insert((ic as usize, ir as usize));
                            }
                        }
                    }
                }
                prev = Some((col, row));
            }
        }

        hexes
    }

    /// Remove noise components and bridge nearby endpoints.
    pub fn cleanup(&self, hexes: &mut HashSet<(usize, usize)>) {
        if hexes.len() < 2 {
            return;
        }
        let before = hexes.len();

        self.remove_tiny_components(hexes);

        let max_gap = self.config.max_river_gap as i32;
        let mut endpoints = self.find_endpoints(hexes);

        // A few passes let freshly bridged paths create new bridgeable pairs.
        for _ in 0..3 {
            let mut connected: HashSet<((usize, usize), (usize, usize))> = HashSet::new();
            let mut added = 0usize;

            for i in 0..endpoints.len() {
                for j in (i + 1)..endpoints.len() {
                    let ep1 = endpoints[i];
                    let ep2 = endpoints[j];
                    if connected.contains(&(ep1, ep2)) || connected.contains(&(ep2, ep1)) {
                        continue;
                    }

                    let dist = (ep1.0 as i32 - ep2.0 as i32).abs()
                        + (ep1.1 as i32 - ep2.1 as i32).abs();
                    if (2..=max_gap * 2).contains(&dist) {
                        let path = self.find_short_path(ep1, ep2, self.config.max_river_gap as usize + 1);
                        if !path.is_empty() {
                            for h in path {
                                if hexes.insert(h) {
                                    added += 1;
                                }
                            }
                            connected.insert((ep1, ep2));
                        }
                    }
                }
            }

            if added == 0 {
                break;
            }
            endpoints = self.find_endpoints(hexes);
        }

        let after = hexes.len();
        if after > before {
            info!("rivers: bridged gaps, added {} hexes", after - before);
        } else if after < before {
            info!("rivers: removed {} noise hexes", before - after);
        }
    }

    fn find_endpoints(&self, hexes: &HashSet<(usize, usize)>) -> Vec<(usize, usize)> {
        let mut endpoints: Vec<(usize, usize)> = hexes
            .iter()
            .copied()
            .filter(|&(c, r)| {
                self.neighbors(c, r)
                    .iter()
                    .filter(|&&(nc, nr, _)| hexes.contains(&(nc, nr)))
                    .count()
                    <= 1
            })
            .collect();
        endpoints.sort_unstable();
        endpoints
    }

    fn remove_tiny_components(&self, hexes: &mut HashSet<(usize, usize)>) {
        let min_size = self.config.min_river_component;
        let mut remaining: HashSet<(usize, usize)> = hexes.clone();
        let mut valid = HashSet::new();

        let mut seeds: Vec<(usize, usize)> = remaining.iter().copied().collect();
        seeds.sort_unstable();

        for seed in seeds {
            if !remaining.remove(&seed) {
                continue;
            }
            let mut component = vec![seed];
            let mut queue = VecDeque::from([seed]);
            while let Some((c, r)) = queue.pop_front() {
                for (nc, nr, _) in self.neighbors(c, r) {
                    if remaining.remove(&(nc, nr)) {
                        component.push((nc, nr));
                        queue.push_back((nc, nr));
                    }
                }
            }
            if component.len() >= min_size {
                valid.extend(component);
            }
        }

        *hexes = valid;
    }

    /// Bounded-depth BFS path between two hexes; empty when none exists
    /// within `max_length` steps. Includes both endpoints.
    fn find_short_path(
        &self,
        start: (usize, usize),
        end: (usize, usize),
        max_length: usize,
    ) -> Vec<(usize, usize)> {
        if start == end {
            return Vec::new();
        }

        let mut queue = VecDeque::from([(start, vec![start])]);
        let mut visited = HashSet::from([start]);

        while let Some((current, path)) = queue.pop_front() {
            if path.len() > max_length {
                continue;
            }
            for (nc, nr, _) in self.neighbors(current.0, current.1) {
                if (nc, nr) == end {
                    let mut full = path;
                    full.push(end);
                    return full;
                }
                if visited.insert((nc, nr)) {
                    let mut next_path = path.clone();
                    next_path.push((nc, nr));
                    queue.push_back(((nc, nr), next_path));
                }
            }
        }

        Vec::new()
    }

    /// All hexes inside the configured natural-lake boxes.
    fn lake_hexes(&self, land: Option<&HexMap<bool>>) -> HashSet<(usize, usize)> {
        let mut lake_hexes = HashSet::new();

        for lake in &self.config.lakes {
            let mut count = 0usize;
            for row in 0..self.height() {
                for col in 0..self.width() {
                    if !Self::is_land(land, col, row) {
                        continue;
                    }
                    let (lon, lat) = self.config.bounds.cell_to_geo(col, row, self.width(), self.height());
                    if lake.contains(lon, lat) {
                        lake_hexes.insert((col, row));
                        count += 1;
                    }
                }
            }
            if count > 0 {
                info!("rivers: lake {} covers {} hexes", lake.name, count);
            }
        }

        lake_hexes
    }

    /// Order the major river's raw hexes into one fully contiguous chain
    /// from north to south, filling data gaps and extending to the sea.
    pub fn build_chain(
        &self,
        raw: &HashSet<(usize, usize)>,
        land: Option<&HexMap<bool>>,
    ) -> Vec<(usize, usize)> {
        let mut hexes: Vec<(usize, usize)> = raw
            .iter()
            .copied()
            .filter(|&(c, r)| Self::is_land(land, c, r))
            .collect();
        if hexes.is_empty() {
            return Vec::new();
        }
        // North to south, west to east.
        hexes.sort_unstable_by_key(|&(c, r)| (r, c));

        let mut chain = vec![hexes[0]];
        let mut remaining: Vec<(usize, usize)> = hexes[1..].to_vec();
        let mut current = hexes[0];

        while !remaining.is_empty() {
            // Nearest remaining hex, rewarding southward movement.
            let mut best_idx = 0;
            let mut best_distance = f64::INFINITY;
            for (idx, &(c, r)) in remaining.iter().enumerate() {
                let dx = (c as f64 - current.0 as f64).abs();
                let dy = r as f64 - current.1 as f64;
                let bonus = if dy > 0.0 { dy * 0.1 } else { 0.0 };
                let distance = dx + dy.abs() - bonus;
                if distance < best_distance {
                    best_distance = distance;
                    best_idx = idx;
                }
            }
            let next = remaining.swap_remove(best_idx);

            let existing: HashSet<(usize, usize)> = chain.iter().copied().collect();
            let gap = self.fill_contiguous_gap(current, next, land, &existing);
            chain.extend(gap);
            chain.push(next);
            current = next;
        }

        if let Some(mask) = land {
            chain = self.extend_to_sea(chain, mask);
        }

        chain = self.ensure_contiguous(chain, land);

        if let (Some(first), Some(last)) = (chain.first(), chain.last()) {
            info!(
                "rivers: major chain spans {} hexes, rows {} to {}",
                chain.len(),
                first.1,
                last.1
            );
        }
        chain
    }

    /// Path between two non-adjacent hexes, excluding both endpoints.
    ///
    /// First BFS over land, then over land plus existing chain hexes, then
    /// straight-line interpolation when no connected path exists at all.
    fn fill_contiguous_gap(
        &self,
        start: (usize, usize),
        end: (usize, usize),
        land: Option<&HexMap<bool>>,
        existing: &HashSet<(usize, usize)>,
    ) -> Vec<(usize, usize)> {
        if self
            .neighbors(start.0, start.1)
            .iter()
            .any(|&(nc, nr, _)| (nc, nr) == end)
        {
            return Vec::new();
        }

        for allow_existing in [false, true] {
            let mut queue = VecDeque::from([(start, vec![start])]);
            let mut visited = HashSet::from([start]);

            while let Some((current, path)) = queue.pop_front() {
                for (nc, nr, _) in self.neighbors(current.0, current.1) {
                    if (nc, nr) == end {
                        return path[1..].to_vec();
                    }
                    if visited.contains(&(nc, nr)) {
                        continue;
                    }
                    let passable = Self::is_land(land, nc, nr)
                        || (allow_existing && existing.contains(&(nc, nr)));
                    if passable {
                        visited.insert((nc, nr));
                        let mut next_path = path.clone();
                        next_path.push((nc, nr));
                        queue.push_back(((nc, nr), next_path));
                    }
                }
            }
        }

        self.interpolate_gap(start, end, land)
    }

    /// Straight-line fallback when no connected land path exists.
    fn interpolate_gap(
        &self,
        start: (usize, usize),
        end: (usize, usize),
        land: Option<&HexMap<bool>>,
    ) -> Vec<(usize, usize)> {
        let (sc, sr) = (start.0 as i32, start.1 as i32);
        let (ec, er) = (end.0 as i32, end.1 as i32);
        let steps = (ec - sc).abs().max((er - sr).abs());
        if steps <= 1 {
            return Vec::new();
        }

        let mut gap = Vec::new();
        for step in 1..steps {
            let col = (sc + (ec - sc) * step / steps) as usize;
            let row = (sr + (er - sr) * step / steps) as usize;
            if Self::is_land(land, col, row) {
                gap.push((col, row));
            }
        }
        gap
    }

    /// Extend the chain hex by hex until it touches ocean.
    fn extend_to_sea(
        &self,
        chain: Vec<(usize, usize)>,
        land: &HexMap<bool>,
    ) -> Vec<(usize, usize)> {
        let start = match chain.last() {
            Some(&h) => h,
            None => return chain,
        };

        let mut extended = chain;
        let mut extended_set: HashSet<(usize, usize)> = extended.iter().copied().collect();
        let mut current = start;
        let max_extensions = 30;

        for _ in 0..max_extensions {
            let mut at_coast = false;
            let mut candidates: Vec<((usize, usize), i64)> = Vec::new();

            for (nc, nr, _) in self.neighbors(current.0, current.1) {
                if !*land.get(nc, nr) {
                    at_coast = true;
                } else if !extended_set.contains(&(nc, nr)) {
                    // Prefer south, lightly prefer staying in column.
                    let score = nr as i64 * 10 - (nc as i64 - current.0 as i64).abs();
                    candidates.push(((nc, nr), score));
                }
            }

            if at_coast {
                info!("rivers: major chain reaches the sea at row {}", current.1);
                break;
            }

            if let Some(&(best, _)) = candidates.iter().max_by_key(|&&(_, score)| score) {
                extended.push(best);
                extended_set.insert(best);
                current = best;
                continue;
            }

            // Boxed in: route to the nearest coastal land hex instead.
            if let Some(coastal) = self.find_nearest_coastal_hex(current, land) {
                let path = self.bfs_land_path(current, coastal, land);
                if !path.is_empty() {
                    for &h in &path[1..] {
                        if extended_set.insert(h) {
                            extended.push(h);
                        }
                    }
                    current = *extended.last().expect("chain is non-empty");
                    continue;
                }
            }

            warn!("rivers: major chain stopped at row {}, no path to sea", current.1);
            break;
        }

        extended
    }

    fn find_nearest_coastal_hex(
        &self,
        start: (usize, usize),
        land: &HexMap<bool>,
    ) -> Option<(usize, usize)> {
        let mut queue = VecDeque::from([start]);
        let mut visited = HashSet::from([start]);

        while let Some((col, row)) = queue.pop_front() {
            if *land.get(col, row)
                && self
                    .neighbors(col, row)
                    .iter()
                    .any(|&(nc, nr, _)| !*land.get(nc, nr))
            {
                return Some((col, row));
            }
            for (nc, nr, _) in self.neighbors(col, row) {
                if *land.get(nc, nr) && visited.insert((nc, nr)) {
                    queue.push_back((nc, nr));
                }
            }
        }

        None
    }

    fn bfs_land_path(
        &self,
        start: (usize, usize),
        end: (usize, usize),
        land: &HexMap<bool>,
    ) -> Vec<(usize, usize)> {
        let mut queue = VecDeque::from([(start, vec![start])]);
        let mut visited = HashSet::from([start]);

        while let Some((current, path)) = queue.pop_front() {
            if current == end {
                return path;
            }
            for (nc, nr, _) in self.neighbors(current.0, current.1) {
                if *land.get(nc, nr) && visited.insert((nc, nr)) {
                    let mut next_path = path.clone();
                    next_path.push((nc, nr));
                    queue.push_back(((nc, nr), next_path));
                }
            }
        }

        Vec::new()
    }

    /// Repair pass: make every consecutive pair in the chain hex-adjacent.
    fn ensure_contiguous(
        &self,
        chain: Vec<(usize, usize)>,
        land: Option<&HexMap<bool>>,
    ) -> Vec<(usize, usize)> {
        if chain.len() <= 1 {
            return chain;
        }

        let chain_set: HashSet<(usize, usize)> = chain.iter().copied().collect();
        let mut result = vec![chain[0]];

        for &curr in &chain[1..] {
            let prev = *result.last().expect("result is non-empty");
            let adjacent = self
                .neighbors(prev.0, prev.1)
                .iter()
                .any(|&(nc, nr, _)| (nc, nr) == curr);
            if !adjacent {
                let gap = self.fill_contiguous_gap(prev, curr, land, &chain_set);
                result.extend(gap);
            }
            result.push(curr);
        }

        result
    }

    /// Target elevation for each member hex: one level below the lowest of
    /// its east/west bank neighbors, floored at shallow water (-1).
    ///
    /// Bank candidates are land hexes outside the member set with a
    /// non-negative level. Members with no qualifying bank default to -1.
    pub fn bank_elevations(
        &self,
        members: &HashSet<(usize, usize)>,
        levels: &HexMap<i8>,
        land: Option<&HexMap<bool>>,
    ) -> HashMap<(usize, usize), i8> {
        let mut result = HashMap::with_capacity(members.len());

        for &(col, row) in members {
            let mut bank_levels: Vec<i8> = Vec::new();

            let sides = east_neighbor_offsets(row)
                .iter()
                .chain(west_neighbor_offsets(row).iter());
            for &(dc, dr) in sides {
                let nc = col as i32 + dc;
                let nr = row as i32 + dr;
                if nc < 0 || nr < 0 || nc as usize >= self.width() || nr as usize >= self.height() {
                    continue;
                }
                let (nc, nr) = (nc as usize, nr as usize);
                if members.contains(&(nc, nr)) || !Self::is_land(land, nc, nr) {
                    continue;
                }
                let level = *levels.get(nc, nr);
                if level >= 0 {
                    bank_levels.push(level);
                }
            }

            let level = match bank_levels.iter().min() {
                Some(&min_bank) => (min_bank - 1).max(-1),
                None => -1,
            };
            result.insert((col, row), level);
        }

        result
    }

    /// Trace a hex set into maximal connected segments with per-hex exit
    /// edges, then merge segments whose endpoints are adjacent.
    ///
    /// The exit edge is the rendering flow direction, not the edge to the
    /// next hex in the segment: downhill when elevation shows a strictly
    /// lower neighbor, otherwise the geographic fallback.
    pub fn trace_segments(
        &self,
        hexes: &HashSet<(usize, usize)>,
        elevation_m: Option<&HexMap<f32>>,
    ) -> Vec<RiverSegment> {
        if hexes.is_empty() {
            return Vec::new();
        }

        let mut adjacency: HashMap<(usize, usize), Vec<(usize, usize, u8)>> = HashMap::new();
        for &(col, row) in hexes {
            let links: Vec<(usize, usize, u8)> = self
                .neighbors(col, row)
                .into_iter()
                .filter(|&(nc, nr, _)| hexes.contains(&(nc, nr)))
                .collect();
            adjacency.insert((col, row), links);
        }

        let mut ordered: Vec<(usize, usize)> = hexes.iter().copied().collect();
        ordered.sort_unstable();

        let mut remaining: HashSet<(usize, usize)> = hexes.clone();
        let mut segments: Vec<Vec<(usize, usize, u8)>> = Vec::new();

        while !remaining.is_empty() {
            // Start at an endpoint where possible for a natural trace order.
            let start = ordered
                .iter()
                .copied()
                .filter(|h| remaining.contains(h))
                .find(|h| {
                    adjacency[h]
                        .iter()
                        .filter(|&&(nc, nr, _)| remaining.contains(&(nc, nr)))
                        .count()
                        <= 1
                })
                .or_else(|| ordered.iter().copied().find(|h| remaining.contains(h)))
                .expect("remaining is non-empty");

            remaining.remove(&start);
            let mut segment = Vec::new();
            let mut current = start;

            loop {
                let next = adjacency[&current]
                    .iter()
                    .copied()
                    .find(|&(nc, nr, _)| remaining.contains(&(nc, nr)));

                let exit_edge = self.flow_direction(current.0, current.1, elevation_m);
                segment.push((current.0, current.1, exit_edge));

                match next {
                    Some((nc, nr, _)) => {
                        remaining.remove(&(nc, nr));
                        current = (nc, nr);
                    }
                    None => break,
                }
            }

            segments.push(segment);
        }

        let merged = self.merge_connected_segments(segments, &adjacency);
        info!("rivers: traced {} flow segments", merged.len());
        merged.into_iter().map(|hexes| RiverSegment { hexes }).collect()
    }

    /// Downstream exit edge for a river hex.
    fn flow_direction(
        &self,
        col: usize,
        row: usize,
        elevation_m: Option<&HexMap<f32>>,
    ) -> u8 {
        if let Some(elevation) = elevation_m {
            let mut lowest = *elevation.get(col, row);
            let mut best_edge = None;
            for (nc, nr, edge) in self.neighbors(col, row) {
                let neighbor = *elevation.get(nc, nr);
                if neighbor < lowest {
                    lowest = neighbor;
                    best_edge = Some(edge);
                }
            }
            if let Some(edge) = best_edge {
                return edge;
            }
        }

        // Geographic fallback, split at the center column.
        if col > self.width() / 2 {
            3 // SW
        } else {
            2 // SE
        }
    }

    fn merge_connected_segments(
        &self,
        segments: Vec<Vec<(usize, usize, u8)>>,
        adjacency: &HashMap<(usize, usize), Vec<(usize, usize, u8)>>,
    ) -> Vec<Vec<(usize, usize, u8)>> {
        if segments.len() <= 1 {
            return segments;
        }

        let mut by_start: HashMap<(usize, usize), usize> = HashMap::new();
        let mut by_end: HashMap<(usize, usize), usize> = HashMap::new();
        for (i, seg) in segments.iter().enumerate() {
            if let (Some(first), Some(last)) = (seg.first(), seg.last()) {
                by_start.insert((first.0, first.1), i);
                by_end.insert((last.0, last.1), i);
            }
        }

        let mut merged = Vec::new();
        let mut used: HashSet<usize> = HashSet::new();

        for i in 0..segments.len() {
            if used.contains(&i) {
                continue;
            }
            let mut current = segments[i].clone();
            used.insert(i);

            // Prepend segments ending next to our start, patching their
            // final exit edge toward the junction.
            loop {
                let Some(&(sc, sr, _)) = current.first() else { break };
                let mut found = false;
                for &(nc, nr, edge) in adjacency.get(&(sc, sr)).into_iter().flatten() {
                    if let Some(&other_idx) = by_end.get(&(nc, nr)) {
                        if !used.contains(&other_idx) {
                            let mut other = segments[other_idx].clone();
                            if let Some(last) = other.last_mut() {
                                *last = (last.0, last.1, edge);
                            }
                            other.extend(current);
                            current = other;
                            used.insert(other_idx);
                            found = true;
                            break;
                        }
                    }
                }
                if !found {
                    break;
                }
            }

            // Append segments starting next to our end.
            loop {
                let Some(&(ec, er, _)) = current.last() else { break };
                let mut found = false;
                for &(nc, nr, edge) in adjacency.get(&(ec, er)).into_iter().flatten() {
                    if let Some(&other_idx) = by_start.get(&(nc, nr)) {
                        if !used.contains(&other_idx) {
                            if let Some(last) = current.last_mut() {
                                *last = (last.0, last.1, edge);
                            }
                            current.extend(segments[other_idx].iter().copied());
                            used.insert(other_idx);
                            found = true;
                            break;
                        }
                    }
                }
                if !found {
                    break;
                }
            }

            merged.push(current);
        }

        merged
    }
}

/// Flatten traced segments to 8-bit flow entries.
///
/// Segment ids above 254 and positions above 255 do not fit the encoding
/// fields; excess entries are dropped with a warning.
pub fn encode_flow(segments: &[RiverSegment]) -> Vec<FlowHex> {
    let mut entries = Vec::new();

    for (segment_id, segment) in segments.iter().enumerate() {
        if segment_id > 254 {
            warn!(
                "rivers: {} flow segments exceed the 255-segment limit, truncating",
                segments.len()
            );
            break;
        }
        for (position, &(col, row, exit_edge)) in segment.hexes.iter().enumerate() {
            if position > 255 {
                warn!(
                    "rivers: segment {} has {} hexes, truncating at 256",
                    segment_id,
                    segment.hexes.len()
                );
                break;
            }
            entries.push(FlowHex {
                col,
                row,
                segment_id: segment_id as u8,
                position: position as u8,
                exit_edge,
            });
        }
    }

    entries
}

/// Expand the sparse flow list into dense per-hex grids, segment ids and
/// exit edges, with the no-river sentinels everywhere else. This is the
/// shape the export stage consumes.
pub fn flow_grids(flow: &[FlowHex], width: usize, height: usize) -> (HexMap<u8>, HexMap<u8>) {
    let mut segment_ids = HexMap::new_with(width, height, NO_RIVER_SEGMENT);
    let mut exit_edges = HexMap::new_with(width, height, NO_RIVER_EDGE);
    for hex in flow {
        segment_ids.set(hex.col, hex.row, hex.segment_id);
        exit_edges.set(hex.col, hex.row, hex.exit_edge);
    }
    (segment_ids, exit_edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoBounds;
    use crate::sources::Polyline;

    fn test_config(width: usize, height: usize) -> BuildConfig {
        BuildConfig {
            bounds: GeoBounds {
                min_lon: 0.0,
                max_lon: width as f64,
                min_lat: 0.0,
                max_lat: height as f64,
            },
            width,
            height,
            lakes: vec![],
            reservoirs: vec![],
            major_river_names: vec!["Test River".into()],
            ..Default::default()
        }
    }

    fn adjacent(a: (usize, usize), b: (usize, usize)) -> bool {
        edge_neighbor_offsets(a.1)
            .iter()
            .any(|&(dc, dr)| (a.0 as i32 + dc, a.1 as i32 + dr) == (b.0 as i32, b.1 as i32))
    }

    /// Cell-center coordinates under the 1-degree-per-cell test bounds.
    fn cell_point(col: usize, row: usize, height: usize) -> (f64, f64) {
        (col as f64 + 0.5, height as f64 - row as f64 - 0.5)
    }

    #[test]
    fn test_rasterize_marks_line_cells() {
        let config = test_config(10, 10);
        let classifier = RiverNetworkClassifier::new(&config);

        let line = RiverLine {
            name: "Test River".into(),
            line: Polyline::new(vec![cell_point(1, 1, 10), cell_point(8, 1, 10)]),
        };
        let hexes = classifier.rasterize([&line].into_iter());

        for col in 1..=8 {
            assert!(hexes.contains(&(col, 1)), "missing ({col}, 1)");
        }
    }

    #[test]
    fn test_rasterize_fills_sample_gaps() {
        let config = test_config(20, 20);
        let classifier = RiverNetworkClassifier::new(&config);

        // Two distant points only: interpolation must leave no holes larger
        // than one cell between consecutive marked cells.
        let line = RiverLine {
            name: "x".into(),
            line: Polyline::new(vec![cell_point(0, 0, 20), cell_point(19, 19, 20)]),
        };
        let hexes = classifier.rasterize([&line].into_iter());
        assert!(hexes.contains(&(0, 0)));
        assert!(hexes.contains(&(19, 19)));
        assert!(hexes.len() >= 19);
    }

    #[test]
    fn test_tiny_components_removed() {
        let config = test_config(12, 12);
        let classifier = RiverNetworkClassifier::new(&config);

        let mut hexes: HashSet<(usize, usize)> =
            [(1, 1), (2, 1), (3, 1), (4, 1), (10, 10)].into_iter().collect();
        classifier.cleanup(&mut hexes);

        assert!(!hexes.contains(&(10, 10)), "isolated hex should be dropped");
        assert!(hexes.contains(&(2, 1)));
    }

    #[test]
    fn test_endpoint_gap_bridged() {
        let config = test_config(14, 6);
        let classifier = RiverNetworkClassifier::new(&config);

        // Two runs on row 2 with a 2-hex gap between their endpoints.
        let mut hexes: HashSet<(usize, usize)> =
            [(1, 2), (2, 2), (3, 2), (6, 2), (7, 2), (8, 2)].into_iter().collect();
        classifier.cleanup(&mut hexes);

        // After bridging the set is one connected component.
        let mut seen = HashSet::new();
        let start = *hexes.iter().min().unwrap();
        let mut queue = VecDeque::from([start]);
        seen.insert(start);
        while let Some((c, r)) = queue.pop_front() {
            for (nc, nr, _) in classifier.neighbors(c, r) {
                if hexes.contains(&(nc, nr)) && seen.insert((nc, nr)) {
                    queue.push_back((nc, nr));
                }
            }
        }
        assert_eq!(seen.len(), hexes.len(), "gap was not bridged");
    }

    #[test]
    fn test_chain_is_contiguous_and_reaches_sea() {
        let config = test_config(10, 10);
        let classifier = RiverNetworkClassifier::new(&config);

        // All land except the southernmost row.
        let mut land = HexMap::new_with(10, 10, true);
        for col in 0..10 {
            land.set(col, 9, false);
        }

        let raw: HashSet<(usize, usize)> =
            [(4, 1), (5, 3), (3, 5), (5, 6), (4, 8)].into_iter().collect();
        let chain = classifier.build_chain(&raw, Some(&land));

        assert!(!chain.is_empty());
        for pair in chain.windows(2) {
            assert!(
                adjacent(pair[0], pair[1]),
                "chain break between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }

        let last = *chain.last().unwrap();
        let touches_ocean = classifier
            .neighbors(last.0, last.1)
            .iter()
            .any(|&(nc, nr, _)| !*land.get(nc, nr));
        assert!(touches_ocean, "chain end {last:?} is not coastal");
    }

    #[test]
    fn test_chain_starts_north() {
        let config = test_config(8, 8);
        let classifier = RiverNetworkClassifier::new(&config);

        let raw: HashSet<(usize, usize)> = [(2, 5), (3, 1), (4, 3)].into_iter().collect();
        let chain = classifier.build_chain(&raw, None);
        assert_eq!(chain[0], (3, 1));
    }

    #[test]
    fn test_bank_elevations() {
        let config = test_config(5, 3);
        let classifier = RiverNetworkClassifier::new(&config);

        // River hex at (2, 1), banks at level 3 and 5.
        let members: HashSet<(usize, usize)> = [(2, 1)].into_iter().collect();
        let mut levels = HexMap::new_with(5, 3, 5i8);
        levels.set(1, 1, 3);

        let banks = classifier.bank_elevations(&members, &levels, None);
        assert_eq!(banks[&(2, 1)], 2, "one below the lowest bank");
    }

    #[test]
    fn test_bank_elevation_floors_at_shallow() {
        let config = test_config(5, 3);
        let classifier = RiverNetworkClassifier::new(&config);

        let members: HashSet<(usize, usize)> = [(2, 1)].into_iter().collect();
        let levels = HexMap::new_with(5, 3, 0i8);

        let banks = classifier.bank_elevations(&members, &levels, None);
        assert_eq!(banks[&(2, 1)], -1);
    }

    #[test]
    fn test_bank_elevation_default_without_banks() {
        let config = test_config(3, 3);
        let classifier = RiverNetworkClassifier::new(&config);

        let members: HashSet<(usize, usize)> = [(1, 1)].into_iter().collect();
        // All neighbors below sea level: no qualifying bank.
        let levels = HexMap::new_with(3, 3, -2i8);

        let banks = classifier.bank_elevations(&members, &levels, None);
        assert_eq!(banks[&(1, 1)], -1);
    }

    #[test]
    fn test_trace_single_segment_positions() {
        let config = test_config(10, 4);
        let classifier = RiverNetworkClassifier::new(&config);

        let hexes: HashSet<(usize, usize)> =
            (2..7).map(|col| (col, 2)).collect();
        let segments = classifier.trace_segments(&hexes, None);

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].hexes.len(), 5);

        let flow = encode_flow(&segments);
        let positions: Vec<u8> = flow.iter().map(|f| f.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3, 4]);
        assert!(flow.iter().all(|f| f.segment_id == 0));
    }

    #[test]
    fn test_flow_grids_default_to_no_river() {
        let segments = vec![RiverSegment {
            hexes: vec![(2, 2, 1), (3, 2, 2)],
        }];
        let flow = encode_flow(&segments);
        let (segment_ids, exit_edges) = flow_grids(&flow, 5, 5);

        assert_eq!(*segment_ids.get(2, 2), 0);
        assert_eq!(*exit_edges.get(3, 2), 2);
        // Every hex off the river carries the sentinels.
        assert_eq!(*segment_ids.get(0, 0), NO_RIVER_SEGMENT);
        assert_eq!(*exit_edges.get(0, 0), NO_RIVER_EDGE);
    }

    #[test]
    fn test_flow_follows_downhill() {
        let config = test_config(5, 5);
        let classifier = RiverNetworkClassifier::new(&config);

        // East neighbor strictly lower: flow must exit east (edge 1).
        let mut elevation = HexMap::new_with(5, 5, 100.0f32);
        elevation.set(3, 2, 10.0);
        let edge = classifier.flow_direction(2, 2, Some(&elevation));
        assert_eq!(edge, 1);
    }

    #[test]
    fn test_flow_fallback_splits_at_center() {
        let config = test_config(10, 10);
        let classifier = RiverNetworkClassifier::new(&config);

        let flat = HexMap::new_with(10, 10, 50.0f32);
        assert_eq!(classifier.flow_direction(8, 5, Some(&flat)), 3); // east side -> SW
        assert_eq!(classifier.flow_direction(2, 5, Some(&flat)), 2); // west side -> SE
        assert_eq!(classifier.flow_direction(2, 5, None), 2);
    }

    #[test]
    fn test_classify_sets_are_disjoint() {
        let config = test_config(12, 12);
        let classifier = RiverNetworkClassifier::new(&config);

        let rivers = vec![
            RiverLine {
                name: "Test River".into(),
                line: Polyline::new(vec![cell_point(5, 1, 12), cell_point(5, 9, 12)]),
            },
            RiverLine {
                name: "Side Creek".into(),
                line: Polyline::new(vec![cell_point(1, 3, 12), cell_point(9, 3, 12)]),
            },
        ];

        let classification = classifier.classify(&rivers, None);

        for h in &classification.regular_rivers {
            assert!(!classification.lakes.contains(h));
            assert!(!classification.chain_members().contains(h));
        }
        for h in &classification.lakes {
            assert!(!classification.chain_members().contains(h));
        }
        assert!(!classification.chain.is_empty());
    }
}
