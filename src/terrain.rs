//! Terrain classification and packed code encoding.
//!
//! Each hex gets one 8-bit terrain code: `(biome_variant << 4) | terrain_idx`.
//! The decision rules are ordered and the first match wins. The authoritative
//! land mask and elevation always dominate land-cover: land-cover saying
//! water on a land hex becomes open grassland, land-cover saying mountain at
//! low elevation is clamped down to the elevation-consistent type.
//!
//! Mountain rendering needs a second channel: a 6-bit adjacency mask marking
//! which neighbors are also mountain terrain, in mask bit order (NW=0, NE=1,
//! W=2, E=3, SW=4, SE=5). An isolated peak gets all 6 bits so it still
//! renders in three dimensions.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::{info, warn};
use rayon::prelude::*;

use crate::config::BuildConfig;
use crate::grid::HexMap;

/// Terrain type names in target-artifact index order (alphabetical).
pub const DEFAULT_TERRAIN_ORDER: [&str; 15] = [
    "CityTerrain",
    "CoastalWater",
    "DryGrass",
    "Forest",
    "Lake",
    "Mountain",
    "MountainSnow",
    "Ocean",
    "Prairie",
    "RockyField",
    "RockyForest",
    "Sterile",
    "StoneField",
    "Wasteland",
    "WoodLand",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TerrainType {
    CityTerrain,
    CoastalWater,
    DryGrass,
    Forest,
    Lake,
    Mountain,
    MountainSnow,
    Ocean,
    Prairie,
    RockyField,
    RockyForest,
    Sterile,
    StoneField,
    Wasteland,
    WoodLand,
}

impl TerrainType {
    pub const ALL: [TerrainType; 15] = [
        TerrainType::CityTerrain,
        TerrainType::CoastalWater,
        TerrainType::DryGrass,
        TerrainType::Forest,
        TerrainType::Lake,
        TerrainType::Mountain,
        TerrainType::MountainSnow,
        TerrainType::Ocean,
        TerrainType::Prairie,
        TerrainType::RockyField,
        TerrainType::RockyForest,
        TerrainType::Sterile,
        TerrainType::StoneField,
        TerrainType::Wasteland,
        TerrainType::WoodLand,
    ];

    pub fn name(self) -> &'static str {
        DEFAULT_TERRAIN_ORDER[self as usize]
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }
}

/// Copernicus CGLS-LC100 land-cover class to terrain type.
pub fn landcover_terrain(code: u16) -> Option<TerrainType> {
    let terrain = match code {
        0 => TerrainType::CityTerrain,   // unknown
        20 => TerrainType::DryGrass,     // shrubs, steppe shrubland
        30 => TerrainType::Prairie,      // herbaceous vegetation
        40 => TerrainType::Prairie,      // cropland
        50 => TerrainType::CityTerrain,  // urban
        60 => TerrainType::Mountain,     // bare / sparse vegetation
        70 => TerrainType::MountainSnow, // snow and ice
        80 => TerrainType::Lake,         // permanent water
        90 => TerrainType::CoastalWater, // herbaceous wetland
        100 => TerrainType::RockyField,  // moss and lichen
        111..=116 => TerrainType::Forest, // closed forest
        121..=126 => TerrainType::WoodLand, // open forest
        200 => TerrainType::Ocean,
        _ => return None,
    };
    Some(terrain)
}

/// Pack terrain index and biome variant into one code byte.
pub fn encode_terrain(terrain_idx: u8, biome_variant: u8) -> u8 {
    (biome_variant << 4) | (terrain_idx & 0x0F)
}

/// Inverse of [`encode_terrain`]: `(terrain_idx, biome_variant)`.
pub fn decode_terrain(code: u8) -> (u8, u8) {
    (code & 0x0F, code >> 4)
}

/// Biome variant forced onto snow-capped peaks.
pub const ARCTIC_VARIANT: u8 = 0;

const OCEAN_ELEVATION: i8 = -3;
const COASTAL_ELEVATION: i8 = -1;
const LAKE_ELEVATION: i8 = -1;

/// One classified hex: packed code plus an optional elevation override for
/// water tiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TerrainDecision {
    pub code: u8,
    pub elevation_override: Option<i8>,
}

/// Full-grid classification result.
#[derive(Clone, Debug)]
pub struct TerrainGrid {
    pub codes: HexMap<u8>,
    pub elevation_overrides: HashMap<(usize, usize), i8>,
    pub mountain_hexes: HashSet<(usize, usize)>,
    /// 6-bit adjacency flags, zero for non-mountain hexes.
    pub mountain_mask: HexMap<u8>,
}

impl TerrainGrid {
    pub fn log_distribution(&self) {
        let mut counts: BTreeMap<u8, usize> = BTreeMap::new();
        for (_, _, &code) in self.codes.iter() {
            *counts.entry(decode_terrain(code).0).or_insert(0) += 1;
        }
        info!("terrain distribution:");
        for (idx, count) in counts {
            let name = DEFAULT_TERRAIN_ORDER
                .get(idx as usize)
                .copied()
                .unwrap_or("Unknown");
            info!("  {name}: {count} hexes");
        }
    }
}

pub struct TerrainClassifier<'a> {
    config: &'a BuildConfig,
    /// Terrain index per type, following the configured artifact order.
    indices: [u8; 15],
}

impl<'a> TerrainClassifier<'a> {
    pub fn new(config: &'a BuildConfig) -> Self {
        // Default order first; a configured order overrides positions for
        // the names it lists. Unlisted names keep their default index.
        let mut indices = [0u8; 15];
        for (idx, terrain) in TerrainType::ALL.iter().enumerate() {
            indices[*terrain as usize] = idx as u8;
        }
        for (idx, name) in config.terrain_order.iter().enumerate() {
            match TerrainType::from_name(name) {
                Some(terrain) => indices[terrain as usize] = idx as u8,
                None => warn!("terrain: unknown type {name:?} in configured order"),
            }
        }
        Self { config, indices }
    }

    pub fn index_of(&self, terrain: TerrainType) -> u8 {
        self.indices[terrain as usize]
    }

    fn encode(&self, terrain: TerrainType, biome_variant: u8) -> u8 {
        encode_terrain(self.index_of(terrain), biome_variant)
    }

    /// Ordered decision rules for one hex; first match wins.
    ///
    /// `max_elevation` is the highest land level observed on the grid, used
    /// to widen the snow band down to the actual peaks of low-relief maps.
    pub fn terrain_for_hex(
        &self,
        elevation: i8,
        is_land: bool,
        is_water_member: bool,
        landcover: Option<u16>,
        biome: Option<u8>,
        max_elevation: Option<i8>,
    ) -> TerrainDecision {
        let variant = biome.unwrap_or(self.config.default_biome_variant);

        if !is_land {
            return if elevation <= -2 {
                TerrainDecision {
                    code: self.encode(TerrainType::Ocean, variant),
                    elevation_override: Some(OCEAN_ELEVATION),
                }
            } else {
                TerrainDecision {
                    code: self.encode(TerrainType::CoastalWater, variant),
                    elevation_override: Some(COASTAL_ELEVATION),
                }
            };
        }

        // Rivers and lakes on land render as lake terrain.
        if is_water_member {
            return TerrainDecision {
                code: self.encode(TerrainType::Lake, variant),
                elevation_override: Some(LAKE_ELEVATION),
            };
        }

        // High elevation must carry mountain terrain or it renders flat.
        if elevation >= 10 || max_elevation.is_some_and(|max| elevation == max) {
            return TerrainDecision {
                code: self.encode(TerrainType::MountainSnow, ARCTIC_VARIANT),
                elevation_override: None,
            };
        }
        if elevation >= 7 {
            return TerrainDecision {
                code: self.encode(TerrainType::Mountain, variant),
                elevation_override: None,
            };
        }
        if elevation >= 5 {
            let terrain = match landcover {
                Some(code) if (111..=116).contains(&code) => TerrainType::RockyForest,
                _ => TerrainType::RockyField,
            };
            return TerrainDecision {
                code: self.encode(terrain, variant),
                elevation_override: None,
            };
        }

        if let Some(terrain) = landcover.and_then(landcover_terrain) {
            // Land-cover water on an authoritative land hex: reservoirs,
            // rivers and wetlands already handled above, so open land.
            let terrain = match terrain {
                TerrainType::Ocean | TerrainType::Lake | TerrainType::CoastalWater => {
                    TerrainType::Prairie
                }
                TerrainType::Mountain if elevation < 7 => TerrainType::RockyField,
                TerrainType::MountainSnow if elevation < 10 => TerrainType::Mountain,
                other => other,
            };
            return TerrainDecision {
                code: self.encode(terrain, variant),
                elevation_override: None,
            };
        }

        TerrainDecision {
            code: self.encode(TerrainType::Prairie, variant),
            elevation_override: None,
        }
    }

    /// Classify the whole grid.
    ///
    /// `water_members` marks hexes rendering as lake terrain (regular
    /// rivers, lakes and the major chain). Their elevation override starts
    /// from the adjacent valley floor; the caller layers bank-derived
    /// overrides on top.
    pub fn classify_grid(
        &self,
        levels: &HexMap<i8>,
        land: &HexMap<bool>,
        water_members: &HashSet<(usize, usize)>,
        landcover: Option<&HexMap<u16>>,
        biomes: Option<&HexMap<u8>>,
    ) -> TerrainGrid {
        let width = levels.width;
        let height = levels.height;

        // The snow band needs actual relief to anchor to. With fewer than
        // two distinct land levels the observed maximum is meaningless and
        // only the fixed >= 10 rule applies.
        let mut land_levels: Vec<i8> = levels
            .iter()
            .filter(|&(c, r, _)| *land.get(c, r))
            .map(|(_, _, &level)| level)
            .collect();
        land_levels.sort_unstable();
        land_levels.dedup();
        let max_elevation = if land_levels.len() >= 2 {
            land_levels.last().copied()
        } else {
            warn!(
                "terrain: {} distinct land level(s), snow band disabled",
                land_levels.len()
            );
            None
        };

        let decisions: Vec<TerrainDecision> = (0..width * height)
            .into_par_iter()
            .map(|idx| {
                let col = idx % width;
                let row = idx / width;
                self.terrain_for_hex(
                    *levels.get(col, row),
                    *land.get(col, row),
                    water_members.contains(&(col, row)),
                    landcover.map(|g| *g.get(col, row)),
                    biomes.map(|g| *g.get(col, row)),
                    max_elevation,
                )
            })
            .collect();

        let mut codes = HexMap::new_with(width, height, 0u8);
        let mut elevation_overrides = HashMap::new();
        let mut mountain_hexes = HashSet::new();

        let mountain_idx = self.index_of(TerrainType::Mountain);
        let snow_idx = self.index_of(TerrainType::MountainSnow);

        for (idx, decision) in decisions.iter().enumerate() {
            let col = idx % width;
            let row = idx / width;
            codes.set(col, row, decision.code);

            let is_water_member = water_members.contains(&(col, row));
            if let Some(level) = decision.elevation_override {
                if !is_water_member {
                    elevation_overrides.insert((col, row), level);
                }
            }

            let terrain_idx = decode_terrain(decision.code).0;
            if terrain_idx == mountain_idx || terrain_idx == snow_idx {
                mountain_hexes.insert((col, row));
            }
        }

        // Water members sit at the valley floor of their surroundings.
        for &(col, row) in water_members {
            elevation_overrides.insert(
                (col, row),
                self.valley_floor(col, row, levels, land, water_members),
            );
        }

        let mountain_mask = mountain_adjacency_mask(&mountain_hexes, width, height);

        info!(
            "terrain: {} mountain hexes, {} elevation overrides",
            mountain_hexes.len(),
            elevation_overrides.len()
        );

        TerrainGrid {
            codes,
            elevation_overrides,
            mountain_hexes,
            mountain_mask,
        }
    }

    /// Lowest level among adjacent land hexes outside the water set.
    fn valley_floor(
        &self,
        col: usize,
        row: usize,
        levels: &HexMap<i8>,
        land: &HexMap<bool>,
        water_members: &HashSet<(usize, usize)>,
    ) -> i8 {
        levels
            .neighbors(col, row)
            .into_iter()
            .filter(|&(nc, nr)| *land.get(nc, nr) && !water_members.contains(&(nc, nr)))
            .map(|(nc, nr)| *levels.get(nc, nr))
            .min()
            .unwrap_or(LAKE_ELEVATION)
    }
}

/// Adjacency flags for mountain rendering.
///
/// Each mountain hex gets one bit per mask-order neighbor that is also a
/// mountain; a flagless hex is forced to 63 so isolated peaks still render.
pub fn mountain_adjacency_mask(
    mountain_hexes: &HashSet<(usize, usize)>,
    width: usize,
    height: usize,
) -> HexMap<u8> {
    let mut mask = HexMap::new_with(width, height, 0u8);

    for &(col, row) in mountain_hexes {
        let mut flags = 0u8;
        for (nc, nr, bit) in mask.mask_neighbors(col, row) {
            if mountain_hexes.contains(&(nc, nr)) {
                flags |= 1 << bit;
            }
        }
        if flags == 0 {
            flags = 63;
        }
        mask.set(col, row, flags);
    }

    mask
}
