//! Build pipeline: fuses all sources into one hex world model.
//!
//! Stages run strictly downstream, each consuming the immutable output of
//! its predecessor: grid fitting, land mask, elevation quantization, river
//! classification, terrain classification, then elevation overrides layered
//! in order (water tiles, lake banks, major-chain banks).

use log::info;

use crate::config::BuildConfig;
use crate::elevation::{ElevationQuantizer, ElevationStats, LandmarkCheck};
use crate::error::MapError;
use crate::geo::GeoHexMapper;
use crate::grid::HexMap;
use crate::rivers::{encode_flow, FlowHex, RiverClassification, RiverNetworkClassifier};
use crate::sources::{
    BiomeSource, ElevationSource, LandCoverSource, LandWaterSource, RiverSource,
};
use crate::terrain::TerrainClassifier;

/// External inputs for one build. Land/water and elevation are required;
/// the rest degrade to documented defaults when absent.
pub struct MapSources<'a> {
    pub land_water: &'a dyn LandWaterSource,
    pub elevation: &'a dyn ElevationSource,
    pub landcover: Option<&'a dyn LandCoverSource>,
    pub rivers: Option<&'a dyn RiverSource>,
    pub biomes: Option<&'a dyn BiomeSource>,
}

/// The fused world model, handed read-only to the export stage.
#[derive(Debug)]
pub struct MapModel {
    pub width: usize,
    pub height: usize,
    /// Hex radius in meters.
    pub hex_size_m: f64,
    pub land: HexMap<bool>,
    /// Final per-hex levels with all overrides applied.
    pub levels: HexMap<i8>,
    pub terrain_codes: HexMap<u8>,
    /// 6-bit mountain adjacency flags, zero off-mountain.
    pub mountain_mask: HexMap<u8>,
    pub rivers: RiverClassification,
    pub flow: Vec<FlowHex>,
    pub elevation_stats: ElevationStats,
    pub landmark_checks: Vec<LandmarkCheck>,
}

/// Run the full fusion pipeline.
pub fn build(config: &BuildConfig, sources: &MapSources) -> Result<MapModel, MapError> {
    config.validate()?;

    let width = config.width;
    let height = config.height;

    let mapper = GeoHexMapper::new(width, height, config.bounds, config.central_meridian_deg)?;
    info!(
        "grid: {}x{} hexes, {:.1} km per hex",
        width,
        height,
        mapper.hex_size_km()
    );

    info!("sampling land/water mask");
    let land = sources.land_water.land_mask(&config.bounds, width, height);
    info!("land: {} of {} hexes", land.count(), width * height);

    info!("sampling elevation");
    let raw_elevation = sources.elevation.sample_grid(&config.bounds, width, height);
    let quantizer = ElevationQuantizer::new(config);
    let (mut levels, elevation_stats) = quantizer.quantize_grid(&raw_elevation, Some(&land))?;
    elevation_stats.log_summary();

    let landmark_checks = quantizer.validate_landmarks(sources.elevation, &config.landmarks);

    info!("classifying rivers");
    let river_classifier = RiverNetworkClassifier::new(config);
    let river_lines = sources.rivers.map(|s| s.rivers()).unwrap_or_default();
    let rivers = river_classifier.classify(&river_lines, Some(&land));

    // Only lakes and the major chain render as standing water. Regular
    // rivers keep their land terrain and exist through the flow encoding.
    let mut water_members = rivers.lakes.clone();
    water_members.extend(rivers.chain_members().iter().copied());

    info!("classifying terrain");
    let landcover = sources
        .landcover
        .map(|s| s.sample_grid(&config.bounds, width, height));
    let biomes = sources
        .biomes
        .map(|s| s.biome_map(&config.bounds, width, height));
    let terrain_classifier = TerrainClassifier::new(config);
    let terrain = terrain_classifier.classify_grid(
        &levels,
        &land,
        &water_members,
        landcover.as_ref(),
        biomes.as_ref(),
    );
    terrain.log_distribution();

    // Bank-derived overrides layer over the terrain pass: lakes first, the
    // major chain last so it wins on any shared hex.
    let mut overrides = terrain.elevation_overrides;
    let lake_banks = river_classifier.bank_elevations(&rivers.lakes, &levels, Some(&land));
    info!("applied {} lake bank overrides", lake_banks.len());
    overrides.extend(lake_banks);
    let chain_banks =
        river_classifier.bank_elevations(rivers.chain_members(), &levels, Some(&land));
    info!("applied {} chain bank overrides", chain_banks.len());
    overrides.extend(chain_banks);

    for (&(col, row), &level) in &overrides {
        levels.set(col, row, level);
    }

    // Flow segments cover regular rivers only; lake terrain has no current.
    let segments = river_classifier.trace_segments(&rivers.regular_rivers, Some(&raw_elevation));
    let flow = encode_flow(&segments);

    Ok(MapModel {
        width,
        height,
        hex_size_m: mapper.hex_size_m(),
        land,
        levels,
        terrain_codes: terrain.codes,
        mountain_mask: terrain.mountain_mask,
        rivers,
        flow,
        elevation_stats,
        landmark_checks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoBounds;
    use crate::sources::{Polyline, RiverLine, NODATA};
    use crate::terrain::{decode_terrain, TerrainType};
    use std::collections::HashMap;

    /// Hand-built fixture: explicit land mask and per-cell elevations.
    struct FixtureWorld {
        land: Vec<Vec<bool>>,
        meters: Vec<Vec<f32>>,
        rivers: Vec<RiverLine>,
    }

    impl LandWaterSource for FixtureWorld {
        fn land_mask(&self, _bounds: &GeoBounds, width: usize, height: usize) -> HexMap<bool> {
            let mut mask = HexMap::new_with(width, height, false);
            for row in 0..height {
                for col in 0..width {
                    mask.set(col, row, self.land[row][col]);
                }
            }
            mask
        }
    }

    impl ElevationSource for FixtureWorld {
        fn elevation_at(&self, lon: f64, lat: f64) -> f32 {
            let height = self.meters.len();
            let width = self.meters[0].len();
            // Bounds in the fixtures are one degree per cell.
            let col = (lon.floor() as usize).min(width - 1);
            let row = (height as f64 - lat).floor().max(0.0) as usize;
            self.meters[row.min(height - 1)][col]
        }
    }

    impl RiverSource for FixtureWorld {
        fn rivers(&self) -> Vec<RiverLine> {
            self.rivers.clone()
        }
    }

    fn fixture_config(width: usize, height: usize) -> BuildConfig {
        BuildConfig {
            bounds: GeoBounds {
                min_lon: 0.0,
                max_lon: width as f64,
                min_lat: 0.0,
                max_lat: height as f64,
            },
            width,
            height,
            central_meridian_deg: width as f64 / 2.0,
            always_shallow: vec![],
            lakes: vec![],
            reservoirs: vec![],
            landmarks: vec![],
            ..Default::default()
        }
    }

    #[test]
    fn test_ocean_center_scenario() {
        // 3x3 grid: ocean center at -200m, land ring at 50m. The center is
        // one step from land, so it quantizes to shallow water and renders
        // as coastal water with a -1 override.
        let world = FixtureWorld {
            land: vec![
                vec![true, true, true],
                vec![true, false, true],
                vec![true, true, true],
            ],
            meters: vec![
                vec![50.0, 50.0, 50.0],
                vec![50.0, -200.0, 50.0],
                vec![50.0, 50.0, 50.0],
            ],
            rivers: vec![],
        };
        let config = fixture_config(3, 3);

        let model = build(
            &config,
            &MapSources {
                land_water: &world,
                elevation: &world,
                landcover: None,
                rivers: None,
                biomes: None,
            },
        )
        .unwrap();

        assert_eq!(*model.levels.get(1, 1), -1);
        let (idx, _) = decode_terrain(*model.terrain_codes.get(1, 1));
        assert_eq!(idx, TerrainType::CoastalWater as u8);
        assert_eq!(*model.levels.get(0, 0), 1, "50m land is level 1");
    }

    #[test]
    fn test_chain_hexes_render_as_lake_with_bank_elevation() {
        let width = 8;
        let height = 8;
        // All land except the south row; a named river runs down column 4.
        let mut land = vec![vec![true; width]; height];
        land[height - 1] = vec![false; width];
        let meters = vec![vec![250.0; width]; height];

        let river = RiverLine {
            name: "Dnipro".into(),
            line: Polyline::new(vec![(4.5, 7.5), (4.5, 1.5)]),
        };
        let world = FixtureWorld {
            land,
            meters,
            rivers: vec![river],
        };
        let config = fixture_config(width, height);

        let model = build(
            &config,
            &MapSources {
                land_water: &world,
                elevation: &world,
                landcover: None,
                rivers: Some(&world),
                biomes: None,
            },
        )
        .unwrap();

        let chain = &model.rivers.chain;
        assert!(!chain.is_empty());
        for &(col, row) in chain {
            let (idx, _) = decode_terrain(*model.terrain_codes.get(col, row));
            assert_eq!(idx, TerrainType::Lake as u8, "chain hex ({col}, {row})");
            // 250m banks are level 4: the chain sits one below.
            assert_eq!(*model.levels.get(col, row), 3);
        }
    }

    #[test]
    fn test_flow_entries_only_on_regular_rivers() {
        let width = 10;
        let height = 10;
        let land = vec![vec![true; width]; height];
        let meters = vec![vec![120.0; width]; height];

        let creek = RiverLine {
            name: "Side Creek".into(),
            line: Polyline::new(vec![(1.5, 8.5), (8.5, 8.5)]),
        };
        let world = FixtureWorld {
            land,
            meters,
            rivers: vec![creek],
        };
        let config = fixture_config(width, height);

        let model = build(
            &config,
            &MapSources {
                land_water: &world,
                elevation: &world,
                landcover: None,
                rivers: Some(&world),
                biomes: None,
            },
        )
        .unwrap();

        assert!(!model.flow.is_empty());
        let flow_by_pos: HashMap<(usize, usize), FlowHex> = model
            .flow
            .iter()
            .map(|f| ((f.col, f.row), *f))
            .collect();
        for pos in flow_by_pos.keys() {
            assert!(model.rivers.is_regular_river(pos.0, pos.1));
        }
        assert!(flow_by_pos.values().all(|f| f.exit_edge < 6));
    }

    #[test]
    fn test_regular_rivers_keep_land_terrain() {
        let width = 10;
        let height = 10;
        let land = vec![vec![true; width]; height];
        let meters = vec![vec![120.0; width]; height];

        let creek = RiverLine {
            name: "Side Creek".into(),
            line: Polyline::new(vec![(1.5, 8.5), (8.5, 8.5)]),
        };
        let world = FixtureWorld {
            land,
            meters,
            rivers: vec![creek],
        };
        let config = fixture_config(width, height);

        let model = build(
            &config,
            &MapSources {
                land_water: &world,
                elevation: &world,
                landcover: None,
                rivers: Some(&world),
                biomes: None,
            },
        )
        .unwrap();

        // Regular rivers live in the flow encoding only; the hexes underneath
        // keep their land terrain and quantized level.
        assert!(!model.rivers.regular_rivers.is_empty());
        for &(col, row) in &model.rivers.regular_rivers {
            assert!(!model.rivers.is_lake_terrain(col, row));
            let (idx, _) = decode_terrain(*model.terrain_codes.get(col, row));
            assert_ne!(
                idx,
                TerrainType::Lake as u8,
                "regular river hex ({col}, {row})"
            );
            assert_eq!(*model.levels.get(col, row), 2, "120m land is level 2");
        }
    }

    #[test]
    fn test_all_nodata_land_fails() {
        let world = FixtureWorld {
            land: vec![vec![true; 4]; 4],
            meters: vec![vec![NODATA; 4]; 4],
            rivers: vec![],
        };
        let config = fixture_config(4, 4);

        let err = build(
            &config,
            &MapSources {
                land_water: &world,
                elevation: &world,
                landcover: None,
                rivers: None,
                biomes: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, MapError::DataQuality(_)));
    }
}
