use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use hexatlas::config::BuildConfig;
use hexatlas::pipeline::{build, MapSources};
use hexatlas::synthetic::SyntheticWorld;
use hexatlas::terrain::decode_terrain;

#[derive(Parser, Debug)]
#[command(name = "hexatlas")]
#[command(about = "Fuse geographic data into a hex-grid world model")]
struct Args {
    /// Build configuration JSON (defaults target the Ukraine region)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Grid width in hexes (overrides the configuration)
    #[arg(short = 'W', long)]
    width: Option<usize>,

    /// Grid height in hexes (overrides the configuration)
    #[arg(short = 'H', long)]
    height: Option<usize>,

    /// Seed for the synthetic data sources
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Print an ASCII preview of the terrain grid
    #[arg(long)]
    preview: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match fs::read_to_string(path).map_err(|e| e.to_string()).and_then(
            |json| BuildConfig::from_json(&json).map_err(|e| e.to_string()),
        ) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => BuildConfig::default(),
    };
    if let Some(width) = args.width {
        config.width = width;
    }
    if let Some(height) = args.height {
        config.height = height;
    }

    let world = SyntheticWorld::new(args.seed, config.bounds);
    let sources = MapSources {
        land_water: &world,
        elevation: &world,
        landcover: Some(&world),
        rivers: Some(&world),
        biomes: Some(&world),
    };

    let model = match build(&config, &sources) {
        Ok(model) => model,
        Err(e) => {
            eprintln!("build failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!(
        "Built {}x{} model, {:.1} km per hex",
        model.width,
        model.height,
        model.hex_size_m / 1000.0
    );
    println!(
        "Land: {} hexes, rivers: {} regular / {} lake / {} chain",
        model.land.count(),
        model.rivers.regular_rivers.len(),
        model.rivers.lakes.len(),
        model.rivers.chain.len()
    );
    println!("Flow entries: {}", model.flow.len());

    let failed: Vec<_> = model.landmark_checks.iter().filter(|c| !c.ok()).collect();
    if !failed.is_empty() {
        println!("Landmark mismatches: {}", failed.len());
        for check in failed {
            println!(
                "  {}: {:.0}m (level {})",
                check.name, check.meters, check.level
            );
        }
    }

    if args.preview {
        print_preview(&model);
    }

    ExitCode::SUCCESS
}

/// One character per hex, indexed by terrain type.
fn print_preview(model: &hexatlas::MapModel) {
    const GLYPHS: [char; 15] = [
        '#', ',', '"', 'T', 'l', 'M', 'S', '~', '.', 'r', 't', '_', 'o', 'x', 'w',
    ];
    for row in 0..model.height {
        let mut line = String::with_capacity(model.width);
        for col in 0..model.width {
            let (idx, _) = decode_terrain(*model.terrain_codes.get(col, row));
            line.push(GLYPHS.get(idx as usize).copied().unwrap_or('?'));
        }
        println!("{line}");
    }
}
