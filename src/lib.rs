//! Hex-grid geographic fusion engine
//!
//! Fuses land/water boundaries, elevation samples, land-cover and vector
//! river geometry into one consistent hexagonal world model with compact
//! per-cell codes ready for embedding into a map artifact.

pub mod config;
pub mod elevation;
pub mod error;
pub mod geo;
pub mod grid;
pub mod hexgrid;
pub mod pipeline;
pub mod rivers;
pub mod sources;
pub mod synthetic;
pub mod terrain;

pub use config::BuildConfig;
pub use error::MapError;
pub use pipeline::{build, MapModel, MapSources};
