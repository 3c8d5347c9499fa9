//! Error taxonomy for the fusion pipeline.
//!
//! Only precondition violations and unusable input data abort a build.
//! Capacity overruns (river segment ids or positions exceeding their 8-bit
//! encoding fields) are handled by truncation plus a warning, and landmark
//! validation mismatches are reported without halting the run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapError {
    /// Invalid geographic bounds or grid dimensions, or a required external
    /// input is absent.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Input data is present but too degraded to build from, e.g. elevation
    /// NODATA covering most of the land grid.
    #[error("data quality: {0}")]
    DataQuality(String),
}
