//! Bus schedule fragility from a GTFS feed.
//!
//! Scores each weekday bus route, direction and time band by how little
//! recovery time its vehicles get between trips and how widely its scheduled
//! runtimes vary, then publishes the table as CSV.

pub mod config;
pub mod error;
pub mod feed;
pub mod layover;
pub mod lock;
pub mod output;
pub mod pipeline;
pub mod runtime;
pub mod scoring;
pub mod service;
pub mod stats;
pub mod time;
pub mod variability;

pub use error::{FragilityError, Result};
pub use pipeline::{FragilityReport, RunSummary, build_fragility_table};
pub use scoring::FragilityRow;
pub use time::{TimeBand, band_of, parse_clock};
