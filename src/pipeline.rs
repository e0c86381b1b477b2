//! Feed tables in, scored segments out.
//!
//! `build_fragility_table` is pure. `run` wraps it with the run lock, feed
//! loading and publishing; any error before publishing leaves earlier outputs
//! as they were.

use serde::Serialize;

use crate::config::{Config, FeedSource};
use crate::error::{FragilityError, Result};
use crate::feed::{self, FeedLoader, GtfsFeed, SkippedRows};
use crate::layover::{LayoverCounts, aggregate_layovers, reconstruct_layovers};
use crate::lock::RunLock;
use crate::output::{OutputWriter, RunOutputs};
use crate::runtime::{ExtractionStats, extract_runtimes};
use crate::scoring::{FragilityRow, score_segments};
use crate::service::select_weekday_bus_trips;
use crate::variability::aggregate_runtimes;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub routes: usize,
    pub trips: usize,
    pub stop_times: usize,
    pub services: usize,
    pub skipped_rows: SkippedRows,
    pub weekday_services: usize,
    pub bus_routes: usize,
    pub eligible_trips: usize,
    pub trip_runtimes: usize,
    pub extraction: ExtractionStats,
    pub layovers: LayoverCounts,
    pub segments: usize,
    pub ranked_segments: usize,
}

#[derive(Debug, Clone)]
pub struct FragilityReport {
    pub rows: Vec<FragilityRow>,
    pub summary: RunSummary,
}

impl FragilityReport {
    pub fn ranked(&self, min_trips: usize) -> Vec<&FragilityRow> {
        crate::scoring::rank(&self.rows, min_trips)
    }
}

pub fn build_fragility_table(feed: &GtfsFeed, min_trips: usize) -> Result<FragilityReport> {
    let mut summary = RunSummary {
        routes: feed.routes.len(),
        trips: feed.trips.len(),
        stop_times: feed.stop_times.len(),
        services: feed.calendar.len(),
        skipped_rows: feed.skipped,
        ..RunSummary::default()
    };

    let selection = select_weekday_bus_trips(feed);
    summary.weekday_services = selection.weekday_services;
    summary.bus_routes = selection.bus_routes;
    summary.eligible_trips = selection.trips.len();
    tracing::info!(
        weekday_services = selection.weekday_services,
        bus_routes = selection.bus_routes,
        trips = selection.trips.len(),
        "Selected weekday bus trips"
    );

    if selection.trips.is_empty() {
        return Err(FragilityError::EmptyResult(format!(
            "no trips left after weekday/bus filtering ({} weekday services, {} bus routes)",
            selection.weekday_services, selection.bus_routes
        )));
    }

    let extraction = extract_runtimes(&selection.trips, &feed.stop_times);
    summary.trip_runtimes = extraction.runtimes.len();
    summary.extraction = extraction.stats;
    if extraction.runtimes.is_empty() {
        return Err(FragilityError::EmptyResult(format!(
            "none of the {} weekday bus trips has timed stop data",
            selection.trips.len()
        )));
    }

    let runtime_stats = aggregate_runtimes(&extraction.runtimes);
    let (layovers, counts) = reconstruct_layovers(&extraction.runtimes);
    summary.layovers = counts;
    let layover_stats = aggregate_layovers(&layovers);

    let rows = score_segments(&runtime_stats, &layover_stats);
    summary.segments = rows.len();
    summary.ranked_segments = rows.iter().filter(|row| row.trips >= min_trips).count();

    tracing::info!(
        runtimes = summary.trip_runtimes,
        layovers = counts.retained,
        segments = summary.segments,
        ranked = summary.ranked_segments,
        skipped_rows = summary.skipped_rows.total(),
        malformed_times = summary.extraction.malformed_times,
        "Built fragility table"
    );

    Ok(FragilityReport { rows, summary })
}

/// A finished run: the scored table and where it was published.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: FragilityReport,
    pub outputs: RunOutputs,
}

pub fn load_feed(config: &Config) -> Result<GtfsFeed> {
    match &config.source {
        FeedSource::Catalog {
            catalog_url,
            package_id,
        } => FeedLoader::new(catalog_url, config.metadata_timeout, config.download_timeout)?
            .fetch(package_id),
        FeedSource::LocalArchive(path) => feed::load_local(path),
    }
}

/// Lock, load, build, publish. Nothing is written unless every earlier step
/// succeeded.
pub fn run(config: &Config) -> Result<RunOutcome> {
    let writer = OutputWriter::new(&config.output_dir);
    let _lock = RunLock::acquire(writer.dir())?;

    let gtfs = load_feed(config)?;
    let report = build_fragility_table(&gtfs, config.min_trips)?;
    let outputs = writer.write_run(&report.rows, &report.summary, config.run_date())?;

    Ok(RunOutcome { report, outputs })
}
