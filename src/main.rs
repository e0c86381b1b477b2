//! Weekday bus schedule fragility batch job.
//!
//! Downloads the agency's GTFS bundle, scores every route/direction/time band
//! and publishes fragility_by_timeband_<date>.csv plus a _latest copy.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bus_fragility::config::{Args, Config};
use bus_fragility::pipeline::{self, RunOutcome};
use bus_fragility::{FragilityError, FragilityRow};

// ============================================================================
// Ranked Report
// ============================================================================

fn print_ranked(ranked: &[&FragilityRow], top: usize, min_trips: usize) {
    println!("\nMost fragile bus segments (at least {} trips):", min_trips);
    println!(
        "{:<8} {:>3} {:<16} {:>7} {:>8} {:>8} {:>6}  {}",
        "route", "dir", "band", "score", "layover", "spread", "trips", "why"
    );
    println!("{}", "─".repeat(90));

    for row in ranked.iter().take(top) {
        println!(
            "{:<8} {:>3} {:<16} {:>7.2} {:>8.1} {:>8.1} {:>6}  {}",
            row.route_short_name,
            row.direction_id,
            row.time_band.label(),
            row.fragility_score,
            row.median_layover_min,
            row.runtime_spread_min,
            row.trips,
            row.why
        );
    }

    if ranked.is_empty() {
        println!("(no segment reaches the trip threshold)");
    }
    println!();
}

// ============================================================================
// Run Report
// ============================================================================

fn print_outcome(outcome: &RunOutcome, config: &Config) {
    let report = &outcome.report;
    print_ranked(&report.ranked(config.min_trips), config.top, config.min_trips);

    for path in [
        &outcome.outputs.table.dated,
        &outcome.outputs.table.latest,
        &outcome.outputs.summary.latest,
    ] {
        println!("✓ Saved {}", path.display());
    }

    let extraction = &report.summary.extraction;
    let unparseable = report.summary.skipped_rows.total();
    let skipped = unparseable + extraction.malformed_times + extraction.untimed_stop_times;
    if skipped > 0 {
        println!(
            "⚠️  {} rows skipped ({} malformed times, {} untimed stop times, \
             {} unparseable table rows)",
            skipped, extraction.malformed_times, extraction.untimed_stop_times, unparseable
        );
    }
}

fn print_failure(e: &FragilityError) {
    eprintln!("\n❌ Fragility run failed: {}", e);
    eprintln!("\n💡 Troubleshooting:");
    match e {
        FragilityError::NetworkError(_) => {
            eprintln!("   1. Check your internet connection");
            eprintln!("   2. Verify the catalog URL is reachable");
            eprintln!("   3. Raise --metadata-timeout-secs / --download-timeout-secs");
        }
        FragilityError::ResourceNotFound { .. } => {
            eprintln!("   1. Check --package-id names the GTFS package");
            eprintln!("   2. Or pass a local archive with --feed-path");
        }
        FragilityError::RunInProgress { path } => {
            eprintln!("   1. Wait for the other run to finish");
            eprintln!("   2. If no run is active, remove {}", path.display());
        }
        FragilityError::EmptyResult(_) => {
            eprintln!("   1. The feed may have no Monday-Friday-only service or no bus routes");
        }
        _ => {
            eprintln!("   1. Review the error message above for specific issues");
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bus_fragility=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_args(Args::parse()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(2);
        }
    };

    tracing::info!(
        source = ?config.source,
        output_dir = %config.output_dir.display(),
        min_trips = config.min_trips,
        timezone = %config.timezone,
        "Starting fragility run"
    );

    match pipeline::run(&config) {
        Ok(outcome) => print_outcome(&outcome, &config),
        Err(e) => {
            tracing::error!(error = %e, "Run failed; previous outputs left untouched");
            print_failure(&e);
            std::process::exit(1);
        }
    }
}
