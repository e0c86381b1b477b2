//! Command-line and environment configuration for a run.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use clap::Parser;

use crate::error::{FragilityError, Result};
use crate::scoring::DEFAULT_MIN_TRIPS;

pub const DEFAULT_CATALOG_URL: &str = "https://ckan0.cf.opendata.inter.prod-toronto.ca";
pub const DEFAULT_PACKAGE_ID: &str = "merged-gtfs-ttc-routes-and-schedules";

/// Every flag can also come from the environment or a `.env` file.
#[derive(Debug, Parser)]
#[command(
    name = "bus-fragility",
    version,
    about = "Score how fragile each bus route's weekday schedule is"
)]
pub struct Args {
    /// Base URL of the open-data catalog
    #[arg(long, env = "FRAGILITY_CATALOG_URL", default_value = DEFAULT_CATALOG_URL)]
    pub catalog_url: String,

    /// Catalog package holding the GTFS bundle
    #[arg(long, env = "FRAGILITY_PACKAGE_ID", default_value = DEFAULT_PACKAGE_ID)]
    pub package_id: String,

    /// Read this GTFS zip instead of downloading from the catalog
    #[arg(long, env = "FRAGILITY_FEED_PATH")]
    pub feed_path: Option<PathBuf>,

    #[arg(long, env = "FRAGILITY_OUTPUT_DIR", default_value = "data")]
    pub output_dir: PathBuf,

    /// Segments need at least this many trips to be ranked
    #[arg(long, env = "FRAGILITY_MIN_TRIPS", default_value_t = DEFAULT_MIN_TRIPS)]
    pub min_trips: usize,

    /// How many ranked segments to print
    #[arg(long, env = "FRAGILITY_TOP", default_value_t = 15)]
    pub top: usize,

    /// IANA timezone used to stamp the run date
    #[arg(long, env = "FRAGILITY_TIMEZONE", default_value = "America/Toronto")]
    pub timezone: String,

    #[arg(long, env = "FRAGILITY_METADATA_TIMEOUT_SECS", default_value_t = 60)]
    pub metadata_timeout_secs: u64,

    #[arg(long, env = "FRAGILITY_DOWNLOAD_TIMEOUT_SECS", default_value_t = 120)]
    pub download_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    Catalog { catalog_url: String, package_id: String },
    LocalArchive(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub source: FeedSource,
    pub output_dir: PathBuf,
    pub min_trips: usize,
    pub top: usize,
    pub timezone: Tz,
    pub metadata_timeout: Duration,
    pub download_timeout: Duration,
}

impl Config {
    pub fn from_args(args: Args) -> Result<Self> {
        let timezone = args
            .timezone
            .parse::<Tz>()
            .map_err(|e| {
                FragilityError::ConfigError(format!("Unknown timezone {:?}: {}", args.timezone, e))
            })?;

        let source = match args.feed_path {
            Some(path) => FeedSource::LocalArchive(path),
            None => FeedSource::Catalog {
                catalog_url: args.catalog_url,
                package_id: args.package_id,
            },
        };

        Ok(Config {
            source,
            output_dir: args.output_dir,
            min_trips: args.min_trips,
            top: args.top,
            timezone,
            metadata_timeout: Duration::from_secs(args.metadata_timeout_secs),
            download_timeout: Duration::from_secs(args.download_timeout_secs),
        })
    }

    /// Today in the agency's timezone.
    pub fn run_date(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults_point_at_the_catalog() {
        let args = Args::try_parse_from(["bus-fragility", "--output-dir", "out"]).unwrap();
        let config = Config::from_args(args).unwrap();

        assert_matches!(config.source, FeedSource::Catalog { .. });
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.metadata_timeout, Duration::from_secs(60));
        assert_eq!(config.download_timeout, Duration::from_secs(120));
    }

    #[test]
    fn feed_path_selects_a_local_archive() {
        let args = Args::try_parse_from([
            "bus-fragility",
            "--feed-path",
            "gtfs.zip",
            "--min-trips",
            "10",
        ])
        .unwrap();
        let config = Config::from_args(args).unwrap();

        assert_eq!(config.source, FeedSource::LocalArchive(PathBuf::from("gtfs.zip")));
        assert_eq!(config.min_trips, 10);
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let args =
            Args::try_parse_from(["bus-fragility", "--timezone", "Mars/Olympus_Mons"]).unwrap();
        assert_matches!(Config::from_args(args), Err(FragilityError::ConfigError(_)));
    }
}
