//! GTFS schedule feed loading.
//!
//! Catalog: CKAN-style `package_show` endpoint, e.g.
//! `<catalog>/api/3/action/package_show?id=merged-gtfs-ttc-routes-and-schedules`
//!
//! The package lists several resources; the GTFS bundle is the zip whose URL or
//! name mentions "gtfs". Only routes, trips, stop_times and calendar are read.

use bytes::Bytes;
use reqwest::blocking;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use std::time::Duration;
use zip::ZipArchive;

use crate::error::{FragilityError, Result};

// ============================================================================
// Data Structures
// ============================================================================

/// GTFS `route_type` for bus service.
pub const BUS_ROUTE_TYPE: u16 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub route_id: String,
    pub route_short_name: String,
    pub route_long_name: String,
    pub route_type: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub trip_id: String,
    pub route_id: String,
    pub service_id: String,
    pub direction_id: u8,
    pub block_id: Option<String>,
}

/// Clock times stay textual here; they are normalized during runtime extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopTime {
    pub trip_id: String,
    pub stop_id: String,
    pub stop_sequence: u32,
    pub arrival_time: String,
    pub departure_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCalendar {
    pub service_id: String,
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub sunday: bool,
}

/// Rows dropped while parsing, per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkippedRows {
    pub routes: usize,
    pub trips: usize,
    pub stop_times: usize,
    pub calendar: usize,
}

impl SkippedRows {
    pub fn total(&self) -> usize {
        self.routes + self.trips + self.stop_times + self.calendar
    }
}

#[derive(Debug, Clone, Default)]
pub struct GtfsFeed {
    pub routes: Vec<Route>,
    pub trips: Vec<Trip>,
    pub stop_times: Vec<StopTime>,
    pub calendar: Vec<ServiceCalendar>,
    pub skipped: SkippedRows,
}

// ============================================================================
// Catalog Resources
// ============================================================================

#[derive(Debug, Deserialize)]
struct PackageShow {
    result: PackageResult,
}

#[derive(Debug, Deserialize)]
struct PackageResult {
    #[serde(default)]
    resources: Vec<CatalogResource>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogResource {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

impl CatalogResource {
    pub fn is_archive(&self) -> bool {
        let url_is_zip = self
            .url
            .as_deref()
            .is_some_and(|url| url.to_lowercase().ends_with(".zip"));
        let format_is_zip = self
            .format
            .as_deref()
            .is_some_and(|format| format.trim().eq_ignore_ascii_case("zip"));
        url_is_zip || format_is_zip
    }

    pub fn mentions_gtfs(&self) -> bool {
        [self.url.as_deref(), self.name.as_deref()]
            .into_iter()
            .flatten()
            .any(|text| text.to_lowercase().contains("gtfs"))
    }
}

/// Prefers a GTFS-looking archive, then any archive.
pub fn select_resource<'a>(
    package_id: &str,
    resources: &'a [CatalogResource],
) -> Result<&'a CatalogResource> {
    let with_url = || {
        resources
            .iter()
            .filter(|r| r.url.as_deref().is_some_and(|u| !u.is_empty()))
    };

    with_url()
        .find(|r| r.is_archive() && r.mentions_gtfs())
        .or_else(|| with_url().find(|r| r.is_archive()))
        .ok_or_else(|| FragilityError::ResourceNotFound {
            package_id: package_id.to_string(),
        })
}

// ============================================================================
// Remote Loading
// ============================================================================

pub struct FeedLoader {
    client: blocking::Client,
    catalog_url: String,
    metadata_timeout: Duration,
    download_timeout: Duration,
}

impl FeedLoader {
    const PACKAGE_SHOW_PATH: &'static str = "/api/3/action/package_show";

    pub fn new(
        catalog_url: &str,
        metadata_timeout: Duration,
        download_timeout: Duration,
    ) -> Result<Self> {
        let client = blocking::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                FragilityError::NetworkError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(FeedLoader {
            client,
            catalog_url: catalog_url.trim_end_matches('/').to_string(),
            metadata_timeout,
            download_timeout,
        })
    }

    pub fn fetch(&self, package_id: &str) -> Result<GtfsFeed> {
        let archive_url = self.resolve_archive_url(package_id)?;
        let zip_bytes = self.download(&archive_url)?;
        parse_archive(zip_bytes)
    }

    pub fn resolve_archive_url(&self, package_id: &str) -> Result<String> {
        let url = format!("{}{}", self.catalog_url, Self::PACKAGE_SHOW_PATH);
        tracing::info!(%url, package_id, "Querying catalog");

        let response = self
            .client
            .get(&url)
            .query(&[("id", package_id)])
            .timeout(self.metadata_timeout)
            .send()
            .map_err(|e| FragilityError::NetworkError(format!("Failed to query catalog: {}", e)))?;

        if !response.status().is_success() {
            return Err(FragilityError::NetworkError(format!(
                "Catalog returned error: {}",
                response.status()
            )));
        }

        let package: PackageShow = response
            .json()
            .map_err(|e| FragilityError::ParseError(format!("Invalid catalog response: {}", e)))?;

        let resource = select_resource(package_id, &package.result.resources)?;
        let archive_url = resource.url.clone().unwrap_or_default();
        tracing::info!(
            url = %archive_url,
            name = resource.name.as_deref().unwrap_or(""),
            "Selected feed archive"
        );
        Ok(archive_url)
    }

    pub fn download(&self, archive_url: &str) -> Result<Bytes> {
        tracing::info!(url = %archive_url, "Downloading GTFS archive");

        let response = self
            .client
            .get(archive_url)
            .timeout(self.download_timeout)
            .send()
            .map_err(|e| {
                FragilityError::NetworkError(format!("Failed to download GTFS archive: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(FragilityError::NetworkError(format!(
                "Download failed with status: {}",
                response.status()
            )));
        }

        let zip_bytes = response
            .bytes()
            .map_err(|e| FragilityError::NetworkError(format!("Failed to read GTFS zip: {}", e)))?;

        tracing::info!(kib = zip_bytes.len() / 1024, "Downloaded GTFS archive");
        Ok(zip_bytes)
    }
}

pub fn load_local(path: &Path) -> Result<GtfsFeed> {
    tracing::info!(path = %path.display(), "Reading local GTFS archive");
    let contents = fs::read(path).map_err(|e| {
        FragilityError::FileError(format!("Failed to read {}: {}", path.display(), e))
    })?;
    parse_archive(Bytes::from(contents))
}

// ============================================================================
// Archive Parsing
// ============================================================================

pub fn parse_archive(zip_bytes: Bytes) -> Result<GtfsFeed> {
    let mut archive = ZipArchive::new(Cursor::new(zip_bytes))
        .map_err(|e| FragilityError::ParseError(format!("Failed to open GTFS zip: {}", e)))?;

    let mut skipped = SkippedRows::default();

    let (raw, bad) =
        read_table::<RawRoute>(&mut archive, "routes.txt", &["route_id", "route_type"])?;
    let routes = convert(raw, bad, &mut skipped.routes, RawRoute::into_route);
    tracing::info!(routes = routes.len(), skipped = skipped.routes, "Parsed routes");

    let (raw, bad) = read_table::<RawTrip>(
        &mut archive,
        "trips.txt",
        &["route_id", "service_id", "trip_id", "direction_id"],
    )?;
    let trips = convert(raw, bad, &mut skipped.trips, RawTrip::into_trip);
    tracing::info!(trips = trips.len(), skipped = skipped.trips, "Parsed trips");

    let (raw, bad) = read_table::<RawStopTime>(
        &mut archive,
        "stop_times.txt",
        &["trip_id", "arrival_time", "departure_time", "stop_id", "stop_sequence"],
    )?;
    let stop_times = convert(raw, bad, &mut skipped.stop_times, RawStopTime::into_stop_time);
    tracing::info!(
        stop_times = stop_times.len(),
        skipped = skipped.stop_times,
        "Parsed stop times"
    );

    let (raw, bad) = read_table::<RawCalendar>(
        &mut archive,
        "calendar.txt",
        &[
            "service_id",
            "monday",
            "tuesday",
            "wednesday",
            "thursday",
            "friday",
            "saturday",
            "sunday",
        ],
    )?;
    let calendar = convert(raw, bad, &mut skipped.calendar, RawCalendar::into_calendar);
    tracing::info!(services = calendar.len(), skipped = skipped.calendar, "Parsed calendar");

    Ok(GtfsFeed {
        routes,
        trips,
        stop_times,
        calendar,
        skipped,
    })
}

/// Reads one member table by header name. Returns the rows that deserialized
/// and the number that did not.
fn read_table<T: DeserializeOwned>(
    archive: &mut ZipArchive<Cursor<Bytes>>,
    name: &'static str,
    required: &[&str],
) -> Result<(Vec<T>, usize)> {
    let mut file = archive.by_name(name).map_err(|_| FragilityError::MissingTable(name))?;

    let mut contents = Vec::new();
    file.read_to_end(&mut contents)
        .map_err(|e| FragilityError::FileError(format!("Failed to read {}: {}", name, e)))?;
    drop(file);

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(contents.as_slice());

    let headers = rdr
        .headers()
        .map_err(|e| FragilityError::ParseError(format!("Failed to read {} header: {}", name, e)))?
        .clone();
    if let Some(missing) = required.iter().find(|col| !headers.iter().any(|h| h == **col)) {
        return Err(FragilityError::ParseError(format!(
            "{} is missing column {}",
            name, missing
        )));
    }

    let mut rows = Vec::new();
    let mut bad = 0;
    for result in rdr.deserialize::<T>() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => {
                bad += 1;
                tracing::debug!(table = name, error = %e, "Skipping undecodable row");
            }
        }
    }

    Ok((rows, bad))
}

fn convert<R, T>(
    raw: Vec<R>,
    undecodable: usize,
    skipped: &mut usize,
    f: fn(R) -> Option<T>,
) -> Vec<T> {
    let total = raw.len();
    let rows: Vec<T> = raw.into_iter().filter_map(f).collect();
    *skipped += undecodable + (total - rows.len());
    rows
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

fn flag(value: &str) -> Option<bool> {
    match value {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct RawRoute {
    route_id: String,
    #[serde(default)]
    route_short_name: String,
    #[serde(default)]
    route_long_name: String,
    route_type: String,
}

impl RawRoute {
    fn into_route(self) -> Option<Route> {
        Some(Route {
            route_type: self.route_type.parse().ok()?,
            route_id: non_empty(self.route_id)?,
            route_short_name: self.route_short_name,
            route_long_name: self.route_long_name,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawTrip {
    route_id: String,
    service_id: String,
    trip_id: String,
    direction_id: String,
    #[serde(default)]
    block_id: String,
}

impl RawTrip {
    fn into_trip(self) -> Option<Trip> {
        let direction_id = match self.direction_id.as_str() {
            "0" => 0,
            "1" => 1,
            _ => return None,
        };
        Some(Trip {
            trip_id: non_empty(self.trip_id)?,
            route_id: non_empty(self.route_id)?,
            service_id: non_empty(self.service_id)?,
            direction_id,
            block_id: non_empty(self.block_id),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawStopTime {
    trip_id: String,
    #[serde(default)]
    arrival_time: String,
    #[serde(default)]
    departure_time: String,
    stop_id: String,
    stop_sequence: String,
}

impl RawStopTime {
    fn into_stop_time(self) -> Option<StopTime> {
        Some(StopTime {
            stop_sequence: self.stop_sequence.parse().ok()?,
            trip_id: non_empty(self.trip_id)?,
            stop_id: non_empty(self.stop_id)?,
            arrival_time: self.arrival_time,
            departure_time: self.departure_time,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawCalendar {
    service_id: String,
    monday: String,
    tuesday: String,
    wednesday: String,
    thursday: String,
    friday: String,
    saturday: String,
    sunday: String,
}

impl RawCalendar {
    fn into_calendar(self) -> Option<ServiceCalendar> {
        Some(ServiceCalendar {
            monday: flag(&self.monday)?,
            tuesday: flag(&self.tuesday)?,
            wednesday: flag(&self.wednesday)?,
            thursday: flag(&self.thursday)?,
            friday: flag(&self.friday)?,
            saturday: flag(&self.saturday)?,
            sunday: flag(&self.sunday)?,
            service_id: non_empty(self.service_id)?,
        })
    }
}
