//! One runtime record per trip, from its first and last timed stop.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::feed::StopTime;
use crate::service::EligibleTrip;
use crate::time::{TimeBand, band_of, parse_clock};

const LOGGED_SAMPLES: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripRuntime {
    pub trip_id: String,
    pub route_id: String,
    pub route_short_name: String,
    pub direction_id: u8,
    pub service_id: String,
    pub block_id: Option<String>,
    pub start_secs: u32,
    pub end_secs: u32,
    pub first_stop_id: String,
    pub last_stop_id: String,
    pub runtime_min: f64,
    pub time_band: TimeBand,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionStats {
    pub malformed_times: usize,
    pub untimed_stop_times: usize,
    pub trips_without_stops: usize,
    pub non_positive_runtimes: usize,
}

#[derive(Debug, Default)]
pub struct Extraction {
    pub runtimes: Vec<TripRuntime>,
    pub stats: ExtractionStats,
}

#[derive(Debug, Clone, Copy)]
struct Endpoint<'a> {
    sequence: u32,
    secs: u32,
    stop_id: &'a str,
}

#[derive(Debug, Clone, Copy)]
struct Endpoints<'a> {
    first: Endpoint<'a>,
    last: Endpoint<'a>,
}

pub fn extract_runtimes(trips: &[EligibleTrip<'_>], stop_times: &[StopTime]) -> Extraction {
    let wanted: HashSet<&str> = trips
        .iter()
        .map(|eligible| eligible.trip.trip_id.as_str())
        .collect();

    let mut stats = ExtractionStats::default();
    let mut endpoints: HashMap<&str, Endpoints<'_>> = HashMap::new();

    for st in stop_times {
        if !wanted.contains(st.trip_id.as_str()) {
            continue;
        }
        if st.arrival_time.is_empty() || st.departure_time.is_empty() {
            stats.untimed_stop_times += 1;
            continue;
        }
        let parsed = (parse_clock(&st.arrival_time), parse_clock(&st.departure_time));
        let (arrival, departure) = match parsed {
            (Ok(a), Ok(d)) => (a, d),
            (Err(e), _) | (_, Err(e)) => {
                if stats.malformed_times < LOGGED_SAMPLES {
                    tracing::warn!(
                        trip_id = %st.trip_id,
                        stop_sequence = st.stop_sequence,
                        error = %e,
                        "Skipping stop time"
                    );
                }
                stats.malformed_times += 1;
                continue;
            }
        };

        let first = Endpoint {
            sequence: st.stop_sequence,
            secs: departure,
            stop_id: &st.stop_id,
        };
        let last = Endpoint {
            secs: arrival,
            ..first
        };

        endpoints
            .entry(st.trip_id.as_str())
            .and_modify(|ends| {
                if first.sequence < ends.first.sequence {
                    ends.first = first;
                }
                if last.sequence >= ends.last.sequence {
                    ends.last = last;
                }
            })
            .or_insert(Endpoints { first, last });
    }

    let mut runtimes = Vec::with_capacity(endpoints.len());
    for eligible in trips {
        let trip = eligible.trip;
        let Some(ends) = endpoints.get(trip.trip_id.as_str()) else {
            stats.trips_without_stops += 1;
            continue;
        };

        let start_secs = ends.first.secs;
        let end_secs = ends.last.secs;
        let runtime_min = (f64::from(end_secs) - f64::from(start_secs)) / 60.0;
        if runtime_min <= 0.0 {
            if stats.non_positive_runtimes < LOGGED_SAMPLES {
                tracing::warn!(trip_id = %trip.trip_id, runtime_min, "Non-positive trip runtime");
            }
            stats.non_positive_runtimes += 1;
        }

        runtimes.push(TripRuntime {
            trip_id: trip.trip_id.clone(),
            route_id: trip.route_id.clone(),
            route_short_name: eligible.route_short_name.to_string(),
            direction_id: trip.direction_id,
            service_id: trip.service_id.clone(),
            block_id: trip.block_id.clone(),
            start_secs,
            end_secs,
            first_stop_id: ends.first.stop_id.to_string(),
            last_stop_id: ends.last.stop_id.to_string(),
            runtime_min,
            time_band: band_of(start_secs),
        });
    }

    Extraction { runtimes, stats }
}
