//! Recovery time between consecutive trips of the same vehicle block.

use std::collections::BTreeMap;

use itertools::Itertools;
use serde::Serialize;

use crate::runtime::TripRuntime;
use crate::stats::Spread;
use crate::time::{TimeBand, band_of};
use crate::variability::SegmentKey;

/// Longer gaps are shift breaks or vehicle swaps, not recovery buffers.
pub const MAX_LAYOVER_MIN: f64 = 120.0;

/// Gap between one trip of a block and the next one the same vehicle runs.
/// Route, direction and band come from the trip that just ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoverRecord {
    pub service_id: String,
    pub block_id: String,
    pub route_id: String,
    pub route_short_name: String,
    pub direction_id: u8,
    pub time_band: TimeBand,
    pub layover_min: f64,
    pub last_stop_id: String,
    pub next_first_stop_id: String,
}

impl LayoverRecord {
    fn between(prev: &TripRuntime, next: &TripRuntime, block_id: &str) -> Self {
        LayoverRecord {
            service_id: prev.service_id.clone(),
            block_id: block_id.to_string(),
            route_id: prev.route_id.clone(),
            route_short_name: prev.route_short_name.clone(),
            direction_id: prev.direction_id,
            time_band: band_of(prev.end_secs),
            layover_min: (f64::from(next.start_secs) - f64::from(prev.end_secs)) / 60.0,
            last_stop_id: prev.last_stop_id.clone(),
            next_first_stop_id: next.first_stop_id.clone(),
        }
    }

    pub fn within_bounds(&self) -> bool {
        (0.0..=MAX_LAYOVER_MIN).contains(&self.layover_min)
    }

    /// The vehicle starts the next trip where it finished the previous one.
    pub fn is_continuous(&self) -> bool {
        self.last_stop_id == self.next_first_stop_id
    }

    pub fn is_recovery(&self) -> bool {
        self.within_bounds() && self.is_continuous()
    }

    pub fn segment(&self) -> SegmentKey {
        SegmentKey::new(&self.route_id, &self.route_short_name, self.direction_id, self.time_band)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LayoverCounts {
    pub candidates: usize,
    pub retained: usize,
    pub dropped_gap: usize,
    pub dropped_discontinuous: usize,
}

/// Every consecutive pair within a (service, block), in block order.
/// Trips without a block id never pair up.
pub fn layover_candidates(runtimes: &[TripRuntime]) -> Vec<LayoverRecord> {
    let groups = runtimes
        .iter()
        .filter_map(|rt| Some(((rt.service_id.as_str(), rt.block_id.as_deref()?), rt)))
        .into_group_map();

    groups
        .into_iter()
        .sorted_unstable_by_key(|(key, _)| *key)
        .flat_map(|((_, block_id), mut trips)| {
            trips.sort_by(|a, b| {
                a.start_secs
                    .cmp(&b.start_secs)
                    .then_with(|| a.trip_id.cmp(&b.trip_id))
            });
            trips
                .into_iter()
                .tuple_windows()
                .map(move |(prev, next)| LayoverRecord::between(prev, next, block_id))
        })
        .collect()
}

pub fn reconstruct_layovers(runtimes: &[TripRuntime]) -> (Vec<LayoverRecord>, LayoverCounts) {
    let mut counts = LayoverCounts::default();
    let mut retained = Vec::new();

    for record in layover_candidates(runtimes) {
        counts.candidates += 1;
        if !record.within_bounds() {
            counts.dropped_gap += 1;
        } else if !record.is_continuous() {
            counts.dropped_discontinuous += 1;
        } else {
            retained.push(record);
        }
    }
    counts.retained = retained.len();

    tracing::debug!(?counts, "Reconstructed block layovers");
    (retained, counts)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoverStats {
    pub layovers: usize,
    pub median_layover_min: f64,
    pub p10_layover_min: f64,
    pub p90_layover_min: f64,
}

pub fn aggregate_layovers(records: &[LayoverRecord]) -> BTreeMap<SegmentKey, LayoverStats> {
    let mut groups: BTreeMap<SegmentKey, Vec<f64>> = BTreeMap::new();
    for record in records {
        groups.entry(record.segment()).or_default().push(record.layover_min);
    }

    groups
        .into_iter()
        .filter_map(|(key, values)| {
            let spread = Spread::of(values)?;
            Some((
                key,
                LayoverStats {
                    layovers: spread.count,
                    median_layover_min: spread.median,
                    p10_layover_min: spread.p10,
                    p90_layover_min: spread.p90,
                },
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trip(
        id: &str,
        block: Option<&str>,
        start: u32,
        end: u32,
        first: &str,
        last: &str,
    ) -> TripRuntime {
        TripRuntime {
            trip_id: id.to_string(),
            route_id: "7".to_string(),
            route_short_name: "7".to_string(),
            direction_id: 0,
            service_id: "wk".to_string(),
            block_id: block.map(str::to_string),
            start_secs: start,
            end_secs: end,
            first_stop_id: first.to_string(),
            last_stop_id: last.to_string(),
            runtime_min: (f64::from(end) - f64::from(start)) / 60.0,
            time_band: band_of(start),
        }
    }

    #[test]
    fn two_minute_turnaround_at_the_same_stop() {
        let runtimes = vec![
            trip("B", Some("b1"), 3720, 5400, "X", "Y"),
            trip("A", Some("b1"), 1800, 3600, "W", "X"),
        ];
        let (records, counts) = reconstruct_layovers(&runtimes);

        assert_eq!(counts.candidates, 1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].layover_min, 2.0);
        assert_eq!(records[0].time_band, TimeBand::Overnight);
    }

    #[test]
    fn last_trip_of_a_block_has_no_record() {
        let runtimes = vec![trip("A", Some("b1"), 0, 600, "X", "Y")];
        assert!(layover_candidates(&runtimes).is_empty());
    }

    #[test]
    fn trips_without_a_block_never_pair() {
        let runtimes = vec![
            trip("A", None, 0, 600, "X", "Y"),
            trip("B", None, 700, 1200, "Y", "X"),
        ];
        assert!(layover_candidates(&runtimes).is_empty());
    }

    #[test]
    fn blocks_are_scoped_by_service() {
        let mut other = trip("B", Some("b1"), 700, 1200, "Y", "X");
        other.service_id = "sat".to_string();
        let runtimes = vec![trip("A", Some("b1"), 0, 600, "X", "Y"), other];
        assert!(layover_candidates(&runtimes).is_empty());
    }

    #[test]
    fn drops_long_negative_and_relocating_gaps() {
        let runtimes = vec![
            trip("a", Some("b1"), 6 * 3600, 7 * 3600, "S", "X"),
            // 121 minutes later
            trip("b", Some("b1"), 9 * 3600 + 60, 10 * 3600, "X", "Y"),
            // starts before b ends
            trip("c", Some("b1"), 9 * 3600 + 120, 11 * 3600, "Y", "Z"),
            // different stop
            trip("d", Some("b1"), 11 * 3600 + 300, 12 * 3600, "Q", "R"),
            // exactly 120 minutes, same stop
            trip("e", Some("b1"), 14 * 3600, 15 * 3600, "R", "S"),
        ];
        let (records, counts) = reconstruct_layovers(&runtimes);

        assert_eq!(counts.candidates, 4);
        assert_eq!(counts.dropped_gap, 2);
        assert_eq!(counts.dropped_discontinuous, 1);
        assert_eq!(counts.retained, 1);
        assert_eq!(records[0].layover_min, 120.0);
        assert_eq!(records[0].time_band, TimeBand::Midday);
        assert!(records.iter().all(LayoverRecord::is_recovery));
    }

    #[test]
    fn band_comes_from_the_predecessor_end() {
        let runtimes = vec![
            trip("a", Some("b1"), 8 * 3600, 9 * 3600 - 60, "S", "X"),
            trip("b", Some("b1"), 9 * 3600 + 240, 10 * 3600, "X", "S"),
        ];
        let (records, _) = reconstruct_layovers(&runtimes);
        assert_eq!(records[0].time_band, TimeBand::AmPeak);
        assert_eq!(records[0].layover_min, 5.0);
    }

    #[test]
    fn aggregates_by_segment() {
        let runtimes = vec![
            trip("a", Some("b1"), 7 * 3600, 7 * 3600 + 1800, "S", "X"),
            trip("b", Some("b1"), 7 * 3600 + 1860, 8 * 3600, "X", "S"),
            trip("c", Some("b1"), 8 * 3600 + 300, 8 * 3600 + 1800, "S", "X"),
        ];
        let (records, _) = reconstruct_layovers(&runtimes);
        let stats = aggregate_layovers(&records);

        let am = stats[&SegmentKey::new("7", "7", 0, TimeBand::AmPeak)];
        assert_eq!(am.layovers, 2);
        assert_eq!(am.median_layover_min, 3.0);
        assert!((am.p10_layover_min - 1.4).abs() < 1e-9);
        assert!((am.p90_layover_min - 4.6).abs() < 1e-9);
    }
}
