//! Runtime spread per route, direction and time band.

use std::collections::BTreeMap;

use crate::runtime::TripRuntime;
use crate::stats::Spread;
use crate::time::TimeBand;

/// Output grain shared by both aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentKey {
    pub route_id: String,
    pub route_short_name: String,
    pub direction_id: u8,
    pub time_band: TimeBand,
}

impl SegmentKey {
    pub fn new(
        route_id: &str,
        route_short_name: &str,
        direction_id: u8,
        time_band: TimeBand,
    ) -> Self {
        SegmentKey {
            route_id: route_id.to_string(),
            route_short_name: route_short_name.to_string(),
            direction_id,
            time_band,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeStats {
    pub trips: usize,
    pub median_runtime_min: f64,
    pub p10_runtime_min: f64,
    pub p90_runtime_min: f64,
    pub runtime_spread_min: f64,
}

impl From<Spread> for RuntimeStats {
    fn from(spread: Spread) -> Self {
        RuntimeStats {
            trips: spread.count,
            median_runtime_min: spread.median,
            p10_runtime_min: spread.p10,
            p90_runtime_min: spread.p90,
            runtime_spread_min: spread.width(),
        }
    }
}

pub fn aggregate_runtimes(runtimes: &[TripRuntime]) -> BTreeMap<SegmentKey, RuntimeStats> {
    let mut groups: BTreeMap<SegmentKey, Vec<f64>> = BTreeMap::new();
    for rt in runtimes {
        let key =
            SegmentKey::new(&rt.route_id, &rt.route_short_name, rt.direction_id, rt.time_band);
        groups.entry(key).or_default().push(rt.runtime_min);
    }

    groups
        .into_iter()
        .filter_map(|(key, values)| Some((key, Spread::of(values)?.into())))
        .collect()
}
