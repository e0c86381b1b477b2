//! Combines runtime spread and layover into a bounded fragility score.
//!
//! Both component scores saturate below their caps, and the weights sum to
//! 95, so no segment ever reaches a score of 100.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::layover::LayoverStats;
use crate::stats::quantile;
use crate::time::TimeBand;
use crate::variability::{RuntimeStats, SegmentKey};

/// Median layover assumed for segments with no usable layover records.
/// Scores as low layover pressure.
pub const DEFAULT_LAYOVER_MIN: f64 = 10.0;
pub const LAYOVER_SCORE_CAP: f64 = 0.95;
pub const LAYOVER_WEIGHT: f64 = 35.0;
pub const RUNTIME_WEIGHT: f64 = 60.0;
pub const DEFAULT_MIN_TRIPS: usize = 50;

const NO_RECOVERY_MIN: f64 = 1.0;
const LOW_RECOVERY_MIN: f64 = 3.0;
const HIGH_VARIABILITY_QUANTILE: f64 = 0.9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragilityRow {
    pub route_id: String,
    pub route_short_name: String,
    pub direction_id: u8,
    pub time_band: TimeBand,
    pub trips: usize,
    pub median_runtime_min: f64,
    pub p10_runtime_min: f64,
    pub p90_runtime_min: f64,
    pub runtime_spread_min: f64,
    pub layovers: Option<usize>,
    pub median_layover_min: f64,
    pub p10_layover_min: Option<f64>,
    pub p90_layover_min: Option<f64>,
    pub layover_score: f64,
    pub runtime_score: f64,
    pub fragility_score: f64,
    pub why: String,
}

/// Robust scale of the spread distribution: `median + 2 * IQR`, or the 90th
/// percentile when the IQR collapses. Never below 1.
pub fn normalization_constant(spreads: &[f64]) -> f64 {
    let clipped: Vec<f64> = spreads.iter().map(|s| s.max(0.0)).collect();
    let q = |p| quantile(&clipped, p).unwrap_or(0.0);

    let iqr = q(0.75) - q(0.25);
    let k = if iqr > 0.0 { q(0.5) + 2.0 * iqr } else { q(0.9) };
    k.max(1.0)
}

pub fn layover_score(median_layover_min: f64) -> f64 {
    LAYOVER_SCORE_CAP / (1.0 + median_layover_min.max(0.0))
}

pub fn runtime_score(spread_min: f64, k: f64) -> f64 {
    let spread = spread_min.max(0.0);
    spread / (spread + k)
}

pub fn composite_score(layover_score: f64, runtime_score: f64) -> f64 {
    let raw = LAYOVER_WEIGHT * layover_score + RUNTIME_WEIGHT * runtime_score;
    (raw * 100.0).round() / 100.0
}

pub fn rationale(median_layover_min: f64, spread_min: f64, high_spread_threshold: f64) -> String {
    let mut parts = Vec::new();
    if median_layover_min <= NO_RECOVERY_MIN {
        parts.push("no recovery time");
    } else if median_layover_min <= LOW_RECOVERY_MIN {
        parts.push("very low recovery time");
    }
    if spread_min >= high_spread_threshold {
        parts.push("high schedule variability");
    }

    if parts.is_empty() {
        "moderate".to_string()
    } else {
        parts.join(", ")
    }
}

/// Left-joins layover statistics onto every runtime segment and scores it.
pub fn score_segments(
    runtime_stats: &BTreeMap<SegmentKey, RuntimeStats>,
    layover_stats: &BTreeMap<SegmentKey, LayoverStats>,
) -> Vec<FragilityRow> {
    let spreads: Vec<f64> = runtime_stats.values().map(|s| s.runtime_spread_min).collect();
    let k = normalization_constant(&spreads);
    let high_spread = quantile(&spreads, HIGH_VARIABILITY_QUANTILE).unwrap_or(f64::INFINITY);
    tracing::debug!(k, high_spread, segments = spreads.len(), "Scoring segments");

    runtime_stats
        .iter()
        .map(|(key, rt)| {
            let lay = layover_stats.get(key);
            let median_layover_min = lay.map_or(DEFAULT_LAYOVER_MIN, |l| l.median_layover_min);
            let layover_score = layover_score(median_layover_min);
            let runtime_score = runtime_score(rt.runtime_spread_min, k);

            FragilityRow {
                route_id: key.route_id.clone(),
                route_short_name: key.route_short_name.clone(),
                direction_id: key.direction_id,
                time_band: key.time_band,
                trips: rt.trips,
                median_runtime_min: rt.median_runtime_min,
                p10_runtime_min: rt.p10_runtime_min,
                p90_runtime_min: rt.p90_runtime_min,
                runtime_spread_min: rt.runtime_spread_min,
                layovers: lay.map(|l| l.layovers),
                median_layover_min,
                p10_layover_min: lay.map(|l| l.p10_layover_min),
                p90_layover_min: lay.map(|l| l.p90_layover_min),
                layover_score,
                runtime_score,
                fragility_score: composite_score(layover_score, runtime_score),
                why: rationale(median_layover_min, rt.runtime_spread_min, high_spread),
            }
        })
        .collect()
}

/// Numeric route ids sort numerically and ahead of non-numeric ones.
fn route_order(a: &str, b: &str) -> Ordering {
    let key = |id: &str| {
        let numeric = id.parse::<u64>().ok();
        (numeric.is_none(), numeric.unwrap_or(0))
    };
    key(a).cmp(&key(b)).then_with(|| a.cmp(b))
}

/// Route, then direction, then band in fixed order.
pub fn table_order(a: &FragilityRow, b: &FragilityRow) -> Ordering {
    route_order(&a.route_id, &b.route_id)
        .then(a.direction_id.cmp(&b.direction_id))
        .then(a.time_band.cmp(&b.time_band))
}

/// Segments with enough trips to rank, most fragile first.
pub fn rank(rows: &[FragilityRow], min_trips: usize) -> Vec<&FragilityRow> {
    let mut ranked: Vec<&FragilityRow> = rows.iter().filter(|row| row.trips >= min_trips).collect();
    ranked.sort_by(|a, b| {
        b.fragility_score
            .total_cmp(&a.fragility_score)
            .then_with(|| table_order(a, b))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(route: &str, direction: u8, band: TimeBand) -> SegmentKey {
        SegmentKey::new(route, route, direction, band)
    }

    fn runtime(trips: usize, spread: f64) -> RuntimeStats {
        RuntimeStats {
            trips,
            median_runtime_min: 30.0,
            p10_runtime_min: 30.0 - spread / 2.0,
            p90_runtime_min: 30.0 + spread / 2.0,
            runtime_spread_min: spread,
        }
    }

    fn layover(median: f64) -> LayoverStats {
        LayoverStats {
            layovers: 4,
            median_layover_min: median,
            p10_layover_min: median,
            p90_layover_min: median,
        }
    }

    #[test]
    fn missing_layover_defaults_to_ten_minutes() {
        let runtime_stats = BTreeMap::from([(key("7", 0, TimeBand::AmPeak), runtime(60, 4.0))]);
        let rows = score_segments(&runtime_stats, &BTreeMap::new());

        let row = &rows[0];
        assert_eq!(row.median_layover_min, 10.0);
        assert_eq!(row.layovers, None);
        assert_eq!(row.p10_layover_min, None);
        assert!((row.layover_score - 0.95 / 11.0).abs() < 1e-12);
        assert!((row.layover_score - 0.0864).abs() < 1e-4);
    }

    #[test]
    fn normalization_uses_iqr_when_positive() {
        // q25 = 2, q50 = 3, q75 = 4
        let k = normalization_constant(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!((k - 7.0).abs() < 1e-12);
    }

    #[test]
    fn normalization_falls_back_to_p90_then_floor() {
        let k = normalization_constant(&[5.0, 5.0, 5.0, 5.0, 9.0]);
        // IQR is zero, p90 interpolates between 5 and 9
        assert!((k - 7.4).abs() < 1e-12);
        assert_eq!(normalization_constant(&[0.0, 0.0, 0.0]), 1.0);
        assert_eq!(normalization_constant(&[]), 1.0);
        assert_eq!(normalization_constant(&[-3.0, 0.2]), 1.0);
    }

    #[test]
    fn component_scores_stay_in_bounds() {
        for layover_min in [-5.0, 0.0, 0.5, 1.0, 3.0, 10.0, 120.0] {
            let score = layover_score(layover_min);
            assert!(score > 0.0 && score <= LAYOVER_SCORE_CAP, "{layover_min} -> {score}");
        }
        for spread in [-1.0, 0.0, 1.0, 50.0, 1e9] {
            let score = runtime_score(spread, 1.0);
            assert!((0.0..1.0).contains(&score), "{spread} -> {score}");
        }
        let worst = composite_score(layover_score(0.0), runtime_score(1e6, 1.0));
        assert!(worst < 95.0);
        assert_eq!(composite_score(0.0, 0.0), 0.0);
    }

    #[test]
    fn composite_is_rounded_to_two_places() {
        let score = composite_score(layover_score(10.0), 0.0);
        assert_eq!(score, 3.02);
    }

    #[test]
    fn rationale_phrases() {
        assert_eq!(rationale(0.5, 1.0, 10.0), "no recovery time");
        assert_eq!(rationale(1.0, 1.0, 10.0), "no recovery time");
        assert_eq!(rationale(2.0, 1.0, 10.0), "very low recovery time");
        assert_eq!(rationale(3.0, 10.0, 10.0), "very low recovery time, high schedule variability");
        assert_eq!(rationale(8.0, 12.0, 10.0), "high schedule variability");
        assert_eq!(rationale(3.5, 9.9, 10.0), "moderate");
    }

    #[test]
    fn high_variability_uses_table_wide_p90() {
        let runtime_stats: BTreeMap<_, _> = (0..10)
            .map(|i| (key(&i.to_string(), 0, TimeBand::Midday), runtime(60, f64::from(i))))
            .collect();
        let rows = score_segments(&runtime_stats, &BTreeMap::new());

        let flagged: Vec<_> = rows
            .iter()
            .filter(|r| r.why.contains("high schedule variability"))
            .map(|r| r.route_id.as_str())
            .collect();
        assert_eq!(flagged, vec!["9"]);
    }

    #[test]
    fn ranking_filters_by_trip_count_and_sorts_descending() {
        let runtime_stats = BTreeMap::from([
            (key("7", 0, TimeBand::AmPeak), runtime(80, 2.0)),
            (key("7", 1, TimeBand::AmPeak), runtime(49, 30.0)),
            (key("29", 0, TimeBand::PmPeak), runtime(50, 12.0)),
        ]);
        let layover_stats = BTreeMap::from([(key("7", 0, TimeBand::AmPeak), layover(0.0))]);
        let rows = score_segments(&runtime_stats, &layover_stats);
        assert_eq!(rows.len(), 3);

        let ranked = rank(&rows, DEFAULT_MIN_TRIPS);
        let ids: Vec<_> = ranked.iter().map(|r| (r.route_id.as_str(), r.direction_id)).collect();
        assert_eq!(ids.len(), 2);
        assert!(ranked[0].fragility_score >= ranked[1].fragility_score);
        assert!(!ids.contains(&("7", 1)));
    }

    #[test]
    fn numeric_route_ids_sort_numerically() {
        assert_eq!(route_order("7", "29"), Ordering::Less);
        assert_eq!(route_order("100", "29"), Ordering::Greater);
        assert_eq!(route_order("900", "7A"), Ordering::Less);
        assert_eq!(route_order("7A", "7B"), Ordering::Less);
        assert_eq!(route_order("007", "7"), Ordering::Less);
    }
}
