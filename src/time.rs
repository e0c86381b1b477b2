//! GTFS clock times and the five fixed time-of-day bands.
//!
//! GTFS times are measured from noon minus 12h of the service day, so hours
//! past 23 are legal and describe post-midnight trips of the same service.

use serde::{Deserialize, Serialize};

use crate::error::{FragilityError, Result};

pub const SECONDS_PER_DAY: u32 = 86_400;

/// Parses `HH:MM:SS` (hours may exceed 23) into seconds since service-day start.
pub fn parse_clock(text: &str) -> Result<u32> {
    let malformed = || FragilityError::MalformedTime {
        text: text.to_string(),
    };

    let mut parts = text.trim().split(':');
    let (Some(h), Some(m), Some(s), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed());
    };

    let component = |part: &str| part.trim().parse::<u32>().map_err(|_| malformed());
    let (hours, minutes, seconds) = (component(h)?, component(m)?, component(s)?);

    hours
        .checked_mul(3600)
        .and_then(|acc| acc.checked_add(minutes.checked_mul(60)?))
        .and_then(|acc| acc.checked_add(seconds))
        .ok_or_else(malformed)
}

/// Time-of-day bucket. Declaration order is the fixed display/sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeBand {
    #[serde(rename = "AM Peak (6–9)")]
    AmPeak,
    #[serde(rename = "Midday (9–15)")]
    Midday,
    #[serde(rename = "PM Peak (15–19)")]
    PmPeak,
    #[serde(rename = "Evening (19–24)")]
    Evening,
    #[serde(rename = "Overnight (0–6)")]
    Overnight,
}

impl TimeBand {
    pub const ALL: [TimeBand; 5] = [
        TimeBand::AmPeak,
        TimeBand::Midday,
        TimeBand::PmPeak,
        TimeBand::Evening,
        TimeBand::Overnight,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TimeBand::AmPeak => "AM Peak (6–9)",
            TimeBand::Midday => "Midday (9–15)",
            TimeBand::PmPeak => "PM Peak (15–19)",
            TimeBand::Evening => "Evening (19–24)",
            TimeBand::Overnight => "Overnight (0–6)",
        }
    }
}

impl std::fmt::Display for TimeBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Buckets an instant by its hour of day after wrapping at 24h.
pub fn band_of(seconds: u32) -> TimeBand {
    let hour = (seconds % SECONDS_PER_DAY) / 3600;
    match hour {
        6..=8 => TimeBand::AmPeak,
        9..=14 => TimeBand::Midday,
        15..=18 => TimeBand::PmPeak,
        19..=23 => TimeBand::Evening,
        _ => TimeBand::Overnight,
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parses_post_midnight_times() {
        assert_eq!(parse_clock("25:30:00").unwrap(), 91_800);
        assert_eq!(band_of(91_800), TimeBand::Overnight);
    }

    #[test]
    fn parses_single_digit_hours_and_padding() {
        assert_eq!(parse_clock("7:05:09").unwrap(), 7 * 3600 + 5 * 60 + 9);
        assert_eq!(parse_clock(" 08:00:00 ").unwrap(), 8 * 3600);
        assert_eq!(parse_clock("00:00:00").unwrap(), 0);
    }

    #[test]
    fn rejects_wrong_arity_and_non_integers() {
        for text in ["", "08:00", "08:00:00:00", "8h:00:00", "08:00:xx", "-1:00:00", "08:00:1.5"] {
            assert_matches!(
                parse_clock(text),
                Err(FragilityError::MalformedTime { .. }),
                "{text:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_overflowing_hours() {
        assert_matches!(
            parse_clock("4294967295:00:00"),
            Err(FragilityError::MalformedTime { .. })
        );
    }

    #[test]
    fn band_boundaries_are_inclusive_lower_exclusive_upper() {
        let at = |h: u32| band_of(h * 3600);
        assert_eq!(at(5), TimeBand::Overnight);
        assert_eq!(at(6), TimeBand::AmPeak);
        assert_eq!(band_of(9 * 3600 - 1), TimeBand::AmPeak);
        assert_eq!(at(9), TimeBand::Midday);
        assert_eq!(at(15), TimeBand::PmPeak);
        assert_eq!(at(19), TimeBand::Evening);
        assert_eq!(band_of(24 * 3600 - 1), TimeBand::Evening);
        assert_eq!(at(24), TimeBand::Overnight);
    }

    #[test]
    fn bands_partition_one_day() {
        let mut counts = [0u32; 5];
        for s in 0..SECONDS_PER_DAY {
            let idx = TimeBand::ALL.iter().position(|b| *b == band_of(s)).unwrap();
            counts[idx] += 1;
        }
        assert_eq!(counts, [3 * 3600, 6 * 3600, 4 * 3600, 5 * 3600, 6 * 3600]);
        assert_eq!(counts.iter().sum::<u32>(), SECONDS_PER_DAY);
    }

    #[test]
    fn band_is_invariant_under_whole_days() {
        for s in (0..SECONDS_PER_DAY).step_by(601) {
            for n in 1..3 {
                assert_eq!(band_of(s), band_of(s + SECONDS_PER_DAY * n));
            }
        }
    }

    #[test]
    fn labels_use_en_dashes() {
        assert_eq!(TimeBand::AmPeak.to_string(), "AM Peak (6–9)");
        assert_eq!(TimeBand::Overnight.label(), "Overnight (0–6)");
    }
}
