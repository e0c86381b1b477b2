//! Order statistics over small per-segment samples.

/// Quantile of an ascending-sorted sample, interpolating linearly between the
/// two nearest ranks at position `q * (n - 1)`.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }

    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Sorts a copy of `values` and takes the quantile.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    quantile_sorted(&sorted, q)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spread {
    pub count: usize,
    pub median: f64,
    pub p10: f64,
    pub p90: f64,
}

impl Spread {
    pub fn of(mut values: Vec<f64>) -> Option<Self> {
        values.sort_by(f64::total_cmp);
        Some(Spread {
            count: values.len(),
            median: quantile_sorted(&values, 0.5)?,
            p10: quantile_sorted(&values, 0.1)?,
            p90: quantile_sorted(&values, 0.9)?,
        })
    }

    pub fn width(&self) -> f64 {
        self.p90 - self.p10
    }
}
