//! Quantile classification of total scores into buckets 1-5.
//!
//! Two threshold tables are supported. The static table uses fixed
//! breakpoints so map legends stay stable. The empirical table is cut at
//! the 20th, 40th, 60th, 80th, and 95th percentiles of the working set,
//! assigned to buckets 1 through 5, using the same nearest-rank-lower
//! percentile as [`crate::scale`].

use investmtl_scoring_models::{ClassificationMode, QuantileBucket, QuantileThresholds};

use crate::scale::{percentile, sorted};

/// Percentile for each bucket's cutoff, bucket 1 first.
pub const EMPIRICAL_PERCENTILES: [f64; 5] = [0.20, 0.40, 0.60, 0.80, 0.95];

/// Builds the empirical threshold table for `totals`.
///
/// An empty working set yields [`QuantileThresholds::NEUTRAL`].
#[must_use]
pub fn empirical_thresholds(totals: &[f64]) -> QuantileThresholds {
    let sorted = sorted(totals);
    let mut cutoffs = QuantileThresholds::NEUTRAL.cutoffs();
    for (cutoff, p) in cutoffs.iter_mut().zip(EMPIRICAL_PERCENTILES) {
        let Some(value) = percentile(&sorted, p) else {
            return QuantileThresholds::NEUTRAL;
        };
        *cutoff = value;
    }
    QuantileThresholds::from_cutoffs(cutoffs)
}

/// Builds the threshold table for `mode` over `totals`.
#[must_use]
pub fn thresholds(mode: ClassificationMode, totals: &[f64]) -> QuantileThresholds {
    match mode {
        ClassificationMode::Static => QuantileThresholds::STATIC,
        ClassificationMode::Empirical => empirical_thresholds(totals),
    }
}

/// Returns the highest bucket whose cutoff `score` meets or exceeds,
/// falling back to bucket 1.
#[must_use]
pub fn classify(score: f64, thresholds: &QuantileThresholds) -> QuantileBucket {
    QuantileBucket::ALL
        .iter()
        .rev()
        .find(|bucket| score >= thresholds.cutoff(**bucket))
        .copied()
        .unwrap_or(QuantileBucket::VeryLow)
}
