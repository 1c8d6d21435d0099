//! Robust scaling of raw metric values onto the 0-100 score range.
//!
//! A raw value is placed relative to the median of its reference
//! population and measured in interquartile ranges:
//! `((value - median) / IQR) * 25 + 50`, clamped to `[0, 100]`.
//!
//! Percentiles use nearest-rank-lower semantics: the value at sorted index
//! `floor(n * p)`, with no interpolation between neighbours. Reference
//! outputs depend on this, so it must not be replaced by linear
//! interpolation.

/// Score returned when the population gives no usable spread.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Score points per interquartile range.
const POINTS_PER_IQR: f64 = 25.0;

const MIN_SCORE: f64 = 0.0;
const MAX_SCORE: f64 = 100.0;

/// Returns a sorted copy of `values` (IEEE total order, so the result is
/// deterministic even with `NaN`s present).
#[must_use]
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(f64::total_cmp);
    out
}

/// Nearest-rank-lower percentile of an already sorted slice.
///
/// `p` is a fraction in `[0, 1]`. Returns `None` for an empty slice.
#[must_use]
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let idx = (sorted.len() as f64 * p).floor() as usize;
    sorted.get(idx.min(last)).copied()
}

/// Median and quartiles of a reference population.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobustStats {
    /// 50th percentile.
    pub median: f64,
    /// 25th percentile.
    pub q1: f64,
    /// 75th percentile.
    pub q3: f64,
}

impl RobustStats {
    /// Computes the statistics, or `None` for an empty population.
    #[must_use]
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let sorted = sorted(values);
        Some(Self {
            median: percentile(&sorted, 0.5)?,
            q1: percentile(&sorted, 0.25)?,
            q3: percentile(&sorted, 0.75)?,
        })
    }

    /// Interquartile range `q3 - q1`.
    #[must_use]
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }
}

/// A scaler fitted once to a reference population and applied to any
/// number of values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobustScaler {
    stats: Option<RobustStats>,
}

impl RobustScaler {
    /// Fits the scaler to `values`. An empty population is allowed.
    #[must_use]
    pub fn fit(values: &[f64]) -> Self {
        Self {
            stats: RobustStats::from_values(values),
        }
    }

    /// Scales `value` onto `[0, 100]`.
    ///
    /// Returns [`NEUTRAL_SCORE`] for an empty population, a zero IQR, or a
    /// `NaN` result.
    #[must_use]
    pub fn scale(&self, value: f64) -> f64 {
        let Some(stats) = self.stats else {
            return NEUTRAL_SCORE;
        };

        let iqr = stats.iqr();
        #[allow(clippy::float_cmp)]
        if iqr == 0.0 {
            return NEUTRAL_SCORE;
        }

        #[allow(clippy::suboptimal_flops)]
        let scaled = ((value - stats.median) / iqr) * POINTS_PER_IQR + NEUTRAL_SCORE;
        if scaled.is_nan() {
            return NEUTRAL_SCORE;
        }
        scaled.clamp(MIN_SCORE, MAX_SCORE)
    }
}

/// Scales `new_value` against the reference population `values`.
#[must_use]
pub fn robust_scale(values: &[f64], new_value: f64) -> f64 {
    RobustScaler::fit(values).scale(new_value)
}

/// Scales every value of a metric column against the column itself.
#[must_use]
pub fn scale_population(values: &[f64]) -> Vec<f64> {
    let scaler = RobustScaler::fit(values);
    values.iter().map(|v| scaler.scale(*v)).collect()
}
