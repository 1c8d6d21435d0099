//! Resolution of caller weight overrides into a normalized
//! [`WeightVector`].

use investmtl_scoring_models::{ResolvedWeights, ScoreCategory, WeightOverrides, WeightVector};

/// Tolerance for "already sums to one" and "same as the defaults" checks.
const EPSILON: f64 = 1e-9;

/// Resolves optional per-category overrides against an injected default
/// vector.
///
/// Resolution never fails: missing, non-positive, or non-finite
/// components take the default weight, and a vector that still sums to
/// zero falls back to the defaults entirely.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightResolver {
    defaults: WeightVector,
}

impl Default for WeightResolver {
    fn default() -> Self {
        Self::new(WeightVector::DEFAULT)
    }
}

impl WeightResolver {
    /// Creates a resolver around `defaults`.
    ///
    /// Defaults that do not already sum to one are normalized here so the
    /// fallback path also satisfies the sum-to-one invariant. Defaults that
    /// sum to zero are replaced by [`WeightVector::DEFAULT`].
    #[must_use]
    pub fn new(defaults: WeightVector) -> Self {
        let sum = defaults.sum();
        let defaults = if (sum - 1.0).abs() <= EPSILON {
            defaults
        } else if sum > 0.0 && sum.is_finite() {
            divide(&defaults, sum)
        } else {
            log::warn!("Default weights sum to {sum}; using built-in defaults");
            WeightVector::DEFAULT
        };
        Self { defaults }
    }

    /// The normalized default vector.
    #[must_use]
    pub const fn defaults(&self) -> WeightVector {
        self.defaults
    }

    /// Resolves `overrides` into normalized weights.
    #[must_use]
    pub fn resolve(&self, overrides: &WeightOverrides) -> ResolvedWeights {
        let input = self.fill(overrides);
        let using_custom_weights = !input.approx_eq(&self.defaults, EPSILON);

        let sum = input.sum();
        let weights = if !using_custom_weights {
            self.defaults
        } else if sum > 0.0 && sum.is_finite() {
            divide(&input, sum)
        } else {
            self.defaults
        };

        ResolvedWeights {
            weights,
            using_custom_weights,
        }
    }

    fn fill(&self, overrides: &WeightOverrides) -> WeightVector {
        let pick = |category: ScoreCategory| {
            overrides
                .get(category)
                .filter(|w| *w > 0.0 && w.is_finite())
                .unwrap_or_else(|| self.defaults.get(category))
        };
        WeightVector::new(
            pick(ScoreCategory::Growth),
            pick(ScoreCategory::Supply),
            pick(ScoreCategory::Tension),
            pick(ScoreCategory::Access),
            pick(ScoreCategory::Return),
        )
    }
}

fn divide(weights: &WeightVector, sum: f64) -> WeightVector {
    WeightVector::new(
        weights.growth / sum,
        weights.supply / sum,
        weights.tension / sum,
        weights.access / sum,
        weights.returns / sum,
    )
}
