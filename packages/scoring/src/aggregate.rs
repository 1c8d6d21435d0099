//! Weighted aggregation of the five sub-scores into a total.

use investmtl_scoring_models::{ScoreCategory, SubScores, WeightVector};

/// Rounds to one decimal place, halves away from zero.
#[must_use]
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Combines `scores` with already-normalized `weights` and rounds the
/// result to one decimal.
///
/// Sub-scores outside `[0, 100]` are used as given.
#[must_use]
pub fn aggregate(scores: &SubScores, weights: &WeightVector) -> f64 {
    let total: f64 = ScoreCategory::ALL
        .iter()
        .map(|c| scores.get(*c) * weights.get(*c))
        .sum();
    round1(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weighted_total() {
        let scores = SubScores::new(80.0, 60.0, 90.0, 70.0, 50.0);
        let total = aggregate(&scores, &WeightVector::DEFAULT);
        assert!((total - 71.5).abs() < 1e-9);
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert!((round1(12.25) - 12.3).abs() < 1e-9);
        assert!((round1(-12.25) + 12.3).abs() < 1e-9);
        assert!((round1(33.333) - 33.3).abs() < 1e-9);
        assert!((round1(0.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn out_of_range_scores_are_not_clamped() {
        let scores = SubScores::new(200.0, 200.0, 200.0, 200.0, 200.0);
        assert!((aggregate(&scores, &WeightVector::DEFAULT) - 200.0).abs() < 1e-9);
    }

    #[test]
    fn single_category_weight_selects_that_score() {
        let scores = SubScores::new(10.0, 20.0, 30.0, 40.0, 50.0);
        let weights = WeightVector::new(0.0, 0.0, 1.0, 0.0, 0.0);
        assert!((aggregate(&scores, &weights) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn increasing_a_sub_score_never_lowers_the_total() {
        let base = SubScores::new(45.0, 55.0, 65.0, 35.0, 25.0);
        let weights = [
            WeightVector::DEFAULT,
            WeightVector::new(0.2, 0.2, 0.2, 0.2, 0.2),
            WeightVector::new(0.7, 0.0, 0.1, 0.1, 0.1),
        ];
        for w in &weights {
            for cat in ScoreCategory::ALL {
                let mut previous = aggregate(&base, w);
                for step in 1..=40 {
                    let raised = base.with(cat, base.get(cat) + f64::from(step) * 1.7);
                    let total = aggregate(&raised, w);
                    assert!(total >= previous, "{cat} step {step}: {total} < {previous}");
                    previous = total;
                }
            }
        }
    }
}
