//! Ranking, comparison, and single-area scoring over a working set of
//! snapshots.
//!
//! Each call resolves the weights once, totals every area with
//! [`aggregate`], builds one threshold table over the resulting totals,
//! classifies, and sorts descending by total with ties broken by
//! ascending area id. Nothing is retained between calls.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use investmtl_scoring_models::{
    BucketCount, ClassificationMode, ComparisonStatistics, QuantileBucket, QuantileThresholds,
    RankedArea, ResolvedWeights, ScoreSnapshot, ScoreSummary, SubScores, WeightOverrides,
};

use crate::aggregate::{aggregate, round1};
use crate::classify::{classify, thresholds};
use crate::weights::WeightResolver;
use crate::{MAX_COMPARE_AREAS, ScoringError};

/// A classified, sorted working set.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    /// Weights the totals were computed with.
    pub weights: ResolvedWeights,
    /// Threshold table the buckets were assigned from.
    pub thresholds: QuantileThresholds,
    /// Areas, best first.
    pub ranked: Vec<RankedArea>,
}

/// A side-by-side comparison of a small set of areas.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// Weights the totals were computed with.
    pub weights: ResolvedWeights,
    /// Threshold table built over the compared areas only.
    pub thresholds: QuantileThresholds,
    /// Compared areas that resolved, best first.
    pub comparisons: Vec<RankedArea>,
    /// Summary of the compared totals.
    pub statistics: ComparisonStatistics,
}

/// The score of one area under a request's weights.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaScore {
    /// Area identifier.
    pub area_id: String,
    /// Area display name.
    pub area_name: String,
    /// Effective date of the snapshot used.
    pub as_of: NaiveDate,
    /// Sub-scores from the snapshot.
    pub scores: SubScores,
    /// Total under `weights`.
    pub total: f64,
    /// Weights used.
    pub weights: ResolvedWeights,
}

/// Orchestrates weight resolution, aggregation, and classification.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RankingService {
    resolver: WeightResolver,
}

impl RankingService {
    /// Creates a service that resolves weights with `resolver`.
    #[must_use]
    pub const fn new(resolver: WeightResolver) -> Self {
        Self { resolver }
    }

    /// Ranks the latest snapshot (at or before `as_of`) of every area.
    #[must_use]
    pub fn rank(
        &self,
        snapshots: &[ScoreSnapshot],
        overrides: &WeightOverrides,
        mode: ClassificationMode,
        as_of: Option<NaiveDate>,
    ) -> Ranking {
        let weights = self.resolver.resolve(overrides);
        let working_set = latest_per_area(snapshots, as_of);
        rank_working_set(&working_set, weights, mode)
    }

    /// Ranks every area and keeps the best `limit`.
    ///
    /// Buckets are assigned over the full working set before truncation.
    #[must_use]
    pub fn top_n(
        &self,
        snapshots: &[ScoreSnapshot],
        overrides: &WeightOverrides,
        mode: ClassificationMode,
        as_of: Option<NaiveDate>,
        limit: usize,
    ) -> Ranking {
        let mut ranking = self.rank(snapshots, overrides, mode, as_of);
        ranking.ranked.truncate(limit);
        ranking
    }

    /// Compares up to [`MAX_COMPARE_AREAS`] areas.
    ///
    /// Duplicate ids count once. Ids with no snapshot are dropped from the
    /// result. Buckets are computed over the compared areas only.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::Validation`] if more than
    /// [`MAX_COMPARE_AREAS`] distinct ids are requested.
    pub fn compare(
        &self,
        snapshots: &[ScoreSnapshot],
        area_ids: &[String],
        overrides: &WeightOverrides,
        mode: ClassificationMode,
        as_of: Option<NaiveDate>,
    ) -> Result<Comparison, ScoringError> {
        let requested = compare_ids(area_ids)?;

        let weights = self.resolver.resolve(overrides);
        let working_set: Vec<&ScoreSnapshot> = latest_per_area(snapshots, as_of)
            .into_iter()
            .filter(|s| requested.contains(&s.area_id))
            .collect();

        if working_set.len() < requested.len() {
            log::debug!(
                "Compare resolved {} of {} requested areas",
                working_set.len(),
                requested.len()
            );
        }

        let ranking = rank_working_set(&working_set, weights, mode);
        let statistics = statistics(&ranking.ranked);

        Ok(Comparison {
            weights: ranking.weights,
            thresholds: ranking.thresholds,
            comparisons: ranking.ranked,
            statistics,
        })
    }

    /// Scores a single area.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::NotFound`] if the area has no snapshot at
    /// or before `as_of`.
    pub fn score_area(
        &self,
        snapshots: &[ScoreSnapshot],
        area_id: &str,
        overrides: &WeightOverrides,
        as_of: Option<NaiveDate>,
    ) -> Result<AreaScore, ScoringError> {
        let snapshot = snapshots
            .iter()
            .filter(|s| s.area_id == area_id && within(s, as_of))
            .max_by_key(|s| s.as_of)
            .ok_or_else(|| ScoringError::NotFound {
                area_id: area_id.to_string(),
            })?;

        let weights = self.resolver.resolve(overrides);

        Ok(AreaScore {
            area_id: snapshot.area_id.clone(),
            area_name: snapshot.area_name.clone(),
            as_of: snapshot.as_of,
            scores: snapshot.scores,
            total: aggregate(&snapshot.scores, &weights.weights),
            weights,
        })
    }

    /// Summarizes the default-weighted score distribution of the latest
    /// snapshot of every area, bucketed empirically.
    #[must_use]
    pub fn summary(&self, snapshots: &[ScoreSnapshot], as_of: Option<NaiveDate>) -> ScoreSummary {
        let ranking = self.rank(
            snapshots,
            &WeightOverrides::default(),
            ClassificationMode::Empirical,
            as_of,
        );
        let totals: Vec<f64> = ranking.ranked.iter().map(|r| r.total).collect();

        let distribution = QuantileBucket::ALL
            .iter()
            .map(|bucket| BucketCount {
                bucket: *bucket,
                count: ranking.ranked.iter().filter(|r| r.bucket == *bucket).count(),
            })
            .collect();

        let (mean, std) = mean_and_std(&totals);

        ScoreSummary {
            areas_scored: totals.len(),
            mean: round1(mean),
            std: round1(std),
            min: totals.iter().copied().reduce(f64::min).unwrap_or(0.0),
            max: totals.iter().copied().reduce(f64::max).unwrap_or(0.0),
            distribution,
            weights_used: ranking.weights.weights,
        }
    }
}

/// Removes duplicate ids, keeping first occurrences in order, and checks
/// the result against [`MAX_COMPARE_AREAS`].
///
/// # Errors
///
/// Returns [`ScoringError::Validation`] if more than [`MAX_COMPARE_AREAS`]
/// distinct ids remain.
pub fn compare_ids(area_ids: &[String]) -> Result<Vec<String>, ScoringError> {
    let mut seen = BTreeSet::new();
    let requested: Vec<String> = area_ids
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect();

    if requested.len() > MAX_COMPARE_AREAS {
        return Err(ScoringError::Validation {
            message: format!(
                "At most {MAX_COMPARE_AREAS} areas can be compared, got {}",
                requested.len()
            ),
        });
    }

    Ok(requested)
}

/// Selects the latest snapshot of each area at or before `as_of`, ordered
/// by area id.
#[must_use]
pub fn latest_per_area(
    snapshots: &[ScoreSnapshot],
    as_of: Option<NaiveDate>,
) -> Vec<&ScoreSnapshot> {
    let mut latest: BTreeMap<&str, &ScoreSnapshot> = BTreeMap::new();
    for snapshot in snapshots.iter().filter(|s| within(s, as_of)) {
        latest
            .entry(snapshot.area_id.as_str())
            .and_modify(|current| {
                if snapshot.as_of > current.as_of {
                    *current = snapshot;
                }
            })
            .or_insert(snapshot);
    }
    latest.into_values().collect()
}

/// Count, extremes, and rounded mean of the totals in `ranked`.
///
/// An empty slice yields all zeros.
#[must_use]
pub fn statistics(ranked: &[RankedArea]) -> ComparisonStatistics {
    let totals: Vec<f64> = ranked.iter().map(|r| r.total).collect();
    let (Some(highest), Some(lowest)) = (
        totals.iter().copied().reduce(f64::max),
        totals.iter().copied().reduce(f64::min),
    ) else {
        return ComparisonStatistics::default();
    };

    ComparisonStatistics {
        count: totals.len(),
        highest,
        lowest,
        average: round1(mean_and_std(&totals).0),
    }
}

fn within(snapshot: &ScoreSnapshot, as_of: Option<NaiveDate>) -> bool {
    as_of.is_none_or(|cutoff| snapshot.as_of <= cutoff)
}

fn rank_working_set(
    working_set: &[&ScoreSnapshot],
    weights: ResolvedWeights,
    mode: ClassificationMode,
) -> Ranking {
    let totals: Vec<f64> = working_set
        .iter()
        .map(|s| aggregate(&s.scores, &weights.weights))
        .collect();
    let thresholds = thresholds(mode, &totals);

    let mut ranked: Vec<RankedArea> = working_set
        .iter()
        .zip(&totals)
        .map(|(snapshot, total)| RankedArea {
            area_id: snapshot.area_id.clone(),
            area_name: snapshot.area_name.clone(),
            as_of: snapshot.as_of,
            scores: snapshot.scores,
            total: *total,
            bucket: classify(*total, &thresholds),
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.total
            .total_cmp(&a.total)
            .then_with(|| a.area_id.cmp(&b.area_id))
    });

    log::trace!("Ranked {} areas in {mode} mode", ranked.len());

    Ranking {
        weights,
        thresholds,
        ranked,
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance.sqrt())
}
