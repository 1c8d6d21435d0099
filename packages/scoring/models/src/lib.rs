#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Investment score types shared across the scoring core, the score
//! repository, and the API layer.
//!
//! Every area is scored on five categories (growth, supply, tension,
//! accessibility, return). Sub-scores live on a 0-100 scale and are
//! combined with a [`WeightVector`] into a single total that is then
//! classified into one of five [`QuantileBucket`]s.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// The five scoring categories.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScoreCategory {
    /// Population and economic growth potential
    Growth,
    /// Future housing supply (less supply scores higher)
    Supply,
    /// Market tension (low vacancy, rising rents)
    Tension,
    /// Transit and downtown accessibility
    Access,
    /// Rental yield potential
    Return,
}

impl ScoreCategory {
    /// All categories in canonical order.
    pub const ALL: [Self; 5] = [
        Self::Growth,
        Self::Supply,
        Self::Tension,
        Self::Access,
        Self::Return,
    ];
}

/// The five per-category sub-scores of an area, each nominally in
/// `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SubScores {
    /// Growth sub-score.
    pub growth: f64,
    /// Supply sub-score.
    pub supply: f64,
    /// Tension sub-score.
    pub tension: f64,
    /// Accessibility sub-score.
    pub access: f64,
    /// Return sub-score.
    #[serde(rename = "return")]
    pub returns: f64,
}

impl SubScores {
    /// Creates a set of sub-scores in canonical category order.
    #[must_use]
    pub const fn new(growth: f64, supply: f64, tension: f64, access: f64, returns: f64) -> Self {
        Self {
            growth,
            supply,
            tension,
            access,
            returns,
        }
    }

    /// Returns the sub-score for `category`.
    #[must_use]
    pub const fn get(&self, category: ScoreCategory) -> f64 {
        match category {
            ScoreCategory::Growth => self.growth,
            ScoreCategory::Supply => self.supply,
            ScoreCategory::Tension => self.tension,
            ScoreCategory::Access => self.access,
            ScoreCategory::Return => self.returns,
        }
    }

    /// Returns a copy with the sub-score for `category` replaced.
    #[must_use]
    pub const fn with(mut self, category: ScoreCategory, value: f64) -> Self {
        match category {
            ScoreCategory::Growth => self.growth = value,
            ScoreCategory::Supply => self.supply = value,
            ScoreCategory::Tension => self.tension = value,
            ScoreCategory::Access => self.access = value,
            ScoreCategory::Return => self.returns = value,
        }
        self
    }
}

/// Per-category weights used to combine [`SubScores`] into a total.
///
/// A resolved vector is non-negative and sums to 1.0 within floating
/// point tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    /// Growth weight.
    pub growth: f64,
    /// Supply weight.
    pub supply: f64,
    /// Tension weight.
    pub tension: f64,
    /// Accessibility weight.
    pub access: f64,
    /// Return weight.
    #[serde(rename = "return", alias = "returns")]
    pub returns: f64,
}

impl WeightVector {
    /// The default investment weighting.
    pub const DEFAULT: Self = Self::new(0.25, 0.20, 0.20, 0.20, 0.15);

    /// Creates a weight vector in canonical category order.
    #[must_use]
    pub const fn new(growth: f64, supply: f64, tension: f64, access: f64, returns: f64) -> Self {
        Self {
            growth,
            supply,
            tension,
            access,
            returns,
        }
    }

    /// Returns the weight for `category`.
    #[must_use]
    pub const fn get(&self, category: ScoreCategory) -> f64 {
        match category {
            ScoreCategory::Growth => self.growth,
            ScoreCategory::Supply => self.supply,
            ScoreCategory::Tension => self.tension,
            ScoreCategory::Access => self.access,
            ScoreCategory::Return => self.returns,
        }
    }

    /// Sum of all five weights.
    #[must_use]
    pub fn sum(&self) -> f64 {
        ScoreCategory::ALL.iter().map(|c| self.get(*c)).sum()
    }

    /// Returns `true` when every component differs from `other` by at most
    /// `epsilon`.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, epsilon: f64) -> bool {
        ScoreCategory::ALL
            .iter()
            .all(|c| (self.get(*c) - other.get(*c)).abs() <= epsilon)
    }
}

impl Default for WeightVector {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Caller-supplied weight overrides. Absent components fall back to the
/// configured default weight for that category.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WeightOverrides {
    /// Growth override.
    pub growth: Option<f64>,
    /// Supply override.
    pub supply: Option<f64>,
    /// Tension override.
    pub tension: Option<f64>,
    /// Accessibility override.
    pub access: Option<f64>,
    /// Return override.
    #[serde(rename = "return")]
    pub returns: Option<f64>,
}

impl WeightOverrides {
    /// Returns the override for `category`, if any.
    #[must_use]
    pub const fn get(&self, category: ScoreCategory) -> Option<f64> {
        match category {
            ScoreCategory::Growth => self.growth,
            ScoreCategory::Supply => self.supply,
            ScoreCategory::Tension => self.tension,
            ScoreCategory::Access => self.access,
            ScoreCategory::Return => self.returns,
        }
    }
}

impl From<WeightVector> for WeightOverrides {
    fn from(weights: WeightVector) -> Self {
        Self {
            growth: Some(weights.growth),
            supply: Some(weights.supply),
            tension: Some(weights.tension),
            access: Some(weights.access),
            returns: Some(weights.returns),
        }
    }
}

/// The outcome of resolving [`WeightOverrides`] against the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedWeights {
    /// Normalized weights (sum to 1.0).
    pub weights: WeightVector,
    /// Whether the pre-normalization input differed from the defaults.
    pub using_custom_weights: bool,
}

/// A geographic bounding box in WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western longitude boundary.
    pub west: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Northern latitude boundary.
    pub north: f64,
}

impl BoundingBox {
    /// Creates a new bounding box from the given coordinates.
    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Returns `true` if the two boxes overlap (touching edges count).
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.west <= other.east
            && self.east >= other.west
            && self.south <= other.north
            && self.north >= other.south
    }
}

/// A fixed geographic unit that gets scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Area {
    /// Stable area identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional bounding geometry.
    pub bounds: Option<BoundingBox>,
}

/// Precomputed sub-scores for one area at one effective date.
///
/// Snapshots are append-only: a new `as_of` produces a new snapshot and
/// existing ones are never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSnapshot {
    /// Area the snapshot belongs to.
    pub area_id: String,
    /// Area display name at read time.
    pub area_name: String,
    /// Effective date.
    pub as_of: NaiveDate,
    /// The five sub-scores.
    pub scores: SubScores,
    /// Total computed by the producer with its own weights.
    pub total: f64,
}

/// Ordinal quantile bucket, from 1 (lowest scores) to 5 (highest).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum QuantileBucket {
    /// Bucket 1
    VeryLow = 1,
    /// Bucket 2
    Low = 2,
    /// Bucket 3
    Moderate = 3,
    /// Bucket 4
    High = 4,
    /// Bucket 5
    VeryHigh = 5,
}

impl QuantileBucket {
    /// All buckets from lowest to highest.
    pub const ALL: [Self; 5] = [
        Self::VeryLow,
        Self::Low,
        Self::Moderate,
        Self::High,
        Self::VeryHigh,
    ];

    /// Returns the numeric value of this bucket (1-5).
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// Creates a bucket from a numeric value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not in the range 1-5.
    pub const fn from_value(value: u8) -> Result<Self, InvalidBucketError> {
        match value {
            1 => Ok(Self::VeryLow),
            2 => Ok(Self::Low),
            3 => Ok(Self::Moderate),
            4 => Ok(Self::High),
            5 => Ok(Self::VeryHigh),
            _ => Err(InvalidBucketError { value }),
        }
    }

    /// Map fill color for this bucket.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::VeryLow => "#d73027",
            Self::Low => "#fc8d59",
            Self::Moderate => "#fee08b",
            Self::High => "#91cf60",
            Self::VeryHigh => "#1a9850",
        }
    }

    const fn index(self) -> usize {
        self as usize - 1
    }
}

/// Error returned when attempting to create a [`QuantileBucket`] from an
/// invalid numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidBucketError {
    /// The invalid bucket value that was provided.
    pub value: u8,
}

impl std::fmt::Display for InvalidBucketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid quantile bucket {}: expected 1-5", self.value)
    }
}

impl std::error::Error for InvalidBucketError {}

/// How a threshold table is built for classification.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ClassificationMode {
    /// Fixed breakpoints at 20/40/60/80, stable across requests.
    Static,
    /// Percentile cutoffs computed from the current working set.
    #[default]
    Empirical,
}

/// Minimum total score required for each bucket.
///
/// A score lands in the highest bucket whose cutoff it meets or exceeds;
/// the bucket 1 cutoff is informational since bucket 1 is the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantileThresholds {
    cutoffs: [f64; 5],
}

impl QuantileThresholds {
    /// Fixed legend breakpoints.
    pub const STATIC: Self = Self::from_cutoffs([0.0, 20.0, 40.0, 60.0, 80.0]);

    /// Table used when there are no scores to derive cutoffs from.
    pub const NEUTRAL: Self = Self::from_cutoffs([0.0, 25.0, 50.0, 75.0, 100.0]);

    /// Creates a table from cutoffs ordered bucket 1 through bucket 5.
    #[must_use]
    pub const fn from_cutoffs(cutoffs: [f64; 5]) -> Self {
        Self { cutoffs }
    }

    /// Cutoff for `bucket`.
    #[must_use]
    pub const fn cutoff(&self, bucket: QuantileBucket) -> f64 {
        self.cutoffs[bucket.index()]
    }

    /// All cutoffs, bucket 1 first.
    #[must_use]
    pub const fn cutoffs(&self) -> [f64; 5] {
        self.cutoffs
    }
}

/// One area in a ranked or compared result. Derived per request and never
/// stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedArea {
    /// Area identifier.
    pub area_id: String,
    /// Area display name.
    pub area_name: String,
    /// Effective date of the snapshot used.
    pub as_of: NaiveDate,
    /// Sub-scores from the snapshot.
    pub scores: SubScores,
    /// Total under the request's resolved weights.
    pub total: f64,
    /// Quantile bucket of `total`.
    pub bucket: QuantileBucket,
}

/// Summary of the totals in a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonStatistics {
    /// Number of areas compared.
    pub count: usize,
    /// Highest total.
    pub highest: f64,
    /// Lowest total.
    pub lowest: f64,
    /// Mean total, rounded to one decimal.
    pub average: f64,
}

/// Number of areas that fell in a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketCount {
    /// The bucket.
    pub bucket: QuantileBucket,
    /// Areas in it.
    pub count: usize,
}

/// Distribution summary of a scored working set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    /// Number of areas scored.
    pub areas_scored: usize,
    /// Mean total.
    pub mean: f64,
    /// Population standard deviation of totals.
    pub std: f64,
    /// Lowest total.
    pub min: f64,
    /// Highest total.
    pub max: f64,
    /// Areas per bucket, bucket 1 first.
    pub distribution: Vec<BucketCount>,
    /// Weights the totals were computed with.
    pub weights_used: WeightVector,
}
