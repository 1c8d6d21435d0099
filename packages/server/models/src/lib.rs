#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the investmtl server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the scoring types to allow independent evolution of the API
//! contract.
//!
//! Query parameters arrive as loose strings. Each `*QueryParams` type has
//! an explicit parse step that either yields strongly-typed values for the
//! scoring core or a [`ParamError`].

use chrono::NaiveDate;
use investmtl_scoring::ranking::AreaScore;
use investmtl_scoring_models::{
    Area, BoundingBox, ClassificationMode, ComparisonStatistics, QuantileBucket,
    QuantileThresholds, RankedArea, SubScores, WeightOverrides, WeightVector,
};
use serde::{Deserialize, Serialize};

/// Errors produced while parsing query parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    /// A weight could not be parsed as a finite number.
    #[error("Invalid weight for {name}: '{value}' is not a number")]
    InvalidWeight {
        /// Category name.
        name: &'static str,
        /// Raw value.
        value: String,
    },

    /// A date was not `YYYY-MM-DD`.
    #[error("Invalid date '{value}'. Expected format: YYYY-MM-DD")]
    InvalidDate {
        /// Raw value.
        value: String,
    },

    /// A bounding box was not four ordered finite numbers.
    #[error("Invalid bbox '{value}'. Expected west,south,east,north")]
    InvalidBbox {
        /// Raw value.
        value: String,
    },

    /// Unknown classification mode.
    #[error("Invalid classification '{value}'. Expected static or empirical")]
    InvalidClassification {
        /// Raw value.
        value: String,
    },
}

/// Weight overrides as they arrive on the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeightQueryParams {
    /// Growth weight.
    pub growth: Option<String>,
    /// Supply weight.
    pub supply: Option<String>,
    /// Tension weight.
    pub tension: Option<String>,
    /// Accessibility weight.
    #[serde(alias = "accessibility")]
    pub access: Option<String>,
    /// Return weight.
    #[serde(rename = "return", alias = "returns")]
    pub returns: Option<String>,
}

impl WeightQueryParams {
    /// Parses the raw weights.
    ///
    /// Empty values count as absent. Negative and zero values are passed
    /// through; the weight resolver replaces them with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError::InvalidWeight`] if a value is not a finite
    /// number.
    pub fn parse(&self) -> Result<WeightOverrides, ParamError> {
        Ok(WeightOverrides {
            growth: parse_weight("growth", self.growth.as_deref())?,
            supply: parse_weight("supply", self.supply.as_deref())?,
            tension: parse_weight("tension", self.tension.as_deref())?,
            access: parse_weight("access", self.access.as_deref())?,
            returns: parse_weight("return", self.returns.as_deref())?,
        })
    }
}

fn parse_weight(name: &'static str, value: Option<&str>) -> Result<Option<f64>, ParamError> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    raw.parse::<f64>()
        .ok()
        .filter(|w| w.is_finite())
        .map(Some)
        .ok_or_else(|| ParamError::InvalidWeight {
            name,
            value: raw.to_string(),
        })
}

/// Parses an optional `YYYY-MM-DD` cutoff date.
///
/// # Errors
///
/// Returns [`ParamError::InvalidDate`] if the value is present but not a
/// valid date.
pub fn parse_as_of(value: Option<&str>) -> Result<Option<NaiveDate>, ParamError> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| ParamError::InvalidDate {
            value: raw.to_string(),
        })
}

/// Parses a bounding box string `"west,south,east,north"` into a
/// [`BoundingBox`].
///
/// # Errors
///
/// Returns [`ParamError::InvalidBbox`] unless the value holds exactly four
/// finite numbers with `west <= east` and `south <= north`.
pub fn parse_bbox(value: &str) -> Result<BoundingBox, ParamError> {
    let err = || ParamError::InvalidBbox {
        value: value.to_string(),
    };

    let parts = value
        .split(',')
        .map(|p| p.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(err)?;

    let &[west, south, east, north] = parts.as_slice() else {
        return Err(err());
    };
    if west > east || south > north {
        return Err(err());
    }

    Ok(BoundingBox::new(west, south, east, north))
}

/// Parses an optional bounding box.
///
/// # Errors
///
/// See [`parse_bbox`].
pub fn parse_optional_bbox(value: Option<&str>) -> Result<Option<BoundingBox>, ParamError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(parse_bbox)
        .transpose()
}

/// Parses a classification mode, falling back to `default` when absent.
///
/// # Errors
///
/// Returns [`ParamError::InvalidClassification`] for unknown modes.
pub fn parse_classification(
    value: Option<&str>,
    default: ClassificationMode,
) -> Result<ClassificationMode, ParamError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ParamError::InvalidClassification {
                value: raw.to_string(),
            }),
    }
}

/// Splits a comma-separated id list, dropping blanks.
#[must_use]
pub fn parse_ids(value: Option<&str>) -> Vec<String> {
    value
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Query parameters for the areas endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AreaQueryParams {
    /// Bounding box as `west,south,east,north`.
    pub bbox: Option<String>,
}

/// Query parameters for the single-area score endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreQueryParams {
    /// Cutoff date (`YYYY-MM-DD`).
    pub as_of: Option<String>,
    /// Weight overrides.
    #[serde(flatten)]
    pub weights: WeightQueryParams,
}

/// Query parameters for the compare endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareQueryParams {
    /// Comma-separated area ids.
    pub ids: Option<String>,
    /// Cutoff date (`YYYY-MM-DD`).
    pub as_of: Option<String>,
    /// `static` or `empirical`.
    pub classification: Option<String>,
    /// Weight overrides.
    #[serde(flatten)]
    pub weights: WeightQueryParams,
}

/// Query parameters for the ranked endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedQueryParams {
    /// Maximum number of results.
    pub limit: Option<String>,
    /// Cutoff date (`YYYY-MM-DD`).
    pub as_of: Option<String>,
    /// Bounding box as `west,south,east,north`.
    pub bbox: Option<String>,
    /// `static` or `empirical`.
    pub classification: Option<String>,
}

impl RankedQueryParams {
    /// Resolves the requested limit, clamped to `max`.
    ///
    /// Absent or unparseable limits fall back to `default`.
    #[must_use]
    pub fn limit(&self, default: usize, max: usize) -> usize {
        self.limit
            .as_deref()
            .and_then(|l| l.trim().parse::<usize>().ok())
            .unwrap_or(default)
            .min(max)
    }
}

/// Query parameters for the summary endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryQueryParams {
    /// Cutoff date (`YYYY-MM-DD`).
    pub as_of: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
}

/// An area as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiArea {
    /// Area identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Bounding box, if known.
    pub bounds: Option<BoundingBox>,
}

impl From<Area> for ApiArea {
    fn from(area: Area) -> Self {
        Self {
            id: area.id,
            name: area.name,
            bounds: area.bounds,
        }
    }
}

/// A ranked or compared area as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRankedArea {
    /// Area identifier.
    pub area_id: String,
    /// Display name.
    pub area_name: String,
    /// Effective date of the snapshot used.
    pub as_of: NaiveDate,
    /// The five sub-scores.
    pub sub_scores: SubScores,
    /// Weighted total.
    pub total: f64,
    /// Bucket value (1-5).
    pub bucket: u8,
    /// Bucket name.
    pub bucket_label: QuantileBucket,
    /// Map fill color for the bucket.
    pub color: String,
}

impl From<RankedArea> for ApiRankedArea {
    fn from(area: RankedArea) -> Self {
        Self {
            area_id: area.area_id,
            area_name: area.area_name,
            as_of: area.as_of,
            sub_scores: area.scores,
            total: area.total,
            bucket: area.bucket.value(),
            bucket_label: area.bucket,
            color: area.bucket.color().to_string(),
        }
    }
}

/// Single-area score response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiScore {
    /// Area identifier.
    pub area_id: String,
    /// Display name.
    pub area_name: String,
    /// Effective date of the snapshot used.
    pub as_of: NaiveDate,
    /// The five sub-scores.
    pub sub_scores: SubScores,
    /// Weighted total.
    pub total: f64,
    /// Normalized weights used.
    pub weights_used: WeightVector,
    /// Whether the caller's weights differed from the defaults.
    pub using_custom_weights: bool,
}

impl From<AreaScore> for ApiScore {
    fn from(score: AreaScore) -> Self {
        Self {
            area_id: score.area_id,
            area_name: score.area_name,
            as_of: score.as_of,
            sub_scores: score.scores,
            total: score.total,
            weights_used: score.weights.weights,
            using_custom_weights: score.weights.using_custom_weights,
        }
    }
}

/// One row of a threshold table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiThreshold {
    /// Bucket value (1-5).
    pub bucket: u8,
    /// Bucket name.
    pub label: QuantileBucket,
    /// Minimum total for the bucket.
    pub min: f64,
    /// Map fill color for the bucket.
    pub color: String,
}

/// Flattens a threshold table into API rows, bucket 1 first.
#[must_use]
pub fn api_thresholds(thresholds: &QuantileThresholds) -> Vec<ApiThreshold> {
    QuantileBucket::ALL
        .iter()
        .map(|bucket| ApiThreshold {
            bucket: bucket.value(),
            label: *bucket,
            min: thresholds.cutoff(*bucket),
            color: bucket.color().to_string(),
        })
        .collect()
}

/// Compare response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiComparison {
    /// Compared areas, best first.
    pub comparisons: Vec<ApiRankedArea>,
    /// Summary of the compared totals.
    pub statistics: ComparisonStatistics,
    /// Thresholds the buckets were assigned from.
    pub thresholds: Vec<ApiThreshold>,
    /// Normalized weights used.
    pub weights_used: WeightVector,
    /// Whether the caller's weights differed from the defaults.
    pub using_custom_weights: bool,
}

/// Ranked list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRanked {
    /// Areas, best first.
    pub ranked: Vec<ApiRankedArea>,
    /// Thresholds the buckets were assigned from.
    pub thresholds: Vec<ApiThreshold>,
    /// How the thresholds were built.
    pub classification: ClassificationMode,
    /// Requested cutoff date, if any.
    pub as_of: Option<NaiveDate>,
}

/// Legend response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiLegend {
    /// Always [`ClassificationMode::Static`].
    pub classification: ClassificationMode,
    /// Fixed bucket breakpoints and colors.
    pub thresholds: Vec<ApiThreshold>,
}

/// Available snapshot dates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDates {
    /// Distinct snapshot dates, oldest first.
    pub dates: Vec<NaiveDate>,
    /// Most recent date, if any snapshot exists.
    pub latest: Option<NaiveDate>,
}

impl From<Vec<NaiveDate>> for ApiDates {
    fn from(dates: Vec<NaiveDate>) -> Self {
        Self {
            latest: dates.last().copied(),
            dates,
        }
    }
}

impl Default for ApiLegend {
    fn default() -> Self {
        Self {
            classification: ClassificationMode::Static,
            thresholds: api_thresholds(&QuantileThresholds::STATIC),
        }
    }
}
