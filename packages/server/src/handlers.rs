//! HTTP handler functions for the investmtl API.
//!
//! Handlers parse their query parameters first, then read snapshots from
//! the repository under the configured timeout, then hand the working set
//! to the ranking service.

use std::sync::Arc;
use std::time::Duration;

use actix_web::http::header::{CacheControl, CacheDirective};
use actix_web::{HttpResponse, web};
use duckdb::Connection;
use investmtl_database::DbError;
use investmtl_database::queries::{self, SnapshotQuery};
use investmtl_scoring::ranking::compare_ids;
use investmtl_scoring_models::WeightOverrides;
use investmtl_server_models::{
    ApiArea, ApiComparison, ApiDates, ApiHealth, ApiLegend, ApiRanked, ApiRankedArea, ApiScore,
    AreaQueryParams, CompareQueryParams, RankedQueryParams, ScoreQueryParams, SummaryQueryParams,
    api_thresholds, parse_as_of, parse_classification, parse_ids, parse_optional_bbox,
};

use crate::AppState;
use crate::error::ApiError;

/// Runs a repository read on the blocking pool with a pooled connection,
/// bounded by the configured timeout.
///
/// A read that times out keeps running until it finishes and holds its
/// connection until then.
async fn read_repository<T, F>(state: &AppState, read: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T, DbError> + Send + 'static,
{
    let pool = Arc::clone(&state.pool);
    let timeout_ms = state.config.repository_timeout_ms;

    let task = web::block(move || read(&pool.acquire()));

    match tokio::time::timeout(Duration::from_millis(timeout_ms), task).await {
        Ok(Ok(result)) => result.map_err(ApiError::from),
        Ok(Err(e)) => Err(ApiError::Internal(e.to_string())),
        Err(_) => Err(ApiError::Timeout { timeout_ms }),
    }
}

fn cached(max_age: u32) -> actix_web::HttpResponseBuilder {
    let mut builder = HttpResponse::Ok();
    builder.insert_header(CacheControl(vec![
        CacheDirective::Public,
        CacheDirective::MaxAge(max_age),
    ]));
    builder
}

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/areas`
///
/// Lists known areas, optionally those intersecting a bounding box.
pub async fn areas(
    state: web::Data<AppState>,
    params: web::Query<AreaQueryParams>,
) -> Result<HttpResponse, ApiError> {
    let bbox = parse_optional_bbox(params.bbox.as_deref())?;

    let areas = read_repository(&state, move |conn| {
        queries::list_areas(conn, bbox.as_ref())
    })
    .await?;

    let areas: Vec<ApiArea> = areas.into_iter().map(ApiArea::from).collect();
    Ok(cached(state.config.cache.ranked).json(areas))
}

/// `GET /api/scores/{area_id}`
///
/// Scores one area under the request's weights.
pub async fn score(
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<ScoreQueryParams>,
) -> Result<HttpResponse, ApiError> {
    let area_id = path.into_inner();
    let as_of = parse_as_of(params.as_of.as_deref())?;
    let overrides = params.weights.parse()?;

    let snapshot = {
        let area_id = area_id.clone();
        read_repository(&state, move |conn| {
            queries::latest_snapshot(conn, &area_id, as_of)
        })
        .await?
    };

    let snapshots: Vec<_> = snapshot.into_iter().collect();
    let score = state
        .service
        .score_area(&snapshots, &area_id, &overrides, as_of)?;

    let cache = &state.config.cache;
    let max_age = if score.weights.using_custom_weights {
        cache.score_custom
    } else {
        cache.score_default
    };

    Ok(cached(max_age).json(ApiScore::from(score)))
}

/// `GET /api/compare`
///
/// Compares up to five distinct areas side by side. Unknown ids are
/// dropped.
pub async fn compare(
    state: web::Data<AppState>,
    params: web::Query<CompareQueryParams>,
) -> Result<HttpResponse, ApiError> {
    let ids = compare_ids(&parse_ids(params.ids.as_deref()))?;
    let as_of = parse_as_of(params.as_of.as_deref())?;
    let mode = parse_classification(params.classification.as_deref(), state.config.classification)?;
    let overrides = params.weights.parse()?;

    let query = SnapshotQuery {
        as_of,
        area_ids: Some(ids.clone()),
        ..SnapshotQuery::default()
    };
    let snapshots =
        read_repository(&state, move |conn| queries::latest_snapshots(conn, &query)).await?;

    let comparison = state
        .service
        .compare(&snapshots, &ids, &overrides, mode, as_of)?;

    if comparison.comparisons.len() < ids.len() {
        log::warn!(
            "Compare dropped unknown areas: requested {}, resolved {}",
            ids.len(),
            comparison.comparisons.len()
        );
    }

    Ok(cached(state.config.cache.compare).json(ApiComparison {
        thresholds: api_thresholds(&comparison.thresholds),
        comparisons: comparison
            .comparisons
            .into_iter()
            .map(ApiRankedArea::from)
            .collect(),
        statistics: comparison.statistics,
        weights_used: comparison.weights.weights,
        using_custom_weights: comparison.weights.using_custom_weights,
    }))
}

/// `GET /api/ranked`
///
/// Returns the top areas under default weights with quantile buckets.
pub async fn ranked(
    state: web::Data<AppState>,
    params: web::Query<RankedQueryParams>,
) -> Result<HttpResponse, ApiError> {
    let config = &state.config;
    let limit = params.limit(config.ranked_default_limit, config.ranked_max_limit);
    let as_of = parse_as_of(params.as_of.as_deref())?;
    let bbox = parse_optional_bbox(params.bbox.as_deref())?;
    let mode = parse_classification(params.classification.as_deref(), config.classification)?;

    let query = SnapshotQuery {
        as_of,
        bbox,
        ..SnapshotQuery::default()
    };
    let snapshots =
        read_repository(&state, move |conn| queries::latest_snapshots(conn, &query)).await?;
    log::debug!("Ranking {} snapshots (limit {limit})", snapshots.len());

    let ranking = state
        .service
        .top_n(&snapshots, &WeightOverrides::default(), mode, as_of, limit);

    Ok(cached(config.cache.ranked).json(ApiRanked {
        thresholds: api_thresholds(&ranking.thresholds),
        ranked: ranking.ranked.into_iter().map(ApiRankedArea::from).collect(),
        classification: mode,
        as_of,
    }))
}

/// `GET /api/legend`
///
/// Returns the fixed legend breakpoints and colors.
pub async fn legend(state: web::Data<AppState>) -> HttpResponse {
    cached(state.config.cache.legend).json(ApiLegend::default())
}

/// `GET /api/summary`
///
/// Summarizes the default-weighted score distribution.
pub async fn summary(
    state: web::Data<AppState>,
    params: web::Query<SummaryQueryParams>,
) -> Result<HttpResponse, ApiError> {
    let as_of = parse_as_of(params.as_of.as_deref())?;

    let query = SnapshotQuery {
        as_of,
        ..SnapshotQuery::default()
    };
    let snapshots =
        read_repository(&state, move |conn| queries::latest_snapshots(conn, &query)).await?;

    Ok(cached(state.config.cache.ranked).json(state.service.summary(&snapshots, as_of)))
}

/// `GET /api/dates`
///
/// Lists the dates score snapshots are available for.
pub async fn dates(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let dates = read_repository(&state, queries::snapshot_dates).await?;
    Ok(cached(state.config.cache.ranked).json(ApiDates::from(dates)))
}
