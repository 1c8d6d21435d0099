#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for investmtl area scores.
//!
//! Serves single-area scores, comparisons, ranked lists, the map legend,
//! and a distribution summary. Snapshots are read from the `DuckDB` score
//! repository; all scoring happens per request in
//! [`investmtl_scoring::ranking::RankingService`].

pub mod config;
pub mod error;
mod handlers;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use investmtl_database::DbError;
use investmtl_scoring::ranking::RankingService;

pub use config::{ConfigError, ServerConfig};
pub use error::ApiError;

/// Simple round-robin pool of `DuckDB` connections to one score database.
///
/// `duckdb::Connection` is `Send` but not `Sync`, so each connection is
/// wrapped in a `Mutex`. Every connection is a clone of the one the pool
/// was built from, so in-memory databases are shared too.
pub struct DuckDbPool {
    connections: Vec<Mutex<duckdb::Connection>>,
    next: AtomicUsize,
}

impl DuckDbPool {
    /// Builds a pool of `size` connections (at least one) from `conn`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a connection cannot be cloned.
    pub fn new(conn: duckdb::Connection, size: usize) -> Result<Self, DbError> {
        let mut connections = Vec::with_capacity(size.max(1));
        for _ in 1..size {
            connections.push(Mutex::new(conn.try_clone()?));
        }
        connections.push(Mutex::new(conn));

        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
        })
    }

    /// Number of pooled connections.
    #[must_use]
    pub fn size(&self) -> usize {
        self.connections.len()
    }

    /// Acquires a connection, starting from the next round-robin slot and
    /// taking the first idle one. Blocks on that slot if all are busy.
    ///
    /// Poisoned connections are still handed out.
    pub fn acquire(&self) -> MutexGuard<'_, duckdb::Connection> {
        let len = self.connections.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed) % len;

        for offset in 0..len {
            match self.connections[(start + offset) % len].try_lock() {
                Ok(conn) => return conn,
                Err(TryLockError::Poisoned(e)) => return e.into_inner(),
                Err(TryLockError::WouldBlock) => {}
            }
        }

        log::debug!("All {len} score database connections busy, waiting");
        self.connections[start]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared application state.
pub struct AppState {
    /// Pooled score repository connections.
    pub pool: Arc<DuckDbPool>,
    /// Server configuration.
    pub config: ServerConfig,
    /// Ranking service seeded with the configured default weights.
    pub service: RankingService,
}

impl AppState {
    /// Builds the state around an open score repository connection,
    /// pooling `config.read_connections` connections to it.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the pool cannot be built.
    pub fn new(conn: duckdb::Connection, config: ServerConfig) -> Result<Self, DbError> {
        let pool = DuckDbPool::new(conn, config.read_connections)?;
        let service = RankingService::new(config.resolver());
        Ok(Self {
            pool: Arc::new(pool),
            config,
            service,
        })
    }
}

/// Registers the `/api` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/areas", web::get().to(handlers::areas))
            .route("/scores/{area_id}", web::get().to(handlers::score))
            .route("/compare", web::get().to(handlers::compare))
            .route("/ranked", web::get().to(handlers::ranked))
            .route("/legend", web::get().to(handlers::legend))
            .route("/summary", web::get().to(handlers::summary))
            .route("/dates", web::get().to(handlers::dates)),
    );
}

/// Starts the investmtl API server.
///
/// Opens the score database named by `config` and serves the API until
/// shut down. The caller is responsible for providing the async runtime
/// (e.g. via `#[actix_web::main]`) and initializing logging.
///
/// # Errors
///
/// Returns an `std::io::Result` error if the database cannot be opened,
/// the HTTP server fails to bind, or it encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server(config: ServerConfig) -> std::io::Result<()> {
    let db_path = config.database_path();
    log::info!("Opening score database at {}...", db_path.display());
    let conn = investmtl_database::open(&db_path).map_err(std::io::Error::other)?;

    let bind_addr = config.bind_addr.clone();
    let port = config.port;
    let state =
        web::Data::new(AppState::new(conn, config).map_err(std::io::Error::other)?);

    log::info!(
        "Starting server on {bind_addr}:{port} with {} score database connections",
        state.pool.size()
    );

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use actix_web::http::{StatusCode, header};
    use actix_web::test;
    use chrono::NaiveDate;
    use investmtl_database::queries::{insert_snapshot, upsert_area};
    use investmtl_scoring_models::{Area, BoundingBox, ScoreSnapshot, SubScores};
    use serde_json::Value;

    use super::*;

    fn snapshot(area_id: &str, as_of: (i32, u32, u32), scores: [f64; 5]) -> ScoreSnapshot {
        ScoreSnapshot {
            area_id: area_id.to_string(),
            area_name: String::new(),
            as_of: NaiveDate::from_ymd_opt(as_of.0, as_of.1, as_of.2).unwrap(),
            scores: SubScores::new(scores[0], scores[1], scores[2], scores[3], scores[4]),
            total: 0.0,
        }
    }

    fn seeded_state(config: ServerConfig) -> web::Data<AppState> {
        let conn = investmtl_database::open_in_memory().unwrap();

        let areas = [
            ("plateau", "Le Plateau-Mont-Royal", Some(BoundingBox::new(-73.60, 45.51, -73.56, 45.54))),
            ("verdun", "Verdun", Some(BoundingBox::new(-73.60, 45.44, -73.54, 45.47))),
            ("anjou", "Anjou", None),
        ];
        for (id, name, bounds) in areas {
            upsert_area(
                &conn,
                &Area {
                    id: id.to_string(),
                    name: name.to_string(),
                    bounds,
                },
            )
            .unwrap();
        }

        for s in [
            snapshot("plateau", (2024, 1, 1), [70.0, 60.0, 80.0, 70.0, 50.0]),
            snapshot("plateau", (2024, 6, 1), [80.0, 60.0, 90.0, 70.0, 50.0]),
            snapshot("verdun", (2024, 6, 1), [70.0, 75.0, 65.0, 60.0, 70.0]),
            snapshot("anjou", (2024, 6, 1), [30.0, 40.0, 35.0, 20.0, 45.0]),
        ] {
            insert_snapshot(&conn, &s).unwrap();
        }

        web::Data::new(AppState::new(conn, config).unwrap())
    }

    macro_rules! init_app {
        ($state:expr) => {
            test::init_service(App::new().app_data($state).configure(configure)).await
        };
    }

    async fn get_json(path: &str) -> (StatusCode, Option<String>, Value) {
        let app = init_app!(seeded_state(ServerConfig::default()));
        let resp = test::call_service(&app, test::TestRequest::get().uri(path).to_request()).await;
        let status = resp.status();
        let cache = resp
            .headers()
            .get(header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let body: Value = test::read_body_json(resp).await;
        (status, cache, body)
    }

    #[actix_web::test]
    async fn health_reports_version() {
        let (status, _, body) = get_json("/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["healthy"], true);
    }

    #[actix_web::test]
    async fn score_with_default_weights() {
        let (status, cache, body) = get_json("/api/scores/plateau").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["areaId"], "plateau");
        assert_eq!(body["areaName"], "Le Plateau-Mont-Royal");
        assert_eq!(body["asOf"], "2024-06-01");
        assert_eq!(body["total"], 71.5);
        assert_eq!(body["usingCustomWeights"], false);
        assert_eq!(cache.as_deref(), Some("public, max-age=3600"));
    }

    #[actix_web::test]
    async fn score_with_custom_weights_is_cached_briefly() {
        let (status, cache, body) = get_json("/api/scores/plateau?growth=1&supply=0").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["usingCustomWeights"], true);
        assert_eq!(cache.as_deref(), Some("public, max-age=300"));

        let weights = &body["weightsUsed"];
        let sum: f64 = ["growth", "supply", "tension", "access", "return"]
            .iter()
            .map(|k| weights[*k].as_f64().unwrap())
            .sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[actix_web::test]
    async fn score_respects_as_of() {
        let (status, _, body) = get_json("/api/scores/plateau?asOf=2024-03-01").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["asOf"], "2024-01-01");
    }

    #[actix_web::test]
    async fn unknown_area_is_not_found() {
        let (status, _, body) = get_json("/api/scores/nowhere").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("nowhere"));
    }

    #[actix_web::test]
    async fn malformed_weight_is_bad_request() {
        let (status, _, body) = get_json("/api/scores/plateau?growth=abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[actix_web::test]
    async fn compare_drops_unknown_ids() {
        let (status, cache, body) =
            get_json("/api/compare?ids=verdun,plateau,nowhere&classification=static").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cache.as_deref(), Some("public, max-age=1800"));

        let ids: Vec<&str> = body["comparisons"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["areaId"].as_str().unwrap())
            .collect();
        assert_eq!(ids, ["plateau", "verdun"]);
        assert_eq!(body["statistics"]["count"], 2);
        assert_eq!(body["comparisons"][0]["bucket"], 4);
        assert_eq!(body["comparisons"][0]["color"], "#91cf60");
    }

    #[actix_web::test]
    async fn compare_with_no_ids_is_empty() {
        let (status, _, body) = get_json("/api/compare").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["comparisons"].as_array().unwrap().len(), 0);
        assert_eq!(body["statistics"]["count"], 0);
        assert_eq!(body["statistics"]["average"], 0.0);
    }

    #[actix_web::test]
    async fn compare_rejects_more_than_five_areas() {
        let (status, _, _) = get_json("/api/compare?ids=a,b,c,d,e,f").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn ranked_is_sorted_and_limited() {
        let (status, cache, body) = get_json("/api/ranked?limit=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cache.as_deref(), Some("public, max-age=7200"));

        let ranked = body["ranked"].as_array().unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0]["areaId"], "plateau");
        assert_eq!(ranked[1]["areaId"], "verdun");
        assert_eq!(body["thresholds"].as_array().unwrap().len(), 5);
        assert_eq!(body["classification"], "empirical");
    }

    #[actix_web::test]
    async fn ranked_filters_by_bbox() {
        let (status, _, body) = get_json("/api/ranked?bbox=-73.70,45.40,-73.50,45.48").await;
        assert_eq!(status, StatusCode::OK);
        let ranked = body["ranked"].as_array().unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0]["areaId"], "verdun");
    }

    #[actix_web::test]
    async fn ranked_rejects_bad_bbox() {
        let (status, _, _) = get_json("/api/ranked?bbox=1,2,3").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn areas_lists_reference_data() {
        let (status, _, body) = get_json("/api/areas").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 3);
    }

    #[actix_web::test]
    async fn legend_is_static() {
        let (status, cache, body) = get_json("/api/legend").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cache.as_deref(), Some("public, max-age=86400"));
        assert_eq!(body["thresholds"][3]["min"], 60.0);
    }

    #[actix_web::test]
    async fn summary_counts_areas() {
        let (status, _, body) = get_json("/api/summary").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["areasScored"], 3);
        assert_eq!(body["max"], 71.5);
    }

    #[actix_web::test]
    async fn ranked_limit_is_clamped_to_config() {
        let config = ServerConfig {
            ranked_default_limit: 1,
            ranked_max_limit: 2,
            ..ServerConfig::default()
        };
        let app = init_app!(seeded_state(config));

        let req = test::TestRequest::get().uri("/api/ranked").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["ranked"].as_array().unwrap().len(), 1);

        let req = test::TestRequest::get().uri("/api/ranked?limit=50").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["ranked"].as_array().unwrap().len(), 2);
    }

    #[actix_web::test]
    async fn compare_dedupes_ids() {
        let (status, _, body) = get_json("/api/compare?ids=verdun,verdun,%20verdun").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["comparisons"].as_array().unwrap().len(), 1);
        assert_eq!(body["statistics"]["count"], 1);
    }

    #[actix_web::test]
    async fn dates_lists_snapshot_dates() {
        let (status, cache, body) = get_json("/api/dates").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cache.as_deref(), Some("public, max-age=7200"));
        assert_eq!(body["dates"], serde_json::json!(["2024-01-01", "2024-06-01"]));
        assert_eq!(body["latest"], "2024-06-01");
    }

    fn single_connection_config() -> ServerConfig {
        ServerConfig {
            read_connections: 1,
            repository_timeout_ms: 50,
            ..ServerConfig::default()
        }
    }

    #[actix_web::test]
    #[allow(clippy::await_holding_lock)]
    async fn busy_repository_times_out() {
        let state = seeded_state(single_connection_config());
        let app = init_app!(state.clone());

        let busy = state.pool.acquire();
        let req = test::TestRequest::get().uri("/api/ranked").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);

        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("timed out after 50 ms"));
        drop(busy);
    }

    #[actix_web::test]
    #[allow(clippy::await_holding_lock)]
    async fn compare_rejects_too_many_ids_without_reading() {
        let state = seeded_state(single_connection_config());
        let app = init_app!(state.clone());

        let busy = state.pool.acquire();
        let req = test::TestRequest::get()
            .uri("/api/compare?ids=a,b,c,d,e,f")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("At most 5 areas"));
        drop(busy);
    }

    #[actix_web::test]
    #[allow(clippy::await_holding_lock)]
    async fn busy_connection_does_not_block_other_reads() {
        let state = seeded_state(ServerConfig {
            read_connections: 2,
            repository_timeout_ms: 1000,
            ..ServerConfig::default()
        });
        let app = init_app!(state.clone());

        let busy = state.pool.acquire();
        for _ in 0..3 {
            let req = test::TestRequest::get().uri("/api/ranked").to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
        }
        drop(busy);
    }

    #[actix_web::test]
    async fn pool_shares_one_database() {
        let conn = investmtl_database::open_in_memory().unwrap();
        let pool = DuckDbPool::new(conn, 3).unwrap();
        assert_eq!(pool.size(), 3);

        upsert_area(
            &pool.acquire(),
            &Area {
                id: "verdun".to_string(),
                name: "Verdun".to_string(),
                bounds: None,
            },
        )
        .unwrap();
        for _ in 0..3 {
            let areas = investmtl_database::queries::list_areas(&pool.acquire(), None).unwrap();
            assert_eq!(areas.len(), 1);
        }

        let held = pool.acquire();
        let other = pool.acquire();
        assert!(!std::ptr::eq(&*held, &*other));
    }
}
