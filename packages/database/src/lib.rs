#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Score repository for investmtl, stored in `DuckDB`.
//!
//! Holds the reference list of areas and the append-only per-area score
//! snapshots produced by the ingestion pipeline. The scoring core only
//! reads from here; writes happen through [`queries::upsert_area`],
//! [`queries::insert_snapshot`], and the CSV [`import`].

pub mod import;
pub mod paths;
pub mod queries;

use std::path::Path;

use duckdb::Connection;

/// Errors that can occur during repository operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Opens (or creates) the score database at `path` and ensures the schema
/// exists.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open(path: &Path) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent() {
        paths::ensure_dir(parent)?;
    }

    let conn = Connection::open(path)?;
    create_schema(&conn)?;
    log::debug!("Opened score database at {}", path.display());
    Ok(conn)
}

/// Opens an in-memory score database with the schema applied.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open_in_memory() -> Result<Connection, DbError> {
    let conn = Connection::open_in_memory()?;
    create_schema(&conn)?;
    Ok(conn)
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS areas (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            west DOUBLE,
            south DOUBLE,
            east DOUBLE,
            north DOUBLE
        );

        CREATE TABLE IF NOT EXISTS score_snapshots (
            area_id TEXT NOT NULL,
            as_of DATE NOT NULL,
            s_growth DOUBLE NOT NULL,
            s_supply DOUBLE NOT NULL,
            s_tension DOUBLE NOT NULL,
            s_access DOUBLE NOT NULL,
            s_return DOUBLE NOT NULL,
            total DOUBLE NOT NULL,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (area_id, as_of)
        );",
    )?;

    Ok(())
}
