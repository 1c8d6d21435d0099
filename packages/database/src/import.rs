//! CSV import of score snapshots.
//!
//! Expected header:
//! `area_id,area_name,as_of,growth,supply,tension,access,return` with
//! optional `total` and `west,south,east,north` columns.
//!
//! In [`ImportMode::Scored`] the five columns are already 0-100
//! sub-scores. In [`ImportMode::Raw`] they are raw metrics and each column
//! is robustly scaled against the other rows sharing the same `as_of`.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use duckdb::Connection;
use investmtl_scoring::aggregate::aggregate;
use investmtl_scoring::scale::scale_population;
use investmtl_scoring_models::{
    Area, BoundingBox, ScoreCategory, ScoreSnapshot, SubScores, WeightVector,
};
use serde::Deserialize;

use crate::DbError;
use crate::queries::{insert_snapshot, parse_date, upsert_area};

/// How the metric columns of an import file are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Columns are precomputed 0-100 sub-scores.
    #[default]
    Scored,
    /// Columns are raw metrics to be scaled per snapshot date.
    Raw,
}

/// Counts from one import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportReport {
    /// Data rows read from the file.
    pub rows_read: usize,
    /// Rows skipped because a field could not be parsed.
    pub invalid_rows: usize,
    /// Distinct areas inserted or updated.
    pub areas_upserted: usize,
    /// New snapshots written.
    pub snapshots_inserted: usize,
    /// Snapshots skipped because one already existed for that date.
    pub duplicates_skipped: usize,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    area_id: String,
    area_name: String,
    as_of: String,
    growth: String,
    supply: String,
    tension: String,
    #[serde(alias = "accessibility")]
    access: String,
    #[serde(rename = "return", alias = "returns")]
    returns: String,
    #[serde(default)]
    total: Option<String>,
    #[serde(default)]
    west: Option<String>,
    #[serde(default)]
    south: Option<String>,
    #[serde(default)]
    east: Option<String>,
    #[serde(default)]
    north: Option<String>,
}

struct ParsedRow {
    area: Area,
    as_of: NaiveDate,
    scores: SubScores,
    total: Option<f64>,
}

/// Imports snapshots from the CSV file at `path`.
///
/// # Errors
///
/// Returns [`DbError`] if the file cannot be opened or a database
/// statement fails.
pub fn import_csv_path(
    conn: &mut Connection,
    path: &Path,
    mode: ImportMode,
    weights: &WeightVector,
) -> Result<ImportReport, DbError> {
    let file = std::fs::File::open(path)?;
    log::info!("Importing snapshots from {}", path.display());
    import_csv(conn, file, mode, weights)
}

/// Imports snapshots from CSV data.
///
/// Areas are upserted, snapshots appended in a single transaction.
/// `weights` are used to compute totals that the file does not provide
/// (always, in raw mode).
///
/// # Errors
///
/// Returns [`DbError`] if the CSV header is unreadable or a database
/// statement fails.
pub fn import_csv<R: Read>(
    conn: &mut Connection,
    reader: R,
    mode: ImportMode,
    weights: &WeightVector,
) -> Result<ImportReport, DbError> {
    let mut report = ImportReport::default();
    let mut rows = Vec::new();

    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    for (idx, record) in csv_reader.deserialize::<CsvRow>().enumerate() {
        report.rows_read += 1;
        let line = idx + 2;
        match record.map_err(DbError::from).and_then(parse_row) {
            Ok(row) => rows.push(row),
            Err(e) => {
                log::warn!("Skipping line {line}: {e}");
                report.invalid_rows += 1;
            }
        }
    }

    if mode == ImportMode::Raw {
        scale_raw_rows(&mut rows);
    }

    let mut areas: BTreeMap<&str, &Area> = BTreeMap::new();
    for row in &rows {
        areas.insert(row.area.id.as_str(), &row.area);
    }

    let tx = conn.transaction()?;

    for area in areas.values() {
        upsert_area(&tx, area)?;
    }
    report.areas_upserted = areas.len();

    for row in &rows {
        let total = match (mode, row.total) {
            (ImportMode::Scored, Some(total)) => total,
            _ => aggregate(&row.scores, weights),
        };
        let snapshot = ScoreSnapshot {
            area_id: row.area.id.clone(),
            area_name: row.area.name.clone(),
            as_of: row.as_of,
            scores: row.scores,
            total,
        };
        if insert_snapshot(&tx, &snapshot)? {
            report.snapshots_inserted += 1;
        } else {
            report.duplicates_skipped += 1;
        }
    }

    tx.commit()?;

    log::info!(
        "Imported {} snapshots for {} areas ({} duplicates, {} invalid rows)",
        report.snapshots_inserted,
        report.areas_upserted,
        report.duplicates_skipped,
        report.invalid_rows
    );

    Ok(report)
}

fn parse_row(row: CsvRow) -> Result<ParsedRow, DbError> {
    if row.area_id.is_empty() {
        return Err(DbError::Conversion {
            message: "Empty area_id".to_string(),
        });
    }

    let bounds = match (
        optional_number("west", row.west.as_deref())?,
        optional_number("south", row.south.as_deref())?,
        optional_number("east", row.east.as_deref())?,
        optional_number("north", row.north.as_deref())?,
    ) {
        (Some(west), Some(south), Some(east), Some(north)) => {
            Some(BoundingBox::new(west, south, east, north))
        }
        _ => None,
    };

    Ok(ParsedRow {
        as_of: parse_date(&row.as_of)?,
        scores: SubScores::new(
            number("growth", &row.growth)?,
            number("supply", &row.supply)?,
            number("tension", &row.tension)?,
            number("access", &row.access)?,
            number("return", &row.returns)?,
        ),
        total: optional_number("total", row.total.as_deref())?,
        area: Area {
            name: if row.area_name.is_empty() {
                row.area_id.clone()
            } else {
                row.area_name
            },
            id: row.area_id,
            bounds,
        },
    })
}

fn number(column: &str, value: &str) -> Result<f64, DbError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| DbError::Conversion {
            message: format!("Invalid {column} value '{value}'"),
        })
}

fn optional_number(column: &str, value: Option<&str>) -> Result<Option<f64>, DbError> {
    match value {
        None | Some("") => Ok(None),
        Some(v) => number(column, v).map(Some),
    }
}

fn scale_raw_rows(rows: &mut [ParsedRow]) {
    let mut by_date: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for (idx, row) in rows.iter().enumerate() {
        by_date.entry(row.as_of).or_default().push(idx);
    }

    for (as_of, indices) in by_date {
        log::debug!("Scaling {} raw rows for {as_of}", indices.len());
        for category in ScoreCategory::ALL {
            let column: Vec<f64> = indices
                .iter()
                .filter_map(|i| rows.get(*i))
                .map(|r| r.scores.get(category))
                .collect();
            let scaled = scale_population(&column);
            for (i, value) in indices.iter().zip(scaled) {
                if let Some(row) = rows.get_mut(*i) {
                    row.scores = row.scores.with(category, value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_in_memory;
    use crate::queries::{SnapshotQuery, latest_snapshot, latest_snapshots, list_areas};

    const SCORED: &str = "\
area_id,area_name,as_of,growth,supply,tension,access,return,west,south,east,north
plateau,Le Plateau-Mont-Royal,2024-06-01,80,60,90,70,50,-73.60,45.51,-73.56,45.54
verdun,Verdun,2024-06-01,70,75,65,60,70,,,,
anjou,Anjou,not-a-date,30,40,35,20,45,,,,
lachine,Lachine,2024-06-01,55,abc,45,40,60,,,,
";

    #[test]
    fn imports_scored_rows_and_skips_invalid_ones() {
        let mut conn = open_in_memory().unwrap();
        let report =
            import_csv(&mut conn, SCORED.as_bytes(), ImportMode::Scored, &WeightVector::DEFAULT)
                .unwrap();

        assert_eq!(report.rows_read, 4);
        assert_eq!(report.invalid_rows, 2);
        assert_eq!(report.areas_upserted, 2);
        assert_eq!(report.snapshots_inserted, 2);
        assert_eq!(report.duplicates_skipped, 0);

        let plateau = latest_snapshot(&conn, "plateau", None).unwrap().unwrap();
        assert!((plateau.total - 71.5).abs() < 1e-9);
        assert_eq!(plateau.area_name, "Le Plateau-Mont-Royal");

        let areas = list_areas(&conn, None).unwrap();
        let plateau_area = areas.iter().find(|a| a.id == "plateau").unwrap();
        assert!(plateau_area.bounds.is_some());
        let verdun_area = areas.iter().find(|a| a.id == "verdun").unwrap();
        assert!(verdun_area.bounds.is_none());
    }

    #[test]
    fn reimport_skips_existing_snapshots() {
        let mut conn = open_in_memory().unwrap();
        import_csv(&mut conn, SCORED.as_bytes(), ImportMode::Scored, &WeightVector::DEFAULT)
            .unwrap();
        let again =
            import_csv(&mut conn, SCORED.as_bytes(), ImportMode::Scored, &WeightVector::DEFAULT)
                .unwrap();
        assert_eq!(again.snapshots_inserted, 0);
        assert_eq!(again.duplicates_skipped, 2);
    }

    #[test]
    fn provided_total_is_kept_in_scored_mode() {
        let csv = "\
area_id,area_name,as_of,growth,supply,tension,access,return,total
plateau,Plateau,2024-06-01,80,60,90,70,50,12.5
";
        let mut conn = open_in_memory().unwrap();
        import_csv(&mut conn, csv.as_bytes(), ImportMode::Scored, &WeightVector::DEFAULT)
            .unwrap();
        let plateau = latest_snapshot(&conn, "plateau", None).unwrap().unwrap();
        assert!((plateau.total - 12.5).abs() < 1e-9);
    }

    #[test]
    fn raw_mode_scales_each_date_separately() {
        let csv = "\
area_id,area_name,as_of,growth,supply,tension,access,return
a,A,2024-01-01,100,1,10,5,0.1
b,B,2024-01-01,200,2,20,5,0.2
c,C,2024-01-01,300,3,30,5,0.3
d,D,2024-01-01,400,4,40,5,0.4
e,E,2024-01-01,500,5,50,5,0.5
a,A,2024-02-01,1,1,1,1,1
";
        let mut conn = open_in_memory().unwrap();
        let report =
            import_csv(&mut conn, csv.as_bytes(), ImportMode::Raw, &WeightVector::DEFAULT)
                .unwrap();
        assert_eq!(report.snapshots_inserted, 6);

        let january = SnapshotQuery {
            as_of: Some(parse_date("2024-01-15").unwrap()),
            ..SnapshotQuery::default()
        };
        let snapshots = latest_snapshots(&conn, &january).unwrap();
        let c = snapshots.iter().find(|s| s.area_id == "c").unwrap();
        assert!((c.scores.growth - 50.0).abs() < 1e-9);
        // Constant column has zero IQR.
        assert!((c.scores.access - 50.0).abs() < 1e-9);
        let e = snapshots.iter().find(|s| s.area_id == "e").unwrap();
        assert!((e.scores.growth - 75.0).abs() < 1e-9);

        // A single-row date has no spread at all.
        let a = latest_snapshot(&conn, "a", None).unwrap().unwrap();
        assert!((a.scores.growth - 50.0).abs() < 1e-9);
        assert!((a.total - 50.0).abs() < 1e-9);
    }

    #[test]
    fn accepts_long_category_aliases() {
        let csv = "\
area_id,area_name,as_of,growth,supply,tension,accessibility,returns
plateau,Plateau,2024-06-01,80,60,90,70,50
";
        let mut conn = open_in_memory().unwrap();
        let report =
            import_csv(&mut conn, csv.as_bytes(), ImportMode::Scored, &WeightVector::DEFAULT)
                .unwrap();
        assert_eq!(report.snapshots_inserted, 1);
    }
}
