//! Score repository queries.
//!
//! Dates are bound as ISO `YYYY-MM-DD` text and cast to `DATE` in SQL, and
//! read back the same way, so no driver-specific date mapping is needed.

use chrono::NaiveDate;
use duckdb::types::Value;
use duckdb::{Connection, params, params_from_iter};
use investmtl_scoring_models::{Area, BoundingBox, ScoreSnapshot, SubScores};

use crate::DbError;

const DATE_FORMAT: &str = "%Y-%m-%d";

const SNAPSHOT_COLUMNS: &str = "s.area_id, COALESCE(a.name, s.area_id), CAST(s.as_of AS VARCHAR),
     s.s_growth, s.s_supply, s.s_tension, s.s_access, s.s_return, s.total";

/// Filters for reading the latest snapshot of every area.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotQuery {
    /// Only consider snapshots effective on or before this date.
    pub as_of: Option<NaiveDate>,
    /// Only include areas whose bounds intersect this box.
    pub bbox: Option<BoundingBox>,
    /// Only include these area ids. An empty list matches nothing.
    pub area_ids: Option<Vec<String>>,
}

/// Parses an ISO `YYYY-MM-DD` date.
///
/// # Errors
///
/// Returns [`DbError::Conversion`] if the string is not a valid date.
pub fn parse_date(s: &str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|e| DbError::Conversion {
        message: format!("Invalid date '{s}': {e}. Expected format: YYYY-MM-DD"),
    })
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Inserts an area or replaces its reference attributes.
///
/// # Errors
///
/// Returns [`DbError`] if the statement fails.
pub fn upsert_area(conn: &Connection, area: &Area) -> Result<(), DbError> {
    let bounds = area.bounds;
    conn.execute(
        "INSERT OR REPLACE INTO areas (id, name, west, south, east, north)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
            area.id,
            area.name,
            bounds.map(|b| b.west),
            bounds.map(|b| b.south),
            bounds.map(|b| b.east),
            bounds.map(|b| b.north)
        ],
    )?;
    Ok(())
}

/// Appends a snapshot.
///
/// Snapshots are never rewritten: if one already exists for the same
/// `(area_id, as_of)` nothing is written and `false` is returned.
///
/// # Errors
///
/// Returns [`DbError`] if a statement fails.
pub fn insert_snapshot(conn: &Connection, snapshot: &ScoreSnapshot) -> Result<bool, DbError> {
    let as_of = format_date(snapshot.as_of);

    let existing: i64 = conn.query_row(
        "SELECT COUNT(*) FROM score_snapshots WHERE area_id = ? AND as_of = CAST(? AS DATE)",
        params![snapshot.area_id, as_of],
        |row| row.get(0),
    )?;

    if existing > 0 {
        log::debug!(
            "Snapshot for {} at {as_of} already exists, skipping",
            snapshot.area_id
        );
        return Ok(false);
    }

    let scores = &snapshot.scores;
    conn.execute(
        "INSERT INTO score_snapshots (
            area_id, as_of, s_growth, s_supply, s_tension, s_access, s_return, total
        ) VALUES (?, CAST(? AS DATE), ?, ?, ?, ?, ?, ?)",
        params![
            snapshot.area_id,
            as_of,
            scores.growth,
            scores.supply,
            scores.tension,
            scores.access,
            scores.returns,
            snapshot.total
        ],
    )?;

    Ok(true)
}

/// Lists areas ordered by id, optionally restricted to those whose bounds
/// intersect `bbox`. Areas without bounds never match a box.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn list_areas(conn: &Connection, bbox: Option<&BoundingBox>) -> Result<Vec<Area>, DbError> {
    let mut frags = Vec::new();
    let mut values = Vec::new();
    if let Some(bbox) = bbox {
        push_bbox_filter(bbox, &mut frags, &mut values);
    }

    let sql = format!(
        "SELECT a.id, a.name, a.west, a.south, a.east, a.north
         FROM areas a{}
         ORDER BY a.id",
        where_clause(&frags)
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values), |row| {
        Ok(Area {
            id: row.get(0)?,
            name: row.get(1)?,
            bounds: bounds_from(row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?),
        })
    })?;

    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Reads the latest snapshot of every area matching `query`, ordered by
/// area id.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a stored date cannot be
/// parsed.
pub fn latest_snapshots(
    conn: &Connection,
    query: &SnapshotQuery,
) -> Result<Vec<ScoreSnapshot>, DbError> {
    let mut frags = Vec::new();
    let mut values = Vec::new();

    if let Some(as_of) = query.as_of {
        frags.push("s.as_of <= CAST(? AS DATE)".to_string());
        values.push(Value::Text(format_date(as_of)));
    }
    if let Some(bbox) = &query.bbox {
        push_bbox_filter(bbox, &mut frags, &mut values);
    }
    if let Some(area_ids) = &query.area_ids {
        if area_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; area_ids.len()].join(", ");
        frags.push(format!("s.area_id IN ({placeholders})"));
        values.extend(area_ids.iter().cloned().map(Value::Text));
    }

    let sql = format!(
        "SELECT {SNAPSHOT_COLUMNS}
         FROM score_snapshots s
         LEFT JOIN areas a ON a.id = s.area_id{}
         QUALIFY ROW_NUMBER() OVER (PARTITION BY s.area_id ORDER BY s.as_of DESC) = 1
         ORDER BY s.area_id",
        where_clause(&frags)
    );

    let snapshots = query_snapshots(conn, &sql, values)?;
    log::debug!("Read {} latest snapshots", snapshots.len());
    Ok(snapshots)
}

/// Reads the latest snapshot of one area effective on or before `as_of`.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a stored date cannot be
/// parsed.
pub fn latest_snapshot(
    conn: &Connection,
    area_id: &str,
    as_of: Option<NaiveDate>,
) -> Result<Option<ScoreSnapshot>, DbError> {
    let mut frags = vec!["s.area_id = ?".to_string()];
    let mut values = vec![Value::Text(area_id.to_string())];

    if let Some(as_of) = as_of {
        frags.push("s.as_of <= CAST(? AS DATE)".to_string());
        values.push(Value::Text(format_date(as_of)));
    }

    let sql = format!(
        "SELECT {SNAPSHOT_COLUMNS}
         FROM score_snapshots s
         LEFT JOIN areas a ON a.id = s.area_id{}
         ORDER BY s.as_of DESC
         LIMIT 1",
        where_clause(&frags)
    );

    Ok(query_snapshots(conn, &sql, values)?.into_iter().next())
}

/// Lists the distinct snapshot dates, oldest first.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a stored date cannot be
/// parsed.
pub fn snapshot_dates(conn: &Connection) -> Result<Vec<NaiveDate>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT CAST(as_of AS VARCHAR) AS d FROM score_snapshots ORDER BY d",
    )?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    rows.map(|r| parse_date(&r?)).collect()
}

struct SnapshotRecord {
    area_id: String,
    area_name: String,
    as_of: String,
    scores: SubScores,
    total: f64,
}

impl SnapshotRecord {
    fn into_snapshot(self) -> Result<ScoreSnapshot, DbError> {
        Ok(ScoreSnapshot {
            as_of: parse_date(&self.as_of)?,
            area_id: self.area_id,
            area_name: self.area_name,
            scores: self.scores,
            total: self.total,
        })
    }
}

fn query_snapshots(
    conn: &Connection,
    sql: &str,
    values: Vec<Value>,
) -> Result<Vec<ScoreSnapshot>, DbError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(values), |row| {
        Ok(SnapshotRecord {
            area_id: row.get(0)?,
            area_name: row.get(1)?,
            as_of: row.get(2)?,
            scores: SubScores::new(
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
            ),
            total: row.get(8)?,
        })
    })?;

    rows.map(|r| r?.into_snapshot()).collect()
}

fn push_bbox_filter(bbox: &BoundingBox, frags: &mut Vec<String>, values: &mut Vec<Value>) {
    frags.push("a.west <= ? AND a.east >= ? AND a.south <= ? AND a.north >= ?".to_string());
    values.extend([
        Value::Double(bbox.east),
        Value::Double(bbox.west),
        Value::Double(bbox.north),
        Value::Double(bbox.south),
    ]);
}

fn where_clause(frags: &[String]) -> String {
    if frags.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", frags.join(" AND "))
    }
}

fn bounds_from(
    west: Option<f64>,
    south: Option<f64>,
    east: Option<f64>,
    north: Option<f64>,
) -> Option<BoundingBox> {
    Some(BoundingBox::new(west?, south?, east?, north?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_in_memory;

    fn area(id: &str, bounds: Option<BoundingBox>) -> Area {
        Area {
            id: id.to_string(),
            name: format!("Area {id}"),
            bounds,
        }
    }

    fn snapshot(area_id: &str, as_of: &str, growth: f64) -> ScoreSnapshot {
        ScoreSnapshot {
            area_id: area_id.to_string(),
            area_name: String::new(),
            as_of: parse_date(as_of).unwrap(),
            scores: SubScores::new(growth, 50.0, 50.0, 50.0, 50.0),
            total: 50.0,
        }
    }

    fn seeded() -> Connection {
        let conn = open_in_memory().unwrap();
        upsert_area(
            &conn,
            &area("plateau", Some(BoundingBox::new(-73.60, 45.51, -73.56, 45.54))),
        )
        .unwrap();
        upsert_area(
            &conn,
            &area("verdun", Some(BoundingBox::new(-73.60, 45.44, -73.54, 45.47))),
        )
        .unwrap();
        upsert_area(&conn, &area("anjou", None)).unwrap();

        for s in [
            snapshot("plateau", "2024-01-01", 60.0),
            snapshot("plateau", "2024-06-01", 70.0),
            snapshot("verdun", "2024-06-01", 55.0),
            snapshot("anjou", "2024-03-01", 40.0),
        ] {
            assert!(insert_snapshot(&conn, &s).unwrap());
        }
        conn
    }

    #[test]
    fn latest_snapshots_pick_newest_per_area() {
        let conn = seeded();
        let snapshots = latest_snapshots(&conn, &SnapshotQuery::default()).unwrap();
        let ids: Vec<&str> = snapshots.iter().map(|s| s.area_id.as_str()).collect();
        assert_eq!(ids, ["anjou", "plateau", "verdun"]);

        let plateau = &snapshots[1];
        assert_eq!(plateau.as_of, parse_date("2024-06-01").unwrap());
        assert!((plateau.scores.growth - 70.0).abs() < f64::EPSILON);
        assert_eq!(plateau.area_name, "Area plateau");
    }

    #[test]
    fn latest_snapshots_respect_as_of() {
        let conn = seeded();
        let query = SnapshotQuery {
            as_of: Some(parse_date("2024-02-01").unwrap()),
            ..SnapshotQuery::default()
        };
        let snapshots = latest_snapshots(&conn, &query).unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].area_id, "plateau");
        assert!((snapshots[0].scores.growth - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn latest_snapshots_filter_by_bbox() {
        let conn = seeded();
        let query = SnapshotQuery {
            bbox: Some(BoundingBox::new(-73.58, 45.50, -73.50, 45.60)),
            ..SnapshotQuery::default()
        };
        let snapshots = latest_snapshots(&conn, &query).unwrap();
        let ids: Vec<&str> = snapshots.iter().map(|s| s.area_id.as_str()).collect();
        assert_eq!(ids, ["plateau"]);
    }

    #[test]
    fn latest_snapshots_filter_by_area_ids() {
        let conn = seeded();
        let query = SnapshotQuery {
            area_ids: Some(vec![
                "verdun".to_string(),
                "plateau".to_string(),
                "nowhere".to_string(),
            ]),
            ..SnapshotQuery::default()
        };
        let snapshots = latest_snapshots(&conn, &query).unwrap();
        let ids: Vec<&str> = snapshots.iter().map(|s| s.area_id.as_str()).collect();
        assert_eq!(ids, ["plateau", "verdun"]);
        assert!((snapshots[0].scores.growth - 70.0).abs() < f64::EPSILON);

        let none = SnapshotQuery {
            area_ids: Some(Vec::new()),
            ..SnapshotQuery::default()
        };
        assert!(latest_snapshots(&conn, &none).unwrap().is_empty());
    }

    #[test]
    fn duplicate_snapshot_is_not_overwritten() {
        let conn = seeded();
        assert!(!insert_snapshot(&conn, &snapshot("verdun", "2024-06-01", 99.0)).unwrap());
        let stored = latest_snapshot(&conn, "verdun", None).unwrap().unwrap();
        assert!((stored.scores.growth - 55.0).abs() < f64::EPSILON);
    }

    #[test]
    fn latest_snapshot_for_unknown_area_is_none() {
        let conn = seeded();
        assert!(latest_snapshot(&conn, "nowhere", None).unwrap().is_none());
        assert!(
            latest_snapshot(&conn, "anjou", Some(parse_date("2024-01-01").unwrap()))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn snapshot_without_area_row_uses_id_as_name() {
        let conn = open_in_memory().unwrap();
        insert_snapshot(&conn, &snapshot("orphan", "2024-06-01", 10.0)).unwrap();
        let stored = latest_snapshot(&conn, "orphan", None).unwrap().unwrap();
        assert_eq!(stored.area_name, "orphan");
    }

    #[test]
    fn list_areas_with_and_without_bbox() {
        let conn = seeded();
        let all = list_areas(&conn, None).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().find(|a| a.id == "anjou").unwrap().bounds.is_none());

        let south = BoundingBox::new(-73.70, 45.40, -73.50, 45.48);
        let found = list_areas(&conn, Some(&south)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "verdun");
    }

    #[test]
    fn upsert_replaces_area_name() {
        let conn = seeded();
        upsert_area(
            &conn,
            &Area {
                id: "anjou".to_string(),
                name: "Anjou".to_string(),
                bounds: None,
            },
        )
        .unwrap();
        let areas = list_areas(&conn, None).unwrap();
        assert_eq!(areas[0].name, "Anjou");
    }

    #[test]
    fn snapshot_dates_are_distinct_and_sorted() {
        let conn = seeded();
        let dates = snapshot_dates(&conn).unwrap();
        assert_eq!(
            dates,
            vec![
                parse_date("2024-01-01").unwrap(),
                parse_date("2024-03-01").unwrap(),
                parse_date("2024-06-01").unwrap(),
            ]
        );
    }

    #[test]
    fn parse_date_rejects_garbage() {
        assert!(parse_date("2024-13-01").is_err());
        assert!(parse_date("yesterday").is_err());
    }
}
