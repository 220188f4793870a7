use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use super::format_timestamp;
use super::types::ActivityBucket;

/// Response from `get-stats`.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_captures: u64,
    pub by_kind: HashMap<String, u64>,
    pub distinct_apps: u64,
    pub db_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_capture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_capture: Option<String>,
}

/// Compute capture index statistics. `db_path` is used for the file size;
/// pass `None` for in-memory databases.
pub fn capture_stats(conn: &Connection, db_path: Option<&Path>) -> Result<StatsResponse> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM captures", [], |row| row.get(0))?;

    let mut by_kind = HashMap::new();
    for k in &["screen", "audio"] {
        by_kind.insert(k.to_string(), 0);
    }
    let mut stmt = conn.prepare("SELECT kind, COUNT(*) FROM captures GROUP BY kind")?;
    let rows: Vec<(String, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    for (kind, count) in rows {
        by_kind.insert(kind, count as u64);
    }

    let distinct_apps: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT app) FROM captures WHERE app IS NOT NULL",
        [],
        |row| row.get(0),
    )?;

    let (first, last): (Option<String>, Option<String>) = conn.query_row(
        "SELECT MIN(captured_at), MAX(captured_at) FROM captures",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let db_size_bytes = db_path
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(StatsResponse {
        total_captures: total as u64,
        by_kind,
        distinct_apps: distinct_apps as u64,
        db_size_bytes,
        first_capture: first,
        last_capture: last,
    })
}

/// Per-hour, per-app capture counts since `since`, oldest hour first.
pub fn activity_graph(conn: &Connection, since: DateTime<Utc>) -> Result<Vec<ActivityBucket>> {
    let mut stmt = conn.prepare(
        "SELECT substr(captured_at, 1, 13) AS hour, COALESCE(app, 'unknown'), COUNT(*)
         FROM captures
         WHERE captured_at >= ?1
         GROUP BY hour, COALESCE(app, 'unknown')
         ORDER BY hour ASC, COUNT(*) DESC",
    )?;
    let buckets = stmt
        .query_map(params![format_timestamp(since)], |row| {
            Ok(ActivityBucket {
                hour: row.get(0)?,
                app: row.get(1)?,
                captures: row.get::<_, i64>(2)? as u64,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(buckets)
}
