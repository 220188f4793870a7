//! Read side of the capture index that backs the local tool server.
//!
//! The capture daemons (out of process) append rows; the gateway reads them
//! through these functions. All functions are synchronous; callers in async
//! contexts go through `tokio::task::spawn_blocking`.

pub mod search;
pub mod stats;
pub mod types;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use types::{Capture, CaptureKind, NewCapture};

/// Canonical timestamp format stored in `captured_at`; sorts lexicographically.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn insert_capture(conn: &Connection, capture: &NewCapture) -> Result<i64> {
    conn.execute(
        "INSERT INTO captures (kind, captured_at, app, window_title, content)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            capture.kind.as_str(),
            format_timestamp(capture.captured_at),
            capture.app,
            capture.window_title,
            capture.content,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

const CAPTURE_COLUMNS: &str = "id, kind, captured_at, app, window_title, content";

fn capture_from_row(row: &Row<'_>) -> rusqlite::Result<Capture> {
    let kind: String = row.get(1)?;
    Ok(Capture {
        id: row.get(0)?,
        kind: kind.parse().unwrap_or(CaptureKind::Screen),
        captured_at: row.get(2)?,
        app: row.get(3)?,
        window_title: row.get(4)?,
        content: row.get(5)?,
    })
}

pub fn get_capture(conn: &Connection, id: i64) -> Result<Option<Capture>> {
    let capture = conn
        .query_row(
            &format!("SELECT {CAPTURE_COLUMNS} FROM captures WHERE id = ?1"),
            params![id],
            capture_from_row,
        )
        .optional()?;
    Ok(capture)
}

/// Captures at or after `since`, newest first.
pub fn recent_captures(conn: &Connection, since: DateTime<Utc>, limit: usize) -> Result<Vec<Capture>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CAPTURE_COLUMNS} FROM captures
         WHERE captured_at >= ?1
         ORDER BY captured_at DESC, id DESC
         LIMIT ?2"
    ))?;
    let rows = stmt
        .query_map(params![format_timestamp(since), limit as i64], capture_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Uniform random sample, optionally restricted to one kind.
pub fn sample_captures(
    conn: &Connection,
    max_samples: usize,
    kind: Option<CaptureKind>,
) -> Result<Vec<Capture>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CAPTURE_COLUMNS} FROM captures
         WHERE (?1 IS NULL OR kind = ?1)
         ORDER BY RANDOM()
         LIMIT ?2"
    ))?;
    let rows = stmt
        .query_map(
            params![kind.map(|k| k.as_str()), max_samples as i64],
            capture_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
