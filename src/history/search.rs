//! FTS5 keyword search over capture text.

use anyhow::Result;
use rusqlite::{params, Connection};

use super::types::{CaptureKind, SearchHit};

/// Turn free text into an FTS5 query: every whitespace token becomes a quoted
/// phrase, so operators and punctuation in user input are matched literally.
pub fn to_fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

/// Best-ranked captures of `kind` whose text matches every term in `query`.
pub fn search_captures(
    conn: &Connection,
    kind: CaptureKind,
    query: &str,
    limit: usize,
    app: Option<&str>,
) -> Result<Vec<SearchHit>> {
    let Some(fts_query) = to_fts_query(query) else {
        return Ok(Vec::new());
    };

    let mut stmt = conn.prepare(
        "SELECT c.id, c.captured_at, c.app, c.window_title,
                snippet(captures_fts, 0, '[', ']', '...', 16),
                bm25(captures_fts)
         FROM captures_fts
         JOIN captures c ON c.id = captures_fts.rowid
         WHERE captures_fts MATCH ?1
           AND c.kind = ?2
           AND (?3 IS NULL OR c.app = ?3)
         ORDER BY bm25(captures_fts)
         LIMIT ?4",
    )?;

    let hits = stmt
        .query_map(
            params![fts_query, kind.as_str(), app, limit as i64],
            |row| {
                Ok(SearchHit {
                    id: row.get(0)?,
                    kind,
                    captured_at: row.get(1)?,
                    app: row.get(2)?,
                    window_title: row.get(3)?,
                    snippet: row.get(4)?,
                    score: row.get(5)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(kind = %kind, hits = hits.len(), "capture search");
    Ok(hits)
}
