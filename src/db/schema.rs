//! SQL DDL for the capture index.
//!
//! Defines `captures` (one row per OCR'd screenshot or transcribed audio chunk),
//! its `captures_fts` FTS5 shadow index kept in sync by triggers on every write,
//! and `schema_meta`. All DDL uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS captures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL CHECK(kind IN ('screen','audio')),
    captured_at TEXT NOT NULL,
    app TEXT,
    window_title TEXT,
    content TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_captures_kind ON captures(kind);
CREATE INDEX IF NOT EXISTS idx_captures_time ON captures(captured_at);
CREATE INDEX IF NOT EXISTS idx_captures_app_time ON captures(app, captured_at);

CREATE VIRTUAL TABLE IF NOT EXISTS captures_fts USING fts5(
    content,
    window_title,
    content='captures',
    content_rowid='id'
);

CREATE TRIGGER IF NOT EXISTS captures_ai AFTER INSERT ON captures BEGIN
    INSERT INTO captures_fts(rowid, content, window_title)
    VALUES (new.id, new.content, new.window_title);
END;

CREATE TRIGGER IF NOT EXISTS captures_ad AFTER DELETE ON captures BEGIN
    INSERT INTO captures_fts(captures_fts, rowid, content, window_title)
    VALUES ('delete', old.id, old.content, old.window_title);
END;

CREATE TRIGGER IF NOT EXISTS captures_au AFTER UPDATE ON captures BEGIN
    INSERT INTO captures_fts(captures_fts, rowid, content, window_title)
    VALUES ('delete', old.id, old.content, old.window_title);
    INSERT INTO captures_fts(rowid, content, window_title)
    VALUES (new.id, new.content, new.window_title);
END;

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
