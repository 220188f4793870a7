//! Forward-only schema migration framework.
//!
//! Tracks the schema version in `schema_meta` and runs sequential migrations
//! to bring the database up to [`CURRENT_SCHEMA_VERSION`]. Version 1 is the
//! baseline laid down by [`init_schema`](super::schema::init_schema); no
//! migrations are pending yet.

use rusqlite::Connection;

/// The schema version that the current binary expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

type Migration = fn(&Connection) -> rusqlite::Result<()>;

/// `(target version, step)` pairs in ascending order.
const MIGRATIONS: &[(u32, Migration)] = &[];

/// Get the current schema version from the database.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().unwrap_or(0))
        },
    )
}

fn update_schema_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE schema_meta SET value = ?1 WHERE key = 'schema_version'",
        [version.to_string()],
    )?;
    Ok(())
}

/// Run any pending forward-only migrations. Each step commits together with its
/// version bump.
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    run_steps(conn, MIGRATIONS)
}

fn run_steps(conn: &Connection, steps: &[(u32, Migration)]) -> rusqlite::Result<()> {
    let version = get_schema_version(conn)?;
    let latest = steps.last().map_or(CURRENT_SCHEMA_VERSION, |(v, _)| *v);
    tracing::debug!(schema_version = version, target = latest, "checking migrations");

    if version > latest {
        tracing::warn!(
            schema_version = version,
            expected = latest,
            "database was written by a newer chronicle; leaving schema as is"
        );
        return Ok(());
    }

    for (target, migrate) in steps.iter().filter(|(target, _)| *target > version) {
        tracing::info!(to = target, "running migration");
        conn.execute_batch("BEGIN")?;
        let applied = migrate(conn).and_then(|()| update_schema_version(conn, *target));
        match applied {
            Ok(()) => conn.execute_batch("COMMIT")?,
            Err(e) => {
                conn.execute_batch("ROLLBACK")?;
                return Err(e);
            }
        }
    }

    Ok(())
}
