//! Schema upgrades.
//!
//! The store keeps its schema version under the `schema_version` key in
//! `schema_meta`. On open, every entry in [`MIGRATIONS`] newer than the
//! stored version is applied in order and the version is bumped, so an old
//! database catches up one step at a time while a current one is left
//! untouched.

use rusqlite::Connection;

/// Version a freshly bootstrapped database is at once all migrations have
/// run. Bump together with each new [`MIGRATIONS`] entry.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Pending upgrades, keyed by the version they migrate *to*.
const MIGRATIONS: &[(u32, fn(&Connection) -> rusqlite::Result<()>)] =
    &[(2, add_project_columns)];

/// Read the stored schema version. The bootstrap DDL seeds it at 1; an
/// unparseable value counts as 0 so every migration re-runs.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let raw: String = conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| row.get(0),
    )?;
    Ok(raw.parse().unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE schema_meta SET value = ?1 WHERE key = 'schema_version'",
        [version.to_string()],
    )?;
    Ok(())
}

/// Apply every migration newer than the stored version, oldest first.
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    let current = get_schema_version(conn)?;
    for (target, migrate) in MIGRATIONS {
        if *target <= current {
            continue;
        }
        tracing::info!(from = current, to = *target, "upgrading store schema");
        migrate(conn)?;
        set_schema_version(conn, *target)?;
    }
    Ok(())
}

/// v2: the telemetry tables gain the `project` partition column. Databases
/// created by the current bootstrap DDL already carry it, so a "duplicate
/// column name" failure means there is nothing to do for that table.
fn add_project_columns(conn: &Connection) -> rusqlite::Result<()> {
    for table in ["search_log", "consult_log", "learn_log", "document_access"] {
        let sql = format!("ALTER TABLE {table} ADD COLUMN project TEXT");
        if let Err(e) = conn.execute(&sql, []) {
            if e.to_string().contains("duplicate column name") {
                continue;
            }
            return Err(e);
        }
    }
    Ok(())
}
