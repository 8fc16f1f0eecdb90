pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

/// Open (or create) the Oracle database at the given path, with schema
/// initialized and migrations applied.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let conn = Connection::open(path).with_context(|| {
        format!(
            "failed to open database at {}. If the file is corrupt, \
             restore from a backup or delete it and run `oracle index` to rebuild.",
            path.display()
        )
    })?;

    // Enable WAL mode for better concurrent read performance
    conn.pragma_update(None, "journal_mode", "WAL")?;
    // Enable foreign keys
    conn.pragma_update(None, "foreign_keys", "ON")?;
    // Wait up to 5 seconds for locks instead of failing immediately
    conn.pragma_update(None, "busy_timeout", "5000")?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;

    // Quick integrity check after schema init — corruption is fatal at startup.
    let integrity: String = conn.pragma_query_value(None, "quick_check", |row| row.get(0))?;
    if integrity != "ok" {
        anyhow::bail!(
            "database integrity check failed: {integrity}. \
             Restore from a backup, or delete {} and re-run `oracle index`.",
            path.display()
        );
    }

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open an in-memory database with the full schema, for tests.
pub fn open_memory_database() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;
    Ok(conn)
}

/// Row-count parity report between the metadata table and the FTS index.
pub struct ParityReport {
    pub document_count: i64,
    pub fts_count: i64,
}

impl ParityReport {
    pub fn is_ok(&self) -> bool {
        self.document_count == self.fts_count
    }
}

/// Compare `oracle_documents` and `oracle_fts` row counts. Used by the stats
/// surface to report `fts_status`.
pub fn check_parity(conn: &Connection) -> Result<ParityReport> {
    let document_count: i64 =
        conn.query_row("SELECT COUNT(*) FROM oracle_documents", [], |row| row.get(0))?;
    let fts_count: i64 = conn.query_row("SELECT COUNT(*) FROM oracle_fts", [], |row| row.get(0))?;
    Ok(ParityReport {
        document_count,
        fts_count,
    })
}
