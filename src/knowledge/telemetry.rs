//! Fire-and-forget telemetry writers.
//!
//! Every function here swallows its own failures: a telemetry miss is logged
//! to stderr with a stable prefix and never propagates into the user-visible
//! call. Callers invoke these *after* the response has been produced.

use chrono::Utc;
use rusqlite::{params, Connection};

const LOG_PREFIX: &str = "telemetry write failed";

/// One row per search call.
pub fn log_search(
    conn: &Connection,
    query: &str,
    type_label: &str,
    mode: &str,
    results_count: usize,
    search_time_ms: u128,
    project: Option<&str>,
) {
    let now = Utc::now().to_rfc3339();
    let result = conn.execute(
        "INSERT INTO search_log (query, type, mode, results_count, search_time_ms, project, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            query,
            type_label,
            mode,
            results_count as i64,
            search_time_ms as i64,
            project,
            now,
        ],
    );
    if let Err(e) = result {
        tracing::warn!(error = %e, "{LOG_PREFIX}: search_log");
    }
}

/// One row per returned document id.
pub fn log_access(conn: &Connection, ids: &[String], access_type: &str, project: Option<&str>) {
    let now = Utc::now().to_rfc3339();
    for id in ids {
        let result = conn.execute(
            "INSERT INTO document_access (document_id, access_type, project, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![id, access_type, project, now],
        );
        if let Err(e) = result {
            tracing::warn!(error = %e, "{LOG_PREFIX}: document_access");
            break;
        }
    }
}

/// One row per consultation.
pub fn log_consult(
    conn: &Connection,
    decision: &str,
    context: Option<&str>,
    principles_found: usize,
    patterns_found: usize,
    guidance: &str,
    project: Option<&str>,
) {
    let now = Utc::now().to_rfc3339();
    let result = conn.execute(
        "INSERT INTO consult_log (decision, context, principles_found, patterns_found, guidance, project, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            decision,
            context,
            principles_found as i64,
            patterns_found as i64,
            guidance,
            project,
            now,
        ],
    );
    if let Err(e) = result {
        tracing::warn!(error = %e, "{LOG_PREFIX}: consult_log");
    }
}

/// One row per learned pattern.
pub fn log_learn(
    conn: &Connection,
    document_id: &str,
    pattern: &str,
    source: Option<&str>,
    concepts: &[String],
    project: Option<&str>,
) {
    let now = Utc::now().to_rfc3339();
    let preview: String = pattern.chars().take(100).collect();
    let result = conn.execute(
        "INSERT INTO learn_log (document_id, pattern_preview, source, concepts, project, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            document_id,
            preview,
            source,
            concepts.join(","),
            project,
            now,
        ],
    );
    if let Err(e) = result {
        tracing::warn!(error = %e, "{LOG_PREFIX}: learn_log");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn search_log_row_is_written() {
        let conn = db::open_memory_database().unwrap();
        log_search(&conn, "git safety", "all", "hybrid", 3, 12, Some("volt"));

        let (query, mode, count): (String, String, i64) = conn
            .query_row(
                "SELECT query, mode, results_count FROM search_log",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(query, "git safety");
        assert_eq!(mode, "hybrid");
        assert_eq!(count, 3);
    }

    #[test]
    fn access_rows_one_per_id() {
        let conn = db::open_memory_database().unwrap();
        log_access(
            &conn,
            &["a".to_string(), "b".to_string()],
            "search",
            None,
        );

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM document_access", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn learn_preview_is_truncated_to_100_chars() {
        let conn = db::open_memory_database().unwrap();
        let long = "x".repeat(300);
        log_learn(&conn, "learning_x", &long, None, &[], None);

        let preview: String = conn
            .query_row("SELECT pattern_preview FROM learn_log", [], |row| row.get(0))
            .unwrap();
        assert_eq!(preview.len(), 100);
    }
}
