//! Read-only aggregations over the telemetry tables.
//!
//! These functions are pure over the tables — they never write. They feed
//! `oracle_stats`, the dashboard routes, and the session-stats endpoint.

use anyhow::Result;
use chrono::{Duration, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::HashMap;

use crate::corpus::indexer;
use crate::db;
use crate::knowledge::browse::{concept_counts, ConceptCount};
use crate::knowledge::truncate_chars;

/// Rows returned per log table by [`activity`].
const ACTIVITY_CAP: usize = 20;

#[derive(Debug, Serialize)]
pub struct Summary {
    pub total_documents: u64,
    pub by_type: HashMap<String, u64>,
    pub total_concepts: u64,
    pub top_concepts: Vec<ConceptCount>,
    pub last_7_days: WeeklyActivity,
    pub fts_status: String,
    pub last_indexed: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WeeklyActivity {
    pub consultations: u64,
    pub searches: u64,
    pub learnings: u64,
}

/// Document totals, concept leaderboard, 7-day activity, and index health.
pub fn summary(conn: &Connection) -> Result<Summary> {
    let total_documents: i64 =
        conn.query_row("SELECT COUNT(*) FROM oracle_documents", [], |r| r.get(0))?;

    let mut by_type = HashMap::new();
    for t in ["principle", "learning", "pattern", "retro"] {
        by_type.insert(t.to_string(), 0u64);
    }
    let mut stmt = conn.prepare("SELECT type, COUNT(*) FROM oracle_documents GROUP BY type")?;
    let rows: Vec<(String, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    for (t, count) in rows {
        by_type.insert(t, count as u64);
    }

    let all_concepts = concept_counts(conn, None, usize::MAX)?;
    let total_concepts = all_concepts.len() as u64;
    let top_concepts = all_concepts.into_iter().take(10).collect();

    let week_ago = (Utc::now() - Duration::days(7)).to_rfc3339();
    let last_7_days = WeeklyActivity {
        consultations: count_since(conn, "consult_log", &week_ago)?,
        searches: count_since(conn, "search_log", &week_ago)?,
        learnings: count_since(conn, "learn_log", &week_ago)?,
    };

    let parity = db::check_parity(conn)?;
    let fts_status = if parity.is_ok() { "ok" } else { "degraded" }.to_string();
    let last_indexed = indexer::read_status(conn)
        .ok()
        .and_then(|s| s.completed_at);

    Ok(Summary {
        total_documents: total_documents as u64,
        by_type,
        total_concepts,
        top_concepts,
        last_7_days,
        fts_status,
        last_indexed,
    })
}

fn count_since(conn: &Connection, table: &str, since: &str) -> Result<u64> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {table} WHERE created_at > ?1"),
        params![since],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

#[derive(Debug, Serialize)]
pub struct ActivityEntry {
    pub kind: String,
    pub summary: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct Activity {
    pub consultations: Vec<ActivityEntry>,
    pub searches: Vec<ActivityEntry>,
    pub learnings: Vec<ActivityEntry>,
}

/// The most recent rows per log table within the last `days`, capped at 20
/// each, with truncated preview text.
pub fn activity(conn: &Connection, days: i64) -> Result<Activity> {
    let since = (Utc::now() - Duration::days(days.max(1))).to_rfc3339();

    let fetch = |sql: &str, kind: &str| -> Result<Vec<ActivityEntry>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![since, ACTIVITY_CAP as i64], |row| {
                let text: String = row.get(0)?;
                Ok(ActivityEntry {
                    kind: kind.to_string(),
                    summary: truncate_chars(&text, 100),
                    created_at: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    };

    Ok(Activity {
        consultations: fetch(
            "SELECT decision, created_at FROM consult_log WHERE created_at > ?1 \
             ORDER BY created_at DESC LIMIT ?2",
            "consult",
        )?,
        searches: fetch(
            "SELECT query, created_at FROM search_log WHERE created_at > ?1 \
             ORDER BY created_at DESC LIMIT ?2",
            "search",
        )?,
        learnings: fetch(
            "SELECT pattern_preview, created_at FROM learn_log WHERE created_at > ?1 \
             ORDER BY created_at DESC LIMIT ?2",
            "learn",
        )?,
    })
}

#[derive(Debug, Serialize)]
pub struct GrowthDay {
    pub day: String,
    pub documents: u64,
    pub consultations: u64,
    pub searches: u64,
}

/// Per-day counts of new documents, consultations, and searches over the
/// period (`week` = 7 days, `month` = 30, `quarter` = 90).
pub fn growth(conn: &Connection, period: &str) -> Result<Vec<GrowthDay>> {
    let days = match period {
        "week" => 7,
        "month" => 30,
        "quarter" => 90,
        other => anyhow::bail!("unknown growth period: {other}"),
    };
    let since = (Utc::now() - Duration::days(days)).to_rfc3339();

    let per_day = |table: &str, column: &str| -> Result<HashMap<String, u64>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT substr({column}, 1, 10) AS day, COUNT(*) FROM {table} \
             WHERE {column} > ?1 GROUP BY day"
        ))?;
        let rows: Vec<(String, i64)> = stmt
            .query_map(params![since], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().map(|(d, c)| (d, c as u64)).collect())
    };

    let documents = per_day("oracle_documents", "indexed_at")?;
    let consultations = per_day("consult_log", "created_at")?;
    let searches = per_day("search_log", "created_at")?;

    let mut day_keys: Vec<String> = documents
        .keys()
        .chain(consultations.keys())
        .chain(searches.keys())
        .cloned()
        .collect();
    day_keys.sort();
    day_keys.dedup();

    Ok(day_keys
        .into_iter()
        .map(|day| GrowthDay {
            documents: documents.get(&day).copied().unwrap_or(0),
            consultations: consultations.get(&day).copied().unwrap_or(0),
            searches: searches.get(&day).copied().unwrap_or(0),
            day,
        })
        .collect())
}

#[derive(Debug, Serialize)]
pub struct SessionStats {
    pub searches: u64,
    pub consultations: u64,
    pub learnings: u64,
}

/// Counts of activity rows created strictly after `since` (RFC3339).
pub fn session_stats(conn: &Connection, since: &str) -> Result<SessionStats> {
    Ok(SessionStats {
        searches: count_since(conn, "search_log", since)?,
        consultations: count_since(conn, "consult_log", since)?,
        learnings: count_since(conn, "learn_log", since)?,
    })
}
