//! Trace — recorded discovery sessions forming a directed forest.
//!
//! Each trace captures the dig points of one session (files, commits,
//! issues, retros, learnings, resonance). Children link to parents via
//! `parent_trace_id`; parents track children redundantly in
//! `child_trace_ids`, updated in the same transaction that creates the
//! child. Distilling a trace attaches an awakening and can promote it into a
//! learning.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

use crate::error::OracleError;
use crate::knowledge::learn::{learn, LearnRequest};
use crate::knowledge::types::TraceStatus;

/// The evidence arrays captured during a discovery session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DigPoints {
    pub files: Vec<String>,
    pub commits: Vec<String>,
    pub issues: Vec<String>,
    pub retros: Vec<String>,
    pub learnings: Vec<String>,
    pub resonance: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TraceCreate {
    pub query: String,
    pub query_type: Option<String>,
    pub dig: DigPoints,
    pub parent_trace_id: Option<String>,
}

/// A full trace row with JSON arrays parsed.
#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    pub trace_id: String,
    pub query: String,
    pub query_type: Option<String>,
    #[serde(flatten)]
    pub dig: DigPoints,
    pub file_count: usize,
    pub commit_count: usize,
    pub issue_count: usize,
    pub depth: i64,
    pub parent_trace_id: Option<String>,
    pub child_trace_ids: Vec<String>,
    pub status: String,
    pub awakening: Option<String>,
    pub distilled_to_id: Option<String>,
    pub distilled_at: Option<String>,
    pub created_at: String,
}

/// Summary projection used by list().
#[derive(Debug, Serialize)]
pub struct TraceSummary {
    pub trace_id: String,
    pub query: String,
    pub query_type: Option<String>,
    pub depth: i64,
    pub status: String,
    pub has_awakening: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainDirection {
    Up,
    Down,
    Both,
}

impl std::str::FromStr for ChainDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "both" => Ok(Self::Both),
            _ => Err(format!("unknown chain direction: {s}")),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChainResponse {
    pub traces: Vec<Trace>,
    pub total_depth: usize,
    pub has_awakening: bool,
    pub awakening_trace_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DistillOutcome {
    pub trace: Trace,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_id: Option<String>,
}

/// Create a trace. A child's depth is `parent.depth + 1`; the parent's
/// `child_trace_ids` is appended in the same transaction.
pub fn create(conn: &mut Connection, input: &TraceCreate) -> Result<Trace, OracleError> {
    let query = input.query.trim();
    if query.is_empty() {
        return Err(OracleError::Validation("query is required".into()));
    }

    let trace_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    let tx = conn.transaction().map_err(anyhow::Error::from)?;

    let depth = match input.parent_trace_id.as_deref() {
        Some(parent_id) => {
            let parent: Option<(i64, String)> = tx
                .query_row(
                    "SELECT depth, child_trace_ids FROM trace_log WHERE trace_id = ?1",
                    params![parent_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((parent_depth, children_json)) = parent else {
                return Err(OracleError::NotFound(format!(
                    "parent trace not found: {parent_id}"
                )));
            };

            let mut children: Vec<String> =
                serde_json::from_str(&children_json).unwrap_or_default();
            children.push(trace_id.clone());
            tx.execute(
                "UPDATE trace_log SET child_trace_ids = ?1 WHERE trace_id = ?2",
                params![serde_json::to_string(&children)?, parent_id],
            )?;

            parent_depth + 1
        }
        None => 0,
    };

    tx.execute(
        "INSERT INTO trace_log \
         (trace_id, query, query_type, files, commits, issues, retros, learnings, resonance, \
          file_count, commit_count, issue_count, depth, parent_trace_id, child_trace_ids, \
          status, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, '[]', 'raw', ?15)",
        params![
            trace_id,
            query,
            input.query_type,
            serde_json::to_string(&input.dig.files)?,
            serde_json::to_string(&input.dig.commits)?,
            serde_json::to_string(&input.dig.issues)?,
            serde_json::to_string(&input.dig.retros)?,
            serde_json::to_string(&input.dig.learnings)?,
            serde_json::to_string(&input.dig.resonance)?,
            input.dig.files.len() as i64,
            input.dig.commits.len() as i64,
            input.dig.issues.len() as i64,
            depth,
            input.parent_trace_id,
            now,
        ],
    )?;

    tx.commit().map_err(anyhow::Error::from)?;
    get(conn, &trace_id)
}

/// Fetch one trace with JSON arrays parsed.
pub fn get(conn: &Connection, trace_id: &str) -> Result<Trace, OracleError> {
    let trace = conn
        .query_row(
            "SELECT trace_id, query, query_type, files, commits, issues, retros, learnings, \
             resonance, file_count, commit_count, issue_count, depth, parent_trace_id, \
             child_trace_ids, status, awakening, distilled_to_id, distilled_at, created_at \
             FROM trace_log WHERE trace_id = ?1",
            params![trace_id],
            row_to_trace,
        )
        .optional()?;

    trace.ok_or_else(|| OracleError::NotFound(format!("trace not found: {trace_id}")))
}

fn row_to_trace(row: &rusqlite::Row<'_>) -> rusqlite::Result<Trace> {
    let parse = |json: String| -> Vec<String> { serde_json::from_str(&json).unwrap_or_default() };
    Ok(Trace {
        trace_id: row.get(0)?,
        query: row.get(1)?,
        query_type: row.get(2)?,
        dig: DigPoints {
            files: parse(row.get(3)?),
            commits: parse(row.get(4)?),
            issues: parse(row.get(5)?),
            retros: parse(row.get(6)?),
            learnings: parse(row.get(7)?),
            resonance: parse(row.get(8)?),
        },
        file_count: row.get::<_, i64>(9)? as usize,
        commit_count: row.get::<_, i64>(10)? as usize,
        issue_count: row.get::<_, i64>(11)? as usize,
        depth: row.get(12)?,
        parent_trace_id: row.get(13)?,
        child_trace_ids: parse(row.get(14)?),
        status: row.get(15)?,
        awakening: row.get(16)?,
        distilled_to_id: row.get(17)?,
        distilled_at: row.get(18)?,
        created_at: row.get(19)?,
    })
}

/// Summary listing ordered by `created_at DESC`.
pub fn list(
    conn: &Connection,
    status: Option<TraceStatus>,
    limit: usize,
    offset: usize,
) -> Result<Vec<TraceSummary>, OracleError> {
    let mut sql = String::from(
        "SELECT trace_id, query, query_type, depth, status, awakening, created_at FROM trace_log",
    );
    if status.is_some() {
        sql.push_str(" WHERE status = ?1 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3");
    } else {
        sql.push_str(" ORDER BY created_at DESC LIMIT ?1 OFFSET ?2");
    }

    let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<TraceSummary> {
        let awakening: Option<String> = row.get(5)?;
        Ok(TraceSummary {
            trace_id: row.get(0)?,
            query: row.get(1)?,
            query_type: row.get(2)?,
            depth: row.get(3)?,
            status: row.get(4)?,
            has_awakening: awakening.is_some(),
            created_at: row.get(6)?,
        })
    };

    let mut stmt = conn.prepare(&sql)?;
    let summaries = match status {
        Some(s) => stmt
            .query_map(params![s.as_str(), limit as i64, offset as i64], map_row)?
            .collect::<Result<Vec<_>, _>>()?,
        None => stmt
            .query_map(params![limit as i64, offset as i64], map_row)?
            .collect::<Result<Vec<_>, _>>()?,
    };
    Ok(summaries)
}

/// Walk the parent/child chain from a trace.
///
/// `up` follows parent links to the root; `down` BFS-walks
/// `child_trace_ids`; `both` concatenates ancestors (root first), the trace
/// itself, and descendants.
pub fn chain(
    conn: &Connection,
    trace_id: &str,
    direction: ChainDirection,
) -> Result<ChainResponse, OracleError> {
    let start = get(conn, trace_id)?;

    let mut traces: Vec<Trace> = Vec::new();
    match direction {
        ChainDirection::Up => {
            traces.push(start);
            walk_up(conn, &mut traces)?;
        }
        ChainDirection::Down => {
            traces.push(start);
            walk_down(conn, &mut traces)?;
        }
        ChainDirection::Both => {
            let mut ancestors = vec![start.clone()];
            walk_up(conn, &mut ancestors)?;
            ancestors.reverse(); // root first, self last
            ancestors.pop();

            let mut descendants = vec![start];
            walk_down(conn, &mut descendants)?;

            traces = ancestors;
            traces.extend(descendants);
        }
    }

    let awakening_trace = traces.iter().find(|t| t.awakening.is_some());
    Ok(ChainResponse {
        total_depth: traces.len(),
        has_awakening: awakening_trace.is_some(),
        awakening_trace_id: awakening_trace.map(|t| t.trace_id.clone()),
        traces,
    })
}

/// Follow parent links transitively; the visited guard makes a corrupted
/// cycle terminate instead of spinning.
fn walk_up(conn: &Connection, traces: &mut Vec<Trace>) -> Result<(), OracleError> {
    let mut visited: HashSet<String> = traces.iter().map(|t| t.trace_id.clone()).collect();
    while let Some(parent_id) = traces
        .last()
        .and_then(|t| t.parent_trace_id.clone())
    {
        if !visited.insert(parent_id.clone()) {
            break;
        }
        traces.push(get(conn, &parent_id)?);
    }
    Ok(())
}

/// BFS over `child_trace_ids`.
fn walk_down(conn: &Connection, traces: &mut Vec<Trace>) -> Result<(), OracleError> {
    let mut visited: HashSet<String> = traces.iter().map(|t| t.trace_id.clone()).collect();
    let mut queue: Vec<String> = traces
        .iter()
        .flat_map(|t| t.child_trace_ids.clone())
        .collect();

    while let Some(child_id) = queue.first().cloned() {
        queue.remove(0);
        if !visited.insert(child_id.clone()) {
            continue;
        }
        let child = get(conn, &child_id)?;
        queue.extend(child.child_trace_ids.clone());
        traces.push(child);
    }
    Ok(())
}

/// Distill a trace: set its awakening and optionally promote it into a new
/// learning whose pattern is the awakening text.
pub fn distill(
    conn: &mut Connection,
    learnings_dir: &Path,
    trace_id: &str,
    awakening: &str,
    promote_to_learning: bool,
) -> Result<DistillOutcome, OracleError> {
    let awakening = awakening.trim();
    if awakening.is_empty() {
        return Err(OracleError::Validation("awakening is required".into()));
    }
    // Existence check up front so a missing trace is a 404, not a no-op.
    get(conn, trace_id)?;

    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE trace_log SET status = 'distilled', awakening = ?1, distilled_at = ?2 \
         WHERE trace_id = ?3",
        params![awakening, now, trace_id],
    )?;

    let learning_id = if promote_to_learning {
        let outcome = learn(
            conn,
            learnings_dir,
            &LearnRequest {
                pattern: awakening.to_string(),
                source: Some(format!("trace:{trace_id}")),
                concepts: Vec::new(),
                origin: None,
                project: None,
            },
        )?;

        conn.execute(
            "UPDATE trace_log SET distilled_to_id = ?1 WHERE trace_id = ?2",
            params![outcome.id, trace_id],
        )?;
        Some(outcome.id)
    } else {
        None
    };

    Ok(DistillOutcome {
        trace: get(conn, trace_id)?,
        learning_id,
    })
}
