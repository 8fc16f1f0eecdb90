//! Decision records with a typed status lifecycle.
//!
//! Decisions append to the `decisions` table and move through a fixed
//! transition graph. Entering `decided` stamps `decided_at` and
//! `decided_by`; `closed` is terminal.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

use crate::error::OracleError;
use crate::knowledge::types::DecisionStatus;

#[derive(Debug, Clone, Default)]
pub struct DecisionCreate {
    pub title: String,
    pub context: Option<String>,
    pub options: Vec<String>,
    pub project: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DecisionUpdate {
    pub title: Option<String>,
    pub context: Option<String>,
    pub options: Option<Vec<String>>,
    pub decision: Option<String>,
    pub rationale: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub id: String,
    pub title: String,
    pub status: String,
    pub context: Option<String>,
    pub options: Vec<String>,
    pub decision: Option<String>,
    pub rationale: Option<String>,
    pub project: Option<String>,
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
    pub decided_at: Option<String>,
    pub decided_by: Option<String>,
}

/// Legal edges of the status graph.
fn is_legal_transition(from: DecisionStatus, to: DecisionStatus) -> bool {
    use DecisionStatus::*;
    matches!(
        (from, to),
        (Pending, Parked | Researching | Decided | Closed)
            | (Parked, Pending | Researching | Decided | Closed)
            | (Researching, Pending | Parked | Decided | Closed)
            | (Decided, Implemented | Closed)
            | (Implemented, Closed)
    )
}

pub fn create(conn: &Connection, input: &DecisionCreate) -> Result<Decision, OracleError> {
    let title = input.title.trim();
    if title.is_empty() {
        return Err(OracleError::Validation("title is required".into()));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO decisions (id, title, status, context, options, project, tags, created_at, updated_at) \
         VALUES (?1, ?2, 'pending', ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            id,
            title,
            input.context,
            serde_json::to_string(&input.options)?,
            input.project,
            serde_json::to_string(&input.tags)?,
            now,
        ],
    )?;

    get(conn, &id)
}

pub fn get(conn: &Connection, id: &str) -> Result<Decision, OracleError> {
    let decision = conn
        .query_row(
            "SELECT id, title, status, context, options, decision, rationale, project, tags, \
             created_at, updated_at, decided_at, decided_by FROM decisions WHERE id = ?1",
            params![id],
            row_to_decision,
        )
        .optional()?;
    decision.ok_or_else(|| OracleError::NotFound(format!("decision not found: {id}")))
}

fn row_to_decision(row: &rusqlite::Row<'_>) -> rusqlite::Result<Decision> {
    let options_json: String = row.get(4)?;
    let tags_json: String = row.get(8)?;
    Ok(Decision {
        id: row.get(0)?,
        title: row.get(1)?,
        status: row.get(2)?,
        context: row.get(3)?,
        options: serde_json::from_str(&options_json).unwrap_or_default(),
        decision: row.get(5)?,
        rationale: row.get(6)?,
        project: row.get(7)?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        decided_at: row.get(11)?,
        decided_by: row.get(12)?,
    })
}

pub fn list(
    conn: &Connection,
    status: Option<DecisionStatus>,
    project: Option<&str>,
    limit: usize,
    offset: usize,
) -> Result<Vec<Decision>, OracleError> {
    let mut sql = String::from(
        "SELECT id, title, status, context, options, decision, rationale, project, tags, \
         created_at, updated_at, decided_at, decided_by FROM decisions WHERE 1=1",
    );
    let mut bound: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
    if let Some(s) = status {
        sql.push_str(" AND status = ?");
        bound.push(Box::new(s.as_str().to_string()));
    }
    if let Some(p) = project {
        sql.push_str(" AND project = ?");
        bound.push(Box::new(p.to_string()));
    }
    sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");
    bound.push(Box::new(limit as i64));
    bound.push(Box::new(offset as i64));

    let mut stmt = conn.prepare(&sql)?;
    let decisions = stmt
        .query_map(
            rusqlite::params_from_iter(bound.iter().map(|b| b.as_ref())),
            row_to_decision,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(decisions)
}

/// Update mutable fields. Status changes go through [`transition_status`].
pub fn update(conn: &Connection, id: &str, changes: &DecisionUpdate) -> Result<Decision, OracleError> {
    let existing = get(conn, id)?;
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "UPDATE decisions SET title = ?1, context = ?2, options = ?3, decision = ?4, \
         rationale = ?5, tags = ?6, updated_at = ?7 WHERE id = ?8",
        params![
            changes.title.as_deref().unwrap_or(&existing.title),
            changes.context.as_deref().or(existing.context.as_deref()),
            serde_json::to_string(changes.options.as_ref().unwrap_or(&existing.options))?,
            changes.decision.as_deref().or(existing.decision.as_deref()),
            changes.rationale.as_deref().or(existing.rationale.as_deref()),
            serde_json::to_string(changes.tags.as_ref().unwrap_or(&existing.tags))?,
            now,
            id,
        ],
    )?;

    get(conn, id)
}

/// Move a decision along the status graph. Illegal edges are conflicts.
pub fn transition_status(
    conn: &Connection,
    id: &str,
    new_status: DecisionStatus,
    decided_by: Option<&str>,
) -> Result<Decision, OracleError> {
    let existing = get(conn, id)?;
    let current: DecisionStatus = existing
        .status
        .parse()
        .map_err(|e: String| OracleError::Internal(anyhow::anyhow!(e)))?;

    if !is_legal_transition(current, new_status) {
        return Err(OracleError::Conflict(format!(
            "illegal status transition: {current} -> {new_status}"
        )));
    }

    let now = Utc::now().to_rfc3339();
    if new_status == DecisionStatus::Decided {
        conn.execute(
            "UPDATE decisions SET status = ?1, decided_at = ?2, decided_by = ?3, updated_at = ?2 \
             WHERE id = ?4",
            params![new_status.as_str(), now, decided_by, id],
        )?;
    } else {
        conn.execute(
            "UPDATE decisions SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![new_status.as_str(), now, id],
        )?;
    }

    get(conn, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn new_decision(conn: &Connection, title: &str) -> Decision {
        create(
            conn,
            &DecisionCreate {
                title: title.into(),
                context: Some("context".into()),
                options: vec!["a".into(), "b".into()],
                project: None,
                tags: vec!["infra".into()],
            },
        )
        .unwrap()
    }

    #[test]
    fn create_starts_pending_with_json_fields() {
        let conn = db::open_memory_database().unwrap();
        let d = new_decision(&conn, "pick a database");
        assert_eq!(d.status, "pending");
        assert_eq!(d.options, vec!["a", "b"]);
        assert_eq!(d.tags, vec!["infra"]);
        assert!(d.decided_at.is_none());
    }

    #[test]
    fn legal_transition_to_decided_stamps_fields() {
        let conn = db::open_memory_database().unwrap();
        let d = new_decision(&conn, "pick a database");

        let decided =
            transition_status(&conn, &d.id, DecisionStatus::Decided, Some("kyle")).unwrap();
        assert_eq!(decided.status, "decided");
        assert!(decided.decided_at.is_some());
        assert_eq!(decided.decided_by.as_deref(), Some("kyle"));

        // Read-back shows the persisted status
        assert_eq!(get(&conn, &d.id).unwrap().status, "decided");
    }

    #[test]
    fn closed_is_terminal() {
        let conn = db::open_memory_database().unwrap();
        let d = new_decision(&conn, "pick a queue");
        transition_status(&conn, &d.id, DecisionStatus::Closed, None).unwrap();

        let err = transition_status(&conn, &d.id, DecisionStatus::Pending, None).unwrap_err();
        assert!(matches!(err, OracleError::Conflict(_)));
    }

    #[test]
    fn decided_cannot_return_to_pending() {
        let conn = db::open_memory_database().unwrap();
        let d = new_decision(&conn, "pick a cache");
        transition_status(&conn, &d.id, DecisionStatus::Decided, None).unwrap();
        assert!(transition_status(&conn, &d.id, DecisionStatus::Pending, None).is_err());
        // decided → implemented → closed is the legal tail
        transition_status(&conn, &d.id, DecisionStatus::Implemented, None).unwrap();
        transition_status(&conn, &d.id, DecisionStatus::Closed, None).unwrap();
    }

    #[test]
    fn update_preserves_unset_fields() {
        let conn = db::open_memory_database().unwrap();
        let d = new_decision(&conn, "original title");

        let updated = update(
            &conn,
            &d.id,
            &DecisionUpdate {
                rationale: Some("because latency".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(updated.title, "original title");
        assert_eq!(updated.rationale.as_deref(), Some("because latency"));
        assert_eq!(updated.options, vec!["a", "b"]);
    }

    #[test]
    fn list_filters_by_status_and_project() {
        let conn = db::open_memory_database().unwrap();
        let d1 = new_decision(&conn, "one");
        let _d2 = new_decision(&conn, "two");
        transition_status(&conn, &d1.id, DecisionStatus::Researching, None).unwrap();

        let researching = list(&conn, Some(DecisionStatus::Researching), None, 10, 0).unwrap();
        assert_eq!(researching.len(), 1);
        assert_eq!(researching[0].id, d1.id);
    }

    #[test]
    fn missing_decision_is_not_found() {
        let conn = db::open_memory_database().unwrap();
        assert!(matches!(get(&conn, "ghost"), Err(OracleError::NotFound(_))));
    }
}
