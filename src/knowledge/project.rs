//! Project resolution and filter semantics.
//!
//! A project is a partition tag. Documents with no project are "universal"
//! and visible under every project filter; searching with an explicit empty
//! project restricts to universal rows only.

use anyhow::Result;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;

/// How a query is scoped to projects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectScope {
    /// No filtering at all (nothing was passed and no cwd detection matched).
    All,
    /// Only universal rows (`project IS NULL`).
    Universal,
    /// Rows tagged with this project, plus universal rows.
    Tagged(String),
}

impl ProjectScope {
    /// SQL fragment for `column`, plus the bound parameter if any. The
    /// fragment always starts with ` AND ` or is empty.
    pub fn filter_sql(&self, column: &str) -> (String, Option<String>) {
        match self {
            Self::All => (String::new(), None),
            Self::Universal => (format!(" AND {column} IS NULL"), None),
            Self::Tagged(p) => (
                format!(" AND ({column} = ? OR {column} IS NULL)"),
                Some(p.clone()),
            ),
        }
    }

    /// In-memory equivalent of [`filter_sql`], for rows fetched from the
    /// vector backend.
    pub fn matches(&self, project: Option<&str>) -> bool {
        match self {
            Self::All => true,
            Self::Universal => project.is_none(),
            Self::Tagged(p) => project.is_none() || project == Some(p.as_str()),
        }
    }

    /// The tag recorded on telemetry rows for this scope.
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::Tagged(p) => Some(p.as_str()),
            _ => None,
        }
    }
}

/// A configured project.
#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Resolve the effective scope for a request.
///
/// An explicitly passed project wins (empty string means "universal only").
/// Otherwise, a supplied `cwd` is walked upward to detect a repository root
/// and map it to a configured project. With neither, no filter applies.
pub fn resolve(conn: &Connection, project: Option<&str>, cwd: Option<&str>) -> ProjectScope {
    match project {
        Some(p) if p.trim().is_empty() => ProjectScope::Universal,
        Some(p) => ProjectScope::Tagged(p.trim().to_string()),
        None => match cwd {
            Some(dir) => detect_from_cwd(conn, Path::new(dir)),
            None => ProjectScope::All,
        },
    }
}

/// Walk up from `cwd` until a `.git` or `ψ/` directory marks a repository
/// root, then map that root to a configured project slug: first by a
/// registered ghq-style `path` suffix, then by directory name. No match
/// leaves the query unfiltered.
fn detect_from_cwd(conn: &Connection, cwd: &Path) -> ProjectScope {
    let mut dir = Some(cwd);
    let root = loop {
        let Some(d) = dir else { return ProjectScope::All };
        if d.join(".git").is_dir() || d.join("ψ").is_dir() {
            break d;
        }
        dir = d.parent();
    };

    let projects = match list(conn) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "project lookup failed during cwd detection");
            return ProjectScope::All;
        }
    };

    let root_str = root.to_string_lossy();
    for project in &projects {
        if let Some(path) = &project.path {
            if !path.is_empty() && root_str.ends_with(path.as_str()) {
                return ProjectScope::Tagged(project.id.clone());
            }
        }
    }
    if let Some(name) = root.file_name().map(|n| n.to_string_lossy()) {
        for project in &projects {
            if project.id == name {
                return ProjectScope::Tagged(project.id.clone());
            }
        }
    }
    ProjectScope::All
}

/// List all configured projects.
pub fn list(conn: &Connection) -> Result<Vec<Project>> {
    let mut stmt =
        conn.prepare("SELECT id, name, color, description, path FROM projects ORDER BY id")?;
    let projects = stmt
        .query_map([], |row| {
            Ok(Project {
                id: row.get(0)?,
                name: row.get(1)?,
                color: row.get(2)?,
                description: row.get(3)?,
                path: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(projects)
}

/// Register a project (used by seeding and tests).
pub fn upsert(conn: &Connection, project: &Project) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO projects (id, name, color, description, path) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            project.id,
            project.name,
            project.color,
            project.description,
            project.path,
        ],
    )?;
    Ok(())
}
