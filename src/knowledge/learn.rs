//! Learn — append one new pattern to the corpus.
//!
//! Writes a markdown file under `ψ/memory/learnings/`, then inserts the
//! metadata and FTS rows in one transaction. The vector index is *not*
//! updated: newly learned documents are keyword-searchable immediately and
//! vector-searchable only after the next full re-index. Duplicate filename on
//! the same day is a conflict, never a silent overwrite.

use anyhow::Context;
use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;

use crate::corpus::concepts;
use crate::error::OracleError;
use crate::knowledge::telemetry;
use crate::knowledge::types::Origin;

/// Maximum slug length in the generated filename.
const SLUG_MAX_CHARS: usize = 50;

/// Maximum title length taken from the pattern's first line.
const TITLE_MAX_CHARS: usize = 80;

#[derive(Debug, Clone, Default)]
pub struct LearnRequest {
    pub pattern: String,
    pub source: Option<String>,
    pub concepts: Vec<String>,
    pub origin: Option<Origin>,
    pub project: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LearnOutcome {
    pub id: String,
    pub file: String,
    pub title: String,
    pub concepts: Vec<String>,
}

/// Append a learning: markdown file first, then both store rows.
///
/// The file write happens before the inserts so a crash between the two
/// leaves a re-indexable file rather than a dangling row.
pub fn learn(
    conn: &mut Connection,
    learnings_dir: &Path,
    req: &LearnRequest,
) -> Result<LearnOutcome, OracleError> {
    let pattern = req.pattern.trim();
    if pattern.is_empty() {
        return Err(OracleError::Validation("pattern is required".into()));
    }

    let date = Utc::now().format("%Y-%m-%d").to_string();
    let slug = slugify(pattern);
    let filename = format!("{date}_{slug}.md");
    let id = format!("learning_{date}_{slug}");
    let relative_path = format!("ψ/memory/learnings/{filename}");

    std::fs::create_dir_all(learnings_dir)
        .with_context(|| format!("failed to create {}", learnings_dir.display()))
        .map_err(OracleError::Internal)?;

    let path = learnings_dir.join(&filename);
    if path.exists() {
        return Err(OracleError::Conflict(format!(
            "File already exists: {filename}"
        )));
    }

    let title = title_from_pattern(pattern);
    let tags = if req.concepts.is_empty() {
        concepts::extract(&title, pattern)
    } else {
        req.concepts.clone()
    };
    let markdown = render_markdown(&title, &tags, &date, req.source.as_deref(), pattern);

    std::fs::write(&path, &markdown)
        .with_context(|| format!("failed to write {}", path.display()))
        .map_err(OracleError::Internal)?;

    let now = Utc::now().to_rfc3339();
    let concepts_json = serde_json::to_string(&tags)?;

    let tx = conn.transaction().map_err(anyhow::Error::from)?;
    tx.execute(
        "INSERT INTO oracle_documents \
         (id, type, source_file, concepts, project, created_at, updated_at, indexed_at, origin, created_by) \
         VALUES (?1, 'learning', ?2, ?3, ?4, ?5, ?5, ?5, ?6, 'oracle_learn')",
        params![
            id,
            relative_path,
            concepts_json,
            req.project,
            now,
            req.origin.map(|o| o.as_str()),
        ],
    )?;
    tx.execute(
        "INSERT INTO oracle_fts (id, type, title, content, concepts) \
         VALUES (?1, 'learning', ?2, ?3, ?4)",
        params![id, title, markdown, tags.join(" ")],
    )?;
    tx.commit().map_err(anyhow::Error::from)?;

    telemetry::log_learn(
        conn,
        &id,
        pattern,
        req.source.as_deref(),
        &tags,
        req.project.as_deref(),
    );

    tracing::info!(id = %id, file = %relative_path, "learning recorded");

    Ok(LearnOutcome {
        id,
        file: relative_path,
        title,
        concepts: tags,
    })
}

/// Lowercase, keep `[a-z0-9 -]`, collapse whitespace runs to single hyphens,
/// trim hyphens, truncate to 50 chars.
fn slugify(pattern: &str) -> String {
    let kept: String = pattern
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || *c == '-')
        .collect();
    let slug: String = kept
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .take(SLUG_MAX_CHARS)
        .collect();
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// First non-empty line of the pattern, truncated.
fn title_from_pattern(pattern: &str) -> String {
    let line = pattern
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("Untitled");
    crate::knowledge::truncate_chars(line, TITLE_MAX_CHARS)
}

fn render_markdown(
    title: &str,
    tags: &[String],
    date: &str,
    source: Option<&str>,
    pattern: &str,
) -> String {
    format!(
        "---\ntitle: {title}\ntags: [{tags}]\ncreated: {date}\nsource: {source}\n---\n\n\
         # {title}\n\n{pattern}\n\n---\n*Added via Oracle Learn*\n",
        tags = tags.join(", "),
        source = source.unwrap_or("oracle"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn learn_once(conn: &mut Connection, dir: &Path, pattern: &str) -> Result<LearnOutcome, OracleError> {
        learn(
            conn,
            dir,
            &LearnRequest {
                pattern: pattern.into(),
                source: Some("test".into()),
                concepts: vec![],
                origin: Some(Origin::Human),
                project: None,
            },
        )
    }

    #[test]
    fn slugify_rules() {
        assert_eq!(slugify("Always verify BEFORE destructive ops!"), "always-verify-before-destructive-ops");
        assert_eq!(slugify("  spaces   collapse  "), "spaces-collapse");
        assert_eq!(slugify("???"), "untitled");
        let long = slugify(&"word ".repeat(30));
        assert!(long.len() <= 50);
        assert!(!long.ends_with('-'));
    }

    #[test]
    fn learn_writes_file_and_both_rows() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut conn = db::open_memory_database().unwrap();

        let outcome = learn_once(&mut conn, tmp.path(), "always verify before destructive operations").unwrap();
        assert!(outcome.id.starts_with("learning_"));

        // File on disk with front matter, body, and footer
        let filename = outcome.file.rsplit('/').next().unwrap();
        let text = std::fs::read_to_string(tmp.path().join(filename)).unwrap();
        assert!(text.starts_with("---\ntitle: always verify before destructive operations\n"));
        assert!(text.contains("\n\nalways verify before destructive operations\n"));
        assert!(text.ends_with("---\n*Added via Oracle Learn*\n"));

        // Metadata row
        let (doc_type, created_by): (String, String) = conn
            .query_row(
                "SELECT type, created_by FROM oracle_documents WHERE id = ?1",
                params![outcome.id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(doc_type, "learning");
        assert_eq!(created_by, "oracle_learn");

        // FTS row is immediately searchable
        let found: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM oracle_fts WHERE oracle_fts MATCH 'destructive operations'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(found, 1);

        // learn_log row
        let log_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM learn_log", [], |row| row.get(0))
            .unwrap();
        assert_eq!(log_count, 1);
    }

    #[test]
    fn duplicate_same_day_is_conflict() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut conn = db::open_memory_database().unwrap();

        learn_once(&mut conn, tmp.path(), "one weird trick").unwrap();
        let err = learn_once(&mut conn, tmp.path(), "one weird trick").unwrap_err();
        assert!(matches!(err, OracleError::Conflict(_)));
        assert!(err.to_string().contains("File already exists"));

        // Only one file on disk
        let count = std::fs::read_dir(tmp.path()).unwrap().count();
        assert_eq!(count, 1);
    }

    #[test]
    fn explicit_concepts_override_extraction() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut conn = db::open_memory_database().unwrap();

        let outcome = learn(
            &mut conn,
            tmp.path(),
            &LearnRequest {
                pattern: "verify before destructive git operations".into(),
                source: None,
                concepts: vec!["safety".into(), "git".into()],
                origin: None,
                project: Some("volt".into()),
            },
        )
        .unwrap();
        assert_eq!(outcome.concepts, vec!["safety", "git"]);

        let project: Option<String> = conn
            .query_row(
                "SELECT project FROM oracle_documents WHERE id = ?1",
                params![outcome.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(project.as_deref(), Some("volt"));
    }

    #[test]
    fn empty_pattern_is_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut conn = db::open_memory_database().unwrap();
        assert!(matches!(
            learn_once(&mut conn, tmp.path(), "   "),
            Err(OracleError::Validation(_))
        ));
    }
}
