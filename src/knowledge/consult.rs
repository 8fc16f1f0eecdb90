//! Consultation — specialized retrieval for decision questions.
//!
//! Runs two keyword queries (principles, learnings) and one untyped vector
//! query, buckets the hits into principles and patterns, merges with a
//! both-backends boost, and renders a templated guidance reply. The guidance
//! template is a compatibility point — tests pin it.

use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

use crate::error::OracleError;
use crate::knowledge::project::ProjectScope;
use crate::knowledge::search::{fts_search, sanitize_query, vector_query};
use crate::knowledge::types::DocType;
use crate::knowledge::{fts_rank_to_score, telemetry, truncate_chars};
use crate::vector::VectorBackend;

/// Closing line of every non-empty guidance reply.
const APHORISM: &str = "Remember: The Oracle Keeps the Human Human.";

/// Per-bucket cap on keyword hits and classified vector hits.
const BUCKET_CANDIDATES: usize = 5;

/// Vector candidates fetched before classification.
const VECTOR_CANDIDATES: usize = 15;

/// Snippet length used in the guidance text.
const SNIPPET_CHARS: usize = 150;

#[derive(Debug, Clone)]
pub struct ConsultRequest {
    pub decision: String,
    pub context: Option<String>,
    pub project: ProjectScope,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsultEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub content: String,
    pub score: f64,
}

#[derive(Debug, Serialize)]
pub struct ConsultResponse {
    pub decision: String,
    pub principles: Vec<ConsultEntry>,
    pub patterns: Vec<ConsultEntry>,
    pub guidance: String,
}

pub fn consult(
    conn: &Connection,
    backend: &dyn VectorBackend,
    collection: &str,
    req: &ConsultRequest,
) -> Result<ConsultResponse, OracleError> {
    let decision = req.decision.trim();
    if decision.is_empty() {
        return Err(OracleError::Validation("decision is required".into()));
    }

    let combined = match req.context.as_deref() {
        Some(ctx) if !ctx.trim().is_empty() => format!("{decision} {ctx}"),
        _ => decision.to_string(),
    };
    // Decision questions are prose, not keyword lists: any-term match beats
    // the FTS5 default of all-terms.
    let sanitized = or_query(&sanitize_query(&combined));

    // Keyword side: principles and learnings, five candidates each.
    let principle_rows = fts_search(
        conn,
        &sanitized,
        Some(DocType::Principle),
        &req.project,
        BUCKET_CANDIDATES,
    )?;
    let learning_rows = fts_search(
        conn,
        &sanitized,
        Some(DocType::Learning),
        &req.project,
        BUCKET_CANDIDATES,
    )?;

    // Vector side: one untyped query, classified by document type. A dead
    // backend degrades to keyword-only without failing the consultation.
    let vector_rows = match vector_query(
        conn,
        backend,
        collection,
        &combined,
        None,
        &req.project,
        VECTOR_CANDIDATES,
    ) {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(error = %e, "vector backend degraded during consult");
            Vec::new()
        }
    };

    let mut principle_bucket = Bucket::new();
    let mut pattern_bucket = Bucket::new();

    for row in &principle_rows {
        principle_bucket.add_keyword(&row.id, &row.content, &row.doc_type, fts_rank_to_score(row.rank));
    }
    for row in &learning_rows {
        pattern_bucket.add_keyword(&row.id, &row.content, &row.doc_type, fts_rank_to_score(row.rank));
    }

    let mut vector_principles = 0usize;
    let mut vector_patterns = 0usize;
    for row in &vector_rows {
        match row.doc_type.as_str() {
            "principle" if vector_principles < BUCKET_CANDIDATES => {
                principle_bucket.add_vector(&row.id, &row.content, &row.doc_type, row.similarity);
                vector_principles += 1;
            }
            "learning" | "pattern" if vector_patterns < BUCKET_CANDIDATES => {
                pattern_bucket.add_vector(&row.id, &row.content, &row.doc_type, row.similarity);
                vector_patterns += 1;
            }
            _ => {}
        }
    }

    let principles = principle_bucket.top(3);
    let patterns = pattern_bucket.top(3);
    let guidance = build_guidance(decision, &principles, &patterns);

    telemetry::log_consult(
        conn,
        decision,
        req.context.as_deref(),
        principles.len(),
        patterns.len(),
        &guidance,
        req.project.tag(),
    );

    Ok(ConsultResponse {
        decision: decision.to_string(),
        principles,
        patterns,
        guidance,
    })
}

/// Per-bucket merge state. A document seen by both backends takes the better
/// of its two scores plus a 0.1 boost, capped at 1.0.
struct Bucket {
    entries: Vec<MergeEntry>,
    by_id: HashMap<String, usize>,
}

struct MergeEntry {
    id: String,
    doc_type: String,
    content: String,
    keyword: Option<f64>,
    vector: Option<f64>,
}

impl Bucket {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    fn add_keyword(&mut self, id: &str, content: &str, doc_type: &str, score: f64) {
        let index = self.entry_index(id, content, doc_type);
        self.entries[index].keyword = Some(score);
    }

    fn add_vector(&mut self, id: &str, content: &str, doc_type: &str, score: f64) {
        let index = self.entry_index(id, content, doc_type);
        self.entries[index].vector = Some(score);
    }

    fn entry_index(&mut self, id: &str, content: &str, doc_type: &str) -> usize {
        if let Some(&i) = self.by_id.get(id) {
            return i;
        }
        self.by_id.insert(id.to_string(), self.entries.len());
        self.entries.push(MergeEntry {
            id: id.to_string(),
            doc_type: doc_type.to_string(),
            content: content.to_string(),
            keyword: None,
            vector: None,
        });
        self.entries.len() - 1
    }

    fn top(self, n: usize) -> Vec<ConsultEntry> {
        let mut scored: Vec<ConsultEntry> = self
            .entries
            .into_iter()
            .map(|e| {
                let score = match (e.keyword, e.vector) {
                    (Some(k), Some(v)) => (k.max(v) + 0.1).min(1.0),
                    (Some(k), None) => k,
                    (None, Some(v)) => v,
                    (None, None) => 0.0,
                };
                ConsultEntry {
                    id: e.id,
                    doc_type: e.doc_type,
                    content: e.content,
                    score,
                }
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(n);
        scored
    }
}

/// Join sanitized tokens with FTS5's OR operator.
fn or_query(sanitized: &str) -> String {
    sanitized
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Render the guidance reply. The exact template is pinned by tests.
fn build_guidance(decision: &str, principles: &[ConsultEntry], patterns: &[ConsultEntry]) -> String {
    if principles.is_empty() && patterns.is_empty() {
        return format!("No matching principles or patterns for: \"{decision}\"");
    }

    let mut out = format!("Guidance for: \"{decision}\"\n");
    if !principles.is_empty() {
        out.push_str("\nRelevant principles:\n");
        for (i, entry) in principles.iter().take(3).enumerate() {
            out.push_str(&format!(
                "{}. {}\n",
                i + 1,
                truncate_chars(&entry.content, SNIPPET_CHARS)
            ));
        }
    }
    if !patterns.is_empty() {
        out.push_str("\nRelevant patterns:\n");
        for (i, entry) in patterns.iter().take(3).enumerate() {
            out.push_str(&format!(
                "{}. {}\n",
                i + 1,
                truncate_chars(&entry.content, SNIPPET_CHARS)
            ));
        }
    }
    out.push_str(&format!("\n{APHORISM}\n"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::vector::{VectorHit, VectorStats};
    use rusqlite::params;

    struct NoVector;

    impl VectorBackend for NoVector {
        fn ensure_collection(&self, _: &str) -> Result<()> {
            Ok(())
        }
        fn upsert(&self, _: &str, _: &[crate::vector::VectorRecord]) -> Result<()> {
            Ok(())
        }
        fn query(
            &self,
            _: &str,
            _: &str,
            _: usize,
            _: Option<&serde_json::Value>,
        ) -> Result<Vec<VectorHit>> {
            anyhow::bail!("bridge not running")
        }
        fn stats(&self, _: &str) -> Result<VectorStats> {
            anyhow::bail!("bridge not running")
        }
        fn delete_collection(&self, _: &str) -> Result<()> {
            Ok(())
        }
    }

    fn insert_doc(conn: &Connection, id: &str, doc_type: &str, content: &str) {
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO oracle_documents (id, type, source_file, concepts, created_at, updated_at, indexed_at) \
             VALUES (?1, ?2, 'ψ/memory/test.md', '[]', ?3, ?3, ?3)",
            params![id, doc_type, now],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO oracle_fts (id, type, title, content, concepts) VALUES (?1, ?2, ?1, ?3, '')",
            params![id, doc_type, content],
        )
        .unwrap();
    }

    fn request(decision: &str) -> ConsultRequest {
        ConsultRequest {
            decision: decision.into(),
            context: None,
            project: ProjectScope::All,
        }
    }

    #[test]
    fn empty_buckets_yield_exact_no_match_template() {
        let conn = db::open_memory_database().unwrap();
        let resp = consult(&conn, &NoVector, "c", &request("should I rewrite everything")).unwrap();

        assert!(resp.principles.is_empty());
        assert!(resp.patterns.is_empty());
        assert_eq!(
            resp.guidance,
            "No matching principles or patterns for: \"should I rewrite everything\""
        );
    }

    #[test]
    fn both_buckets_fill_and_template_is_complete() {
        let conn = db::open_memory_database().unwrap();
        insert_doc(&conn, "p1", "principle", "Nothing is Deleted: append only, preserve history");
        insert_doc(&conn, "l1", "learning", "Use move-to-trash instead of rm -rf deleted files");

        let resp = consult(&conn, &NoVector, "c", &request("should I rm -rf the deleted build dir?"))
            .unwrap();

        assert!(!resp.principles.is_empty());
        assert!(!resp.patterns.is_empty());
        assert!(resp.guidance.contains("Relevant principles:"));
        assert!(resp.guidance.contains("Relevant patterns:"));
        assert!(resp.guidance.contains(APHORISM));
    }

    #[test]
    fn consult_log_row_is_written() {
        let conn = db::open_memory_database().unwrap();
        consult(&conn, &NoVector, "c", &request("anything at all")).unwrap();

        let (decision, p, pa): (String, i64, i64) = conn
            .query_row(
                "SELECT decision, principles_found, patterns_found FROM consult_log",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(decision, "anything at all");
        assert_eq!(p, 0);
        assert_eq!(pa, 0);
    }

    #[test]
    fn empty_decision_is_rejected() {
        let conn = db::open_memory_database().unwrap();
        assert!(matches!(
            consult(&conn, &NoVector, "c", &request("  ")),
            Err(OracleError::Validation(_))
        ));
    }

    #[test]
    fn both_backends_boost_beats_single_source() {
        let merged = {
            let mut bucket = Bucket::new();
            bucket.add_keyword("a", "seen by both", "principle", 0.6);
            bucket.add_vector("a", "seen by both", "principle", 0.5);
            bucket.add_keyword("b", "keyword only", "principle", 0.65);
            bucket.top(3)
        };
        assert_eq!(merged[0].id, "a");
        assert!((merged[0].score - 0.7).abs() < 1e-9); // max(0.6, 0.5) + 0.1
        assert_eq!(merged[1].id, "b");
    }

    #[test]
    fn snippets_are_truncated_in_guidance() {
        let conn = db::open_memory_database().unwrap();
        let long = format!("principle prefix {}", "x".repeat(400));
        insert_doc(&conn, "p1", "principle", &long);

        let resp = consult(&conn, &NoVector, "c", &request("principle prefix")).unwrap();
        for line in resp.guidance.lines() {
            assert!(line.chars().count() <= SNIPPET_CHARS + 4, "line too long: {line}");
        }
    }
}
