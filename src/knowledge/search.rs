//! Hybrid search — the retrieval core.
//!
//! Sanitizes the query for the FTS5 grammar, runs the keyword and vector
//! backends, normalizes each side's scores into `[0, 1]`, fuses by weighted
//! sum with a hybrid boost, and paginates the combined ranking. The vector
//! side degrades gracefully: an unreachable or slow backend turns into a
//! `warning` on the response, never an error, unless vector mode was
//! explicitly requested.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;

use crate::error::OracleError;
use crate::knowledge::project::ProjectScope;
use crate::knowledge::types::{DocType, SearchMode};
use crate::knowledge::{distance_to_similarity, fts_rank_to_score, telemetry, truncate_chars};
use crate::vector::VectorBackend;

/// Returned result content is truncated to this many characters.
const CONTENT_PREVIEW_CHARS: usize = 500;

/// Boost applied when a document is found by both backends, before capping
/// the score at 1.0.
const HYBRID_BOOST: f64 = 1.10;

// ── Public types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    /// `None` means all types.
    pub doc_type: Option<DocType>,
    pub limit: usize,
    pub offset: usize,
    pub mode: SearchMode,
    pub project: ProjectScope,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            doc_type: None,
            limit: 10,
            offset: 0,
            mode: SearchMode::Hybrid,
            project: ProjectScope::All,
        }
    }
}

/// One ranked result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub content: String,
    pub source_file: String,
    pub concepts: Vec<String>,
    pub project: Option<String>,
    /// Which backend(s) produced this hit: `fts`, `vector`, or `hybrid`.
    pub source: &'static str,
    pub score: f64,
    #[serde(rename = "ftsScore", skip_serializing_if = "Option::is_none")]
    pub fts_score: Option<f64>,
    #[serde(rename = "vectorScore", skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    /// Requested mode, suffixed with the active weighting rule when a
    /// query-aware rule replaced the default (e.g. `hybrid-short`).
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

// ── Sanitization and weighting ───────────────────────────────────────────────

/// Characters the FTS5 query grammar treats as operators.
const FTS_OPERATORS: &[char] = &[
    '?', '*', '+', '-', '(', ')', '^', '~', '"', '\'', ':', '.', '/',
];

/// Replace FTS5 operator characters with spaces and collapse whitespace.
///
/// If stripping leaves nothing, the original string is returned unchanged and
/// the caller surfaces the resulting backend error. Idempotent.
pub fn sanitize_query(query: &str) -> String {
    let replaced: String = query
        .chars()
        .map(|c| if FTS_OPERATORS.contains(&c) { ' ' } else { c })
        .collect();
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        query.to_string()
    } else {
        collapsed
    }
}

/// Query-aware fusion weights `(fts, vector)` plus the mode-string suffix
/// documenting the chosen rule.
pub fn fusion_weights(raw_query: &str) -> (f64, f64, &'static str) {
    let tokens = raw_query.split_whitespace().count();
    let has_quote = raw_query.contains('"');
    let has_boolean = raw_query
        .split_whitespace()
        .any(|t| t == "AND" || t == "OR" || t == "NOT");

    if tokens <= 2 && !has_quote {
        (0.7, 0.3, "-short")
    } else if has_quote || has_boolean {
        (0.75, 0.25, "-exact")
    } else if tokens > 5 {
        (0.3, 0.7, "-long")
    } else {
        (0.5, 0.5, "")
    }
}

/// Fuse one document's per-backend scores into `(source, final score)`.
fn fused_score(
    fts: Option<f64>,
    vector: Option<f64>,
    weights: (f64, f64),
) -> (&'static str, f64) {
    match (fts, vector) {
        (Some(f), Some(v)) => (
            "hybrid",
            ((weights.0 * f + weights.1 * v) * HYBRID_BOOST).min(1.0),
        ),
        (Some(f), None) => ("fts", weights.0 * f),
        (None, Some(v)) => ("vector", weights.1 * v),
        (None, None) => ("fts", 0.0),
    }
}

// ── Backend rows ─────────────────────────────────────────────────────────────

pub(crate) struct FtsRow {
    pub id: String,
    pub title: String,
    pub content: String,
    pub rank: f64,
    pub doc_type: String,
    pub source_file: String,
    pub concepts: Vec<String>,
    pub project: Option<String>,
}

pub(crate) struct VectorRow {
    pub id: String,
    pub content: String,
    pub doc_type: String,
    pub source_file: String,
    pub concepts: Vec<String>,
    pub project: Option<String>,
    pub similarity: f64,
}

/// Parse the JSON-array concepts column.
pub(crate) fn parse_concepts(json: &str) -> Vec<String> {
    serde_json::from_str(json).unwrap_or_default()
}

/// Keyword search: one prepared statement joining the FTS index on the
/// metadata table, ordered by the index's internal rank.
pub(crate) fn fts_search(
    conn: &Connection,
    match_query: &str,
    doc_type: Option<DocType>,
    scope: &ProjectScope,
    limit: usize,
) -> Result<Vec<FtsRow>> {
    let mut sql = String::from(
        "SELECT oracle_fts.id, oracle_fts.title, oracle_fts.content, oracle_fts.rank, \
         d.type, d.source_file, d.concepts, d.project \
         FROM oracle_fts JOIN oracle_documents d ON d.id = oracle_fts.id \
         WHERE oracle_fts MATCH ?",
    );
    let mut bound: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(match_query.to_string())];

    if let Some(t) = doc_type {
        sql.push_str(" AND d.type = ?");
        bound.push(Box::new(t.as_str().to_string()));
    }
    let (clause, param) = scope.filter_sql("d.project");
    sql.push_str(&clause);
    if let Some(p) = param {
        bound.push(Box::new(p));
    }
    sql.push_str(" ORDER BY oracle_fts.rank LIMIT ?");
    bound.push(Box::new(limit as i64));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            rusqlite::params_from_iter(bound.iter().map(|b| b.as_ref())),
            |row| {
                let concepts_json: String = row.get(6)?;
                Ok(FtsRow {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    content: row.get(2)?,
                    rank: row.get(3)?,
                    doc_type: row.get(4)?,
                    source_file: row.get(5)?,
                    concepts: parse_concepts(&concepts_json),
                    project: row.get(7)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()
        .context("keyword search failed")?;
    Ok(rows)
}

/// Total keyword matches under the same filters, without a limit.
fn fts_count(
    conn: &Connection,
    match_query: &str,
    doc_type: Option<DocType>,
    scope: &ProjectScope,
) -> Result<usize> {
    let mut sql = String::from(
        "SELECT COUNT(*) FROM oracle_fts JOIN oracle_documents d ON d.id = oracle_fts.id \
         WHERE oracle_fts MATCH ?",
    );
    let mut bound: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(match_query.to_string())];
    if let Some(t) = doc_type {
        sql.push_str(" AND d.type = ?");
        bound.push(Box::new(t.as_str().to_string()));
    }
    let (clause, param) = scope.filter_sql("d.project");
    sql.push_str(&clause);
    if let Some(p) = param {
        bound.push(Box::new(p));
    }

    let count: i64 = conn
        .query_row(
            &sql,
            rusqlite::params_from_iter(bound.iter().map(|b| b.as_ref())),
            |row| row.get(0),
        )
        .context("keyword count failed")?;
    Ok(count as usize)
}

/// Vector search with the project filter applied after joining ids back
/// against the metadata table. While the metadata table is empty mid-reindex
/// the hit's own metadata stands in, so vector-only mode keeps working.
pub(crate) fn vector_query(
    conn: &Connection,
    backend: &dyn VectorBackend,
    collection: &str,
    raw_query: &str,
    doc_type: Option<DocType>,
    scope: &ProjectScope,
    k: usize,
) -> Result<Vec<VectorRow>> {
    let where_filter = doc_type.map(|t| serde_json::json!({ "type": t.as_str() }));
    let hits = backend.query(collection, raw_query, k, where_filter.as_ref())?;

    let mut rows = Vec::with_capacity(hits.len());
    for hit in hits {
        let meta: Option<(String, String, String, Option<String>)> = conn
            .query_row(
                "SELECT type, source_file, concepts, project FROM oracle_documents WHERE id = ?1",
                params![hit.id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let (doc_type_label, source_file, concepts, project) = match meta {
            Some((t, sf, concepts_json, project)) => {
                (t, sf, parse_concepts(&concepts_json), project)
            }
            None => (
                json_str(&hit.metadata, "type").unwrap_or_else(|| "learning".into()),
                json_str(&hit.metadata, "source_file").unwrap_or_default(),
                json_str(&hit.metadata, "concepts")
                    .map(|c| c.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default(),
                None,
            ),
        };

        if !scope.matches(project.as_deref()) {
            continue;
        }

        rows.push(VectorRow {
            id: hit.id,
            content: hit.document,
            doc_type: doc_type_label,
            source_file,
            concepts,
            project,
            similarity: distance_to_similarity(hit.distance),
        });
    }
    Ok(rows)
}

fn json_str(value: &serde_json::Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

// ── The search entry point ───────────────────────────────────────────────────

pub fn search(
    conn: &Connection,
    backend: &dyn VectorBackend,
    collection: &str,
    req: &SearchRequest,
) -> Result<SearchResponse, OracleError> {
    let started = Instant::now();

    let raw_query = req.query.trim();
    if raw_query.is_empty() {
        return Err(OracleError::Validation("query is required".into()));
    }
    if !(1..=100).contains(&req.limit) {
        return Err(OracleError::Validation(
            "limit must be between 1 and 100".into(),
        ));
    }

    let sanitized = sanitize_query(raw_query);
    let candidate_limit = req.limit * 2;

    // Keyword side (unless vector-only)
    let (fts_rows, keyword_total) = if req.mode != SearchMode::Vector {
        let rows = fts_search(conn, &sanitized, req.doc_type, &req.project, candidate_limit)?;
        let total = fts_count(conn, &sanitized, req.doc_type, &req.project)?;
        (rows, total)
    } else {
        (Vec::new(), 0)
    };

    // Vector side (unless keyword-only), degrading on failure
    let mut warning = None;
    let vector_rows = if req.mode != SearchMode::Fts {
        match vector_query(
            conn,
            backend,
            collection,
            raw_query,
            req.doc_type,
            &req.project,
            candidate_limit,
        ) {
            Ok(rows) => rows,
            Err(e) if req.mode == SearchMode::Vector => {
                // Vector-only was asked for; there is nothing to fall back to.
                return Err(OracleError::Degraded(format!("vector search failed: {e}")));
            }
            Err(e) => {
                tracing::warn!(error = %e, "vector backend degraded, serving keyword-only results");
                warning = Some(format!("Vector search unavailable: {e}. Using FTS5 only."));
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    let vector_total = vector_rows.len();

    // Fuse: dedupe by id, keyword rows first so ties break keyword-first.
    let (fts_weight, vector_weight, suffix) = fusion_weights(raw_query);
    let mode_label = match req.mode {
        SearchMode::Hybrid => format!("hybrid{suffix}"),
        SearchMode::Fts => "fts".to_string(),
        SearchMode::Vector => "vector".to_string(),
    };

    struct Combined {
        id: String,
        doc_type: String,
        content: String,
        source_file: String,
        concepts: Vec<String>,
        project: Option<String>,
        fts: Option<f64>,
        vector: Option<f64>,
    }

    let mut combined: Vec<Combined> = Vec::new();
    let mut by_id: HashMap<String, usize> = HashMap::new();

    for row in fts_rows {
        by_id.insert(row.id.clone(), combined.len());
        combined.push(Combined {
            id: row.id,
            doc_type: row.doc_type,
            content: row.content,
            source_file: row.source_file,
            concepts: row.concepts,
            project: row.project,
            fts: Some(fts_rank_to_score(row.rank)),
            vector: None,
        });
    }
    for row in vector_rows {
        if let Some(&i) = by_id.get(&row.id) {
            combined[i].vector = Some(row.similarity);
        } else {
            by_id.insert(row.id.clone(), combined.len());
            combined.push(Combined {
                id: row.id,
                doc_type: row.doc_type,
                content: row.content,
                source_file: row.source_file,
                concepts: row.concepts,
                project: row.project,
                fts: None,
                vector: Some(row.similarity),
            });
        }
    }

    let mut hits: Vec<SearchHit> = combined
        .into_iter()
        .map(|c| {
            let (source, score) = match req.mode {
                SearchMode::Fts => ("fts", c.fts.unwrap_or(0.0)),
                SearchMode::Vector => ("vector", c.vector.unwrap_or(0.0)),
                SearchMode::Hybrid => fused_score(c.fts, c.vector, (fts_weight, vector_weight)),
            };
            SearchHit {
                id: c.id,
                doc_type: c.doc_type,
                content: truncate_chars(&c.content, CONTENT_PREVIEW_CHARS),
                source_file: c.source_file,
                concepts: c.concepts,
                project: c.project,
                source,
                score,
                fts_score: c.fts,
                vector_score: c.vector,
            }
        })
        .collect();

    // Stable sort keeps keyword-first insertion order on ties.
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let combined_count = hits.len();
    let total = match req.mode {
        SearchMode::Fts => keyword_total,
        SearchMode::Vector => vector_total,
        SearchMode::Hybrid => keyword_total.max(combined_count),
    };

    let page: Vec<SearchHit> = hits
        .into_iter()
        .skip(req.offset)
        .take(req.limit)
        .collect();

    let elapsed_ms = started.elapsed().as_millis();
    let type_label = req
        .doc_type
        .map(|t| t.as_str().to_string())
        .unwrap_or_else(|| "all".to_string());

    // Telemetry happens after the result is ready and never fails the call.
    telemetry::log_search(
        conn,
        raw_query,
        &type_label,
        &mode_label,
        total,
        elapsed_ms,
        req.project.tag(),
    );
    let page_ids: Vec<String> = page.iter().map(|h| h.id.clone()).collect();
    telemetry::log_access(conn, &page_ids, "search", req.project.tag());

    Ok(SearchResponse {
        results: page,
        total,
        offset: req.offset,
        limit: req.limit,
        mode: mode_label,
        warning,
    })
}
