//! Document browsing — reflect, list, concept counts, and the concept graph.
//!
//! Read-only surfaces over the two co-indexed stores. Listing groups by
//! source file by default so UI browsing is not flooded by bullet
//! sub-documents of the same file.

use anyhow::Result;
use rand::Rng;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;

use crate::error::OracleError;
use crate::knowledge::search::parse_concepts;
use crate::knowledge::types::DocType;

/// A full document, content included.
#[derive(Debug, Serialize)]
pub struct FullDocument {
    pub id: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub title: String,
    pub content: String,
    pub source_file: String,
    pub concepts: Vec<String>,
    pub project: Option<String>,
}

/// One randomly chosen principle or learning, full content.
pub fn reflect(conn: &Connection) -> Result<FullDocument, OracleError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM oracle_documents WHERE type IN ('principle','learning')",
        [],
        |row| row.get(0),
    )?;
    if count == 0 {
        return Err(OracleError::NotFound(
            "no principles or learnings indexed yet".into(),
        ));
    }

    let offset = rand::thread_rng().gen_range(0..count);
    let doc = conn
        .query_row(
            "SELECT d.id, d.type, f.title, f.content, d.source_file, d.concepts, d.project \
             FROM oracle_documents d JOIN oracle_fts f ON f.id = d.id \
             WHERE d.type IN ('principle','learning') \
             ORDER BY d.id LIMIT 1 OFFSET ?1",
            [offset],
            |row| {
                let concepts_json: String = row.get(5)?;
                Ok(FullDocument {
                    id: row.get(0)?,
                    doc_type: row.get(1)?,
                    title: row.get(2)?,
                    content: row.get(3)?,
                    source_file: row.get(4)?,
                    concepts: parse_concepts(&concepts_json),
                    project: row.get(6)?,
                })
            },
        )
        .optional()?;

    doc.ok_or_else(|| OracleError::NotFound("no principles or learnings indexed yet".into()))
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub documents: Vec<FullDocument>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub grouped_by_file: bool,
}

/// List documents ordered by source file.
///
/// With `group_by_file` (the default), one row per source file surfaces,
/// chosen by `MAX(indexed_at)`; which chunk of a multi-chunk file wins is not
/// fully determined and callers must not depend on it.
pub fn list(
    conn: &Connection,
    doc_type: Option<DocType>,
    limit: usize,
    offset: usize,
    group_by_file: bool,
) -> Result<ListResponse, OracleError> {
    if !(1..=100).contains(&limit) {
        return Err(OracleError::Validation(
            "limit must be between 1 and 100".into(),
        ));
    }

    let type_clause = match doc_type {
        Some(_) => " WHERE d.type = ?1",
        None => "",
    };

    let (select_sql, count_sql) = if group_by_file {
        (
            format!(
                "SELECT d.id, d.type, f.title, f.content, d.source_file, d.concepts, d.project \
                 FROM oracle_documents d JOIN oracle_fts f ON f.id = d.id \
                 WHERE d.id IN (SELECT id FROM (SELECT id, MAX(indexed_at) FROM oracle_documents GROUP BY source_file)) \
                 {} ORDER BY d.source_file LIMIT ?{} OFFSET ?{}",
                type_clause.replace("WHERE", "AND"),
                if doc_type.is_some() { 2 } else { 1 },
                if doc_type.is_some() { 3 } else { 2 },
            ),
            format!(
                "SELECT COUNT(DISTINCT d.source_file) FROM oracle_documents d{type_clause}"
            ),
        )
    } else {
        (
            format!(
                "SELECT d.id, d.type, f.title, f.content, d.source_file, d.concepts, d.project \
                 FROM oracle_documents d JOIN oracle_fts f ON f.id = d.id \
                 {} ORDER BY d.source_file, d.id LIMIT ?{} OFFSET ?{}",
                type_clause,
                if doc_type.is_some() { 2 } else { 1 },
                if doc_type.is_some() { 3 } else { 2 },
            ),
            format!("SELECT COUNT(*) FROM oracle_documents d{type_clause}"),
        )
    };

    let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<FullDocument> {
        let concepts_json: String = row.get(5)?;
        Ok(FullDocument {
            id: row.get(0)?,
            doc_type: row.get(1)?,
            title: row.get(2)?,
            content: row.get(3)?,
            source_file: row.get(4)?,
            concepts: parse_concepts(&concepts_json),
            project: row.get(6)?,
        })
    };

    let mut stmt = conn.prepare(&select_sql)?;
    let documents = match doc_type {
        Some(t) => stmt
            .query_map(
                rusqlite::params![t.as_str(), limit as i64, offset as i64],
                map_row,
            )?
            .collect::<Result<Vec<_>, _>>()?,
        None => stmt
            .query_map(rusqlite::params![limit as i64, offset as i64], map_row)?
            .collect::<Result<Vec<_>, _>>()?,
    };

    let total: i64 = match doc_type {
        Some(t) => conn.query_row(&count_sql, rusqlite::params![t.as_str()], |row| row.get(0))?,
        None => conn.query_row(&count_sql, [], |row| row.get(0))?,
    };

    Ok(ListResponse {
        documents,
        total: total as usize,
        offset,
        limit,
        grouped_by_file: group_by_file,
    })
}

#[derive(Debug, Serialize)]
pub struct ConceptCount {
    pub concept: String,
    pub count: u64,
}

/// Concept tag counts across documents, sorted descending.
pub fn concept_counts(
    conn: &Connection,
    doc_type: Option<DocType>,
    limit: usize,
) -> Result<Vec<ConceptCount>> {
    let sql = match doc_type {
        Some(_) => "SELECT concepts FROM oracle_documents WHERE type = ?1",
        None => "SELECT concepts FROM oracle_documents",
    };
    let mut stmt = conn.prepare(sql)?;
    let rows: Vec<String> = match doc_type {
        Some(t) => stmt
            .query_map([t.as_str()], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?,
        None => stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?,
    };

    let mut counts: HashMap<String, u64> = HashMap::new();
    for json in rows {
        for concept in parse_concepts(&json) {
            *counts.entry(concept).or_insert(0) += 1;
        }
    }

    let mut sorted: Vec<ConceptCount> = counts
        .into_iter()
        .map(|(concept, count)| ConceptCount { concept, count })
        .collect();
    sorted.sort_by(|a, b| b.count.cmp(&a.count).then(a.concept.cmp(&b.concept)));
    sorted.truncate(limit);
    Ok(sorted)
}

#[derive(Debug, Serialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub label: String,
    pub concepts: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub weight: usize,
}

#[derive(Debug, Serialize)]
pub struct GraphResponse {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// All principles plus a random sample of up to 100 learnings; edges connect
/// nodes sharing concepts with weight = size of the intersection.
pub fn graph(conn: &Connection) -> Result<GraphResponse> {
    let mut nodes = graph_nodes(
        conn,
        "SELECT d.id, d.type, f.title, d.concepts FROM oracle_documents d \
         JOIN oracle_fts f ON f.id = d.id WHERE d.type = 'principle'",
    )?;
    nodes.extend(graph_nodes(
        conn,
        "SELECT d.id, d.type, f.title, d.concepts FROM oracle_documents d \
         JOIN oracle_fts f ON f.id = d.id WHERE d.type = 'learning' \
         ORDER BY RANDOM() LIMIT 100",
    )?);

    let mut edges = Vec::new();
    for i in 0..nodes.len() {
        for j in (i + 1)..nodes.len() {
            let weight = nodes[i]
                .concepts
                .iter()
                .filter(|c| nodes[j].concepts.contains(c))
                .count();
            if weight > 0 {
                edges.push(GraphEdge {
                    source: nodes[i].id.clone(),
                    target: nodes[j].id.clone(),
                    weight,
                });
            }
        }
    }

    Ok(GraphResponse { nodes, edges })
}

fn graph_nodes(conn: &Connection, sql: &str) -> Result<Vec<GraphNode>> {
    let mut stmt = conn.prepare(sql)?;
    let nodes = stmt
        .query_map([], |row| {
            let concepts_json: String = row.get(3)?;
            Ok(GraphNode {
                id: row.get(0)?,
                doc_type: row.get(1)?,
                label: row.get(2)?,
                concepts: parse_concepts(&concepts_json),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(nodes)
}
