//! One-shot corpus indexing job.
//!
//! Clears both indices and rebuilds them from the parsed corpus. The
//! `indexing_status` singleton row acts as the cross-caller mutex and the
//! progress surface for the dashboard. The store side is authoritative: if
//! the vector backend is unreachable the job logs and continues.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::corpus::parser::{self, ParsedDocument};
use crate::vector::{VectorBackend, VectorRecord, UPSERT_BATCH_SIZE};
use std::path::Path;

/// Documents inserted per store transaction. Progress is published between
/// transactions so readers see forward motion during a long rebuild.
const STORE_BATCH_SIZE: usize = 50;

/// Result of a completed indexing run.
#[derive(Debug, Serialize)]
pub struct IndexOutcome {
    pub documents: usize,
    pub vector_indexed: bool,
    pub elapsed_ms: u128,
}

/// Current contents of the `indexing_status` singleton row.
#[derive(Debug, Clone, Serialize)]
pub struct IndexingStatus {
    pub is_indexing: bool,
    pub progress_current: i64,
    pub progress_total: i64,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub error: Option<String>,
}

/// Run one full indexing pass: clear both indices, parse the corpus, insert
/// every chunk into the store, and upsert embeddings in batches.
///
/// `progress` is called with `(current, total)` as documents land.
pub fn run_index(
    conn: &mut Connection,
    vector: &dyn VectorBackend,
    collection: &str,
    memory_dir: &Path,
    mut progress: impl FnMut(usize, usize),
) -> Result<IndexOutcome> {
    let started = std::time::Instant::now();

    if read_status(conn)?.is_indexing {
        bail!("indexing already in progress");
    }
    mark_started(conn)?;

    let outcome = (|| -> Result<IndexOutcome> {
        // Clear both indices. This is the only deviation from append-only:
        // a complete rebuild is the only way to reconcile chunk-boundary
        // drift between the markdown corpus and stored ids.
        conn.execute("DELETE FROM oracle_fts", [])?;
        conn.execute("DELETE FROM oracle_documents", [])?;

        let mut vector_ok = true;
        if let Err(e) = vector
            .delete_collection(collection)
            .and_then(|_| vector.ensure_collection(collection))
        {
            tracing::warn!(error = %e, "vector backend unavailable, indexing store only");
            vector_ok = false;
        }

        let documents =
            parser::parse_corpus(memory_dir).context("failed to parse knowledge corpus")?;
        let total = documents.len();
        set_progress(conn, 0, total as i64)?;
        progress(0, total);

        let mut inserted = 0usize;
        for batch in documents.chunks(STORE_BATCH_SIZE) {
            let tx = conn.transaction()?;
            for doc in batch {
                insert_document(&tx, doc)?;
            }
            tx.commit()?;
            inserted += batch.len();
            set_progress(conn, inserted as i64, total as i64)?;
            progress(inserted, total);
        }

        if vector_ok {
            for batch in documents.chunks(UPSERT_BATCH_SIZE) {
                let records: Vec<VectorRecord> = batch.iter().map(to_vector_record).collect();
                if let Err(e) = vector.upsert(collection, &records) {
                    tracing::warn!(error = %e, "vector upsert failed, continuing with store only");
                    vector_ok = false;
                    break;
                }
            }
        }

        Ok(IndexOutcome {
            documents: total,
            vector_indexed: vector_ok,
            elapsed_ms: started.elapsed().as_millis(),
        })
    })();

    match outcome {
        Ok(result) => {
            mark_finished(conn, result.documents as i64)?;
            tracing::info!(
                documents = result.documents,
                vector = result.vector_indexed,
                elapsed_ms = result.elapsed_ms as u64,
                "indexing complete"
            );
            Ok(result)
        }
        Err(e) => {
            mark_failed(conn, &e.to_string())?;
            Err(e)
        }
    }
}

/// Insert the metadata row and the FTS row for one parsed chunk.
///
/// All three timestamps are the wall clock at insert time — source file
/// mtimes are deliberately not used, so freshness is a property of the
/// indexing run.
fn insert_document(conn: &Connection, doc: &ParsedDocument) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let concepts_json = serde_json::to_string(&doc.concepts)?;

    conn.execute(
        "INSERT OR REPLACE INTO oracle_documents \
         (id, type, source_file, concepts, created_at, updated_at, indexed_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?5)",
        params![
            doc.id,
            doc.doc_type.as_str(),
            doc.source_file,
            concepts_json,
            now,
        ],
    )?;

    conn.execute(
        "INSERT INTO oracle_fts (id, type, title, content, concepts) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            doc.id,
            doc.doc_type.as_str(),
            doc.title,
            doc.content,
            doc.concepts.join(" "),
        ],
    )?;

    Ok(())
}

fn to_vector_record(doc: &ParsedDocument) -> VectorRecord {
    VectorRecord {
        id: doc.id.clone(),
        text: doc.content.clone(),
        metadata: serde_json::json!({
            "type": doc.doc_type.as_str(),
            "source_file": doc.source_file,
            "concepts": doc.concepts.join(" "),
        }),
    }
}

// ── indexing_status singleton ────────────────────────────────────────────────

pub fn read_status(conn: &Connection) -> Result<IndexingStatus> {
    let status = conn.query_row(
        "SELECT is_indexing, progress_current, progress_total, started_at, completed_at, error \
         FROM indexing_status WHERE id = 1",
        [],
        |row| {
            Ok(IndexingStatus {
                is_indexing: row.get::<_, i64>(0)? != 0,
                progress_current: row.get(1)?,
                progress_total: row.get(2)?,
                started_at: row.get(3)?,
                completed_at: row.get(4)?,
                error: row.get(5)?,
            })
        },
    )?;
    Ok(status)
}

fn mark_started(conn: &Connection) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE indexing_status SET is_indexing = 1, progress_current = 0, progress_total = 0, \
         started_at = ?1, completed_at = NULL, error = NULL WHERE id = 1",
        params![now],
    )?;
    Ok(())
}

fn set_progress(conn: &Connection, current: i64, total: i64) -> Result<()> {
    conn.execute(
        "UPDATE indexing_status SET progress_current = ?1, progress_total = ?2 WHERE id = 1",
        params![current, total],
    )?;
    Ok(())
}

fn mark_finished(conn: &Connection, total: i64) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE indexing_status SET is_indexing = 0, progress_current = ?1, progress_total = ?1, \
         completed_at = ?2 WHERE id = 1",
        params![total, now],
    )?;
    Ok(())
}

fn mark_failed(conn: &Connection, message: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE indexing_status SET is_indexing = 0, error = ?1, completed_at = ?2 WHERE id = 1",
        params![message, now],
    )?;
    Ok(())
}

/// Clear a stale `is_indexing` flag. The HTTP server calls this at startup:
/// if we are starting, nothing is indexing.
pub fn reset_stale(conn: &Connection) -> Result<()> {
    let cleared = conn.execute(
        "UPDATE indexing_status SET is_indexing = 0 WHERE is_indexing = 1",
        [],
    )?;
    if cleared > 0 {
        tracing::warn!("cleared stale is_indexing flag from a previous run");
    }
    Ok(())
}
