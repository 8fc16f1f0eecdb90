//! End-to-end indexing: empty corpus, canonical seed, rebuild parity, and
//! vector degradation.

mod helpers;

use helpers::{seed_canonical_corpus, seed_learning_file, test_db, MockVector};
use oracle::config::VECTOR_COLLECTION;
use oracle::corpus::indexer;
use oracle::db;
use oracle::knowledge::search::{search, SearchRequest};
use tempfile::TempDir;

#[test]
fn empty_corpus_indexes_and_searches_clean() {
    let tmp = TempDir::new().unwrap();
    let mut conn = test_db();
    let backend = MockVector::new();

    let outcome = indexer::run_index(
        &mut conn,
        &backend,
        VECTOR_COLLECTION,
        tmp.path(),
        |_, _| {},
    )
    .unwrap();
    assert_eq!(outcome.documents, 0);

    let resp = search(&conn, &backend, VECTOR_COLLECTION, &SearchRequest::new("anything")).unwrap();
    assert!(resp.results.is_empty());
    assert_eq!(resp.total, 0);
}

#[test]
fn canonical_seed_yields_section_plus_bullet_subdocuments() {
    let tmp = TempDir::new().unwrap();
    seed_canonical_corpus(tmp.path());
    let mut conn = test_db();
    let backend = MockVector::new();

    let outcome = indexer::run_index(
        &mut conn,
        &backend,
        VECTOR_COLLECTION,
        tmp.path(),
        |_, _| {},
    )
    .unwrap();
    assert_eq!(outcome.documents, 3);

    let ids: Vec<String> = conn
        .prepare("SELECT id FROM oracle_documents ORDER BY id")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(
        ids,
        vec![
            "resonance_core_0",
            "resonance_core_0_sub_0",
            "resonance_core_0_sub_1",
        ]
    );

    // The exact-match bullet ranks ahead of the whole section for "append"
    let resp = search(&conn, &backend, VECTOR_COLLECTION, &SearchRequest::new("append")).unwrap();
    assert!(!resp.results.is_empty());
    assert_eq!(resp.results[0].id, "resonance_core_0_sub_0");
    let parent_rank = resp
        .results
        .iter()
        .position(|h| h.id == "resonance_core_0")
        .expect("parent section present");
    assert!(parent_rank > 0);
}

#[test]
fn reindex_keeps_both_stores_in_parity() {
    let tmp = TempDir::new().unwrap();
    seed_canonical_corpus(tmp.path());
    seed_learning_file(
        tmp.path(),
        "2026-01-01_git.md",
        "---\ntitle: Git Safety\n---\n\n## Force Push\nnever force push shared branches\n",
    );
    let mut conn = test_db();
    let backend = MockVector::new();

    for _ in 0..2 {
        indexer::run_index(&mut conn, &backend, VECTOR_COLLECTION, tmp.path(), |_, _| {}).unwrap();
    }

    let parity = db::check_parity(&conn).unwrap();
    assert!(parity.is_ok(), "documents={} fts={}", parity.document_count, parity.fts_count);
    assert_eq!(parity.document_count, 4);

    // Vector ids match the store ids after the rebuild
    let upserted = backend.upserted.lock().unwrap();
    let last_round: std::collections::HashSet<_> =
        upserted[upserted.len() - 4..].iter().cloned().collect();
    let store_ids: std::collections::HashSet<String> = conn
        .prepare("SELECT id FROM oracle_documents")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(last_round, store_ids);
}

#[test]
fn dead_vector_backend_degrades_indexing_not_search() {
    let tmp = TempDir::new().unwrap();
    seed_canonical_corpus(tmp.path());
    let mut conn = test_db();
    let backend = MockVector::new();
    backend.kill();

    let outcome = indexer::run_index(
        &mut conn,
        &backend,
        VECTOR_COLLECTION,
        tmp.path(),
        |_, _| {},
    )
    .unwrap();
    assert!(!outcome.vector_indexed);

    // Keyword search still works, with the degradation warning attached
    let resp = search(&conn, &backend, VECTOR_COLLECTION, &SearchRequest::new("append")).unwrap();
    assert!(!resp.results.is_empty());
    let warning = resp.warning.expect("warning expected");
    assert!(warning.starts_with("Vector search unavailable:"));
    assert!(warning.ends_with("Using FTS5 only."));
    assert!(resp.mode.starts_with("hybrid"));
}

#[test]
fn progress_is_published_to_the_status_row() {
    let tmp = TempDir::new().unwrap();
    seed_canonical_corpus(tmp.path());
    let mut conn = test_db();
    let backend = MockVector::new();

    let mut observed = Vec::new();
    indexer::run_index(&mut conn, &backend, VECTOR_COLLECTION, tmp.path(), |c, t| {
        observed.push((c, t))
    })
    .unwrap();

    assert_eq!(observed.first(), Some(&(0, 3)));
    assert_eq!(observed.last(), Some(&(3, 3)));

    let status = indexer::read_status(&conn).unwrap();
    assert!(!status.is_indexing);
    assert_eq!(status.progress_current, 3);
    assert_eq!(status.progress_total, 3);
    assert!(status.error.is_none());
}
