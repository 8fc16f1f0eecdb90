//! Hybrid retrieval end-to-end: ranking across backends, project scoping,
//! and pagination stability.

mod helpers;

use helpers::{insert_doc, test_db, MockVector};
use oracle::config::VECTOR_COLLECTION;
use oracle::knowledge::project::ProjectScope;
use oracle::knowledge::search::{search, SearchRequest};
use oracle::knowledge::types::SearchMode;

#[test]
fn hybrid_beats_single_backend_ranking() {
    let conn = test_db();
    // L1: verbatim keyword match; L2: semantic paraphrase; L3: unrelated
    insert_doc(&conn, "L1", "learning", "git safety force push discipline", None);
    insert_doc(
        &conn,
        "L2",
        "learning",
        "avoid destructive version-control operations",
        None,
    );
    insert_doc(&conn, "L3", "learning", "sourdough starter feeding schedule", None);

    let backend = MockVector::with_hits(vec![
        ("L1", "git safety force push discipline", 0.3),
        ("L2", "avoid destructive version-control operations", 0.5),
    ]);

    let resp = search(
        &conn,
        &backend,
        VECTOR_COLLECTION,
        &SearchRequest::new("force push safety"),
    )
    .unwrap();

    let ids: Vec<&str> = resp.results.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids[0], "L1");
    assert_eq!(resp.results[0].source, "hybrid");
    assert!(ids.contains(&"L2"));
    assert!(!ids.contains(&"L3"));

    let l2 = resp.results.iter().find(|h| h.id == "L2").unwrap();
    assert_eq!(l2.source, "vector");
    assert!(resp.results[0].score > l2.score);
}

#[test]
fn project_scoping_matches_the_contract() {
    let conn = test_db();
    insert_doc(&conn, "d1", "learning", "partition tag experiment", Some("P"));
    insert_doc(&conn, "d2", "learning", "partition tag experiment", None);
    insert_doc(&conn, "d3", "learning", "partition tag experiment", Some("Q"));
    let backend = MockVector::new();

    let mut req = SearchRequest::new("partition tag");
    req.project = ProjectScope::Tagged("P".into());
    let ids: Vec<String> = search(&conn, &backend, VECTOR_COLLECTION, &req)
        .unwrap()
        .results
        .into_iter()
        .map(|h| h.id)
        .collect();
    assert!(ids.contains(&"d1".to_string()));
    assert!(ids.contains(&"d2".to_string()));
    assert!(!ids.contains(&"d3".to_string()));

    req.project = ProjectScope::Universal;
    let ids: Vec<String> = search(&conn, &backend, VECTOR_COLLECTION, &req)
        .unwrap()
        .results
        .into_iter()
        .map(|h| h.id)
        .collect();
    assert_eq!(ids, vec!["d2".to_string()]);

    req.project = ProjectScope::All;
    let resp = search(&conn, &backend, VECTOR_COLLECTION, &req).unwrap();
    assert_eq!(resp.results.len(), 3);
}

#[test]
fn repeated_offsets_partition_the_ranked_set() {
    let conn = test_db();
    for i in 0..10 {
        insert_doc(
            &conn,
            &format!("doc{i:02}"),
            "learning",
            &format!("stable ranking corpus entry number {i}"),
            None,
        );
    }
    let backend = MockVector::new();

    let mut collected = Vec::new();
    let mut offset = 0;
    loop {
        let mut req = SearchRequest::new("stable ranking corpus");
        req.limit = 4;
        req.offset = offset;
        let resp = search(&conn, &backend, VECTOR_COLLECTION, &req).unwrap();
        if resp.results.is_empty() {
            break;
        }
        for hit in resp.results {
            assert!(!collected.contains(&hit.id), "duplicate across pages: {}", hit.id);
            collected.push(hit.id);
        }
        offset += 4;
    }

    // Candidates are capped at 2*limit per backend
    assert_eq!(collected.len(), 8);
}

#[test]
fn fts_mode_never_touches_the_vector_backend() {
    let conn = test_db();
    insert_doc(&conn, "d1", "learning", "pure keyword pathway", None);
    let backend = MockVector::new();
    backend.kill();

    let mut req = SearchRequest::new("keyword pathway");
    req.mode = SearchMode::Fts;
    let resp = search(&conn, &backend, VECTOR_COLLECTION, &req).unwrap();

    assert_eq!(resp.mode, "fts");
    assert_eq!(resp.results.len(), 1);
    assert!(resp.warning.is_none());
    assert_eq!(resp.results[0].source, "fts");
}

#[test]
fn vector_mode_works_while_metadata_is_empty() {
    // Mid-reindex the metadata table can be empty; vector hits stand on
    // their own metadata.
    let conn = test_db();
    let backend = MockVector::with_hits(vec![("v1", "orphaned vector row", 0.4)]);

    let mut req = SearchRequest::new("anything semantic");
    req.mode = SearchMode::Vector;
    let resp = search(&conn, &backend, VECTOR_COLLECTION, &req).unwrap();

    assert_eq!(resp.mode, "vector");
    assert_eq!(resp.results.len(), 1);
    assert_eq!(resp.results[0].id, "v1");
    assert_eq!(resp.results[0].doc_type, "learning");
    assert_eq!(resp.total, 1);
}

#[test]
fn superseded_rows_stay_in_the_store() {
    // Append-only: superseding marks the old row, it never deletes it.
    let conn = test_db();
    insert_doc(&conn, "old", "learning", "superseded advice", None);
    insert_doc(&conn, "new", "learning", "current advice", None);
    conn.execute(
        "UPDATE oracle_documents SET superseded_by = 'new', superseded_at = ?1, \
         superseded_reason = 'revised' WHERE id = 'old'",
        [chrono::Utc::now().to_rfc3339()],
    )
    .unwrap();

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM oracle_documents", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 2);

    let marked: Option<String> = conn
        .query_row(
            "SELECT superseded_by FROM oracle_documents WHERE id = 'old'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(marked.as_deref(), Some("new"));
}
