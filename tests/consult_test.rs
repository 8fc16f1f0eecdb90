//! Consultation produces both buckets and the pinned guidance template.

mod helpers;

use helpers::{insert_doc, test_db, MockVector};
use oracle::config::VECTOR_COLLECTION;
use oracle::knowledge::consult::{consult, ConsultRequest};
use oracle::knowledge::project::ProjectScope;

fn request(decision: &str) -> ConsultRequest {
    ConsultRequest {
        decision: decision.into(),
        context: None,
        project: ProjectScope::All,
    }
}

#[test]
fn consult_fills_both_buckets_with_guidance() {
    let conn = test_db();
    insert_doc(
        &conn,
        "p1",
        "principle",
        "Nothing is Deleted: append only, preserve history",
        None,
    );
    insert_doc(
        &conn,
        "l1",
        "learning",
        "Use move-to-trash instead of rm -rf for build directories",
        None,
    );
    let backend = MockVector::new();

    let resp = consult(
        &conn,
        &backend,
        VECTOR_COLLECTION,
        &request("should I rm -rf the build dir to clean deleted artifacts?"),
    )
    .unwrap();

    assert!(!resp.principles.is_empty());
    assert!(!resp.patterns.is_empty());
    assert_eq!(resp.principles[0].id, "p1");
    assert_eq!(resp.patterns[0].id, "l1");

    assert!(resp.guidance.contains("Relevant principles:"));
    assert!(resp.guidance.contains("Relevant patterns:"));
    assert!(resp
        .guidance
        .contains("Remember: The Oracle Keeps the Human Human."));
}

#[test]
fn consult_empty_corpus_pins_no_match_template() {
    let conn = test_db();
    let backend = MockVector::new();

    let resp = consult(&conn, &backend, VECTOR_COLLECTION, &request("rewrite it in rust?"))
        .unwrap();
    assert_eq!(
        resp.guidance,
        "No matching principles or patterns for: \"rewrite it in rust?\""
    );
}

#[test]
fn vector_hits_classify_into_patterns_bucket() {
    let conn = test_db();
    insert_doc(&conn, "l9", "learning", "semantic-only learning content", None);
    // FTS will not match this decision text, only the vector side will
    let backend = MockVector::with_hits(vec![("l9", "semantic-only learning content", 0.2)]);

    let resp = consult(
        &conn,
        &backend,
        VECTOR_COLLECTION,
        &request("completely unrelated wording"),
    )
    .unwrap();

    assert!(resp.principles.is_empty());
    assert_eq!(resp.patterns.len(), 1);
    assert_eq!(resp.patterns[0].id, "l9");
}

#[test]
fn dead_vector_backend_degrades_consult_silently() {
    let conn = test_db();
    insert_doc(
        &conn,
        "p1",
        "principle",
        "Trust the mirror: context is behavior",
        None,
    );
    let backend = MockVector::new();
    backend.kill();

    let resp = consult(&conn, &backend, VECTOR_COLLECTION, &request("trust the mirror?"))
        .unwrap();
    assert_eq!(resp.principles.len(), 1);

    let log_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM consult_log", [], |r| r.get(0))
        .unwrap();
    assert_eq!(log_count, 1);
}
