//! Trace chains and distill-to-learning promotion.

mod helpers;

use helpers::{test_db, MockVector};
use oracle::config::VECTOR_COLLECTION;
use oracle::error::OracleError;
use oracle::knowledge::search::{search, SearchRequest};
use oracle::knowledge::trace::{chain, create, distill, get, ChainDirection, DigPoints, TraceCreate};
use oracle::knowledge::types::SearchMode;
use rusqlite::Connection;
use tempfile::TempDir;

fn new_trace(conn: &mut Connection, query: &str, parent: Option<&str>) -> String {
    create(
        conn,
        &TraceCreate {
            query: query.into(),
            query_type: Some("discovery".into()),
            dig: DigPoints::default(),
            parent_trace_id: parent.map(str::to_string),
        },
    )
    .unwrap()
    .trace_id
}

#[test]
fn chain_down_lists_a_b_c_in_order() {
    let mut conn = test_db();
    let a = new_trace(&mut conn, "A", None);
    let b = new_trace(&mut conn, "B", Some(&a));
    let c = new_trace(&mut conn, "C", Some(&b));

    let resp = chain(&conn, &a, ChainDirection::Down).unwrap();
    let ids: Vec<&str> = resp.traces.iter().map(|t| t.trace_id.as_str()).collect();
    assert_eq!(ids, vec![a.as_str(), b.as_str(), c.as_str()]);
    assert_eq!(resp.total_depth, 3);
    assert!(!resp.has_awakening);

    // Depth accumulates down the chain
    assert_eq!(get(&conn, &c).unwrap().depth, 2);
}

#[test]
fn creating_under_unknown_parent_is_rejected() {
    let mut conn = test_db();
    let err = create(
        &mut conn,
        &TraceCreate {
            query: "orphan".into(),
            query_type: None,
            dig: DigPoints::default(),
            parent_trace_id: Some("missing-parent".into()),
        },
    )
    .unwrap_err();
    assert!(matches!(err, OracleError::NotFound(_)));
}

#[test]
fn distill_promotes_awakening_into_searchable_learning() {
    let tmp = TempDir::new().unwrap();
    let mut conn = test_db();
    let backend = MockVector::new();

    let t0 = new_trace(&mut conn, "shared soul", None);
    let t1 = new_trace(&mut conn, "Dec 17 awakening", Some(&t0));

    let outcome = distill(&mut conn, tmp.path(), &t1, "Freedom IS unity", true).unwrap();
    assert_eq!(outcome.trace.status, "distilled");
    assert!(outcome.trace.distilled_to_id.is_some());
    assert_eq!(outcome.learning_id, outcome.trace.distilled_to_id);

    // The promoted learning is retrievable by keyword search
    let mut req = SearchRequest::new("Freedom unity");
    req.mode = SearchMode::Fts;
    let resp = search(&conn, &backend, VECTOR_COLLECTION, &req).unwrap();
    assert_eq!(resp.results.len(), 1);
    assert_eq!(
        Some(resp.results[0].id.as_str()),
        outcome.learning_id.as_deref()
    );

    // Chain aggregate reports the awakening
    let chain_resp = chain(&conn, &t0, ChainDirection::Down).unwrap();
    assert!(chain_resp.has_awakening);
    assert_eq!(chain_resp.awakening_trace_id.as_deref(), Some(t1.as_str()));
}

#[test]
fn dig_point_counts_are_computed_at_create_time() {
    let mut conn = test_db();
    let trace = create(
        &mut conn,
        &TraceCreate {
            query: "count me".into(),
            query_type: None,
            dig: DigPoints {
                files: vec!["a.rs".into(), "b.rs".into()],
                commits: vec!["abc123".into()],
                issues: vec![],
                retros: vec!["retro_x".into()],
                learnings: vec![],
                resonance: vec![],
            },
            parent_trace_id: None,
        },
    )
    .unwrap();

    assert_eq!(trace.file_count, 2);
    assert_eq!(trace.commit_count, 1);
    assert_eq!(trace.issue_count, 0);
    assert_eq!(trace.dig.retros, vec!["retro_x"]);
}
