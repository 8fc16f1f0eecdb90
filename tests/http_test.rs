//! HTTP API surface: routes, status codes, and the file-path guard.

mod helpers;

use helpers::{insert_doc, MockVector};
use oracle::config::{OracleConfig, VectorConfig};
use oracle::db;
use oracle::http::{handlers::AppState, router};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

struct TestServer {
    base: String,
    _tmp: TempDir,
}

async fn start_server(seed: impl FnOnce(&rusqlite::Connection)) -> TestServer {
    let tmp = TempDir::new().unwrap();
    let repo_root = tmp.path().join("repo");
    std::fs::create_dir_all(repo_root.join("ψ/memory/learnings")).unwrap();

    let conn = db::open_memory_database().unwrap();
    seed(&conn);

    let config = OracleConfig {
        port: 0,
        data_dir: tmp.path().to_path_buf(),
        db_path: tmp.path().join("oracle.db"),
        repo_root: repo_root.clone(),
        vector: VectorConfig::default(),
    };

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        vector: Arc::new(MockVector::new()),
        config: Arc::new(config),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    TestServer {
        base: format!("http://{addr}"),
        _tmp: tmp,
    }
}

#[tokio::test]
async fn health_answers_ok() {
    let server = start_server(|_| {}).await;
    let body: serde_json::Value = reqwest::get(format!("{}/api/health", server.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn search_endpoint_returns_contract_shape() {
    let server = start_server(|conn| {
        insert_doc(conn, "d1", "learning", "http layer retrieval check", None);
    })
    .await;

    let body: serde_json::Value = reqwest::get(format!(
        "{}/api/search?q=retrieval+check&limit=5",
        server.base
    ))
    .await
    .unwrap()
    .json()
    .await
    .unwrap();

    assert_eq!(body["total"], 1);
    assert_eq!(body["limit"], 5);
    assert_eq!(body["results"][0]["id"], "d1");
    assert_eq!(body["results"][0]["type"], "learning");
    assert!(body["results"][0]["score"].as_f64().unwrap() > 0.0);

    // Missing q is a 400 with an error body
    let resp = reqwest::get(format!("{}/api/search", server.base)).await.unwrap();
    assert_eq!(resp.status(), 400);
    let err: serde_json::Value = resp.json().await.unwrap();
    assert!(err["error"].as_str().unwrap().contains("required"));
}

#[tokio::test]
async fn learn_then_search_roundtrip_over_http() {
    let server = start_server(|_| {}).await;
    let client = reqwest::Client::new();

    let created: serde_json::Value = client
        .post(format!("{}/api/learn", server.base))
        .json(&serde_json::json!({
            "pattern": "always run the verifier before shipping",
            "concepts": ["verification"],
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(created["id"].as_str().unwrap().starts_with("learning_"));

    let found: serde_json::Value = client
        .get(format!("{}/api/search?q=verifier+shipping&mode=fts", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(found["results"][0]["id"], created["id"]);

    // Same-day duplicate → 409 Conflict
    let dup = client
        .post(format!("{}/api/learn", server.base))
        .json(&serde_json::json!({ "pattern": "always run the verifier before shipping" }))
        .send()
        .await
        .unwrap();
    assert_eq!(dup.status(), 409);
}

#[tokio::test]
async fn decision_transition_endpoint_enforces_the_graph() {
    let server = start_server(|_| {}).await;
    let client = reqwest::Client::new();

    let decision: serde_json::Value = client
        .post(format!("{}/api/decisions", server.base))
        .json(&serde_json::json!({ "title": "http transition test" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = decision["id"].as_str().unwrap();

    let ok = client
        .post(format!("{}/api/decisions/{id}/transition", server.base))
        .json(&serde_json::json!({ "status": "decided", "decided_by": "tester" }))
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), 200);
    let decided: serde_json::Value = ok.json().await.unwrap();
    assert!(decided["decided_at"].is_string());

    let bad = client
        .post(format!("{}/api/decisions/{id}/transition", server.base))
        .json(&serde_json::json!({ "status": "pending" }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), 409);
}

#[tokio::test]
async fn file_endpoint_rejects_escapes_and_serves_repo_files() {
    let server = start_server(|_| {}).await;
    let client = reqwest::Client::new();

    // Seed a file inside the repo root
    let repo_root = server._tmp.path().join("repo");
    std::fs::write(repo_root.join("ψ/memory/learnings/note.md"), "note body").unwrap();

    let ok: serde_json::Value = client
        .get(format!(
            "{}/api/file?path=ψ/memory/learnings/note.md",
            server.base
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ok["content"], "note body");

    // Traversal out of the root is rejected
    let escape = client
        .get(format!("{}/api/file?path=../outside.txt", server.base))
        .send()
        .await
        .unwrap();
    assert!(escape.status() == 400 || escape.status() == 404);

    // Absolute path outside the root is rejected even if it exists
    std::fs::write(server._tmp.path().join("outside.txt"), "secret").unwrap();
    let outside = server._tmp.path().join("outside.txt");
    let abs = client
        .get(format!("{}/api/file?path={}", server.base, outside.display()))
        .send()
        .await
        .unwrap();
    assert_eq!(abs.status(), 400);
}

#[tokio::test]
async fn thread_post_and_read_over_http() {
    let server = start_server(|_| {}).await;
    let client = reqwest::Client::new();

    let outcome: serde_json::Value = client
        .post(format!("{}/api/thread", server.base))
        .json(&serde_json::json!({ "message": "is the oracle awake?" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let thread_id = outcome["thread"]["id"].as_str().unwrap();

    let detail: serde_json::Value = client
        .get(format!("{}/api/thread/{thread_id}", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["messages"].as_array().unwrap().len(), 2);

    let patched = client
        .patch(format!("{}/api/thread/{thread_id}/status", server.base))
        .json(&serde_json::json!({ "status": "answered" }))
        .send()
        .await
        .unwrap();
    assert_eq!(patched.status(), 200);

    let missing = client
        .get(format!("{}/api/thread/not-a-thread", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn stats_reports_index_health() {
    let server = start_server(|conn| {
        insert_doc(conn, "p1", "principle", "healthy corpus", None);
    })
    .await;

    let stats: serde_json::Value = reqwest::get(format!("{}/api/stats", server.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total_documents"], 1);
    assert_eq!(stats["fts_status"], "ok");
    assert_eq!(stats["by_type"]["principle"], 1);
}
