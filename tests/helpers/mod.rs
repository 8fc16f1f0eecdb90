#![allow(dead_code)]

use anyhow::Result;
use oracle::db;
use oracle::vector::{VectorBackend, VectorHit, VectorRecord, VectorStats};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

/// Insert a document into both stores directly, bypassing the parser.
pub fn insert_doc(
    conn: &Connection,
    id: &str,
    doc_type: &str,
    content: &str,
    project: Option<&str>,
) {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO oracle_documents (id, type, source_file, concepts, project, created_at, updated_at, indexed_at) \
         VALUES (?1, ?2, 'ψ/memory/test.md', '[]', ?3, ?4, ?4, ?4)",
        params![id, doc_type, project, now],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO oracle_fts (id, type, title, content, concepts) VALUES (?1, ?2, ?1, ?3, '')",
        params![id, doc_type, content],
    )
    .unwrap();
}

/// Scripted vector backend for integration tests.
///
/// Records upserts, serves canned `(id, document, distance)` hits, and can
/// be killed mid-test to exercise degraded mode.
pub struct MockVector {
    pub hits: Mutex<Vec<(String, String, f64)>>,
    pub upserted: Mutex<Vec<String>>,
    pub alive: Mutex<bool>,
}

impl MockVector {
    pub fn new() -> Self {
        Self {
            hits: Mutex::new(Vec::new()),
            upserted: Mutex::new(Vec::new()),
            alive: Mutex::new(true),
        }
    }

    pub fn with_hits(hits: Vec<(&str, &str, f64)>) -> Self {
        let backend = Self::new();
        *backend.hits.lock().unwrap() = hits
            .into_iter()
            .map(|(id, doc, d)| (id.to_string(), doc.to_string(), d))
            .collect();
        backend
    }

    /// Simulate the bridge process dying.
    pub fn kill(&self) {
        *self.alive.lock().unwrap() = false;
    }

    fn check_alive(&self) -> Result<()> {
        if *self.alive.lock().unwrap() {
            Ok(())
        } else {
            anyhow::bail!("bridge not running")
        }
    }
}

impl VectorBackend for MockVector {
    fn ensure_collection(&self, _name: &str) -> Result<()> {
        self.check_alive()
    }

    fn upsert(&self, _name: &str, records: &[VectorRecord]) -> Result<()> {
        self.check_alive()?;
        let mut guard = self.upserted.lock().unwrap();
        guard.extend(records.iter().map(|r| r.id.clone()));
        Ok(())
    }

    fn query(
        &self,
        _name: &str,
        _text: &str,
        k: usize,
        _where_filter: Option<&serde_json::Value>,
    ) -> Result<Vec<VectorHit>> {
        self.check_alive()?;
        Ok(self
            .hits
            .lock()
            .unwrap()
            .iter()
            .take(k)
            .map(|(id, doc, distance)| VectorHit {
                id: id.clone(),
                document: doc.clone(),
                metadata: serde_json::json!({ "type": "learning" }),
                distance: *distance,
            })
            .collect())
    }

    fn stats(&self, _name: &str) -> Result<VectorStats> {
        self.check_alive()?;
        Ok(VectorStats {
            count: self.upserted.lock().unwrap().len() as u64,
        })
    }

    fn delete_collection(&self, _name: &str) -> Result<()> {
        self.check_alive()
    }
}

/// Seed a corpus directory with the canonical resonance file plus optional
/// learnings.
pub fn seed_canonical_corpus(memory_dir: &Path) {
    let resonance = memory_dir.join("resonance");
    std::fs::create_dir_all(&resonance).unwrap();
    std::fs::write(
        resonance.join("core.md"),
        "### 1. Nothing is Deleted\n- append only\n- preserve history\n",
    )
    .unwrap();
}

pub fn seed_learning_file(memory_dir: &Path, name: &str, text: &str) {
    let learnings = memory_dir.join("learnings");
    std::fs::create_dir_all(&learnings).unwrap();
    std::fs::write(learnings.join(name), text).unwrap();
}
