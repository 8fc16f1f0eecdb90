//! Abstract vector backend — embedding and top-k similarity over a named
//! collection.
//!
//! The embedding model is never linked into this process. The production
//! implementation ([`child::ChildProcessBackend`]) spawns a bridge child and
//! speaks line-delimited JSON-RPC over its pipes; retrieval degrades to
//! keyword-only when the child is unreachable or slow.

pub mod child;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// One item staged for upsert.
#[derive(Debug, Clone, Serialize)]
pub struct VectorRecord {
    pub id: String,
    pub text: String,
    pub metadata: serde_json::Value,
}

/// One nearest-neighbor hit from a query.
///
/// `distance` is cosine distance in `[0, 2]`: 0 identical, 1 orthogonal,
/// 2 opposite.
#[derive(Debug, Clone, Deserialize)]
pub struct VectorHit {
    pub id: String,
    pub document: String,
    pub metadata: serde_json::Value,
    pub distance: f64,
}

/// Collection statistics.
#[derive(Debug, Clone, Deserialize)]
pub struct VectorStats {
    pub count: u64,
}

/// Upserts are sent to the backend in batches of this many items.
pub const UPSERT_BATCH_SIZE: usize = 100;

/// The backend contract. All methods are synchronous — callers in async
/// contexts use `tokio::task::spawn_blocking`.
pub trait VectorBackend: Send + Sync {
    /// Create the collection if it does not exist. Idempotent.
    fn ensure_collection(&self, name: &str) -> Result<()>;

    /// Upsert records; duplicate ids overwrite.
    fn upsert(&self, name: &str, records: &[VectorRecord]) -> Result<()>;

    /// Top-k nearest neighbors for `text`. `where_filter` is a small equality
    /// map (e.g. `{"type": "principle"}`) applied server-side.
    fn query(
        &self,
        name: &str,
        text: &str,
        k: usize,
        where_filter: Option<&serde_json::Value>,
    ) -> Result<Vec<VectorHit>>;

    /// At least `{count}` for the named collection.
    fn stats(&self, name: &str) -> Result<VectorStats>;

    /// Drop the collection. Used by re-index before rebuilding.
    fn delete_collection(&self, name: &str) -> Result<()>;
}
