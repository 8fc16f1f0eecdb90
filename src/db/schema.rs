//! SQL DDL for all Oracle tables.
//!
//! Defines the document metadata table, the `oracle_fts` FTS5 virtual table,
//! the telemetry tables, and the trace/decision/forum tables. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization. The FTS table holds the
//! chunk content; the metadata table holds everything *about* a chunk.

use rusqlite::Connection;

/// All schema DDL statements for Oracle's core tables.
const SCHEMA_SQL: &str = r#"
-- Document metadata. Content lives in oracle_fts; this table carries
-- provenance, concept tags, and the supersede chain. Rows are never deleted
-- outside a full re-index.
CREATE TABLE IF NOT EXISTS oracle_documents (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL CHECK(type IN ('principle','learning','pattern','retro')),
    source_file TEXT NOT NULL,
    concepts TEXT NOT NULL DEFAULT '[]',
    project TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    indexed_at TEXT NOT NULL,
    superseded_by TEXT,
    superseded_at TEXT,
    superseded_reason TEXT,
    origin TEXT CHECK(origin IN ('mother','arthur','volt','human') OR origin IS NULL),
    created_by TEXT
);

CREATE INDEX IF NOT EXISTS idx_documents_type ON oracle_documents(type);
CREATE INDEX IF NOT EXISTS idx_documents_project ON oracle_documents(project);
CREATE INDEX IF NOT EXISTS idx_documents_source ON oracle_documents(source_file);
CREATE INDEX IF NOT EXISTS idx_documents_superseded ON oracle_documents(superseded_by);

-- Project registry: partition tags for documents and telemetry.
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    color TEXT NOT NULL DEFAULT '#888888',
    description TEXT,
    path TEXT
);

-- Telemetry (append-only, fire-and-forget writers).
CREATE TABLE IF NOT EXISTS search_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    query TEXT NOT NULL,
    type TEXT,
    mode TEXT,
    results_count INTEGER NOT NULL DEFAULT 0,
    search_time_ms INTEGER NOT NULL DEFAULT 0,
    project TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS consult_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    decision TEXT NOT NULL,
    context TEXT,
    principles_found INTEGER NOT NULL DEFAULT 0,
    patterns_found INTEGER NOT NULL DEFAULT 0,
    guidance TEXT,
    project TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS learn_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id TEXT NOT NULL,
    pattern_preview TEXT,
    source TEXT,
    concepts TEXT,
    project TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS document_access (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id TEXT NOT NULL,
    access_type TEXT NOT NULL,
    project TEXT,
    created_at TEXT NOT NULL
);

-- Discovery sessions. Parent links form a directed forest; children are
-- tracked redundantly on the parent in child_trace_ids.
CREATE TABLE IF NOT EXISTS trace_log (
    trace_id TEXT PRIMARY KEY,
    query TEXT NOT NULL,
    query_type TEXT,
    files TEXT NOT NULL DEFAULT '[]',
    commits TEXT NOT NULL DEFAULT '[]',
    issues TEXT NOT NULL DEFAULT '[]',
    retros TEXT NOT NULL DEFAULT '[]',
    learnings TEXT NOT NULL DEFAULT '[]',
    resonance TEXT NOT NULL DEFAULT '[]',
    file_count INTEGER NOT NULL DEFAULT 0,
    commit_count INTEGER NOT NULL DEFAULT 0,
    issue_count INTEGER NOT NULL DEFAULT 0,
    depth INTEGER NOT NULL DEFAULT 0,
    parent_trace_id TEXT,
    child_trace_ids TEXT NOT NULL DEFAULT '[]',
    status TEXT NOT NULL DEFAULT 'raw' CHECK(status IN ('raw','reviewed','distilling','distilled')),
    awakening TEXT,
    distilled_to_id TEXT,
    distilled_at TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_trace_parent ON trace_log(parent_trace_id);
CREATE INDEX IF NOT EXISTS idx_trace_status ON trace_log(status);

-- Decision records with a typed status lifecycle.
CREATE TABLE IF NOT EXISTS decisions (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending','parked','researching','decided','implemented','closed')),
    context TEXT,
    options TEXT NOT NULL DEFAULT '[]',
    decision TEXT,
    rationale TEXT,
    project TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    decided_at TEXT,
    decided_by TEXT
);

CREATE INDEX IF NOT EXISTS idx_decisions_status ON decisions(status);
CREATE INDEX IF NOT EXISTS idx_decisions_project ON decisions(project);

-- Forum threads and messages (append-only).
CREATE TABLE IF NOT EXISTS forum_threads (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active','answered','pending','closed')),
    project TEXT,
    created_by TEXT,
    issue_url TEXT,
    issue_number INTEGER,
    synced_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS forum_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    thread_id TEXT NOT NULL REFERENCES forum_threads(id),
    role TEXT NOT NULL CHECK(role IN ('human','oracle','claude')),
    content TEXT NOT NULL,
    author TEXT,
    principles_found INTEGER,
    patterns_found INTEGER,
    search_query TEXT,
    comment_id TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_thread ON forum_messages(thread_id);

-- Singleton indexing mutex + progress row.
CREATE TABLE IF NOT EXISTS indexing_status (
    id INTEGER PRIMARY KEY CHECK(id = 1),
    is_indexing INTEGER NOT NULL DEFAULT 0,
    progress_current INTEGER NOT NULL DEFAULT 0,
    progress_total INTEGER NOT NULL DEFAULT 0,
    started_at TEXT,
    completed_at TEXT,
    error TEXT
);

INSERT OR IGNORE INTO indexing_status (id, is_indexing) VALUES (1, 0);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// FTS5 virtual table with a Porter-stemmer tokenizer. The keyword rank
/// exposed as `rank` is BM25-derived and negative (more negative = better).
const FTS_TABLE_SQL: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS oracle_fts USING fts5(
    id UNINDEXED,
    type UNINDEXED,
    title,
    content,
    concepts,
    tokenize = 'porter unicode61'
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute_batch(FTS_TABLE_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
