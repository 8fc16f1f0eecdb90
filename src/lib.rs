//! Oracle — a personal knowledge memory layer for AI coding assistants.
//!
//! Oracle ingests a markdown corpus (principles, learnings, retrospectives)
//! into two co-indexed stores and answers hybrid retrieval queries over
//! them, stably ranked even when one backend is down:
//!
//! - **Storage**: SQLite with an FTS5 Porter-stemmer index for keyword
//!   search; an external vector backend (child process over a JSON-RPC
//!   pipe) for semantic search
//! - **Retrieval**: per-backend score normalization fused by weighted sum
//!   with a dual-source boost; query-aware weighting
//! - **Transports**: MCP over stdio (primary) and an HTTP/JSON API
//! - **Lifecycle**: append-only records — learnings, discovery traces,
//!   forum threads, decisions — with supersede chains instead of deletes
//!
//! # Modules
//!
//! - [`config`] — environment-driven configuration
//! - [`db`] — SQLite schema, migrations, and startup checks
//! - [`vector`] — the vector backend contract and child-process bridge
//! - [`corpus`] — markdown parsing, concept tagging, and the index job
//! - [`knowledge`] — search, consult, learn, trace, forum, decisions,
//!   dashboard
//! - [`tools`] — the MCP tool surface
//! - [`http`] — the HTTP API, instance lock, and PID file
//! - [`cli`] — indexing and ensure-server subcommands

pub mod cli;
pub mod config;
pub mod corpus;
pub mod db;
pub mod error;
pub mod http;
pub mod knowledge;
pub mod server;
pub mod tools;
pub mod vector;
