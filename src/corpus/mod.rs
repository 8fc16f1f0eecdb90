//! Ingestion pipeline — markdown parsing, concept tagging, and indexing.
//!
//! [`parser`] turns the knowledge directory into chunk records, [`concepts`]
//! assigns deterministic tags, and [`indexer`] drives the clear-and-rebuild
//! job into the store and the vector backend.

pub mod concepts;
pub mod indexer;
pub mod parser;
