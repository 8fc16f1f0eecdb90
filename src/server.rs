//! MCP server initialization for the stdio transport.
//!
//! Wires the database, vector backend, and tool handler into a running
//! server. Stdout belongs to the JSON-RPC framing; all logging goes to
//! stderr.

use anyhow::Result;
use rmcp::ServiceExt;
use std::sync::{Arc, Mutex};

use crate::config::{OracleConfig, VECTOR_COLLECTION};
use crate::db;
use crate::tools::OracleTools;
use crate::vector::child::ChildProcessBackend;
use crate::vector::VectorBackend;

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: OracleConfig) -> Result<()> {
    tracing::info!("starting Oracle MCP server on stdio");

    let conn = db::open_database(&config.db_path)?;
    let db = Arc::new(Mutex::new(conn));

    let vector: Arc<dyn VectorBackend> = Arc::new(ChildProcessBackend::new(&config.vector));

    // Pre-warm the vector bridge before the tool server takes over stdio.
    // Failure here is fine — retrieval degrades to keyword-only.
    {
        let vector = Arc::clone(&vector);
        let warmed = tokio::task::spawn_blocking(move || vector.stats(VECTOR_COLLECTION)).await;
        match warmed {
            Ok(Ok(stats)) => tracing::info!(count = stats.count, "vector backend ready"),
            Ok(Err(e)) => tracing::warn!(error = %e, "vector backend unavailable at startup"),
            Err(e) => tracing::warn!(error = %e, "vector warm-up task failed"),
        }
    }

    let tools = OracleTools::new(db, vector, Arc::new(config));
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running — waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}
