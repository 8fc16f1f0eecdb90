//! HTTP/JSON API server.
//!
//! Mirrors the MCP tool surface over REST, plus the dashboard and file
//! routes. Startup acquires an instance lock and writes a PID file so only
//! one server owns a data dir at a time; shutdown is cooperative with a 5 s
//! grace window.

pub mod handlers;
pub mod lock;

use anyhow::{Context, Result};
use axum::routing::{get, patch, post};
use axum::Router;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::config::OracleConfig;
use crate::corpus::indexer;
use crate::db;
use crate::vector::child::ChildProcessBackend;
use crate::vector::VectorBackend;
use handlers::AppState;
use lock::{InstanceLock, PidFile, LOCK_REFRESH_INTERVAL};

/// In-flight requests get this long after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Build the full API router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/search", get(handlers::api_search))
        .route("/api/consult", get(handlers::api_consult))
        .route("/api/reflect", get(handlers::api_reflect))
        .route("/api/stats", get(handlers::api_stats))
        .route("/api/list", get(handlers::api_list))
        .route("/api/graph", get(handlers::api_graph))
        .route("/api/concepts", get(handlers::api_concepts))
        .route("/api/projects", get(handlers::api_projects))
        .route("/api/learn", post(handlers::api_learn))
        .route("/api/file", get(handlers::api_file))
        .route("/api/dashboard", get(handlers::api_stats))
        .route("/api/dashboard/summary", get(handlers::api_stats))
        .route("/api/dashboard/activity", get(handlers::api_dashboard_activity))
        .route("/api/dashboard/growth", get(handlers::api_dashboard_growth))
        .route("/api/session/stats", get(handlers::api_session_stats))
        .route("/api/threads", get(handlers::api_threads))
        .route("/api/thread", post(handlers::api_thread_post))
        .route("/api/thread/{id}", get(handlers::api_thread_get))
        .route("/api/thread/{id}/status", patch(handlers::api_thread_status))
        .route(
            "/api/decisions",
            get(handlers::api_decisions_list).post(handlers::api_decisions_create),
        )
        .route(
            "/api/decisions/{id}",
            get(handlers::api_decisions_get).patch(handlers::api_decisions_update),
        )
        .route(
            "/api/decisions/{id}/transition",
            post(handlers::api_decisions_transition),
        )
        .route(
            "/api/trace",
            get(handlers::api_trace_list).post(handlers::api_trace_create),
        )
        .route("/api/trace/{id}", get(handlers::api_trace_get))
        .route("/api/trace/{id}/distill", post(handlers::api_trace_distill))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server and block until shutdown.
pub async fn serve(config: OracleConfig) -> Result<()> {
    // 1. Open the store (creates log tables if absent).
    let conn = db::open_database(&config.db_path)?;

    // 2. If we are starting, nothing is indexing.
    indexer::reset_stale(&conn)?;

    // 3-4. Single-instance lock, then the PID file.
    let instance_lock = Arc::new(InstanceLock::acquire(&config.lock_path())?);
    let _pid_file = PidFile::write(&config.pid_path(), config.port)?;

    let vector: Arc<dyn VectorBackend> = Arc::new(ChildProcessBackend::new(&config.vector));
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        vector,
        config: Arc::new(config.clone()),
    };

    // Keep the lock fresh while we are alive.
    let refresher = {
        let instance_lock = Arc::clone(&instance_lock);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(LOCK_REFRESH_INTERVAL);
            loop {
                interval.tick().await;
                instance_lock.refresh();
            }
        })
    };

    let bind_addr = format!("127.0.0.1:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "oracle HTTP server listening");

    // 5. Serve until a signal, then give in-flight requests a grace window.
    let shutdown = Arc::new(tokio::sync::Notify::new());
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            wait_for_signal().await;
            tracing::info!("shutdown signal received");
            shutdown.notify_waiters();
        });
    }

    let graceful = {
        let shutdown = Arc::clone(&shutdown);
        async move { shutdown.notified().await }
    };
    let server = async move {
        axum::serve(listener, router(state))
            .with_graceful_shutdown(graceful)
            .await
    };

    let deadline = {
        let shutdown = Arc::clone(&shutdown);
        async move {
            shutdown.notified().await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        }
    };

    tokio::select! {
        result = server => result.context("server error")?,
        _ = deadline => {
            tracing::warn!("grace window elapsed with requests still in flight");
        }
    }

    refresher.abort();
    tracing::info!("oracle HTTP server shut down");
    // PID file and lock are removed by their Drop impls.
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    }
}
