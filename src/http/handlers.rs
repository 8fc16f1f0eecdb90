//! HTTP API handlers.
//!
//! Every endpoint drives the same knowledge-engine functions as the MCP
//! tools. Handlers move blocking store work onto `spawn_blocking`; errors
//! serialize as `{error: message}` with the status carried by
//! [`OracleError`].

use axum::extract::{Path as AxumPath, Query, State};
use axum::Json;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::config::{OracleConfig, VECTOR_COLLECTION};
use crate::error::OracleError;
use crate::knowledge::consult::{consult, ConsultRequest};
use crate::knowledge::learn::{learn, LearnRequest};
use crate::knowledge::project::{self, ProjectScope};
use crate::knowledge::search::{search, SearchRequest};
use crate::knowledge::trace::{ChainDirection, DigPoints, TraceCreate};
use crate::knowledge::types::{parse_type_filter, MessageRole, SearchMode};
use crate::knowledge::{browse, dashboard, decisions, forum, trace};
use crate::vector::VectorBackend;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub vector: Arc<dyn VectorBackend>,
    pub config: Arc<OracleConfig>,
}

impl AppState {
    /// Run store work on a blocking thread under the single-writer lock.
    async fn run<T, F>(&self, f: F) -> Result<T, OracleError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, &dyn VectorBackend, &OracleConfig) -> Result<T, OracleError>
            + Send
            + 'static,
    {
        let db = Arc::clone(&self.db);
        let vector = Arc::clone(&self.vector);
        let config = Arc::clone(&self.config);

        tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| OracleError::Internal(anyhow::anyhow!("db lock poisoned: {e}")))?;
            f(&mut conn, vector.as_ref(), &config)
        })
        .await
        .map_err(|e| OracleError::Internal(anyhow::anyhow!("task failed: {e}")))?
    }
}

fn resolve_scope(conn: &Connection, project: Option<&str>, cwd: Option<&str>) -> ProjectScope {
    project::resolve(conn, project, cwd)
}

// ── Health ───────────────────────────────────────────────────────────────────

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// ── Search / consult / reflect ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SearchQueryParams {
    pub q: Option<String>,
    pub r#type: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub mode: Option<String>,
    pub project: Option<String>,
    pub cwd: Option<String>,
}

pub async fn api_search(
    State(state): State<AppState>,
    Query(params): Query<SearchQueryParams>,
) -> Result<Json<Value>, OracleError> {
    let response = state
        .run(move |conn, vector, _config| {
            let query = params
                .q
                .ok_or_else(|| OracleError::Validation("q is required".into()))?;
            let doc_type =
                parse_type_filter(params.r#type.as_deref()).map_err(OracleError::Validation)?;
            let mode: SearchMode = params
                .mode
                .as_deref()
                .unwrap_or("")
                .parse()
                .map_err(OracleError::Validation)?;
            let scope = resolve_scope(conn, params.project.as_deref(), params.cwd.as_deref());
            search(
                conn,
                vector,
                VECTOR_COLLECTION,
                &SearchRequest {
                    query,
                    doc_type,
                    limit: params.limit.unwrap_or(10),
                    offset: params.offset.unwrap_or(0),
                    mode,
                    project: scope,
                },
            )
        })
        .await?;
    Ok(Json(serde_json::to_value(response)?))
}

#[derive(Debug, Deserialize)]
pub struct ConsultQueryParams {
    pub q: Option<String>,
    pub context: Option<String>,
    pub project: Option<String>,
    pub cwd: Option<String>,
}

pub async fn api_consult(
    State(state): State<AppState>,
    Query(params): Query<ConsultQueryParams>,
) -> Result<Json<Value>, OracleError> {
    let response = state
        .run(move |conn, vector, _config| {
            let decision = params
                .q
                .ok_or_else(|| OracleError::Validation("q is required".into()))?;
            let scope = resolve_scope(conn, params.project.as_deref(), params.cwd.as_deref());
            consult(
                conn,
                vector,
                VECTOR_COLLECTION,
                &ConsultRequest {
                    decision,
                    context: params.context,
                    project: scope,
                },
            )
        })
        .await?;
    Ok(Json(serde_json::to_value(response)?))
}

pub async fn api_reflect(State(state): State<AppState>) -> Result<Json<Value>, OracleError> {
    let doc = state
        .run(move |conn, _vector, _config| browse::reflect(conn))
        .await?;
    Ok(Json(serde_json::to_value(doc)?))
}

// ── Browse ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListQueryParams {
    pub r#type: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub group: Option<bool>,
}

pub async fn api_list(
    State(state): State<AppState>,
    Query(params): Query<ListQueryParams>,
) -> Result<Json<Value>, OracleError> {
    let response = state
        .run(move |conn, _vector, _config| {
            let doc_type =
                parse_type_filter(params.r#type.as_deref()).map_err(OracleError::Validation)?;
            browse::list(
                conn,
                doc_type,
                params.limit.unwrap_or(20),
                params.offset.unwrap_or(0),
                params.group.unwrap_or(true),
            )
        })
        .await?;
    Ok(Json(serde_json::to_value(response)?))
}

#[derive(Debug, Deserialize)]
pub struct ConceptsQueryParams {
    pub r#type: Option<String>,
    pub limit: Option<usize>,
}

pub async fn api_concepts(
    State(state): State<AppState>,
    Query(params): Query<ConceptsQueryParams>,
) -> Result<Json<Value>, OracleError> {
    let counts = state
        .run(move |conn, _vector, _config| {
            let doc_type =
                parse_type_filter(params.r#type.as_deref()).map_err(OracleError::Validation)?;
            browse::concept_counts(conn, doc_type, params.limit.unwrap_or(20))
                .map_err(OracleError::Internal)
        })
        .await?;
    Ok(Json(serde_json::to_value(counts)?))
}

pub async fn api_graph(State(state): State<AppState>) -> Result<Json<Value>, OracleError> {
    let graph = state
        .run(move |conn, _vector, _config| browse::graph(conn).map_err(OracleError::Internal))
        .await?;
    Ok(Json(serde_json::to_value(graph)?))
}

pub async fn api_projects(State(state): State<AppState>) -> Result<Json<Value>, OracleError> {
    let projects = state
        .run(move |conn, _vector, _config| project::list(conn).map_err(OracleError::Internal))
        .await?;
    Ok(Json(serde_json::to_value(projects)?))
}

// ── Learn ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LearnBody {
    pub pattern: String,
    pub source: Option<String>,
    pub concepts: Option<Vec<String>>,
    pub origin: Option<String>,
    pub project: Option<String>,
    pub cwd: Option<String>,
}

pub async fn api_learn(
    State(state): State<AppState>,
    Json(body): Json<LearnBody>,
) -> Result<Json<Value>, OracleError> {
    let outcome = state
        .run(move |conn, _vector, config| {
            let origin = body
                .origin
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(OracleError::Validation)?;
            let scope = resolve_scope(conn, body.project.as_deref(), body.cwd.as_deref());
            learn(
                conn,
                &config.learnings_dir(),
                &LearnRequest {
                    pattern: body.pattern,
                    source: body.source,
                    concepts: body.concepts.unwrap_or_default(),
                    origin,
                    project: scope.tag().map(str::to_string),
                },
            )
        })
        .await?;
    Ok(Json(serde_json::to_value(outcome)?))
}

// ── File access ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct FileQueryParams {
    pub path: String,
}

/// Read a file from the knowledge repository. Both the repo root and the
/// requested path are canonicalized and the request must stay inside the
/// root, so symlinks cannot escape it.
pub async fn api_file(
    State(state): State<AppState>,
    Query(params): Query<FileQueryParams>,
) -> Result<Json<Value>, OracleError> {
    let repo_root = state.config.repo_root.clone();
    let requested = params.path.clone();

    let (path, content) = tokio::task::spawn_blocking(move || {
        let root = repo_root
            .canonicalize()
            .map_err(|e| OracleError::Internal(anyhow::anyhow!("repo root unavailable: {e}")))?;

        let candidate = PathBuf::from(&requested);
        let absolute = if candidate.is_absolute() {
            candidate
        } else {
            root.join(candidate)
        };
        let resolved = absolute
            .canonicalize()
            .map_err(|_| OracleError::NotFound(format!("file not found: {requested}")))?;

        if !resolved.starts_with(&root) {
            return Err(OracleError::Validation(
                "path escapes the repository root".into(),
            ));
        }

        let content = std::fs::read_to_string(&resolved)
            .map_err(|e| OracleError::Internal(anyhow::anyhow!("failed to read file: {e}")))?;
        Ok((resolved.display().to_string(), content))
    })
    .await
    .map_err(|e| OracleError::Internal(anyhow::anyhow!("task failed: {e}")))??;

    Ok(Json(json!({ "path": path, "content": content })))
}

// ── Dashboard ────────────────────────────────────────────────────────────────

pub async fn api_stats(State(state): State<AppState>) -> Result<Json<Value>, OracleError> {
    let summary = state
        .run(move |conn, _vector, _config| {
            dashboard::summary(conn).map_err(OracleError::Internal)
        })
        .await?;
    Ok(Json(serde_json::to_value(summary)?))
}

#[derive(Debug, Deserialize)]
pub struct ActivityQueryParams {
    pub days: Option<i64>,
}

pub async fn api_dashboard_activity(
    State(state): State<AppState>,
    Query(params): Query<ActivityQueryParams>,
) -> Result<Json<Value>, OracleError> {
    let activity = state
        .run(move |conn, _vector, _config| {
            dashboard::activity(conn, params.days.unwrap_or(7)).map_err(OracleError::Internal)
        })
        .await?;
    Ok(Json(serde_json::to_value(activity)?))
}

#[derive(Debug, Deserialize)]
pub struct GrowthQueryParams {
    pub period: Option<String>,
}

pub async fn api_dashboard_growth(
    State(state): State<AppState>,
    Query(params): Query<GrowthQueryParams>,
) -> Result<Json<Value>, OracleError> {
    let growth = state
        .run(move |conn, _vector, _config| {
            let period = params.period.unwrap_or_else(|| "week".to_string());
            match period.as_str() {
                "week" | "month" | "quarter" => {
                    dashboard::growth(conn, &period).map_err(OracleError::Internal)
                }
                other => Err(OracleError::Validation(format!(
                    "unknown growth period: {other}"
                ))),
            }
        })
        .await?;
    Ok(Json(serde_json::to_value(growth)?))
}

#[derive(Debug, Deserialize)]
pub struct SessionStatsQueryParams {
    pub since: Option<String>,
}

pub async fn api_session_stats(
    State(state): State<AppState>,
    Query(params): Query<SessionStatsQueryParams>,
) -> Result<Json<Value>, OracleError> {
    let stats = state
        .run(move |conn, _vector, _config| {
            let since = params
                .since
                .ok_or_else(|| OracleError::Validation("since is required".into()))?;
            dashboard::session_stats(conn, &since).map_err(OracleError::Internal)
        })
        .await?;
    Ok(Json(serde_json::to_value(stats)?))
}

// ── Threads ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ThreadsQueryParams {
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn api_threads(
    State(state): State<AppState>,
    Query(params): Query<ThreadsQueryParams>,
) -> Result<Json<Value>, OracleError> {
    let threads = state
        .run(move |conn, _vector, _config| {
            let status = params
                .status
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(OracleError::Validation)?;
            forum::list_threads(
                conn,
                status,
                params.limit.unwrap_or(20),
                params.offset.unwrap_or(0),
            )
        })
        .await?;
    Ok(Json(serde_json::to_value(threads)?))
}

#[derive(Debug, Deserialize)]
pub struct ThreadBody {
    pub message: String,
    pub thread_id: Option<String>,
    pub title: Option<String>,
    pub role: Option<String>,
    pub project: Option<String>,
}

pub async fn api_thread_post(
    State(state): State<AppState>,
    Json(body): Json<ThreadBody>,
) -> Result<Json<Value>, OracleError> {
    let outcome = state
        .run(move |conn, vector, _config| {
            let role = body
                .role
                .as_deref()
                .map(str::parse::<MessageRole>)
                .transpose()
                .map_err(OracleError::Validation)?;
            forum::handle_thread_message(
                conn,
                vector,
                VECTOR_COLLECTION,
                &forum::ThreadMessageInput {
                    message: body.message,
                    thread_id: body.thread_id,
                    title: body.title,
                    role,
                    project: body.project,
                },
            )
        })
        .await?;
    Ok(Json(serde_json::to_value(outcome)?))
}

pub async fn api_thread_get(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<Value>, OracleError> {
    let detail = state
        .run(move |conn, _vector, _config| forum::get_thread(conn, &id))
        .await?;
    Ok(Json(serde_json::to_value(detail)?))
}

#[derive(Debug, Deserialize)]
pub struct ThreadStatusBody {
    pub status: String,
}

pub async fn api_thread_status(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(body): Json<ThreadStatusBody>,
) -> Result<Json<Value>, OracleError> {
    let thread = state
        .run(move |conn, _vector, _config| {
            let status = body.status.parse().map_err(OracleError::Validation)?;
            forum::update_thread_status(conn, &id, status)
        })
        .await?;
    Ok(Json(serde_json::to_value(thread)?))
}

// ── Decisions ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DecisionsQueryParams {
    pub status: Option<String>,
    pub project: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn api_decisions_list(
    State(state): State<AppState>,
    Query(params): Query<DecisionsQueryParams>,
) -> Result<Json<Value>, OracleError> {
    let list = state
        .run(move |conn, _vector, _config| {
            let status = params
                .status
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(OracleError::Validation)?;
            decisions::list(
                conn,
                status,
                params.project.as_deref(),
                params.limit.unwrap_or(20),
                params.offset.unwrap_or(0),
            )
        })
        .await?;
    Ok(Json(serde_json::to_value(list)?))
}

#[derive(Debug, Deserialize)]
pub struct DecisionCreateBody {
    pub title: String,
    pub context: Option<String>,
    pub options: Option<Vec<String>>,
    pub project: Option<String>,
    pub tags: Option<Vec<String>>,
}

pub async fn api_decisions_create(
    State(state): State<AppState>,
    Json(body): Json<DecisionCreateBody>,
) -> Result<Json<Value>, OracleError> {
    let decision = state
        .run(move |conn, _vector, _config| {
            decisions::create(
                conn,
                &decisions::DecisionCreate {
                    title: body.title,
                    context: body.context,
                    options: body.options.unwrap_or_default(),
                    project: body.project,
                    tags: body.tags.unwrap_or_default(),
                },
            )
        })
        .await?;
    Ok(Json(serde_json::to_value(decision)?))
}

pub async fn api_decisions_get(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<Value>, OracleError> {
    let decision = state
        .run(move |conn, _vector, _config| decisions::get(conn, &id))
        .await?;
    Ok(Json(serde_json::to_value(decision)?))
}

#[derive(Debug, Deserialize)]
pub struct DecisionUpdateBody {
    pub title: Option<String>,
    pub context: Option<String>,
    pub options: Option<Vec<String>>,
    pub decision: Option<String>,
    pub rationale: Option<String>,
    pub tags: Option<Vec<String>>,
}

pub async fn api_decisions_update(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(body): Json<DecisionUpdateBody>,
) -> Result<Json<Value>, OracleError> {
    let decision = state
        .run(move |conn, _vector, _config| {
            decisions::update(
                conn,
                &id,
                &decisions::DecisionUpdate {
                    title: body.title,
                    context: body.context,
                    options: body.options,
                    decision: body.decision,
                    rationale: body.rationale,
                    tags: body.tags,
                },
            )
        })
        .await?;
    Ok(Json(serde_json::to_value(decision)?))
}

#[derive(Debug, Deserialize)]
pub struct DecisionTransitionBody {
    pub status: String,
    pub decided_by: Option<String>,
}

pub async fn api_decisions_transition(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(body): Json<DecisionTransitionBody>,
) -> Result<Json<Value>, OracleError> {
    let decision = state
        .run(move |conn, _vector, _config| {
            let status = body.status.parse().map_err(OracleError::Validation)?;
            decisions::transition_status(conn, &id, status, body.decided_by.as_deref())
        })
        .await?;
    Ok(Json(serde_json::to_value(decision)?))
}

// ── Traces ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TraceListQueryParams {
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn api_trace_list(
    State(state): State<AppState>,
    Query(params): Query<TraceListQueryParams>,
) -> Result<Json<Value>, OracleError> {
    let traces = state
        .run(move |conn, _vector, _config| {
            let status = params
                .status
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(OracleError::Validation)?;
            trace::list(
                conn,
                status,
                params.limit.unwrap_or(20),
                params.offset.unwrap_or(0),
            )
        })
        .await?;
    Ok(Json(serde_json::to_value(traces)?))
}

#[derive(Debug, Deserialize)]
pub struct TraceCreateBody {
    pub query: String,
    pub query_type: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub commits: Vec<String>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub retros: Vec<String>,
    #[serde(default)]
    pub learnings: Vec<String>,
    #[serde(default)]
    pub resonance: Vec<String>,
    pub parent_trace_id: Option<String>,
}

pub async fn api_trace_create(
    State(state): State<AppState>,
    Json(body): Json<TraceCreateBody>,
) -> Result<Json<Value>, OracleError> {
    let created = state
        .run(move |conn, _vector, _config| {
            trace::create(
                conn,
                &TraceCreate {
                    query: body.query,
                    query_type: body.query_type,
                    dig: DigPoints {
                        files: body.files,
                        commits: body.commits,
                        issues: body.issues,
                        retros: body.retros,
                        learnings: body.learnings,
                        resonance: body.resonance,
                    },
                    parent_trace_id: body.parent_trace_id,
                },
            )
        })
        .await?;
    Ok(Json(serde_json::to_value(created)?))
}

#[derive(Debug, Deserialize)]
pub struct TraceGetQueryParams {
    pub chain: Option<String>,
}

pub async fn api_trace_get(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Query(params): Query<TraceGetQueryParams>,
) -> Result<Json<Value>, OracleError> {
    let value = state
        .run(move |conn, _vector, _config| match params.chain.as_deref() {
            Some(direction) => {
                let direction: ChainDirection =
                    direction.parse().map_err(OracleError::Validation)?;
                trace::chain(conn, &id, direction)
                    .map(|c| serde_json::to_value(c).unwrap_or_default())
            }
            None => trace::get(conn, &id).map(|t| serde_json::to_value(t).unwrap_or_default()),
        })
        .await?;
    Ok(Json(value))
}

#[derive(Debug, Deserialize)]
pub struct TraceDistillBody {
    pub awakening: String,
    #[serde(default)]
    pub promote_to_learning: bool,
}

pub async fn api_trace_distill(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(body): Json<TraceDistillBody>,
) -> Result<Json<Value>, OracleError> {
    let outcome = state
        .run(move |conn, _vector, config| {
            trace::distill(
                conn,
                &config.learnings_dir(),
                &id,
                &body.awakening,
                body.promote_to_learning,
            )
        })
        .await?;
    Ok(Json(serde_json::to_value(outcome)?))
}
