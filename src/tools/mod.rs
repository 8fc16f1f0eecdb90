//! The Oracle MCP tool handler.
//!
//! Holds shared state (store connection, vector backend, config) and exposes
//! the fixed `oracle_*` tool set via the `#[tool_router]` macro. Each tool
//! validates its input, runs the corresponding knowledge-engine call on a
//! blocking thread, and returns the result as JSON text.

pub mod consult;
pub mod decisions;
pub mod learn;
pub mod search;
pub mod threads;
pub mod trace;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

use crate::config::{OracleConfig, VECTOR_COLLECTION};
use crate::error::OracleError;
use crate::knowledge::consult::{consult as run_consult, ConsultRequest};
use crate::knowledge::learn::{learn as run_learn, LearnRequest};
use crate::knowledge::project;
use crate::knowledge::search::{search as run_search, SearchRequest};
use crate::knowledge::trace::{ChainDirection, DigPoints, TraceCreate};
use crate::knowledge::types::{parse_type_filter, MessageRole, SearchMode};
use crate::knowledge::{browse, dashboard, decisions as decision_ops, forum, trace as trace_ops};
use crate::vector::VectorBackend;

use consult::ConsultParams;
use decisions::{DecisionsCreateParams, DecisionsGetParams, DecisionsListParams, DecisionsUpdateParams};
use learn::LearnParams;
use search::{ConceptsParams, ListParams, ReflectParams, SearchParams, StatsParams};
use threads::{ThreadParams, ThreadReadParams, ThreadUpdateParams, ThreadsParams};
use trace::{TraceGetParams, TraceListParams, TraceParams};

/// The Oracle MCP tool handler.
#[derive(Clone)]
pub struct OracleTools {
    tool_router: ToolRouter<Self>,
    db: Arc<Mutex<Connection>>,
    vector: Arc<dyn VectorBackend>,
    config: Arc<OracleConfig>,
}

impl OracleTools {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        vector: Arc<dyn VectorBackend>,
        config: Arc<OracleConfig>,
    ) -> Self {
        Self {
            tool_router: Self::tool_router(),
            db,
            vector,
            config,
        }
    }

    /// Run a knowledge-engine call on a blocking thread and JSON-encode the
    /// result. Tool errors are plain strings; the SDK turns them into
    /// `isError` content blocks.
    async fn run<T, F>(&self, f: F) -> Result<String, String>
    where
        T: serde::Serialize + Send + 'static,
        F: FnOnce(&mut Connection, &dyn VectorBackend, &OracleConfig) -> Result<T, OracleError>
            + Send
            + 'static,
    {
        let db = Arc::clone(&self.db);
        let vector = Arc::clone(&self.vector);
        let config = Arc::clone(&self.config);

        let result = tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| OracleError::Internal(anyhow::anyhow!("db lock poisoned: {e}")))?;
            f(&mut conn, vector.as_ref(), &config)
        })
        .await
        .map_err(|e| format!("task failed: {e}"))?
        .map_err(|e| e.to_string())?;

        serde_json::to_string(&result).map_err(|e| format!("serialization failed: {e}"))
    }
}

#[tool_router]
impl OracleTools {
    /// Hybrid search over the knowledge base.
    #[tool(description = "Search the knowledge base. Hybrid keyword + semantic retrieval over principles, learnings, patterns, and retros.")]
    async fn oracle_search(
        &self,
        Parameters(params): Parameters<SearchParams>,
    ) -> Result<String, String> {
        tracing::info!(query = %params.query, "oracle_search called");
        self.run(move |conn, vector, _config| {
            let doc_type =
                parse_type_filter(params.r#type.as_deref()).map_err(OracleError::Validation)?;
            let mode: SearchMode = params
                .mode
                .as_deref()
                .unwrap_or("")
                .parse()
                .map_err(OracleError::Validation)?;
            let scope = project::resolve(conn, params.project.as_deref(), params.cwd.as_deref());

            run_search(
                conn,
                vector,
                VECTOR_COLLECTION,
                &SearchRequest {
                    query: params.query,
                    doc_type,
                    limit: params.limit.unwrap_or(10),
                    offset: params.offset.unwrap_or(0),
                    mode,
                    project: scope,
                },
            )
        })
        .await
    }

    /// Consult the knowledge base about a decision.
    #[tool(description = "Consult the knowledge base about a decision. Returns matching principles, patterns, and templated guidance.")]
    async fn oracle_consult(
        &self,
        Parameters(params): Parameters<ConsultParams>,
    ) -> Result<String, String> {
        tracing::info!(decision = %params.decision, "oracle_consult called");
        self.run(move |conn, vector, _config| {
            let scope = project::resolve(conn, params.project.as_deref(), params.cwd.as_deref());
            run_consult(
                conn,
                vector,
                VECTOR_COLLECTION,
                &ConsultRequest {
                    decision: params.decision,
                    context: params.context,
                    project: scope,
                },
            )
        })
        .await
    }

    /// One randomly chosen principle or learning, full content.
    #[tool(description = "Return one random principle or learning with full content, for reflection.")]
    async fn oracle_reflect(
        &self,
        Parameters(_params): Parameters<ReflectParams>,
    ) -> Result<String, String> {
        self.run(move |conn, _vector, _config| browse::reflect(conn)).await
    }

    /// Record a new learning.
    #[tool(description = "Record a new learning: writes a markdown file and indexes it for keyword search immediately.")]
    async fn oracle_learn(
        &self,
        Parameters(params): Parameters<LearnParams>,
    ) -> Result<String, String> {
        tracing::info!(pattern_len = params.pattern.len(), "oracle_learn called");
        self.run(move |conn, _vector, config| {
            let origin = params
                .origin
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(OracleError::Validation)?;
            let scope = project::resolve(conn, params.project.as_deref(), params.cwd.as_deref());
            run_learn(
                conn,
                &config.learnings_dir(),
                &LearnRequest {
                    pattern: params.pattern,
                    source: params.source,
                    concepts: params.concepts.unwrap_or_default(),
                    origin,
                    project: scope.tag().map(str::to_string),
                },
            )
        })
        .await
    }

    /// Browse indexed documents.
    #[tool(description = "List indexed documents, grouped by source file by default.")]
    async fn oracle_list(
        &self,
        Parameters(params): Parameters<ListParams>,
    ) -> Result<String, String> {
        self.run(move |conn, _vector, _config| {
            let doc_type =
                parse_type_filter(params.r#type.as_deref()).map_err(OracleError::Validation)?;
            browse::list(
                conn,
                doc_type,
                params.limit.unwrap_or(20),
                params.offset.unwrap_or(0),
                params.group_by_file.unwrap_or(true),
            )
        })
        .await
    }

    /// Knowledge base statistics.
    #[tool(description = "Knowledge base statistics: document counts, concept leaderboard, recent activity, index health.")]
    async fn oracle_stats(
        &self,
        Parameters(_params): Parameters<StatsParams>,
    ) -> Result<String, String> {
        self.run(move |conn, _vector, _config| {
            dashboard::summary(conn).map_err(OracleError::Internal)
        })
        .await
    }

    /// Concept tag counts.
    #[tool(description = "Concept tag counts across documents, sorted descending.")]
    async fn oracle_concepts(
        &self,
        Parameters(params): Parameters<ConceptsParams>,
    ) -> Result<String, String> {
        self.run(move |conn, _vector, _config| {
            let doc_type =
                parse_type_filter(params.r#type.as_deref()).map_err(OracleError::Validation)?;
            browse::concept_counts(conn, doc_type, params.limit.unwrap_or(20))
                .map_err(OracleError::Internal)
        })
        .await
    }

    /// Post a message to a forum thread.
    #[tool(description = "Post a message to a forum thread (creating it if needed). The oracle auto-replies with guidance.")]
    async fn oracle_thread(
        &self,
        Parameters(params): Parameters<ThreadParams>,
    ) -> Result<String, String> {
        self.run(move |conn, vector, _config| {
            let role = params
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
                    message: params.message,
                    thread_id: params.thread_id,
                    title: params.title,
                    role,
                    project: params.project,
                },
            )
        })
        .await
    }

    /// List forum threads.
    #[tool(description = "List forum threads, optionally filtered by status.")]
    async fn oracle_threads(
        &self,
        Parameters(params): Parameters<ThreadsParams>,
    ) -> Result<String, String> {
        self.run(move |conn, _vector, _config| {
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
        .await
    }

    /// Read one thread with all messages.
    #[tool(description = "Read one forum thread with all of its messages.")]
    async fn oracle_thread_read(
        &self,
        Parameters(params): Parameters<ThreadReadParams>,
    ) -> Result<String, String> {
        self.run(move |conn, _vector, _config| forum::get_thread(conn, &params.thread_id))
            .await
    }

    /// Update a thread's status.
    #[tool(description = "Update a forum thread's status tag.")]
    async fn oracle_thread_update(
        &self,
        Parameters(params): Parameters<ThreadUpdateParams>,
    ) -> Result<String, String> {
        self.run(move |conn, _vector, _config| {
            let status = params
                .status
                .parse()
                .map_err(OracleError::Validation)?;
            forum::update_thread_status(conn, &params.thread_id, status)
        })
        .await
    }

    /// List decision records.
    #[tool(description = "List decision records, filterable by status and project.")]
    async fn oracle_decisions_list(
        &self,
        Parameters(params): Parameters<DecisionsListParams>,
    ) -> Result<String, String> {
        self.run(move |conn, _vector, _config| {
            let status = params
                .status
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(OracleError::Validation)?;
            decision_ops::list(
                conn,
                status,
                params.project.as_deref(),
                params.limit.unwrap_or(20),
                params.offset.unwrap_or(0),
            )
        })
        .await
    }

    /// Create a decision record.
    #[tool(description = "Create a decision record in 'pending' status.")]
    async fn oracle_decisions_create(
        &self,
        Parameters(params): Parameters<DecisionsCreateParams>,
    ) -> Result<String, String> {
        self.run(move |conn, _vector, _config| {
            decision_ops::create(
                conn,
                &decision_ops::DecisionCreate {
                    title: params.title,
                    context: params.context,
                    options: params.options.unwrap_or_default(),
                    project: params.project,
                    tags: params.tags.unwrap_or_default(),
                },
            )
        })
        .await
    }

    /// Fetch one decision.
    #[tool(description = "Fetch one decision record by id.")]
    async fn oracle_decisions_get(
        &self,
        Parameters(params): Parameters<DecisionsGetParams>,
    ) -> Result<String, String> {
        self.run(move |conn, _vector, _config| decision_ops::get(conn, &params.id))
            .await
    }

    /// Update a decision and/or transition its status.
    #[tool(description = "Update decision fields and optionally transition its status; illegal transitions are rejected.")]
    async fn oracle_decisions_update(
        &self,
        Parameters(params): Parameters<DecisionsUpdateParams>,
    ) -> Result<String, String> {
        self.run(move |conn, _vector, _config| {
            let updated = decision_ops::update(
                conn,
                &params.id,
                &decision_ops::DecisionUpdate {
                    title: params.title,
                    context: params.context,
                    options: params.options,
                    decision: params.decision,
                    rationale: params.rationale,
                    tags: params.tags,
                },
            )?;
            match params.status {
                Some(status) => {
                    let status = status.parse().map_err(OracleError::Validation)?;
                    decision_ops::transition_status(
                        conn,
                        &params.id,
                        status,
                        params.decided_by.as_deref(),
                    )
                }
                None => Ok(updated),
            }
        })
        .await
    }

    /// Record or distill a discovery trace.
    #[tool(description = "Record a discovery trace (default), or with action='distill' attach an awakening and optionally promote it to a learning.")]
    async fn oracle_trace(
        &self,
        Parameters(params): Parameters<TraceParams>,
    ) -> Result<String, String> {
        self.run(move |conn, _vector, config| match params.action.as_deref() {
            None | Some("create") => {
                let query = params.query.clone().ok_or_else(|| {
                    OracleError::Validation("query is required for create".into())
                })?;
                trace_ops::create(
                    conn,
                    &TraceCreate {
                        query,
                        query_type: params.query_type.clone(),
                        dig: DigPoints {
                            files: params.files.clone().unwrap_or_default(),
                            commits: params.commits.clone().unwrap_or_default(),
                            issues: params.issues.clone().unwrap_or_default(),
                            retros: params.retros.clone().unwrap_or_default(),
                            learnings: params.learnings.clone().unwrap_or_default(),
                            resonance: params.resonance.clone().unwrap_or_default(),
                        },
                        parent_trace_id: params.parent_trace_id.clone(),
                    },
                )
                .map(|t| serde_json::to_value(t).unwrap_or_default())
            }
            Some("distill") => {
                let trace_id = params.trace_id.as_deref().ok_or_else(|| {
                    OracleError::Validation("trace_id is required for distill".into())
                })?;
                let awakening = params.awakening.as_deref().ok_or_else(|| {
                    OracleError::Validation("awakening is required for distill".into())
                })?;
                trace_ops::distill(
                    conn,
                    &config.learnings_dir(),
                    trace_id,
                    awakening,
                    params.promote_to_learning.unwrap_or(false),
                )
                .map(|o| serde_json::to_value(o).unwrap_or_default())
            }
            Some(other) => Err(OracleError::Validation(format!(
                "unknown trace action: {other}"
            ))),
        })
        .await
    }

    /// List traces.
    #[tool(description = "List discovery traces, newest first, filterable by status.")]
    async fn oracle_trace_list(
        &self,
        Parameters(params): Parameters<TraceListParams>,
    ) -> Result<String, String> {
        self.run(move |conn, _vector, _config| {
            let status = params
                .status
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(OracleError::Validation)?;
            trace_ops::list(
                conn,
                status,
                params.limit.unwrap_or(20),
                params.offset.unwrap_or(0),
            )
        })
        .await
    }

    /// Fetch one trace, or walk its chain.
    #[tool(description = "Fetch one trace by id, or walk its parent/child chain with chain='up'|'down'|'both'.")]
    async fn oracle_trace_get(
        &self,
        Parameters(params): Parameters<TraceGetParams>,
    ) -> Result<String, String> {
        self.run(move |conn, _vector, _config| match params.chain.as_deref() {
            Some(direction) => {
                let direction: ChainDirection =
                    direction.parse().map_err(OracleError::Validation)?;
                trace_ops::chain(conn, &params.trace_id, direction)
                    .map(|c| serde_json::to_value(c).unwrap_or_default())
            }
            None => trace_ops::get(conn, &params.trace_id)
                .map(|t| serde_json::to_value(t).unwrap_or_default()),
        })
        .await
    }
}

#[tool_handler]
impl ServerHandler for OracleTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "Oracle is a personal knowledge memory layer. Use oracle_search for hybrid \
                 retrieval, oracle_consult before decisions, oracle_learn to record patterns, \
                 and the thread/decision/trace tools for ongoing records."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
