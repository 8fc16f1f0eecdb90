//! Parameter definitions for the trace MCP tools.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for `oracle_trace`. `action` selects between recording a new
/// trace (default) and distilling an existing one.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TraceParams {
    #[schemars(description = "'create' (default) records a new trace; 'distill' attaches an awakening to an existing one")]
    pub action: Option<String>,

    #[schemars(description = "The discovery query (required for create)")]
    pub query: Option<String>,

    #[schemars(description = "Kind of discovery session, e.g. 'discovery', 'debug'")]
    pub query_type: Option<String>,

    #[schemars(description = "Files dug up during the session")]
    pub files: Option<Vec<String>>,

    #[schemars(description = "Commits dug up during the session")]
    pub commits: Option<Vec<String>>,

    #[schemars(description = "Issues dug up during the session")]
    pub issues: Option<Vec<String>>,

    #[schemars(description = "Retro documents dug up during the session")]
    pub retros: Option<Vec<String>>,

    #[schemars(description = "Learnings dug up during the session")]
    pub learnings: Option<Vec<String>>,

    #[schemars(description = "Resonance files dug up during the session")]
    pub resonance: Option<Vec<String>>,

    #[schemars(description = "Parent trace id for a follow-up session")]
    pub parent_trace_id: Option<String>,

    #[schemars(description = "Trace id to distill (required for distill)")]
    pub trace_id: Option<String>,

    #[schemars(description = "The distilled insight (required for distill)")]
    pub awakening: Option<String>,

    #[schemars(description = "Promote the awakening into a new learning (distill only)")]
    pub promote_to_learning: Option<bool>,
}

/// Parameters for `oracle_trace_list`.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TraceListParams {
    #[schemars(description = "Filter by status: 'raw', 'reviewed', 'distilling', 'distilled'")]
    pub status: Option<String>,

    #[schemars(description = "Maximum traces returned. Defaults to 20.")]
    pub limit: Option<usize>,

    #[schemars(description = "Pagination offset. Defaults to 0.")]
    pub offset: Option<usize>,
}

/// Parameters for `oracle_trace_get`.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TraceGetParams {
    #[schemars(description = "Trace id")]
    pub trace_id: String,

    #[schemars(description = "Walk the parent/child chain instead: 'up', 'down', or 'both'")]
    pub chain: Option<String>,
}
