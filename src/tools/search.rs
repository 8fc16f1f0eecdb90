//! Parameter definitions for the retrieval-side MCP tools.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for `oracle_search`.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchParams {
    #[schemars(description = "The search query")]
    pub query: String,

    #[schemars(description = "Filter by type: 'principle', 'learning', 'pattern', 'retro', or 'all'")]
    pub r#type: Option<String>,

    #[schemars(description = "Maximum results (1-100). Defaults to 10.")]
    pub limit: Option<usize>,

    #[schemars(description = "Pagination offset. Defaults to 0.")]
    pub offset: Option<usize>,

    #[schemars(description = "Search mode: 'hybrid' (default), 'fts', or 'vector'")]
    pub mode: Option<String>,

    #[schemars(description = "Project slug to scope results. Empty string means universal-only.")]
    pub project: Option<String>,

    #[schemars(description = "Working directory used to auto-detect the project when none is given")]
    pub cwd: Option<String>,
}

/// Parameters for `oracle_list`.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListParams {
    #[schemars(description = "Filter by type: 'principle', 'learning', 'pattern', 'retro', or 'all'")]
    pub r#type: Option<String>,

    #[schemars(description = "Maximum results (1-100). Defaults to 20.")]
    pub limit: Option<usize>,

    #[schemars(description = "Pagination offset. Defaults to 0.")]
    pub offset: Option<usize>,

    #[schemars(description = "Group results by source file (default true) so one row per file surfaces")]
    pub group_by_file: Option<bool>,
}

/// Parameters for `oracle_stats` (none).
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct StatsParams {}

/// Parameters for `oracle_reflect` (none).
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ReflectParams {}

/// Parameters for `oracle_concepts`.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ConceptsParams {
    #[schemars(description = "Filter by document type")]
    pub r#type: Option<String>,

    #[schemars(description = "Maximum concepts returned. Defaults to 20.")]
    pub limit: Option<usize>,
}
