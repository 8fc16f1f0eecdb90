//! Parameter definitions for the decision-record MCP tools.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for `oracle_decisions_list`.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DecisionsListParams {
    #[schemars(description = "Filter by status: 'pending', 'parked', 'researching', 'decided', 'implemented', 'closed'")]
    pub status: Option<String>,

    #[schemars(description = "Filter by project slug")]
    pub project: Option<String>,

    #[schemars(description = "Maximum decisions returned. Defaults to 20.")]
    pub limit: Option<usize>,

    #[schemars(description = "Pagination offset. Defaults to 0.")]
    pub offset: Option<usize>,
}

/// Parameters for `oracle_decisions_create`.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DecisionsCreateParams {
    #[schemars(description = "Title of the decision to be made")]
    pub title: String,

    #[schemars(description = "Background context")]
    pub context: Option<String>,

    #[schemars(description = "Options under consideration")]
    pub options: Option<Vec<String>>,

    #[schemars(description = "Project slug")]
    pub project: Option<String>,

    #[schemars(description = "Free-form tags")]
    pub tags: Option<Vec<String>>,
}

/// Parameters for `oracle_decisions_get`.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DecisionsGetParams {
    #[schemars(description = "Decision id")]
    pub id: String,
}

/// Parameters for `oracle_decisions_update`. Field updates and an optional
/// status transition in one call; illegal transitions are rejected.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DecisionsUpdateParams {
    #[schemars(description = "Decision id")]
    pub id: String,

    #[schemars(description = "New title")]
    pub title: Option<String>,

    #[schemars(description = "New context")]
    pub context: Option<String>,

    #[schemars(description = "Replacement options list")]
    pub options: Option<Vec<String>>,

    #[schemars(description = "The decision that was made")]
    pub decision: Option<String>,

    #[schemars(description = "Why the decision was made")]
    pub rationale: Option<String>,

    #[schemars(description = "Replacement tags list")]
    pub tags: Option<Vec<String>>,

    #[schemars(description = "Transition to this status (legality is enforced)")]
    pub status: Option<String>,

    #[schemars(description = "Recorded as decided_by when transitioning to 'decided'")]
    pub decided_by: Option<String>,
}
