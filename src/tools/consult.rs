//! MCP `oracle_consult` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for `oracle_consult`.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ConsultParams {
    #[schemars(description = "The decision question to consult the knowledge base about")]
    pub decision: String,

    #[schemars(description = "Additional context for the decision")]
    pub context: Option<String>,

    #[schemars(description = "Project slug to scope results. Empty string means universal-only.")]
    pub project: Option<String>,

    #[schemars(description = "Working directory used to auto-detect the project when none is given")]
    pub cwd: Option<String>,
}
