//! MCP `oracle_learn` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for `oracle_learn`.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct LearnParams {
    #[schemars(description = "The pattern or insight to record. Multi-line markdown allowed.")]
    pub pattern: String,

    #[schemars(description = "Where this pattern came from (e.g. a session or issue reference)")]
    pub source: Option<String>,

    #[schemars(description = "Concept tags. Extracted from the pattern text when omitted.")]
    pub concepts: Option<Vec<String>>,

    #[schemars(description = "Provenance origin: 'mother', 'arthur', 'volt', or 'human'")]
    pub origin: Option<String>,

    #[schemars(description = "Project slug to tag the learning with")]
    pub project: Option<String>,

    #[schemars(description = "Working directory used to auto-detect the project when none is given")]
    pub cwd: Option<String>,
}
