//! Parameter definitions for the forum-thread MCP tools.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for `oracle_thread` — post a message, creating the thread if
/// needed. The oracle auto-replies unless the sender is the oracle.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ThreadParams {
    #[schemars(description = "The message content")]
    pub message: String,

    #[schemars(description = "Existing thread id. A new thread is created when omitted.")]
    pub thread_id: Option<String>,

    #[schemars(description = "Title for a new thread. Defaults to the message's first 50 characters.")]
    pub title: Option<String>,

    #[schemars(description = "Sender role: 'human' (default), 'oracle', or 'claude'")]
    pub role: Option<String>,

    #[schemars(description = "Project slug to tag a new thread with")]
    pub project: Option<String>,
}

/// Parameters for `oracle_threads`.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ThreadsParams {
    #[schemars(description = "Filter by status: 'active', 'answered', 'pending', 'closed'")]
    pub status: Option<String>,

    #[schemars(description = "Maximum threads returned. Defaults to 20.")]
    pub limit: Option<usize>,

    #[schemars(description = "Pagination offset. Defaults to 0.")]
    pub offset: Option<usize>,
}

/// Parameters for `oracle_thread_read`.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ThreadReadParams {
    #[schemars(description = "Thread id to read")]
    pub thread_id: String,
}

/// Parameters for `oracle_thread_update`.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ThreadUpdateParams {
    #[schemars(description = "Thread id to update")]
    pub thread_id: String,

    #[schemars(description = "New status: 'active', 'answered', 'pending', or 'closed'")]
    pub status: String,
}
