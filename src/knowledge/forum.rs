//! Forum — append-only threads with an oracle auto-reply.
//!
//! A human (or claude) message lands in a thread; the oracle consults the
//! knowledge base over the thread's recent context and appends its reply as
//! a second message. Messages are never edited or deleted.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

use crate::error::OracleError;
use crate::knowledge::consult::{consult, ConsultRequest};
use crate::knowledge::project::ProjectScope;
use crate::knowledge::truncate_chars;
use crate::knowledge::types::{MessageRole, ThreadStatus};
use crate::vector::VectorBackend;

/// New-thread titles derive from the first message's opening characters.
const TITLE_FROM_MESSAGE_CHARS: usize = 50;

/// How many prior messages feed the oracle's consultation context.
const CONTEXT_MESSAGES: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct Thread {
    pub id: String,
    pub title: String,
    pub status: String,
    pub project: Option<String>,
    pub created_by: Option<String>,
    pub issue_url: Option<String>,
    pub issue_number: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: i64,
    pub thread_id: String,
    pub role: String,
    pub content: String,
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principles_found: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patterns_found: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct ThreadMessageInput {
    pub message: String,
    pub thread_id: Option<String>,
    pub title: Option<String>,
    pub role: Option<MessageRole>,
    pub project: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ThreadMessageOutcome {
    pub thread: Thread,
    pub message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oracle_reply: Option<Message>,
}

#[derive(Debug, Serialize)]
pub struct ThreadDetail {
    pub thread: Thread,
    pub messages: Vec<Message>,
}

/// Post a message, creating the thread if needed, and append the oracle's
/// auto-reply unless the sender *is* the oracle.
pub fn handle_thread_message(
    conn: &Connection,
    backend: &dyn VectorBackend,
    collection: &str,
    input: &ThreadMessageInput,
) -> Result<ThreadMessageOutcome, OracleError> {
    let text = input.message.trim();
    if text.is_empty() {
        return Err(OracleError::Validation("message is required".into()));
    }
    let role = input.role.unwrap_or(MessageRole::Human);

    let thread = match input.thread_id.as_deref() {
        Some(id) => get_thread_row(conn, id)?,
        None => {
            let title = input
                .title
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| truncate_chars(text, TITLE_FROM_MESSAGE_CHARS));
            create_thread(conn, &title, role, input.project.as_deref())?
        }
    };

    let message = insert_message(conn, &thread.id, role, text, role.as_str(), None)?;

    // Oracle reply: consult over the thread's recent context.
    let oracle_reply = if role != MessageRole::Oracle {
        let context = recent_context(conn, &thread.id, message.id)?;
        let scope = match thread.project.as_deref() {
            Some(p) => ProjectScope::Tagged(p.to_string()),
            None => ProjectScope::All,
        };
        match consult(
            conn,
            backend,
            collection,
            &ConsultRequest {
                decision: text.to_string(),
                context,
                project: scope,
            },
        ) {
            Ok(result) => Some(insert_message(
                conn,
                &thread.id,
                MessageRole::Oracle,
                &result.guidance,
                "oracle",
                Some(ReplyStats {
                    principles_found: result.principles.len() as i64,
                    patterns_found: result.patterns.len() as i64,
                    search_query: text.to_string(),
                }),
            )?),
            Err(e) => {
                // The human message is already appended; a failed reply
                // should not unwind the post.
                tracing::warn!(error = %e, thread = %thread.id, "oracle auto-reply failed");
                None
            }
        }
    } else {
        None
    };

    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE forum_threads SET updated_at = ?1 WHERE id = ?2",
        params![now, thread.id],
    )?;

    Ok(ThreadMessageOutcome {
        thread: get_thread_row(conn, &thread.id)?,
        message,
        oracle_reply,
    })
}

struct ReplyStats {
    principles_found: i64,
    patterns_found: i64,
    search_query: String,
}

fn create_thread(
    conn: &Connection,
    title: &str,
    created_by: MessageRole,
    project: Option<&str>,
) -> Result<Thread, OracleError> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO forum_threads (id, title, status, project, created_by, created_at, updated_at) \
         VALUES (?1, ?2, 'active', ?3, ?4, ?5, ?5)",
        params![id, title, project, created_by.as_str(), now],
    )?;
    get_thread_row(conn, &id)
}

fn insert_message(
    conn: &Connection,
    thread_id: &str,
    role: MessageRole,
    content: &str,
    author: &str,
    stats: Option<ReplyStats>,
) -> Result<Message, OracleError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO forum_messages \
         (thread_id, role, content, author, principles_found, patterns_found, search_query, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            thread_id,
            role.as_str(),
            content,
            author,
            stats.as_ref().map(|s| s.principles_found),
            stats.as_ref().map(|s| s.patterns_found),
            stats.as_ref().map(|s| s.search_query.clone()),
            now,
        ],
    )?;
    let id = conn.last_insert_rowid();
    Ok(Message {
        id,
        thread_id: thread_id.to_string(),
        role: role.as_str().to_string(),
        content: content.to_string(),
        author: Some(author.to_string()),
        principles_found: stats.as_ref().map(|s| s.principles_found),
        patterns_found: stats.as_ref().map(|s| s.patterns_found),
        search_query: stats.map(|s| s.search_query),
        created_at: now,
    })
}

/// Concatenate the last few messages before `before_id` as consult context.
fn recent_context(
    conn: &Connection,
    thread_id: &str,
    before_id: i64,
) -> Result<Option<String>, OracleError> {
    let mut stmt = conn.prepare(
        "SELECT content FROM forum_messages WHERE thread_id = ?1 AND id < ?2 \
         ORDER BY id DESC LIMIT ?3",
    )?;
    let mut contents: Vec<String> = stmt
        .query_map(params![thread_id, before_id, CONTEXT_MESSAGES as i64], |row| {
            row.get(0)
        })?
        .collect::<Result<Vec<_>, _>>()?;
    contents.reverse();
    if contents.is_empty() {
        Ok(None)
    } else {
        Ok(Some(contents.join("\n")))
    }
}

fn get_thread_row(conn: &Connection, id: &str) -> Result<Thread, OracleError> {
    let thread = conn
        .query_row(
            "SELECT id, title, status, project, created_by, issue_url, issue_number, \
             created_at, updated_at FROM forum_threads WHERE id = ?1",
            params![id],
            |row| {
                Ok(Thread {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    status: row.get(2)?,
                    project: row.get(3)?,
                    created_by: row.get(4)?,
                    issue_url: row.get(5)?,
                    issue_number: row.get(6)?,
                    created_at: row.get(7)?,
                    updated_at: row.get(8)?,
                })
            },
        )
        .optional()?;
    thread.ok_or_else(|| OracleError::NotFound(format!("thread not found: {id}")))
}

/// Threads ordered by last activity.
pub fn list_threads(
    conn: &Connection,
    status: Option<ThreadStatus>,
    limit: usize,
    offset: usize,
) -> Result<Vec<Thread>, OracleError> {
    let mut sql = String::from(
        "SELECT id, title, status, project, created_by, issue_url, issue_number, \
         created_at, updated_at FROM forum_threads",
    );
    if status.is_some() {
        sql.push_str(" WHERE status = ?1 ORDER BY updated_at DESC LIMIT ?2 OFFSET ?3");
    } else {
        sql.push_str(" ORDER BY updated_at DESC LIMIT ?1 OFFSET ?2");
    }

    let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<Thread> {
        Ok(Thread {
            id: row.get(0)?,
            title: row.get(1)?,
            status: row.get(2)?,
            project: row.get(3)?,
            created_by: row.get(4)?,
            issue_url: row.get(5)?,
            issue_number: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    };

    let mut stmt = conn.prepare(&sql)?;
    let threads = match status {
        Some(s) => stmt
            .query_map(params![s.as_str(), limit as i64, offset as i64], map_row)?
            .collect::<Result<Vec<_>, _>>()?,
        None => stmt
            .query_map(params![limit as i64, offset as i64], map_row)?
            .collect::<Result<Vec<_>, _>>()?,
    };
    Ok(threads)
}

/// One thread with all of its messages in order.
pub fn get_thread(conn: &Connection, id: &str) -> Result<ThreadDetail, OracleError> {
    let thread = get_thread_row(conn, id)?;
    let mut stmt = conn.prepare(
        "SELECT id, thread_id, role, content, author, principles_found, patterns_found, \
         search_query, created_at FROM forum_messages WHERE thread_id = ?1 ORDER BY id",
    )?;
    let messages = stmt
        .query_map(params![id], |row| {
            Ok(Message {
                id: row.get(0)?,
                thread_id: row.get(1)?,
                role: row.get(2)?,
                content: row.get(3)?,
                author: row.get(4)?,
                principles_found: row.get(5)?,
                patterns_found: row.get(6)?,
                search_query: row.get(7)?,
                created_at: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ThreadDetail { thread, messages })
}

/// Set a thread's status. Any state may transition to any other; statuses
/// are filter tags, not a gate.
pub fn update_thread_status(
    conn: &Connection,
    id: &str,
    status: ThreadStatus,
) -> Result<Thread, OracleError> {
    get_thread_row(conn, id)?;
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE forum_threads SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now, id],
    )?;
    get_thread_row(conn, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::vector::{VectorHit, VectorStats};

    struct NoVector;

    impl VectorBackend for NoVector {
        fn ensure_collection(&self, _: &str) -> anyhow::Result<()> {
            Ok(())
        }
        fn upsert(&self, _: &str, _: &[crate::vector::VectorRecord]) -> anyhow::Result<()> {
            Ok(())
        }
        fn query(
            &self,
            _: &str,
            _: &str,
            _: usize,
            _: Option<&serde_json::Value>,
        ) -> anyhow::Result<Vec<VectorHit>> {
            anyhow::bail!("bridge not running")
        }
        fn stats(&self, _: &str) -> anyhow::Result<VectorStats> {
            anyhow::bail!("bridge not running")
        }
        fn delete_collection(&self, _: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn post(conn: &Connection, input: ThreadMessageInput) -> ThreadMessageOutcome {
        handle_thread_message(conn, &NoVector, "c", &input).unwrap()
    }

    #[test]
    fn new_thread_gets_title_from_message_and_oracle_reply() {
        let conn = db::open_memory_database().unwrap();
        let outcome = post(
            &conn,
            ThreadMessageInput {
                message: "should we adopt feature flags for the rollout process?".into(),
                ..Default::default()
            },
        );

        assert_eq!(outcome.thread.status, "active");
        assert_eq!(
            outcome.thread.title,
            "should we adopt feature flags for the rollout proc"
        );
        assert_eq!(outcome.message.role, "human");

        let reply = outcome.oracle_reply.expect("oracle reply expected");
        assert_eq!(reply.role, "oracle");
        assert_eq!(reply.author.as_deref(), Some("oracle"));
        assert_eq!(
            reply.search_query.as_deref(),
            Some("should we adopt feature flags for the rollout process?")
        );
        // Empty corpus → the no-match guidance template
        assert!(reply.content.starts_with("No matching principles or patterns"));
    }

    #[test]
    fn oracle_message_gets_no_auto_reply() {
        let conn = db::open_memory_database().unwrap();
        let outcome = post(
            &conn,
            ThreadMessageInput {
                message: "the oracle speaks".into(),
                role: Some(MessageRole::Oracle),
                ..Default::default()
            },
        );
        assert!(outcome.oracle_reply.is_none());

        let detail = get_thread(&conn, &outcome.thread.id).unwrap();
        assert_eq!(detail.messages.len(), 1);
    }

    #[test]
    fn follow_up_message_lands_in_same_thread() {
        let conn = db::open_memory_database().unwrap();
        let first = post(
            &conn,
            ThreadMessageInput {
                message: "first question".into(),
                ..Default::default()
            },
        );
        let second = post(
            &conn,
            ThreadMessageInput {
                message: "a follow-up".into(),
                thread_id: Some(first.thread.id.clone()),
                ..Default::default()
            },
        );

        assert_eq!(second.thread.id, first.thread.id);
        let detail = get_thread(&conn, &first.thread.id).unwrap();
        // two human messages + two oracle replies
        assert_eq!(detail.messages.len(), 4);
        assert!(detail.thread.updated_at >= first.thread.updated_at);
    }

    #[test]
    fn unknown_thread_is_not_found() {
        let conn = db::open_memory_database().unwrap();
        let err = handle_thread_message(
            &conn,
            &NoVector,
            "c",
            &ThreadMessageInput {
                message: "hello".into(),
                thread_id: Some("ghost".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, OracleError::NotFound(_)));
    }

    #[test]
    fn status_updates_are_unrestricted() {
        let conn = db::open_memory_database().unwrap();
        let outcome = post(
            &conn,
            ThreadMessageInput {
                message: "status dance".into(),
                ..Default::default()
            },
        );
        let id = &outcome.thread.id;

        for status in [
            ThreadStatus::Pending,
            ThreadStatus::Answered,
            ThreadStatus::Closed,
            ThreadStatus::Active,
        ] {
            let thread = update_thread_status(&conn, id, status).unwrap();
            assert_eq!(thread.status, status.as_str());
        }
    }

    #[test]
    fn list_threads_filters_by_status() {
        let conn = db::open_memory_database().unwrap();
        let a = post(
            &conn,
            ThreadMessageInput {
                message: "thread a".into(),
                ..Default::default()
            },
        );
        post(
            &conn,
            ThreadMessageInput {
                message: "thread b".into(),
                ..Default::default()
            },
        );
        update_thread_status(&conn, &a.thread.id, ThreadStatus::Closed).unwrap();

        assert_eq!(list_threads(&conn, None, 10, 0).unwrap().len(), 2);
        let closed = list_threads(&conn, Some(ThreadStatus::Closed), 10, 0).unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].id, a.thread.id);
    }
}
