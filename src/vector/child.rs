//! Child-process vector backend.
//!
//! Spawns the configured bridge command with piped stdio and speaks
//! line-delimited JSON-RPC 2.0 over it. A dedicated reader thread forwards
//! stdout lines into a channel so each request can enforce a wall-clock
//! timeout with `recv_timeout`. The pipe carries one request at a time; a
//! mutex over the process state serializes callers.

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc;
use std::sync::Mutex;
use std::time::Duration;

use super::{VectorBackend, VectorHit, VectorRecord, VectorStats, UPSERT_BATCH_SIZE};
use crate::config::VectorConfig;

pub struct ChildProcessBackend {
    command: String,
    timeout: Duration,
    state: Mutex<Option<Bridge>>,
}

struct Bridge {
    child: Child,
    stdin: ChildStdin,
    lines: mpsc::Receiver<String>,
    next_id: u64,
}

impl ChildProcessBackend {
    pub fn new(config: &VectorConfig) -> Self {
        Self {
            command: config.bridge_command.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            state: Mutex::new(None),
        }
    }

    /// Spawn the bridge and wire up the reader thread.
    fn spawn_bridge(command: &str) -> Result<Bridge> {
        let mut child = Command::new(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to spawn vector bridge: {command}"))?;

        let stdin = child
            .stdin
            .take()
            .context("vector bridge has no stdin pipe")?;
        let stdout = child
            .stdout
            .take()
            .context("vector bridge has no stdout pipe")?;

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                match line {
                    Ok(l) => {
                        if tx.send(l).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        tracing::info!(command = %command, "vector bridge spawned");
        Ok(Bridge {
            child,
            stdin,
            lines: rx,
            next_id: 1,
        })
    }

    /// Send one JSON-RPC request and wait for its response line.
    ///
    /// On any pipe error or timeout, the child is killed and the state
    /// cleared so the next call re-spawns.
    fn request(&self, method: &str, params: Value) -> Result<Value> {
        let mut guard = self
            .state
            .lock()
            .map_err(|e| anyhow::anyhow!("vector bridge lock poisoned: {e}"))?;

        if guard.is_none() {
            *guard = Some(Self::spawn_bridge(&self.command)?);
        }
        let bridge = guard.as_mut().expect("bridge just initialized");

        let id = bridge.next_id;
        bridge.next_id += 1;

        let frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let outcome = Self::exchange(bridge, &frame, id, self.timeout);
        if outcome.is_err() {
            // Kill and forget the child; the next call gets a fresh one.
            if let Some(mut dead) = guard.take() {
                let _ = dead.child.kill();
                let _ = dead.child.wait();
            }
        }
        outcome
    }

    fn exchange(bridge: &mut Bridge, frame: &Value, id: u64, timeout: Duration) -> Result<Value> {
        let mut line = serde_json::to_string(frame)?;
        line.push('\n');
        bridge
            .stdin
            .write_all(line.as_bytes())
            .context("vector bridge stdin closed")?;
        bridge.stdin.flush().context("vector bridge stdin flush")?;

        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                bail!("vector bridge timed out after {timeout:?}");
            }
            let raw = match bridge.lines.recv_timeout(remaining) {
                Ok(raw) => raw,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    bail!("vector bridge timed out after {timeout:?}")
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    bail!("vector bridge exited")
                }
            };

            let reply: Value = match serde_json::from_str(&raw) {
                Ok(v) => v,
                Err(_) => continue, // non-JSON noise on stdout
            };

            // Skip stale replies from an abandoned (timed-out) request.
            if reply.get("id").and_then(Value::as_u64) != Some(id) {
                continue;
            }

            if let Some(err) = reply.get("error") {
                let message = err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown bridge error");
                bail!("vector bridge error: {message}");
            }

            return Ok(reply.get("result").cloned().unwrap_or(Value::Null));
        }
    }
}

impl VectorBackend for ChildProcessBackend {
    fn ensure_collection(&self, name: &str) -> Result<()> {
        self.request("ensure_collection", json!({ "name": name }))?;
        Ok(())
    }

    fn upsert(&self, name: &str, records: &[VectorRecord]) -> Result<()> {
        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            let items: Vec<Value> = batch
                .iter()
                .map(|r| {
                    json!({
                        "id": r.id,
                        "text": r.text,
                        "metadata": r.metadata,
                    })
                })
                .collect();
            self.request("upsert", json!({ "collection": name, "items": items }))?;
        }
        Ok(())
    }

    fn query(
        &self,
        name: &str,
        text: &str,
        k: usize,
        where_filter: Option<&Value>,
    ) -> Result<Vec<VectorHit>> {
        let mut params = json!({
            "collection": name,
            "text": text,
            "k": k,
        });
        if let Some(w) = where_filter {
            params["where"] = w.clone();
        }
        let result = self.request("query", params)?;

        // Parallel arrays, matching the backend's wire shape.
        let ids = as_string_array(&result, "ids");
        let documents = as_string_array(&result, "documents");
        let metadatas: Vec<Value> = result
            .get("metadatas")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let distances: Vec<f64> = result
            .get("distances")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_f64).collect())
            .unwrap_or_default();

        let mut hits = Vec::with_capacity(ids.len());
        for (i, id) in ids.into_iter().enumerate() {
            hits.push(VectorHit {
                id,
                document: documents.get(i).cloned().unwrap_or_default(),
                metadata: metadatas.get(i).cloned().unwrap_or(Value::Null),
                distance: distances.get(i).copied().unwrap_or(2.0),
            });
        }
        Ok(hits)
    }

    fn stats(&self, name: &str) -> Result<VectorStats> {
        let result = self.request("stats", json!({ "collection": name }))?;
        let count = result.get("count").and_then(Value::as_u64).unwrap_or(0);
        Ok(VectorStats { count })
    }

    fn delete_collection(&self, name: &str) -> Result<()> {
        self.request("delete_collection", json!({ "name": name }))?;
        Ok(())
    }
}

impl Drop for ChildProcessBackend {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.state.lock() {
            if let Some(mut bridge) = guard.take() {
                let _ = bridge.child.kill();
                let _ = bridge.child.wait();
            }
        }
    }
}

fn as_string_array(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_parses_parallel_arrays() {
        // Exercise the response decoding directly — no child involved.
        let result = json!({
            "ids": ["a", "b"],
            "documents": ["alpha text", "beta text"],
            "metadatas": [{"type": "principle"}, {"type": "learning"}],
            "distances": [0.0, 1.0],
        });

        let ids = as_string_array(&result, "ids");
        assert_eq!(ids, vec!["a", "b"]);
        let distances: Vec<f64> = result["distances"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_f64)
            .collect();
        assert_eq!(distances, vec![0.0, 1.0]);
    }

    #[test]
    fn missing_bridge_command_errors_not_panics() {
        let config = VectorConfig {
            bridge_command: "definitely-not-a-real-binary-xyz".into(),
            timeout_ms: 200,
        };
        let backend = ChildProcessBackend::new(&config);
        let err = backend.stats("oracle_knowledge").unwrap_err();
        assert!(err.to_string().contains("failed to spawn vector bridge"));
    }

    #[test]
    fn dead_child_is_respawned_on_next_call() {
        let config = VectorConfig {
            bridge_command: "true".into(), // exits immediately, pipe closes
            timeout_ms: 200,
        };
        let backend = ChildProcessBackend::new(&config);

        assert!(backend.stats("c").is_err());
        // State was cleared; a second call attempts a fresh spawn rather
        // than writing into a closed pipe forever.
        assert!(backend.stats("c").is_err());
    }
}
