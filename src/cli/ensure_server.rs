//! `oracle ensure-server` — auto-start the HTTP server if it is not alive.
//!
//! Probes `/api/health`; when the server is down (and `--status` was not
//! passed), spawns a detached `oracle server` process and polls until it
//! answers. Exits zero iff a healthy server is running at the end.

use anyhow::{Context, Result};
use std::process::{Command, Stdio};
use std::time::Duration;

use crate::config::OracleConfig;

/// How long to wait for a freshly spawned server to come up.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(15);
const POLL_INTERVAL: Duration = Duration::from_millis(500);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Returns `Ok(true)` when a healthy server is running (already, or after a
/// successful spawn). `Ok(false)` means not running and not started
/// (`--status`), or the spawn never became healthy.
pub async fn ensure_server(config: &OracleConfig, status_only: bool, verbose: bool) -> Result<bool> {
    let url = format!("http://127.0.0.1:{}/api/health", config.port);
    let client = reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;

    if probe(&client, &url, verbose).await {
        println!("oracle server healthy on port {}", config.port);
        return Ok(true);
    }

    if status_only {
        println!("oracle server is not running on port {}", config.port);
        return Ok(false);
    }

    let exe = std::env::current_exe().context("cannot locate the oracle binary")?;
    if verbose {
        eprintln!("spawning: {} server", exe.display());
    }
    Command::new(exe)
        .arg("server")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("failed to spawn oracle server")?;

    let deadline = std::time::Instant::now() + STARTUP_TIMEOUT;
    while std::time::Instant::now() < deadline {
        tokio::time::sleep(POLL_INTERVAL).await;
        if probe(&client, &url, verbose).await {
            println!("oracle server started on port {}", config.port);
            return Ok(true);
        }
    }

    eprintln!(
        "oracle server did not become healthy within {}s",
        STARTUP_TIMEOUT.as_secs()
    );
    Ok(false)
}

async fn probe(client: &reqwest::Client, url: &str, verbose: bool) -> bool {
    match client.get(url).send().await {
        Ok(response) if response.status().is_success() => {
            let healthy = response
                .json::<serde_json::Value>()
                .await
                .map(|v| v["status"] == "ok")
                .unwrap_or(false);
            if verbose {
                eprintln!("probe {url}: healthy={healthy}");
            }
            healthy
        }
        Ok(response) => {
            if verbose {
                eprintln!("probe {url}: HTTP {}", response.status());
            }
            false
        }
        Err(e) => {
            if verbose {
                eprintln!("probe {url}: {e}");
            }
            false
        }
    }
}
