use anyhow::Result;
use std::path::{Path, PathBuf};

/// Default HTTP port when `ORACLE_PORT` is unset.
pub const DEFAULT_PORT: u16 = 47778;

/// Collection name in the vector backend. One collection holds the whole corpus.
pub const VECTOR_COLLECTION: &str = "oracle_knowledge";

#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// HTTP port for the API server.
    pub port: u16,
    /// Directory holding the database, PID file, and instance lock.
    pub data_dir: PathBuf,
    /// SQLite database path. Defaults to `<data_dir>/oracle.db`.
    pub db_path: PathBuf,
    /// Root of the knowledge repository — the directory containing `ψ/`.
    pub repo_root: PathBuf,
    /// Vector backend settings.
    pub vector: VectorConfig,
}

#[derive(Debug, Clone)]
pub struct VectorConfig {
    /// Command spawned as the embedding bridge child process.
    pub bridge_command: String,
    /// Per-call timeout for pipe RPCs, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            bridge_command: "oracle-chroma-bridge".into(),
            timeout_ms: 2000,
        }
    }
}

impl OracleConfig {
    /// Build the configuration from environment variables.
    ///
    /// Recognized: `ORACLE_PORT`, `ORACLE_DATA_DIR`, `ORACLE_DB_PATH`,
    /// `ORACLE_REPO_ROOT`, plus `HOME` for the default data dir.
    pub fn load() -> Result<Self> {
        let data_dir = match std::env::var("ORACLE_DATA_DIR") {
            Ok(v) if !v.is_empty() => PathBuf::from(v),
            _ => default_data_dir(),
        };

        let port = match std::env::var("ORACLE_PORT") {
            Ok(v) if !v.is_empty() => v
                .parse::<u16>()
                .map_err(|_| anyhow::anyhow!("ORACLE_PORT is not a valid port: {v}"))?,
            _ => DEFAULT_PORT,
        };

        let db_path = match std::env::var("ORACLE_DB_PATH") {
            Ok(v) if !v.is_empty() => PathBuf::from(v),
            _ => data_dir.join("oracle.db"),
        };

        let repo_root = match std::env::var("ORACLE_REPO_ROOT") {
            Ok(v) if !v.is_empty() => PathBuf::from(v),
            _ => discover_repo_root().unwrap_or_else(|| data_dir.clone()),
        };

        Ok(Self {
            port,
            data_dir,
            db_path,
            repo_root,
            vector: VectorConfig::default(),
        })
    }

    /// The markdown corpus root: `<repo_root>/ψ/memory/`.
    pub fn memory_dir(&self) -> PathBuf {
        self.repo_root.join("ψ").join("memory")
    }

    /// Directory where `learn` writes new markdown files.
    pub fn learnings_dir(&self) -> PathBuf {
        self.memory_dir().join("learnings")
    }

    /// PID file path for the HTTP server.
    pub fn pid_path(&self) -> PathBuf {
        self.data_dir.join("oracle-http.pid")
    }

    /// Instance lock path for the HTTP server.
    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join("oracle-http.lock")
    }
}

/// Returns `$HOME/.oracle-v2`.
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".oracle-v2")
}

/// Walk up from the running binary's directory looking for a `ψ/` directory.
fn discover_repo_root() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let mut dir: &Path = exe.parent()?;
    loop {
        if dir.join("ψ").is_dir() {
            return Some(dir.to_path_buf());
        }
        dir = dir.parent()?;
    }
}
