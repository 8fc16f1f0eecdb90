//! CLI subcommand implementations beyond the two servers.

pub mod ensure_server;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{OracleConfig, VECTOR_COLLECTION};
use crate::corpus::indexer;
use crate::db;
use crate::vector::child::ChildProcessBackend;

/// Run one indexing pass to completion with a progress bar, then exit.
pub fn run_index(config: &OracleConfig) -> Result<()> {
    let mut conn = db::open_database(&config.db_path)?;
    let vector = ChildProcessBackend::new(&config.vector);

    println!("Indexing {} ...", config.memory_dir().display());

    let mut bar: Option<ProgressBar> = None;
    let outcome = indexer::run_index(
        &mut conn,
        &vector,
        VECTOR_COLLECTION,
        &config.memory_dir(),
        |current, total| {
            let bar = bar.get_or_insert_with(|| {
                let bar = ProgressBar::new(total as u64);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template("  {bar:40.cyan/blue} {pos}/{len} documents")
                        .expect("valid template")
                        .progress_chars("##-"),
                );
                bar
            });
            bar.set_length(total as u64);
            bar.set_position(current as u64);
        },
    );

    if let Some(bar) = bar.take() {
        bar.finish_and_clear();
    }
    let outcome = outcome?;

    println!(
        "Indexed {} documents in {} ms (vector: {})",
        outcome.documents,
        outcome.elapsed_ms,
        if outcome.vector_indexed { "ok" } else { "skipped" },
    );
    Ok(())
}
