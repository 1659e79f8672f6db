//! One update run: config → history load → fetch → snapshot → append → persist.
//!
//! Fatal errors are raised before anything is written. Per-project fetch
//! failures end up in [`RunSummary::failures`] and do not fail the run.

use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;
use tracing::info;

use crate::config::{load_tracked_projects, ConfigError, RunConfig};
use crate::github::MetricsFetcher;
use crate::history::{HistoryError, HistoryStore};
use crate::snapshot::{build_snapshot, FetchFailure, MetricsSnapshot, SnapshotOptions};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("history error: {0}")]
    History(#[from] HistoryError),
}

/// Outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub history_path: PathBuf,
    /// Number of snapshots in the document after this run.
    pub total_snapshots: usize,
    pub projects: usize,
    pub failures: Vec<FetchFailure>,
    /// False for dry runs.
    pub persisted: bool,
    pub snapshot: MetricsSnapshot,
    pub elapsed_ms: u64,
}

/// Run the full pipeline and persist the new snapshot.
pub async fn run_update(
    config: &RunConfig,
    fetcher: &dyn MetricsFetcher,
) -> Result<RunSummary, RunError> {
    execute(config, fetcher, true).await
}

/// Build a snapshot against the current history without writing anything.
pub async fn run_dry(
    config: &RunConfig,
    fetcher: &dyn MetricsFetcher,
) -> Result<RunSummary, RunError> {
    execute(config, fetcher, false).await
}

async fn execute(
    config: &RunConfig,
    fetcher: &dyn MetricsFetcher,
    persist: bool,
) -> Result<RunSummary, RunError> {
    let start = Instant::now();

    let projects = load_tracked_projects(&config.config_path)?;
    let store = HistoryStore::new(&config.history_path);
    // Load before fetching so a corrupt document aborts without spending API calls.
    let existing = store.load()?;

    info!(
        projects = projects.len(),
        existing_snapshots = existing.len(),
        "collecting metrics"
    );

    let options = SnapshotOptions {
        concurrency: config.concurrency,
        fetch_timeout: config.fetch_timeout,
    };
    let report = build_snapshot(&projects, fetcher, &options).await;

    let updated = store.append(&existing, &report.snapshot)?;
    if persist {
        store.persist(&updated)?;
    }

    info!(
        path = %store.path().display(),
        total_snapshots = updated.len(),
        failures = report.failures.len(),
        persisted = persist,
        "run complete"
    );

    Ok(RunSummary {
        history_path: config.history_path.clone(),
        total_snapshots: updated.len(),
        projects: projects.len(),
        failures: report.failures,
        persisted: persist,
        snapshot: report.snapshot,
        elapsed_ms: start.elapsed().as_millis() as u64,
    })
}
