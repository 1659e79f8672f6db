#![forbid(unsafe_code)]

//! # framework-metrics
//!
//! Collects stars, forks, watchers and default-branch commit counts for a
//! curated list of GitHub repositories and appends them, as one timestamped
//! snapshot per run, to an append-only JSON history.
//!
//! A run never drops a project: a repository whose lookup fails is recorded
//! with zero metrics and reported as a warning. The history file is replaced
//! atomically, and files from before the `history` wrapper was introduced are
//! upgraded in place.

pub mod config;
pub mod github;
pub mod history;
pub mod run;
pub mod snapshot;

pub use config::{ConfigError, RepoId, RunConfig, TrackedProject};
pub use github::{Credentials, FetchError, GithubGateway, MetricsFetcher, RepoMetrics};
pub use history::{HistoryDocument, HistoryEntry, HistoryError, HistoryStore};
pub use run::{run_dry, run_update, RunError, RunSummary};
pub use snapshot::{
    build_snapshot, FetchFailure, FrameworkRecord, MetricsSnapshot, SnapshotOptions,
    SnapshotReport,
};
