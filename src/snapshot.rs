//! Snapshot assembly: tracked projects + fetch results → one ordered snapshot.
//!
//! Every tracked project yields exactly one record, in input order. A failed
//! fetch zero-fills the metrics and is reported alongside the snapshot rather
//! than aborting the run.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::warn;

use crate::config::{RepoId, TrackedProject};
use crate::github::{FetchError, MetricsFetcher, RepoMetrics};

// =============================================================================
// Types
// =============================================================================

/// One tracked project's descriptive fields plus its metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameworkRecord {
    pub repo: RepoId,
    #[serde(flatten)]
    pub metrics: RepoMetrics,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl FrameworkRecord {
    /// Merge a tracked project with its metrics. Metric fields take precedence
    /// over extra fields of the same name.
    pub fn new(project: &TrackedProject, metrics: RepoMetrics) -> Self {
        let mut extra = project.extra.clone();
        for name in RepoMetrics::FIELD_NAMES {
            extra.remove(name);
        }
        Self {
            repo: project.repo.clone(),
            metrics,
            extra,
        }
    }
}

/// Metrics for every tracked project at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// RFC 3339 UTC timestamp, second precision.
    pub generated_at: String,
    pub frameworks: Vec<FrameworkRecord>,
}

impl MetricsSnapshot {
    pub fn new(generated_at: DateTime<Utc>, frameworks: Vec<FrameworkRecord>) -> Self {
        Self {
            generated_at: format_timestamp(generated_at),
            frameworks,
        }
    }

    /// Parsed `generated_at`, if it is a valid RFC 3339 timestamp.
    pub fn generated_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.generated_at)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// A project whose metrics could not be fetched this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchFailure {
    pub repo: RepoId,
    pub code: &'static str,
    pub cause: String,
}

/// Result of building a snapshot: the snapshot itself and the per-item failures
/// that were zero-filled in it.
#[derive(Debug, Clone)]
pub struct SnapshotReport {
    pub snapshot: MetricsSnapshot,
    pub failures: Vec<FetchFailure>,
}

#[derive(Debug, Clone)]
pub struct SnapshotOptions {
    /// Maximum number of fetches in flight.
    pub concurrency: usize,
    /// Upper bound on a single fetch.
    pub fetch_timeout: Duration,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Build
// =============================================================================

/// Fetch metrics for every project and assemble the snapshot.
///
/// `generated_at` is stamped after the last fetch has completed.
pub async fn build_snapshot(
    projects: &[TrackedProject],
    fetcher: &dyn MetricsFetcher,
    options: &SnapshotOptions,
) -> SnapshotReport {
    let fetch_timeout = options.fetch_timeout;

    let tasks = projects.iter().map(|project| async move {
        let outcome = match tokio::time::timeout(fetch_timeout, fetcher.fetch(&project.repo)).await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(fetch_timeout)),
        };
        (project, outcome)
    });

    // `buffered` yields in input order regardless of completion order.
    let outcomes: Vec<(&TrackedProject, Result<RepoMetrics, FetchError>)> = stream::iter(tasks)
        .buffered(options.concurrency.max(1))
        .collect()
        .await;

    let mut frameworks = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();

    for (project, outcome) in outcomes {
        let metrics = match outcome {
            Ok(metrics) => metrics,
            Err(err) => {
                warn!(
                    repo = %project.repo,
                    code = err.code(),
                    request_id = err.request_id().unwrap_or("-"),
                    "metrics fetch failed, recording zeros: {err}"
                );
                failures.push(FetchFailure {
                    repo: project.repo.clone(),
                    code: err.code(),
                    cause: err.to_string(),
                });
                RepoMetrics::default()
            }
        };
        frameworks.push(FrameworkRecord::new(project, metrics));
    }

    SnapshotReport {
        snapshot: MetricsSnapshot::new(Utc::now(), frameworks),
        failures,
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}
