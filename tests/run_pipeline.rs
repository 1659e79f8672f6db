use std::time::Duration;

use async_trait::async_trait;
use framework_metrics::github::{FetchError, MetricsFetcher, RepoMetrics};
use framework_metrics::{run_update, HistoryEntry, HistoryStore, RepoId, RunConfig, RunError};
use serde_json::json;
use tempfile::tempdir;

/// Stars equal to the length of the repo name; `missing` repos are not found.
struct NameLengthFetcher;

#[async_trait]
impl MetricsFetcher for NameLengthFetcher {
    async fn fetch(&self, repo: &RepoId) -> Result<RepoMetrics, FetchError> {
        if repo.name() == "missing" {
            return Err(FetchError::not_found(repo.to_string(), None));
        }
        Ok(RepoMetrics::new(repo.name().len() as u64, 0, 0, 0))
    }
}

fn config_in(dir: &std::path::Path, yaml: &str) -> RunConfig {
    let config_path = dir.join("frameworks.yml");
    std::fs::write(&config_path, yaml).unwrap();
    RunConfig {
        config_path,
        history_path: dir.join("out").join("metrics.json"),
        concurrency: 2,
        fetch_timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn consecutive_runs_only_ever_append() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path(), "- repo: acme/widgets\n- repo: acme/missing\n");

    let first = run_update(&config, &NameLengthFetcher).await.unwrap();
    assert!(first.persisted);
    assert_eq!(first.total_snapshots, 1);
    assert_eq!(first.projects, 2);
    assert_eq!(first.failures.len(), 1);
    assert_eq!(first.failures[0].repo.to_string(), "acme/missing");

    let store = HistoryStore::new(&config.history_path);
    let after_first = store.load().unwrap();

    let second = run_update(&config, &NameLengthFetcher).await.unwrap();
    assert_eq!(second.total_snapshots, 2);

    let after_second = store.load().unwrap();
    assert_eq!(after_second.history[0], after_first.history[0]);
    assert_eq!(
        after_second.latest(),
        Some(&HistoryEntry::from_snapshot(&second.snapshot).unwrap())
    );

    let latest = after_second.latest().unwrap().frameworks();
    assert_eq!(
        serde_json::Value::from(latest.to_vec()),
        json!([
            {"repo": "acme/widgets", "stars": 7, "forks": 0, "watchers": 0, "commits": 0},
            {"repo": "acme/missing", "stars": 0, "forks": 0, "watchers": 0, "commits": 0}
        ])
    );
}

#[tokio::test]
async fn missing_config_is_fatal_and_writes_nothing() {
    let dir = tempdir().unwrap();
    let config = RunConfig {
        config_path: dir.path().join("nope.yml"),
        history_path: dir.path().join("metrics.json"),
        ..RunConfig::default()
    };

    let err = run_update(&config, &NameLengthFetcher).await.unwrap_err();
    assert!(matches!(err, RunError::Config(_)));
    assert!(!config.history_path.exists());
}

#[tokio::test]
async fn corrupt_history_is_fatal_and_preserved() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path(), "- repo: acme/widgets\n");
    std::fs::create_dir_all(config.history_path.parent().unwrap()).unwrap();
    std::fs::write(&config.history_path, "[1, 2, 3]").unwrap();

    let err = run_update(&config, &NameLengthFetcher).await.unwrap_err();
    assert!(matches!(err, RunError::History(_)));
    assert_eq!(std::fs::read_to_string(&config.history_path).unwrap(), "[1, 2, 3]");
}
