use framework_metrics::github::RepoMetrics;
use framework_metrics::history::{append, HistoryDocument, HistoryEntry, HistoryError, HistoryStore};
use framework_metrics::snapshot::{FrameworkRecord, MetricsSnapshot};
use framework_metrics::TrackedProject;
use serde_json::json;
use tempfile::tempdir;

fn snapshot(generated_at: &str, stars: u64) -> MetricsSnapshot {
    let project = TrackedProject::new("acme/widgets".parse().unwrap()).with_field("name", "Widgets");
    MetricsSnapshot {
        generated_at: generated_at.to_string(),
        frameworks: vec![FrameworkRecord::new(&project, RepoMetrics::new(stars, 1, 1, 1))],
    }
}

fn entry(snapshot: &MetricsSnapshot) -> HistoryEntry {
    HistoryEntry::from_snapshot(snapshot).unwrap()
}

fn read_json(path: &std::path::Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn write_json(path: &std::path::Path, value: serde_json::Value) {
    std::fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
}

#[test]
fn missing_file_loads_as_empty_history() {
    let dir = tempdir().unwrap();
    let store = HistoryStore::new(dir.path().join("metrics.json"));

    let doc = store.load().unwrap();
    assert!(doc.is_empty());
    assert!(doc.latest().is_none());
}

#[test]
fn append_persist_load_round_trips() {
    let dir = tempdir().unwrap();
    let store = HistoryStore::new(dir.path().join("metrics.json"));

    let s0 = snapshot("2025-01-01T06:00:00+00:00", 10);
    let s1 = snapshot("2025-01-02T06:00:00+00:00", 12);

    let doc = store.append(&store.load().unwrap(), &s0).unwrap();
    store.persist(&doc).unwrap();

    let doc = store.append(&store.load().unwrap(), &s1).unwrap();
    store.persist(&doc).unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded.history, vec![entry(&s0), entry(&s1)]);
    assert_eq!(loaded.latest(), Some(&entry(&s1)));
}

#[test]
fn legacy_bare_snapshot_is_wrapped_and_upgraded_on_write() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metrics.json");
    let legacy = json!({
        "generated_at": "T0",
        "frameworks": [
            {"repo": "acme/widgets", "name": "Widgets", "stars": 3, "forks": 1, "watchers": 2, "commits": 40}
        ]
    });
    write_json(&path, legacy.clone());

    let store = HistoryStore::new(&path);
    let doc = store.load().unwrap();
    assert_eq!(doc.len(), 1);
    assert_eq!(doc.history[0].generated_at(), "T0");
    assert_eq!(doc.history[0].frameworks()[0]["stars"], 3);

    let s1 = snapshot("2025-01-02T06:00:00+00:00", 5);
    store.persist(&append(&doc, &s1).unwrap()).unwrap();

    let on_disk = read_json(&path);
    assert_eq!(
        on_disk,
        json!({ "history": [legacy, serde_json::to_value(&s1).unwrap()] })
    );
}

#[test]
fn prior_entries_are_rewritten_verbatim() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metrics.json");
    // Keys deliberately out of alphabetical order, a snapshot-level note, a
    // record with no metrics and a repo that today's config would reject.
    let prior = json!({
        "generated_at": "T0",
        "note": "manual",
        "frameworks": [
            {"repo": "acme/widgets", "name": "W"},
            {"name": "Nested", "repo": "acme/widgets/extra", "stars": 0, "forks": 0, "watchers": 0, "commits": 0}
        ]
    });
    write_json(&path, json!({ "history": [prior.clone()] }));

    let store = HistoryStore::new(&path);
    let doc = store.load().unwrap();
    assert_eq!(doc.len(), 1);
    assert_eq!(doc.history[0].frameworks()[1]["repo"], "acme/widgets/extra");

    let s1 = snapshot("2025-01-02T06:00:00+00:00", 5);
    store.persist(&store.append(&doc, &s1).unwrap()).unwrap();

    let on_disk = read_json(&path);
    assert_eq!(on_disk["history"].as_array().unwrap().len(), 2);
    assert_eq!(on_disk["history"][0], prior);
    assert_eq!(
        serde_json::to_string_pretty(&on_disk["history"][0]).unwrap(),
        serde_json::to_string_pretty(&prior).unwrap()
    );
}

#[test]
fn legacy_snapshot_keeps_its_own_keys() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metrics.json");
    let legacy = json!({
        "generated_at": "T0",
        "source": "cron",
        "frameworks": [{"repo": "acme/widgets", "name": "W"}]
    });
    write_json(&path, legacy.clone());

    let store = HistoryStore::new(&path);
    let doc = store.load().unwrap();
    store
        .persist(&append(&doc, &snapshot("2025-01-02T06:00:00+00:00", 5)).unwrap())
        .unwrap();

    assert_eq!(read_json(&path)["history"][0], legacy);
}

#[test]
fn entry_without_frameworks_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metrics.json");
    write_json(&path, json!({ "history": [{ "generated_at": "T0" }] }));

    let err = HistoryStore::new(&path).load().unwrap_err();
    assert!(matches!(err, HistoryError::Corrupt { .. }));
    assert!(err.to_string().contains("`frameworks`"));
}

#[test]
fn non_array_history_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metrics.json");
    write_json(&path, json!({ "history": { "generated_at": "T0", "frameworks": [] } }));

    let err = HistoryStore::new(&path).load().unwrap_err();
    assert!(matches!(err, HistoryError::Corrupt { .. }));
    assert!(err.to_string().contains("`history` must be an array"));
}

#[test]
fn null_history_is_corrupt_not_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metrics.json");
    write_json(&path, json!({ "history": null }));

    let err = HistoryStore::new(&path).load().unwrap_err();
    assert!(matches!(err, HistoryError::Corrupt { .. }));
}

#[test]
fn unparseable_and_empty_files_are_corrupt() {
    let dir = tempdir().unwrap();

    let garbage = dir.path().join("garbage.json");
    std::fs::write(&garbage, "{\"history\": [").unwrap();
    let err = HistoryStore::new(&garbage).load().unwrap_err();
    assert!(matches!(err, HistoryError::Corrupt { .. }));

    let empty = dir.path().join("empty.json");
    std::fs::write(&empty, "").unwrap();
    let err = HistoryStore::new(&empty).load().unwrap_err();
    assert!(matches!(err, HistoryError::Corrupt { .. }));
}

#[test]
fn persist_creates_parent_dirs_and_leaves_no_temp_files() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().join("data");
    let path = data_dir.join("metrics.json");
    let store = HistoryStore::new(&path);

    store
        .persist(&HistoryDocument::new(vec![entry(&snapshot("2025-01-01T06:00:00+00:00", 1))]))
        .unwrap();

    let entries: Vec<_> = std::fs::read_dir(&data_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(entries, vec!["metrics.json".to_string()]);

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.starts_with("{\n  \"history\": ["));
    assert!(raw.ends_with("}\n"));
}

#[test]
fn failed_persist_keeps_previous_document() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metrics.json");
    let store = HistoryStore::new(&path);
    store
        .persist(&HistoryDocument::new(vec![entry(&snapshot("2025-01-01T06:00:00+00:00", 1))]))
        .unwrap();
    let before = std::fs::read(&path).unwrap();

    // A target that is a directory cannot be replaced by a file rename.
    let blocked = HistoryStore::new(dir.path());
    let err = blocked
        .persist(&HistoryDocument::new(vec![entry(&snapshot("2025-01-02T06:00:00+00:00", 2))]))
        .unwrap_err();
    assert!(matches!(err, HistoryError::Io { .. }));

    assert_eq!(std::fs::read(&path).unwrap(), before);
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .filter(|name| name != "metrics.json")
        .collect();
    assert!(leftovers.is_empty(), "unexpected files: {leftovers:?}");
}

#[cfg(unix)]
#[test]
fn persist_keeps_the_target_file_mode() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let path = dir.path().join("metrics.json");
    let store = HistoryStore::new(&path);
    let mode = |p: &std::path::Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;

    let doc = store
        .append(&HistoryDocument::default(), &snapshot("2025-01-01T06:00:00+00:00", 1))
        .unwrap();
    store.persist(&doc).unwrap();
    assert_eq!(mode(&path), 0o644);

    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();
    let doc = store
        .append(&store.load().unwrap(), &snapshot("2025-01-02T06:00:00+00:00", 2))
        .unwrap();
    store.persist(&doc).unwrap();
    assert_eq!(mode(&path), 0o640);
}
