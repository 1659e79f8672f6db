//! JSON-file-backed history of metrics snapshots.
//!
//! The document is append-only: a run loads it, appends one snapshot and
//! replaces the file atomically. Files written before the `history` wrapper
//! existed (a bare snapshot at the top level) are read as a one-entry history
//! and upgraded on the next write.
//!
//! There is no locking. Two runs against the same file at the same time can
//! lose one of the appended snapshots; schedule runs so they do not overlap.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::snapshot::MetricsSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt history document {}: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

// =============================================================================
// Document
// =============================================================================

/// One persisted snapshot, held exactly as it was read.
///
/// Only the shape is checked (an object with a string `generated_at` and a
/// `frameworks` array); records inside are opaque so that entries written by
/// older versions survive every rewrite unchanged.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct HistoryEntry(serde_json::Map<String, serde_json::Value>);

impl HistoryEntry {
    /// Serialize a freshly built snapshot into an entry.
    pub fn from_snapshot(snapshot: &MetricsSnapshot) -> Result<Self, serde_json::Error> {
        match serde_json::to_value(snapshot)? {
            serde_json::Value::Object(object) => Ok(Self(object)),
            _ => Err(<serde_json::Error as serde::ser::Error>::custom(
                "snapshot did not serialize to a JSON object",
            )),
        }
    }

    fn from_value(value: serde_json::Value) -> Result<Self, String> {
        let object = match value {
            serde_json::Value::Object(object) => object,
            other => return Err(format!("expected an object, found {}", json_kind(&other))),
        };
        match object.get("generated_at") {
            Some(serde_json::Value::String(_)) => {}
            Some(other) => {
                return Err(format!(
                    "`generated_at` must be a string, found {}",
                    json_kind(other)
                ))
            }
            None => return Err("missing `generated_at`".to_string()),
        }
        match object.get("frameworks") {
            Some(serde_json::Value::Array(_)) => {}
            Some(other) => {
                return Err(format!(
                    "`frameworks` must be an array, found {}",
                    json_kind(other)
                ))
            }
            None => return Err("missing `frameworks`".to_string()),
        }
        Ok(Self(object))
    }

    pub fn generated_at(&self) -> &str {
        self.0
            .get("generated_at")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
    }

    pub fn frameworks(&self) -> &[serde_json::Value] {
        self.0
            .get("frameworks")
            .and_then(serde_json::Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn as_map(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.0
    }
}

/// The full persisted history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryDocument {
    pub history: Vec<HistoryEntry>,
    /// Unrecognised top-level keys, preserved as found.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl HistoryDocument {
    pub fn new(history: Vec<HistoryEntry>) -> Self {
        Self {
            history,
            extra: serde_json::Map::new(),
        }
    }

    /// The most recent snapshot, i.e. the current metrics.
    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.history.last()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Interpret a parsed JSON value as a history document.
    ///
    /// `origin` is only used in error messages.
    pub fn from_value(value: serde_json::Value, origin: &Path) -> Result<Self, HistoryError> {
        let corrupt = |reason: String| HistoryError::Corrupt {
            path: origin.to_path_buf(),
            reason,
        };

        let mut object = match value {
            serde_json::Value::Object(object) => object,
            other => {
                return Err(corrupt(format!(
                    "expected a JSON object at top level, found {}",
                    json_kind(&other)
                )))
            }
        };

        let Some(history) = object.remove("history") else {
            let legacy = HistoryEntry::from_value(serde_json::Value::Object(object))
                .map_err(|e| corrupt(format!("no `history` key and not a legacy snapshot: {e}")))?;
            return Ok(Self::new(vec![legacy]));
        };

        let entries = match history {
            serde_json::Value::Array(entries) => entries,
            other => {
                return Err(corrupt(format!(
                    "`history` must be an array, found {}",
                    json_kind(&other)
                )))
            }
        };

        let history = entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                HistoryEntry::from_value(entry).map_err(|e| {
                    corrupt(format!("invalid snapshot at `history[{index}]`: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            history,
            extra: object,
        })
    }
}

/// Return a new document with `snapshot` appended after the existing entries.
pub fn append(
    doc: &HistoryDocument,
    snapshot: &MetricsSnapshot,
) -> Result<HistoryDocument, HistoryError> {
    let mut next = doc.clone();
    next.history.push(HistoryEntry::from_snapshot(snapshot)?);
    Ok(next)
}

// =============================================================================
// Store
// =============================================================================

/// Owner of the on-disk history document.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted document. A missing file is an empty history.
    pub fn load(&self) -> Result<HistoryDocument, HistoryError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(HistoryDocument::default());
            }
            Err(source) => {
                return Err(HistoryError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if raw.trim().is_empty() {
            return Err(HistoryError::Corrupt {
                path: self.path.clone(),
                reason: "file is empty".to_string(),
            });
        }

        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| HistoryError::Corrupt {
                path: self.path.clone(),
                reason: format!("invalid JSON: {e}"),
            })?;

        HistoryDocument::from_value(value, &self.path)
    }

    /// See [`append`].
    pub fn append(
        &self,
        doc: &HistoryDocument,
        snapshot: &MetricsSnapshot,
    ) -> Result<HistoryDocument, HistoryError> {
        append(doc, snapshot)
    }

    /// Replace the on-disk document with `doc`.
    ///
    /// The document is written to a temporary file next to the target, synced,
    /// then renamed over it. The temporary file is removed if any step fails.
    /// The target keeps its existing permissions; a new file gets `0644` on unix.
    pub fn persist(&self, doc: &HistoryDocument) -> Result<(), HistoryError> {
        let mut body = serde_json::to_vec_pretty(doc)?;
        body.push(b'\n');

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|source| self.io_error(source))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|source| self.io_error(source))?;
        tmp.write_all(&body).map_err(|source| self.io_error(source))?;
        self.carry_permissions(&tmp)
            .map_err(|source| self.io_error(source))?;
        tmp.as_file()
            .sync_all()
            .map_err(|source| self.io_error(source))?;
        tmp.persist(&self.path)
            .map_err(|e| self.io_error(e.error))?;

        tracing::debug!(
            path = %self.path.display(),
            snapshots = doc.len(),
            bytes = body.len(),
            "persisted history document"
        );
        Ok(())
    }

    /// Temp files are created owner-only; give the replacement the mode of the
    /// file it replaces so readers of the document keep access.
    fn carry_permissions(&self, tmp: &NamedTempFile) -> std::io::Result<()> {
        match std::fs::metadata(&self.path) {
            Ok(meta) if meta.is_file() => tmp.as_file().set_permissions(meta.permissions()),
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => default_permissions(tmp),
            Err(e) => Err(e),
        }
    }

    fn io_error(&self, source: std::io::Error) -> HistoryError {
        HistoryError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(unix)]
fn default_permissions(tmp: &NamedTempFile) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tmp.as_file()
        .set_permissions(std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions(_tmp: &NamedTempFile) -> std::io::Result<()> {
    Ok(())
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
