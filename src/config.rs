//! Tracked-project list and runtime settings.
//!
//! The project list is a YAML sequence of mappings. Only `repo` is interpreted;
//! every other field is carried through to the snapshot unchanged.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Default location of the tracked-project list.
pub const DEFAULT_CONFIG_PATH: &str = "data/frameworks.yml";

/// Default location of the history document.
pub const DEFAULT_HISTORY_PATH: &str = "data/metrics.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid repository identifier {value:?}: {reason}")]
    InvalidRepoId { value: String, reason: &'static str },

    #[error("duplicate repository {0} in tracked projects")]
    DuplicateRepo(String),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

// =============================================================================
// REPO ID
// =============================================================================

/// A validated `owner/name` repository identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoId {
    owner: String,
    name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self, ConfigError> {
        let owner = owner.into();
        let name = name.into();
        format!("{owner}/{name}").parse()
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for RepoId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| ConfigError::InvalidRepoId {
            value: s.to_string(),
            reason,
        };

        let (owner, name) = s.split_once('/').ok_or_else(|| invalid("missing '/' separator"))?;
        if owner.is_empty() {
            return Err(invalid("empty owner"));
        }
        if name.is_empty() {
            return Err(invalid("empty name"));
        }
        if name.contains('/') {
            return Err(invalid("more than one '/' separator"));
        }
        if s.chars().any(char::is_whitespace) {
            return Err(invalid("contains whitespace"));
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl TryFrom<String> for RepoId {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RepoId> for String {
    fn from(id: RepoId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// =============================================================================
// TRACKED PROJECTS
// =============================================================================

/// One entry of the tracked-project list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedProject {
    pub repo: RepoId,
    /// Descriptive fields (name, category, homepage, ...) passed through verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl TrackedProject {
    pub fn new(repo: RepoId) -> Self {
        Self {
            repo,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Parse a YAML tracked-project list and reject duplicate repositories.
pub fn parse_tracked_projects(
    yaml: &str,
    origin: &Path,
) -> Result<Vec<TrackedProject>, ConfigError> {
    // An empty file deserializes to unit, not to an empty sequence.
    if yaml.trim().is_empty() {
        return Ok(Vec::new());
    }

    let projects: Vec<TrackedProject> =
        serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;

    let mut seen = HashSet::with_capacity(projects.len());
    for project in &projects {
        if !seen.insert(&project.repo) {
            return Err(ConfigError::DuplicateRepo(project.repo.to_string()));
        }
    }

    Ok(projects)
}

/// Read and parse the tracked-project list at `path`.
pub fn load_tracked_projects(path: impl AsRef<Path>) -> Result<Vec<TrackedProject>, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_tracked_projects(&raw, path)
}

// =============================================================================
// RUN CONFIG
// =============================================================================

/// Settings for one update run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub config_path: PathBuf,
    pub history_path: PathBuf,
    /// Maximum number of fetches in flight.
    pub concurrency: usize,
    /// Upper bound on a single fetch, retries included.
    pub fetch_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            history_path: PathBuf::from(DEFAULT_HISTORY_PATH),
            concurrency: 4,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

impl RunConfig {
    /// Defaults overridden by `FRAMEWORK_METRICS_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("FRAMEWORK_METRICS_CONFIG") {
            config.config_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("FRAMEWORK_METRICS_HISTORY") {
            config.history_path = PathBuf::from(path);
        }
        if let Ok(raw) = std::env::var("FRAMEWORK_METRICS_TIMEOUT_SECONDS") {
            if let Some(timeout) = parse_timeout_secs(&raw) {
                config.fetch_timeout = timeout;
            }
        }

        config
    }
}

/// A positive whole number of seconds. Anything else is logged and ignored.
fn parse_timeout_secs(raw: &str) -> Option<Duration> {
    match raw.trim().parse::<u64>() {
        Ok(0) => {
            warn!(
                value = raw,
                "FRAMEWORK_METRICS_TIMEOUT_SECONDS must be at least 1, keeping the default"
            );
            None
        }
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(e) => {
            warn!(value = raw, "ignoring FRAMEWORK_METRICS_TIMEOUT_SECONDS: {e}");
            None
        }
    }
}
