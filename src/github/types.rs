//! Core types for the GitHub metrics gateway.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// CREDENTIALS
// =============================================================================

/// Token used to authenticate against the GitHub API.
///
/// Absence is valid: anonymous requests work with a lower rate limit.
#[derive(Clone, Default)]
pub struct Credentials {
    token: Option<String>,
}

impl Credentials {
    pub fn anonymous() -> Self {
        Self { token: None }
    }

    pub fn token(token: impl Into<String>) -> Self {
        let token = token.into();
        if token.trim().is_empty() {
            return Self::anonymous();
        }
        Self { token: Some(token) }
    }

    /// Read `GH_TOKEN`, falling back to `GITHUB_TOKEN`.
    pub fn from_env() -> Self {
        std::env::var("GH_TOKEN")
            .or_else(|_| std::env::var("GITHUB_TOKEN"))
            .map(Self::token)
            .unwrap_or_default()
    }

    pub fn bearer(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.token.is_none()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = if self.token.is_some() { "<redacted>" } else { "<none>" };
        f.debug_struct("Credentials").field("token", &shown).finish()
    }
}

// =============================================================================
// METRICS
// =============================================================================

/// The four popularity metrics collected for a repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMetrics {
    #[serde(default)]
    pub stars: u64,
    #[serde(default)]
    pub forks: u64,
    #[serde(default)]
    pub watchers: u64,
    /// Commit count of the default branch.
    #[serde(default)]
    pub commits: u64,
}

impl RepoMetrics {
    pub fn new(stars: u64, forks: u64, watchers: u64, commits: u64) -> Self {
        Self {
            stars,
            forks,
            watchers,
            commits,
        }
    }

    /// Names of the metric fields as they appear in persisted records.
    pub const FIELD_NAMES: [&'static str; 4] = ["stars", "forks", "watchers", "commits"];
}
