//! GitHub GraphQL adapter for repository metrics.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};

use super::error::{ErrorContext, FetchError};
use super::types::{Credentials, RepoMetrics};
use super::MetricsFetcher;
use crate::config::RepoId;

/// Public GitHub API root; the GraphQL endpoint lives at `/graphql` below it.
pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// Maximum allowed response body length (1MB).
const MAX_RESPONSE_LEN: usize = 1_024 * 1_024;

/// Fallback wait when GitHub signals a rate limit without saying for how long.
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

const REPOSITORY_QUERY: &str = r#"
query($owner: String!, $name: String!) {
  repository(owner: $owner, name: $name) {
    stargazerCount
    forkCount
    watchers { totalCount }
    defaultBranchRef { target { ... on Commit { history { totalCount } } } }
  }
}
"#;

// =============================================================================
// GRAPHQL ADAPTER
// =============================================================================

/// Single-request client for the repository metrics query.
#[derive(Debug, Clone)]
pub struct GraphqlAdapter {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl GraphqlAdapter {
    /// Create with the base URL and credentials taken from the environment.
    /// `timeout` bounds each HTTP request.
    pub fn from_env(timeout: Duration) -> Result<Self, FetchError> {
        let base_url =
            std::env::var("GITHUB_GRAPHQL_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());

        let credentials = Credentials::from_env();
        if credentials.is_anonymous() {
            tracing::warn!(
                "neither GH_TOKEN nor GITHUB_TOKEN is set, sending unauthenticated requests"
            );
        }

        Self::with_config(credentials, base_url, timeout)
    }

    /// Create with custom configuration.
    pub fn with_config(
        credentials: Credentials,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("framework-metrics/", env!("CARGO_PKG_VERSION"))),
        );

        if let Some(token) = credentials.bearer() {
            let auth_value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| FetchError::config("Invalid token format"))?;
            headers.insert(AUTHORIZATION, auth_value);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| FetchError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    fn graphql_url(&self) -> String {
        format!("{}/graphql", self.base_url)
    }

    /// Extract request ID from response headers.
    fn extract_request_id(headers: &HeaderMap) -> Option<String> {
        headers
            .get("x-github-request-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }

    fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok())
    }

    /// Work out how long GitHub wants us to back off, if this response is a rate limit.
    fn rate_limit_wait(status: u16, headers: &HeaderMap, body: &str) -> Option<Duration> {
        let retry_after = Self::header_u64(headers, "retry-after").map(Duration::from_secs);
        let exhausted = Self::header_u64(headers, "x-ratelimit-remaining") == Some(0);
        let mentions_limit = body.to_lowercase().contains("rate limit");

        if status != 429 && retry_after.is_none() && !exhausted && !mentions_limit {
            return None;
        }

        if let Some(wait) = retry_after {
            return Some(wait);
        }

        if let Some(reset) = Self::header_u64(headers, "x-ratelimit-reset") {
            let now = chrono::Utc::now().timestamp().max(0) as u64;
            return Some(Duration::from_secs(reset.saturating_sub(now).max(1)));
        }

        Some(DEFAULT_RATE_LIMIT_WAIT)
    }

    fn map_send_error(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Http(err)
        }
    }
}

// =============================================================================
// API TYPES
// =============================================================================

#[derive(Serialize)]
struct GraphqlRequest<'a> {
    query: &'static str,
    variables: Variables<'a>,
}

#[derive(Serialize)]
struct Variables<'a> {
    owner: &'a str,
    name: &'a str,
}

#[derive(Deserialize)]
struct GraphqlResponse {
    data: Option<ResponseData>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Deserialize)]
struct ResponseData {
    repository: Option<RepositoryNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryNode {
    stargazer_count: Option<u64>,
    fork_count: Option<u64>,
    watchers: Option<CountNode>,
    default_branch_ref: Option<BranchRef>,
}

#[derive(Deserialize)]
struct CountNode {
    #[serde(rename = "totalCount")]
    total_count: Option<u64>,
}

#[derive(Deserialize)]
struct BranchRef {
    target: Option<CommitTarget>,
}

#[derive(Deserialize)]
struct CommitTarget {
    history: Option<CountNode>,
}

#[derive(Deserialize)]
struct GraphqlError {
    #[serde(rename = "type")]
    error_type: Option<String>,
    message: Option<String>,
}

/// REST-style error body GitHub returns alongside non-2xx statuses.
#[derive(Deserialize)]
struct RestErrorBody {
    message: Option<String>,
}

impl From<RepositoryNode> for RepoMetrics {
    fn from(node: RepositoryNode) -> Self {
        let commits = node
            .default_branch_ref
            .and_then(|r| r.target)
            .and_then(|t| t.history)
            .and_then(|h| h.total_count)
            .unwrap_or(0);

        RepoMetrics {
            stars: node.stargazer_count.unwrap_or(0),
            forks: node.fork_count.unwrap_or(0),
            watchers: node.watchers.and_then(|w| w.total_count).unwrap_or(0),
            commits,
        }
    }
}

// =============================================================================
// FETCHER IMPL
// =============================================================================

#[async_trait]
impl MetricsFetcher for GraphqlAdapter {
    async fn fetch(&self, repo: &RepoId) -> Result<RepoMetrics, FetchError> {
        let api_req = GraphqlRequest {
            query: REPOSITORY_QUERY,
            variables: Variables {
                owner: repo.owner(),
                name: repo.name(),
            },
        };

        let mut response = self
            .client
            .post(self.graphql_url())
            .json(&api_req)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let request_id = Self::extract_request_id(&headers);

        // Stream response to enforce size limit
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.map_send_error(e))? {
            let new_len = bytes.len() + chunk.len();
            if new_len > MAX_RESPONSE_LEN {
                return Err(FetchError::invalid_response(format!(
                    "Response too large: {new_len} bytes"
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        let body = String::from_utf8_lossy(&bytes).to_string();

        let ctx = ErrorContext::new().with_status(status.as_u16());
        let ctx = if let Some(id) = &request_id {
            ctx.with_request_id(id)
        } else {
            ctx
        };

        if !status.is_success() {
            let code = status.as_u16();
            let message = serde_json::from_str::<RestErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| format!("HTTP {code}"));

            if code == 403 || code == 429 {
                if let Some(wait) = Self::rate_limit_wait(code, &headers, &body) {
                    return Err(FetchError::rate_limited(wait, ctx));
                }
            }

            return Err(match code {
                401 => FetchError::unauthorized(message, ctx),
                404 => FetchError::not_found(repo.to_string(), Some(ctx)),
                _ => FetchError::api_with_context(message, code >= 500, ctx),
            });
        }

        let parsed: GraphqlResponse = serde_json::from_str(&body)
            .map_err(|e| FetchError::invalid_response(format!("Invalid JSON: {e}")))?;

        if let Some(repository) = parsed.data.and_then(|d| d.repository) {
            return Ok(RepoMetrics::from(repository));
        }

        if parsed.errors.is_empty() {
            return Err(FetchError::not_found(repo.to_string(), Some(ctx)));
        }

        let has_type = |wanted: &str| {
            parsed
                .errors
                .iter()
                .any(|e| e.error_type.as_deref() == Some(wanted))
        };

        if has_type("RATE_LIMITED") {
            let wait = Self::rate_limit_wait(429, &headers, &body).unwrap_or(DEFAULT_RATE_LIMIT_WAIT);
            return Err(FetchError::rate_limited(
                wait,
                ctx.with_error_type("RATE_LIMITED"),
            ));
        }

        if has_type("NOT_FOUND") {
            return Err(FetchError::not_found(
                repo.to_string(),
                Some(ctx.with_error_type("NOT_FOUND")),
            ));
        }

        let message = parsed
            .errors
            .iter()
            .filter_map(|e| e.message.as_deref())
            .collect::<Vec<_>>()
            .join("; ");
        let ctx = match parsed.errors.iter().find_map(|e| e.error_type.clone()) {
            Some(t) => ctx.with_error_type(t),
            None => ctx,
        };

        Err(FetchError::api_with_context(message, false, ctx))
    }
}
