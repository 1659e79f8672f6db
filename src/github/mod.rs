//! Metric fetcher backed by the GitHub GraphQL API.

pub mod error;
pub mod graphql;
pub mod types;

use std::time::Duration;

use tokio::time::sleep;

use crate::config::RepoId;
use graphql::GraphqlAdapter;

pub use error::{ErrorContext, FetchError};
pub use types::{Credentials, RepoMetrics};

/// Anything that can look up the metrics of one repository.
#[async_trait::async_trait]
pub trait MetricsFetcher: Send + Sync {
    async fn fetch(&self, repo: &RepoId) -> Result<RepoMetrics, FetchError>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    /// Longest rate-limit wait honoured before retrying.
    pub max_rate_limit_wait: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_base_delay: Duration::from_secs(1),
            max_rate_limit_wait: Duration::from_secs(10),
        }
    }
}

/// GraphQL adapter plus retry policy for transient failures.
pub struct GithubGateway {
    graphql: GraphqlAdapter,
    config: GatewayConfig,
}

#[async_trait::async_trait]
impl MetricsFetcher for GithubGateway {
    async fn fetch(&self, repo: &RepoId) -> Result<RepoMetrics, FetchError> {
        GithubGateway::fetch(self, repo).await
    }
}

impl GithubGateway {
    /// Default retry policy over [`GraphqlAdapter::from_env`].
    pub fn from_env(request_timeout: Duration) -> Result<Self, FetchError> {
        let graphql = GraphqlAdapter::from_env(request_timeout)?;
        Ok(Self {
            graphql,
            config: GatewayConfig::default(),
        })
    }

    pub fn with_config(graphql: GraphqlAdapter, config: GatewayConfig) -> Self {
        Self { graphql, config }
    }

    pub async fn fetch(&self, repo: &RepoId) -> Result<RepoMetrics, FetchError> {
        let mut last_error: Option<FetchError> = None;

        for attempt in 0..=self.config.max_retries {
            match self.graphql.fetch(repo).await {
                Ok(metrics) => return Ok(metrics),
                Err(err) => {
                    if !err.is_retryable() || attempt == self.config.max_retries {
                        return Err(err);
                    }

                    let delay = match &err {
                        FetchError::RateLimited { retry_after, .. } => {
                            (*retry_after).min(self.config.max_rate_limit_wait)
                        }
                        _ => backoff_delay(self.config.retry_base_delay, attempt),
                    };
                    tracing::debug!(
                        repo = %repo,
                        attempt,
                        code = err.code(),
                        delay_ms = delay.as_millis() as u64,
                        "retrying metrics fetch"
                    );
                    last_error = Some(err);
                    sleep(delay).await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FetchError::api("unknown error", false)))
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2u64.pow(attempt.min(5));
    base * multiplier as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_saturates() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(800));
        assert_eq!(backoff_delay(base, 9), Duration::from_millis(3200));
    }
}
