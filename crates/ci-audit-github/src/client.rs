//! GitHub REST client
//!
//! Thin typed wrapper over `reqwest` for the handful of endpoints the audits
//! need. Every request goes through [`GithubClient::get_json`], which applies
//! the only retry policy in the system: rate-limit and abuse-detection
//! rejections are retried a bounded number of times, honouring the delay the
//! server advises. Nothing else is retried.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, LINK, RETRY_AFTER};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::GithubError;
use crate::models::{
    CheckRun, CheckRunList, Commit, CommitStatus, GitRef, IssueSearchItem, IssueSearchResults,
    PullRequest, Release, Tag,
};
use crate::source::{Page, PullQuery, RecordSource};
use crate::Result;

/// Default API root.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Wait used when a rate-limit response carries no usable hint.
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// GitHub client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// API root, without trailing slash
    pub api_base: String,
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Personal access token
    pub token: Option<String>,
    /// Records per page (GitHub caps this at 100)
    pub per_page: u32,
    /// Retry bound for rate-limit rejections
    pub max_rate_limit_retries: u32,
    /// Upper bound on a single rate-limit wait
    pub max_backoff: Duration,
}

impl Default for GithubConfig {
    fn default() -> Self {
        GithubConfig {
            api_base: DEFAULT_API_BASE.to_string(),
            owner: "web-platform-tests".to_string(),
            repo: "wpt".to_string(),
            token: None,
            per_page: 100,
            max_rate_limit_retries: 2,
            max_backoff: Duration::from_secs(15 * 60),
        }
    }
}

impl GithubConfig {
    /// Config for a specific repository
    pub fn new(owner: &str, repo: &str) -> Self {
        GithubConfig {
            owner: owner.to_string(),
            repo: repo.to_string(),
            ..Default::default()
        }
    }

    /// Set authentication token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Point at a different API root (GitHub Enterprise, test servers)
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_rate_limit_retries(mut self, retries: u32) -> Self {
        self.max_rate_limit_retries = retries;
        self
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    fn repo_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}{}", self.api_base, self.owner, self.repo, path)
    }
}

/// GitHub REST client
#[derive(Debug, Clone)]
pub struct GithubClient {
    config: GithubConfig,
    http_client: reqwest::Client,
}

/// Response body plus the pagination hint from the `Link` header.
struct Fetched<T> {
    body: T,
    has_next: bool,
}

impl GithubClient {
    /// Create a new client
    pub fn new(config: GithubConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("ci-audit/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(GithubClient {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &GithubConfig {
        &self.config
    }

    fn page_params(&self, page: u32) -> Vec<(&'static str, String)> {
        vec![
            ("per_page", self.config.per_page.to_string()),
            ("page", page.to_string()),
        ]
    }

    /// GET `url` and decode the JSON body, retrying rate-limit rejections.
    #[instrument(skip(self, query), level = "debug")]
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Fetched<T>> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let mut request = self
                .http_client
                .get(url)
                .query(query)
                .header(ACCEPT, "application/vnd.github+json")
                .header("X-GitHub-Api-Version", "2022-11-28");
            if let Some(token) = &self.config.token {
                request = request.header(AUTHORIZATION, format!("Bearer {}", token));
            }

            let response = request.send().await?;
            let status = response.status();
            let headers = response.headers().clone();

            if status.is_success() {
                let has_next = has_next_page(&headers);
                let bytes = response.bytes().await?;
                let body = serde_json::from_slice(&bytes)?;
                debug!(url, attempt, has_next, "request succeeded");
                return Ok(Fetched { body, has_next });
            }

            if status == StatusCode::NOT_FOUND {
                return Err(GithubError::NotFound {
                    url: url.to_string(),
                });
            }

            let message = response.text().await.unwrap_or_default();

            if is_rate_limited(status, &headers, &message) {
                if attempt > self.config.max_rate_limit_retries {
                    return Err(GithubError::RateLimited {
                        attempts: attempt,
                        message: error_message(&message),
                    });
                }

                let wait = advised_wait(&headers, Utc::now()).min(self.config.max_backoff);
                warn!(
                    url,
                    status = status.as_u16(),
                    retry = attempt,
                    max_retries = self.config.max_rate_limit_retries,
                    wait_secs = wait.as_secs(),
                    "rate limited, backing off"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            return Err(GithubError::Api {
                status: status.as_u16(),
                url: url.to_string(),
                message: error_message(&message),
            });
        }
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        url: &str,
        mut query: Vec<(&'static str, String)>,
        page: u32,
    ) -> Result<Page<T>> {
        query.extend(self.page_params(page));
        let fetched: Fetched<Vec<T>> = self.get_json(url, &query).await?;
        Ok(Page::new(fetched.body, fetched.has_next))
    }
}

#[async_trait]
impl RecordSource for GithubClient {
    async fn list_pulls_page(&self, query: &PullQuery, page: u32) -> Result<Page<PullRequest>> {
        let url = self.config.repo_url("/pulls");
        let params = vec![
            ("state", query.state.clone()),
            ("sort", query.sort.clone()),
            ("direction", query.direction.clone()),
        ];
        self.get_page(&url, params, page).await
    }

    async fn search_open_pulls_page(
        &self,
        updated_after: DateTime<Utc>,
        page: u32,
    ) -> Result<Page<IssueSearchItem>> {
        let url = format!("{}/search/issues", self.config.api_base);
        let q = format!(
            "repo:{}/{} is:pr is:open updated:>{}",
            self.config.owner,
            self.config.repo,
            github_timestamp(updated_after)
        );
        let mut params = vec![("q", q)];
        params.extend(self.page_params(page));
        let fetched: Fetched<IssueSearchResults> = self.get_json(&url, &params).await?;
        Ok(Page::new(fetched.body.items, fetched.has_next))
    }

    async fn list_pull_commits_page(&self, number: u64, page: u32) -> Result<Page<Commit>> {
        let url = self.config.repo_url(&format!("/pulls/{}/commits", number));
        self.get_page(&url, Vec::new(), page).await
    }

    async fn list_releases_page(&self, page: u32) -> Result<Page<Release>> {
        let url = self.config.repo_url("/releases");
        self.get_page(&url, Vec::new(), page).await
    }

    async fn get_release_by_tag(&self, tag: &str) -> Result<Release> {
        let url = self.config.repo_url(&format!("/releases/tags/{}", tag));
        let fetched: Fetched<Release> = self.get_json(&url, &[]).await?;
        Ok(fetched.body)
    }

    async fn get_tag_ref(&self, tag: &str) -> Result<GitRef> {
        let url = self.config.repo_url(&format!("/git/ref/tags/{}", tag));
        let fetched: Fetched<GitRef> = self.get_json(&url, &[]).await?;
        Ok(fetched.body)
    }

    async fn list_tags_page(&self, page: u32) -> Result<Page<Tag>> {
        let url = self.config.repo_url("/tags");
        self.get_page(&url, Vec::new(), page).await
    }

    async fn list_commits_page(&self, since: DateTime<Utc>, page: u32) -> Result<Page<Commit>> {
        let url = self.config.repo_url("/commits");
        self.get_page(&url, vec![("since", github_timestamp(since))], page)
            .await
    }

    async fn list_check_runs_page(&self, git_ref: &str, page: u32) -> Result<Page<CheckRun>> {
        let url = self.config.repo_url(&format!("/commits/{}/check-runs", git_ref));
        let fetched: Fetched<CheckRunList> = self.get_json(&url, &self.page_params(page)).await?;
        Ok(Page::new(fetched.body.check_runs, fetched.has_next))
    }

    async fn list_statuses_page(&self, git_ref: &str, page: u32) -> Result<Page<CommitStatus>> {
        let url = self.config.repo_url(&format!("/commits/{}/statuses", git_ref));
        self.get_page(&url, Vec::new(), page).await
    }
}

/// GitHub rejects fractional seconds in query timestamps.
pub fn github_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn has_next_page(headers: &HeaderMap) -> bool {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|link| link.contains("rel=\"next\""))
}

/// Primary rate limit (429, or 403 with no remaining quota) and secondary
/// rate limit / abuse detection (403 with an explanatory body).
fn is_rate_limited(status: StatusCode, headers: &HeaderMap, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    if status != StatusCode::FORBIDDEN {
        return false;
    }
    let quota_exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false);
    let body = body.to_ascii_lowercase();
    quota_exhausted
        || headers.contains_key(RETRY_AFTER)
        || body.contains("abuse")
        || body.contains("secondary rate limit")
}

/// Delay advised by the server: `Retry-After` seconds, else the time until
/// `x-ratelimit-reset`, else a fixed default.
fn advised_wait(headers: &HeaderMap, now: DateTime<Utc>) -> Duration {
    let header_u64 = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
    };

    if let Some(secs) = header_u64(RETRY_AFTER.as_str()) {
        return Duration::from_secs(secs);
    }
    if let Some(reset) = header_u64("x-ratelimit-reset") {
        let now = now.timestamp().max(0) as u64;
        return Duration::from_secs(reset.saturating_sub(now));
    }
    DEFAULT_RATE_LIMIT_WAIT
}

/// GitHub error bodies are `{"message": ...}`; fall back to the raw text.
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.to_string())
}
