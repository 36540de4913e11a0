//! Error types for ci-audit-github

use thiserror::Error;

/// Errors that can occur while talking to the record source
#[derive(Error, Debug)]
pub enum GithubError {
    /// No token in the environment
    #[error(
        "GITHUB_TOKEN is not set. Please set the GITHUB_TOKEN environment variable \
         (create one at https://github.com/settings/tokens)"
    )]
    MissingToken,

    /// The requested record does not exist (HTTP 404)
    #[error("Not found: {url}")]
    NotFound { url: String },

    /// Rate limit or abuse detection still in effect after all retries
    #[error("Rate limited by GitHub after {attempts} attempt(s): {message}")]
    RateLimited { attempts: u32, message: String },

    /// Any other non-success response
    #[error("GitHub API returned {status} for {url}: {message}")]
    Api {
        status: u16,
        url: String,
        message: String,
    },

    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON parsing error (includes malformed timestamps)
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GithubError {
    /// Whether this error is the expected "record absent" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, GithubError::NotFound { .. })
    }

    /// Whether this error is a rate-limit or abuse-detection rejection.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GithubError::RateLimited { .. })
    }
}

impl From<reqwest::Error> for GithubError {
    fn from(err: reqwest::Error) -> Self {
        GithubError::Http(err.to_string())
    }
}
