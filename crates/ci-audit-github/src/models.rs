//! Record types returned by the GitHub REST API.
//!
//! Only the fields the audits read are modelled; everything else in the
//! payload is ignored on deserialization. Timestamps are RFC 3339 and a
//! malformed one fails the whole record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Branch reference on the base side of a pull request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BaseRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
}

/// Commit on the head side of a pull request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeadRef {
    pub sha: String,
}

/// A pull request. Identity is `number`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub state: String,
    pub base: BaseRef,
    pub head: HeadRef,
    pub merged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub html_url: String,
}

impl PullRequest {
    /// Tag that the merge of this pull request is expected to produce.
    pub fn merge_tag(&self) -> String {
        merge_tag_for(self.number)
    }

    pub fn is_open(&self) -> bool {
        self.state == "open"
    }
}

/// `merge_pr_<number>`
pub fn merge_tag_for(number: u64) -> String {
    format!("merge_pr_{}", number)
}

/// Commit a tag points to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagCommit {
    pub sha: String,
}

/// A tag as listed by `GET /repos/{owner}/{repo}/tags`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub commit: TagCommit,
}

/// Object a git ref resolves to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitObject {
    pub sha: String,
}

/// A git ref as returned by `GET /repos/{owner}/{repo}/git/ref/{ref}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub object: GitObject,
}

/// A file attached to a release.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Asset {
    pub name: String,
    pub state: String,
    pub size: u64,
}

impl Asset {
    pub fn is_uploaded(&self) -> bool {
        self.state == "uploaded"
    }
}

/// A release. Identity is `tag_name`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Release {
    pub id: u64,
    pub tag_name: String,
    pub html_url: String,
    #[serde(default)]
    pub draft: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// A commit as listed by `GET /repos/{owner}/{repo}/commits`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Commit {
    pub sha: String,
}

/// A check run attached to a ref.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckRun {
    pub name: String,
    pub status: String,
    pub conclusion: Option<String>,
    pub details_url: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

impl CheckRun {
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }
}

/// Envelope of `GET /repos/{owner}/{repo}/commits/{ref}/check-runs`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckRunList {
    pub total_count: u64,
    pub check_runs: Vec<CheckRun>,
}

/// A commit status. Newer statuses come first in API order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitStatus {
    pub context: String,
    pub state: String,
    pub target_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// One hit of the issue search endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssueSearchItem {
    pub number: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Envelope of `GET /search/issues`.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueSearchResults {
    pub total_count: u64,
    pub items: Vec<IssueSearchItem>,
}
