//! ci-audit-github: typed access to the GitHub REST API for ci-audit
//!
//! This crate is the record source layer. It provides:
//! - Record models (pull requests, tags, releases, check runs, statuses)
//! - The [`RecordSource`] trait with a REST implementation and an in-memory fake
//! - Lazy pagination via [`paginate`]
//! - Bounded rate-limit retry (the only retry policy in the system)
//! - A local JSON snapshot of pulls, tags and releases

pub mod client;
pub mod error;
pub mod fakes;
pub mod models;
pub mod snapshot;
pub mod source;

pub use client::{github_timestamp, GithubClient, GithubConfig, DEFAULT_API_BASE};
pub use error::GithubError;
pub use models::{
    merge_tag_for, Asset, BaseRef, CheckRun, Commit, CommitStatus, GitObject, GitRef, HeadRef,
    IssueSearchItem, PullRequest, Release, Tag, TagCommit,
};
pub use snapshot::{SnapshotError, SnapshotResult, SnapshotStore, UpdateSummary};
pub use source::{collect_all, paginate, Page, PullQuery, RecordSource};

/// Result type for record source operations
pub type Result<T> = std::result::Result<T, GithubError>;
