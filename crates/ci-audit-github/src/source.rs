//! Record source abstraction
//!
//! `RecordSource` is the seam between the audits and GitHub: one method per
//! endpoint, one page per call. [`paginate`] turns any page-fetching closure
//! into a lazy stream that requests the next page only once the current one
//! is consumed.
//!
//! Implementations:
//! - [`crate::GithubClient`]: the REST client
//! - [`crate::fakes::MemorySource`]: in-memory fake for tests

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};

use crate::models::{
    CheckRun, Commit, CommitStatus, GitRef, IssueSearchItem, PullRequest, Release, Tag,
};
use crate::Result;

/// One page of a paginated collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Whether the source advertised another page after this one.
    pub has_next: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, has_next: bool) -> Self {
        Self { items, has_next }
    }

    /// A final page.
    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, false)
    }

    pub fn empty() -> Self {
        Self::last(Vec::new())
    }
}

/// Filter and ordering for listing pull requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullQuery {
    /// `open`, `closed` or `all`
    pub state: String,
    /// `created`, `updated`, `popularity` or `long-running`
    pub sort: String,
    /// `asc` or `desc`
    pub direction: String,
}

impl PullQuery {
    /// All pull requests, most recently updated first.
    pub fn recently_updated() -> Self {
        Self {
            state: "all".to_string(),
            sort: "updated".to_string(),
            direction: "desc".to_string(),
        }
    }

    /// All pull requests, oldest created first (snapshot order).
    pub fn oldest_created() -> Self {
        Self {
            state: "all".to_string(),
            sort: "created".to_string(),
            direction: "asc".to_string(),
        }
    }
}

/// Paginated, read-only access to one repository's records.
///
/// Pages are 1-based. Absent single records surface as
/// [`crate::GithubError::NotFound`].
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn list_pulls_page(&self, query: &PullQuery, page: u32) -> Result<Page<PullRequest>>;

    /// Search open pull requests updated after `updated_after`.
    async fn search_open_pulls_page(
        &self,
        updated_after: DateTime<Utc>,
        page: u32,
    ) -> Result<Page<IssueSearchItem>>;

    async fn list_pull_commits_page(&self, number: u64, page: u32) -> Result<Page<Commit>>;

    /// Releases in API order (newest created first).
    async fn list_releases_page(&self, page: u32) -> Result<Page<Release>>;

    async fn get_release_by_tag(&self, tag: &str) -> Result<Release>;

    /// Resolve `tags/<tag>`.
    async fn get_tag_ref(&self, tag: &str) -> Result<GitRef>;

    async fn list_tags_page(&self, page: u32) -> Result<Page<Tag>>;

    async fn list_commits_page(&self, since: DateTime<Utc>, page: u32) -> Result<Page<Commit>>;

    async fn list_check_runs_page(&self, git_ref: &str, page: u32) -> Result<Page<CheckRun>>;

    /// Statuses for a ref, newest first.
    async fn list_statuses_page(&self, git_ref: &str, page: u32) -> Result<Page<CommitStatus>>;
}

struct PageCursor<T, F> {
    fetch: F,
    next_page: Option<u32>,
    buffered: std::vec::IntoIter<T>,
}

/// Lazily walk every page produced by `fetch`, yielding records in order.
///
/// `fetch` is called with 1, 2, ... and is not called again once a page
/// reports `has_next == false` or an error has been yielded.
pub fn paginate<'a, T, F, Fut>(fetch: F) -> BoxStream<'a, Result<T>>
where
    T: Send + 'a,
    F: FnMut(u32) -> Fut + Send + 'a,
    Fut: Future<Output = Result<Page<T>>> + Send + 'a,
{
    let cursor = PageCursor {
        fetch,
        next_page: Some(1),
        buffered: Vec::new().into_iter(),
    };

    stream::try_unfold(cursor, |mut cursor| async move {
        loop {
            if let Some(item) = cursor.buffered.next() {
                return Ok(Some((item, cursor)));
            }
            let Some(page) = cursor.next_page else {
                return Ok(None);
            };
            let fetched = match (cursor.fetch)(page).await {
                Ok(fetched) => fetched,
                Err(err) => return Err(err),
            };
            cursor.next_page = fetched.has_next.then_some(page + 1);
            cursor.buffered = fetched.items.into_iter();
        }
    })
    .boxed()
}

/// Drain a paginated stream into a vector.
pub async fn collect_all<T>(mut records: BoxStream<'_, Result<T>>) -> Result<Vec<T>> {
    let mut all = Vec::new();
    while let Some(record) = records.next().await {
        all.push(record?);
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GithubError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_paginate_walks_pages_in_order() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let records = paginate(move |page| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok::<_, GithubError>(match page {
                    1 => Page::new(vec![1, 2], true),
                    2 => Page::new(vec![3], true),
                    _ => Page::last(vec![4]),
                })
            }
        });

        let all = collect_all(records).await.expect("collect");
        assert_eq!(all, vec![1, 2, 3, 4]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_paginate_is_lazy() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut records = paginate(move |page| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, GithubError>(Page::new(vec![page * 10, page * 10 + 1], true)) }
        });

        assert_eq!(records.next().await.unwrap().unwrap(), 10);
        assert_eq!(records.next().await.unwrap().unwrap(), 11);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(records.next().await.unwrap().unwrap(), 20);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_paginate_stops_after_error() {
        let mut records = paginate(|page| async move {
            if page == 1 {
                Ok(Page::new(vec!["a"], true))
            } else {
                Err(GithubError::Http("connection reset".to_string()))
            }
        });

        assert_eq!(records.next().await.unwrap().unwrap(), "a");
        assert!(records.next().await.unwrap().is_err());
        assert!(records.next().await.is_none());
    }

    #[tokio::test]
    async fn test_paginate_empty_collection() {
        let records = paginate(|_| async { Ok::<_, GithubError>(Page::<u32>::empty()) });
        assert!(collect_all(records).await.unwrap().is_empty());
    }
}
