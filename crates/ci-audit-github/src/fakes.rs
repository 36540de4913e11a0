//! In-memory fake for the record source (testing only)
//!
//! `MemorySource` serves canned records through the [`RecordSource`] trait
//! and logs every request it receives, so tests can assert how many pages or
//! lookups a stage issued.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::GithubError;
use crate::models::*;
use crate::source::{Page, PullQuery, RecordSource};
use crate::Result;

/// In-memory record source. Collections are split into pages of
/// `page_size`; releases can also be given as explicit pages.
#[derive(Debug)]
pub struct MemorySource {
    page_size: usize,
    pulls: Vec<PullRequest>,
    search_items: Vec<IssueSearchItem>,
    pull_commits: HashMap<u64, Vec<Commit>>,
    release_pages: Vec<Vec<Release>>,
    releases_by_tag: HashMap<String, Release>,
    tag_refs: HashSet<String>,
    tags: Vec<Tag>,
    commits: Vec<Commit>,
    check_runs: HashMap<String, Vec<CheckRun>>,
    statuses: HashMap<String, Vec<CommitStatus>>,
    failing_tags: HashSet<String>,
    requests: Mutex<Vec<String>>,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self {
            page_size: 100,
            pulls: Vec::new(),
            search_items: Vec::new(),
            pull_commits: HashMap::new(),
            release_pages: Vec::new(),
            releases_by_tag: HashMap::new(),
            tag_refs: HashSet::new(),
            tags: Vec::new(),
            commits: Vec::new(),
            check_runs: HashMap::new(),
            statuses: HashMap::new(),
            failing_tags: HashSet::new(),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Pull requests, served in the given order.
    pub fn with_pulls(mut self, pulls: Vec<PullRequest>) -> Self {
        self.pulls = pulls;
        self
    }

    pub fn with_search_items(mut self, items: Vec<IssueSearchItem>) -> Self {
        self.search_items = items;
        self
    }

    pub fn with_pull_commits(mut self, number: u64, commits: Vec<Commit>) -> Self {
        self.pull_commits.insert(number, commits);
        self
    }

    /// Append one page to the release listing. Releases are also
    /// reachable by tag.
    pub fn with_release_page(mut self, releases: Vec<Release>) -> Self {
        for release in &releases {
            self.releases_by_tag
                .insert(release.tag_name.clone(), release.clone());
            self.tag_refs.insert(release.tag_name.clone());
        }
        self.release_pages.push(releases);
        self
    }

    /// A release reachable only through the by-tag lookup.
    pub fn with_release(mut self, release: Release) -> Self {
        self.tag_refs.insert(release.tag_name.clone());
        self.releases_by_tag
            .insert(release.tag_name.clone(), release);
        self
    }

    /// A tag that exists without a release.
    pub fn with_tag_ref(mut self, tag: &str) -> Self {
        self.tag_refs.insert(tag.to_string());
        self
    }

    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_commits(mut self, commits: Vec<Commit>) -> Self {
        self.commits = commits;
        self
    }

    pub fn with_check_runs(mut self, git_ref: &str, runs: Vec<CheckRun>) -> Self {
        self.check_runs.insert(git_ref.to_string(), runs);
        self
    }

    pub fn with_statuses(mut self, git_ref: &str, statuses: Vec<CommitStatus>) -> Self {
        self.statuses.insert(git_ref.to_string(), statuses);
        self
    }

    /// Make the by-tag lookup for `tag` fail with a server error.
    pub fn with_failing_tag(mut self, tag: &str) -> Self {
        self.failing_tags.insert(tag.to_string());
        self
    }

    /// Every request received so far, e.g. `releases?page=2`.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests whose log entry starts with `prefix`.
    pub fn request_count(&self, prefix: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.starts_with(prefix))
            .count()
    }

    fn log(&self, request: String) {
        self.requests.lock().unwrap().push(request);
    }

    fn page_of<T: Clone>(&self, items: &[T], page: u32) -> Page<T> {
        let start = (page.saturating_sub(1) as usize).saturating_mul(self.page_size);
        if start >= items.len() {
            return Page::empty();
        }
        let end = (start + self.page_size).min(items.len());
        Page::new(items[start..end].to_vec(), end < items.len())
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn list_pulls_page(&self, query: &PullQuery, page: u32) -> Result<Page<PullRequest>> {
        self.log(format!("pulls?state={}&page={}", query.state, page));
        let matching: Vec<PullRequest> = self
            .pulls
            .iter()
            .filter(|pr| query.state == "all" || pr.state == query.state)
            .cloned()
            .collect();
        Ok(self.page_of(&matching, page))
    }

    async fn search_open_pulls_page(
        &self,
        updated_after: DateTime<Utc>,
        page: u32,
    ) -> Result<Page<IssueSearchItem>> {
        self.log(format!("search?page={}", page));
        let matching: Vec<IssueSearchItem> = self
            .search_items
            .iter()
            .filter(|item| item.updated_at > updated_after)
            .cloned()
            .collect();
        Ok(self.page_of(&matching, page))
    }

    async fn list_pull_commits_page(&self, number: u64, page: u32) -> Result<Page<Commit>> {
        self.log(format!("pulls/{}/commits?page={}", number, page));
        let commits = self.pull_commits.get(&number).cloned().unwrap_or_default();
        Ok(self.page_of(&commits, page))
    }

    async fn list_releases_page(&self, page: u32) -> Result<Page<Release>> {
        self.log(format!("releases?page={}", page));
        let index = page.saturating_sub(1) as usize;
        match self.release_pages.get(index) {
            Some(releases) => Ok(Page::new(
                releases.clone(),
                index + 1 < self.release_pages.len(),
            )),
            None => Ok(Page::empty()),
        }
    }

    async fn get_release_by_tag(&self, tag: &str) -> Result<Release> {
        self.log(format!("releases/tags/{}", tag));
        if self.failing_tags.contains(tag) {
            return Err(GithubError::Api {
                status: 500,
                url: format!("releases/tags/{}", tag),
                message: "Server Error".to_string(),
            });
        }
        self.releases_by_tag
            .get(tag)
            .cloned()
            .ok_or_else(|| GithubError::NotFound {
                url: format!("releases/tags/{}", tag),
            })
    }

    async fn get_tag_ref(&self, tag: &str) -> Result<GitRef> {
        self.log(format!("git/ref/tags/{}", tag));
        if self.tag_refs.contains(tag) {
            Ok(GitRef {
                ref_name: format!("refs/tags/{}", tag),
                object: GitObject {
                    sha: "0".repeat(40),
                },
            })
        } else {
            Err(GithubError::NotFound {
                url: format!("git/ref/tags/{}", tag),
            })
        }
    }

    async fn list_tags_page(&self, page: u32) -> Result<Page<Tag>> {
        self.log(format!("tags?page={}", page));
        Ok(self.page_of(&self.tags, page))
    }

    async fn list_commits_page(&self, _since: DateTime<Utc>, page: u32) -> Result<Page<Commit>> {
        self.log(format!("commits?page={}", page));
        Ok(self.page_of(&self.commits, page))
    }

    async fn list_check_runs_page(&self, git_ref: &str, page: u32) -> Result<Page<CheckRun>> {
        self.log(format!("commits/{}/check-runs?page={}", git_ref, page));
        let runs = self.check_runs.get(git_ref).cloned().unwrap_or_default();
        Ok(self.page_of(&runs, page))
    }

    async fn list_statuses_page(&self, git_ref: &str, page: u32) -> Result<Page<CommitStatus>> {
        self.log(format!("commits/{}/statuses?page={}", git_ref, page));
        let statuses = self.statuses.get(git_ref).cloned().unwrap_or_default();
        Ok(self.page_of(&statuses, page))
    }
}
