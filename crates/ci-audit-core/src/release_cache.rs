//! Tag-to-release cache.
//!
//! Filled by one bounded scan of the release listing so that the common case
//! costs no request per pull request. The scan trusts the API's
//! newest-created-first order and stops after the first page that reaches
//! past the cutoff; anything older is looked up by tag on demand.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use ci_audit_github::{GithubError, RecordSource, Release};
use tracing::{debug, info};

/// Non-draft releases keyed by tag name.
#[derive(Debug, Clone, Default)]
pub struct ReleaseCache {
    by_tag: HashMap<String, Release>,
    pages_scanned: u32,
}

impl ReleaseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan release pages until one contains a release created before
    /// `cutoff`, or the listing ends. An empty listing gives an empty cache.
    pub async fn load(
        source: &dyn RecordSource,
        cutoff: DateTime<Utc>,
    ) -> Result<Self, GithubError> {
        let mut cache = Self::new();
        let mut page = 1;

        loop {
            let fetched = source.list_releases_page(page).await?;
            cache.pages_scanned = page;

            let oldest = fetched.items.last().map(|r| r.created_at);
            for release in fetched.items {
                cache.insert(release);
            }

            debug!(page, cached = cache.len(), ?oldest, "scanned release page");

            let reached_cutoff = oldest.map(|at| at < cutoff).unwrap_or(true);
            if reached_cutoff || !fetched.has_next {
                break;
            }
            page += 1;
        }

        info!(
            releases = cache.len(),
            pages = cache.pages_scanned,
            cutoff = %cutoff,
            "release cache loaded"
        );
        Ok(cache)
    }

    /// Insert a release; drafts are ignored.
    pub fn insert(&mut self, release: Release) {
        if release.draft {
            return;
        }
        self.by_tag.insert(release.tag_name.clone(), release);
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.by_tag.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }

    /// Pages requested by [`ReleaseCache::load`].
    pub fn pages_scanned(&self) -> u32 {
        self.pages_scanned
    }

    /// Release for `tag`: from the cache, else by direct lookup.
    ///
    /// A missing release is `Ok(None)`; any other failure propagates.
    pub async fn lookup(
        &self,
        source: &dyn RecordSource,
        tag: &str,
    ) -> Result<Option<Release>, GithubError> {
        if let Some(release) = self.by_tag.get(tag) {
            return Ok(Some(release.clone()));
        }

        debug!(tag, "release cache miss");
        match source.get_release_by_tag(tag).await {
            Ok(release) if release.draft => Ok(None),
            Ok(release) => Ok(Some(release)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
