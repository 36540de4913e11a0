//! Eligibility filter for the manifest audit.
//!
//! Decides whether a pull request is expected to have a `merge_pr_<N>`
//! release yet. Conditions are evaluated in a fixed order and the first
//! disqualifier wins, so a skip always carries exactly one reason.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, TimeZone, Utc};
use ci_audit_github::PullRequest;
use serde::{Deserialize, Serialize};

/// Why a pull request was not checked.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Listed in the manual ignore set.
    Ignored,
    /// Base branch is not one of the accepted branches.
    WrongBase,
    /// Closed without merging, or still open.
    NotMerged,
    /// Merged before `merge_pr_*` tags were introduced.
    MergedBeforeCutoff,
    /// Updated within the grace window; artifacts may still be generating.
    RecentlyUpdated,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::Ignored => "ignored",
            SkipReason::WrongBase => "wrong base branch",
            SkipReason::NotMerged => "not merged",
            SkipReason::MergedBeforeCutoff => "merged before tags were introduced",
            SkipReason::RecentlyUpdated => "recently updated",
        };
        f.write_str(s)
    }
}

/// `merge_pr_*` tags exist for merges since July 2017.
pub fn default_tags_since() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2017, 7, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Policy parameters for the eligibility filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityPolicy {
    /// Merges before this instant are not expected to have tags.
    pub tags_since: DateTime<Utc>,
    /// Pull requests updated less than this long before `now` are skipped.
    pub grace_window: Duration,
    /// Pull requests never checked.
    pub ignore: BTreeSet<u64>,
    /// Accepted base branch names.
    pub base_branches: Vec<String>,
    /// Reference time for the grace window.
    pub now: DateTime<Utc>,
}

impl Default for EligibilityPolicy {
    fn default() -> Self {
        Self {
            tags_since: default_tags_since(),
            grace_window: Duration::hours(1),
            ignore: BTreeSet::new(),
            base_branches: vec!["master".to_string(), "main".to_string()],
            now: Utc::now(),
        }
    }
}

impl EligibilityPolicy {
    pub fn with_tags_since(mut self, tags_since: DateTime<Utc>) -> Self {
        self.tags_since = tags_since;
        self
    }

    pub fn with_grace_window(mut self, grace_window: Duration) -> Self {
        self.grace_window = grace_window;
        self
    }

    pub fn with_ignore(mut self, ignore: impl IntoIterator<Item = u64>) -> Self {
        self.ignore.extend(ignore);
        self
    }

    pub fn with_base_branches(mut self, branches: Vec<String>) -> Self {
        self.base_branches = branches;
        self
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// `Ok(())` when the pull request should be checked, otherwise the first
    /// reason it should not.
    pub fn evaluate(&self, pr: &PullRequest) -> Result<(), SkipReason> {
        if self.ignore.contains(&pr.number) {
            return Err(SkipReason::Ignored);
        }
        if !self.base_branches.iter().any(|b| b == &pr.base.ref_name) {
            return Err(SkipReason::WrongBase);
        }
        let Some(merged_at) = pr.merged_at else {
            return Err(SkipReason::NotMerged);
        };
        if merged_at < self.tags_since {
            return Err(SkipReason::MergedBeforeCutoff);
        }
        if pr.updated_at > self.now - self.grace_window {
            return Err(SkipReason::RecentlyUpdated);
        }
        Ok(())
    }

    pub fn is_eligible(&self, pr: &PullRequest) -> bool {
        self.evaluate(pr).is_ok()
    }
}
