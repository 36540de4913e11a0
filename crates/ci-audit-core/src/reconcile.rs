//! Pull-request / release reconciliation (the manifest audit).
//!
//! Consumes pull requests newest-updated-first. Each record is either skipped
//! by the eligibility filter (no I/O) or checked: its `merge_pr_<N>` release
//! is looked up and its manifest assets validated. The scan ends when the
//! stream is exhausted or a record was last updated before the scan floor;
//! the stream is ordered, so nothing newer can follow.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ci_audit_github::{paginate, GithubError, PullQuery, PullRequest, RecordSource};
use futures::stream::{self, BoxStream, StreamExt};
use tracing::{debug, info};

use crate::eligibility::{EligibilityPolicy, SkipReason};
use crate::manifest::{validate_release, ManifestPolicy};
use crate::release_cache::ReleaseCache;
use crate::report::{Finding, Report, Severity};

/// Configuration for one manifest audit run.
#[derive(Debug, Clone)]
pub struct ManifestAuditConfig {
    pub eligibility: EligibilityPolicy,
    pub manifest: ManifestPolicy,
    /// The scan stops at the first pull request updated before this.
    pub scan_floor: DateTime<Utc>,
    /// Severity for an eligible pull request without a release.
    pub missing_release: Severity,
}

impl Default for ManifestAuditConfig {
    fn default() -> Self {
        let eligibility = EligibilityPolicy::default();
        Self {
            scan_floor: eligibility.tags_since,
            eligibility,
            manifest: ManifestPolicy::default(),
            missing_release: Severity::Info,
        }
    }
}

/// Result of a manifest audit run.
#[derive(Debug, Clone, Default)]
pub struct ManifestAuditOutcome {
    pub report: Report,
    /// Pull requests consumed above the scan floor.
    pub scanned: usize,
    /// Pull requests that went through release lookup and validation.
    pub checked: usize,
    pub skipped: BTreeMap<SkipReason, usize>,
}

impl ManifestAuditOutcome {
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }
}

/// Pull requests from the API, most recently updated first.
pub fn pulls_from_source(
    source: &dyn RecordSource,
) -> BoxStream<'_, Result<PullRequest, GithubError>> {
    paginate(move |page| async move {
        source
            .list_pulls_page(&PullQuery::recently_updated(), page)
            .await
    })
}

/// Pull requests from a local snapshot, reordered most recently updated
/// first so the scan floor applies.
pub fn pulls_from_snapshot(
    mut pulls: Vec<PullRequest>,
) -> BoxStream<'static, Result<PullRequest, GithubError>> {
    pulls.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    stream::iter(pulls.into_iter().map(Ok)).boxed()
}

/// The manifest audit over one record source and one release cache.
pub struct ManifestAudit<'a> {
    source: &'a dyn RecordSource,
    cache: &'a ReleaseCache,
    config: ManifestAuditConfig,
}

impl<'a> ManifestAudit<'a> {
    pub fn new(
        source: &'a dyn RecordSource,
        cache: &'a ReleaseCache,
        config: ManifestAuditConfig,
    ) -> Self {
        Self {
            source,
            cache,
            config,
        }
    }

    /// Run the scan to completion. Any source failure aborts the run.
    pub async fn run(
        &self,
        mut pulls: BoxStream<'_, Result<PullRequest, GithubError>>,
    ) -> Result<ManifestAuditOutcome, GithubError> {
        let mut outcome = ManifestAuditOutcome::default();

        info!(
            tags_since = %self.config.eligibility.tags_since,
            scan_floor = %self.config.scan_floor,
            "starting manifest audit"
        );

        while let Some(pr) = pulls.next().await {
            let pr = pr?;

            if pr.updated_at < self.config.scan_floor {
                debug!(number = pr.number, updated_at = %pr.updated_at, "reached scan floor");
                break;
            }
            outcome.scanned += 1;

            if let Err(reason) = self.config.eligibility.evaluate(&pr) {
                debug!(number = pr.number, %reason, "skipping pull request");
                *outcome.skipped.entry(reason).or_default() += 1;
                continue;
            }

            outcome.checked += 1;
            let findings = self.check_pull(&pr).await?;
            outcome.report.extend(findings);

            if outcome.checked % 500 == 0 {
                info!(checked = outcome.checked, scanned = outcome.scanned, "progress");
            }
        }

        info!(
            scanned = outcome.scanned,
            checked = outcome.checked,
            skipped = outcome.skipped_total(),
            errors = outcome.report.count(Severity::Error),
            "manifest audit finished"
        );
        Ok(outcome)
    }

    /// Look up and validate the release for one eligible pull request.
    pub async fn check_pull(&self, pr: &PullRequest) -> Result<Vec<Finding>, GithubError> {
        let tag = pr.merge_tag();

        let Some(release) = self.cache.lookup(self.source, &tag).await? else {
            let message = match self.source.get_tag_ref(&tag).await {
                Ok(_) => "no release",
                Err(e) if e.is_not_found() => "no tag",
                Err(e) => return Err(e),
            };
            return Ok(vec![Finding::new(
                tag,
                self.config.missing_release,
                message,
            )
            .with_url(pr.html_url.clone())]);
        };

        let violations = validate_release(&release, &self.config.manifest);
        if violations.is_empty() {
            return Ok(vec![Finding::ok(tag).with_url(release.html_url)]);
        }

        Ok(violations
            .into_iter()
            .map(|v| Finding::error(tag.clone(), v.to_string()).with_url(release.html_url.clone()))
            .collect())
    }
}
