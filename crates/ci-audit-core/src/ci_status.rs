//! CI status audit for open pull requests and the default branch.
//!
//! Open pull requests are expected to carry the named CI check and the named
//! status context. Anything stuck outside a terminal state (and not merely
//! pending for a short while) is most likely an infrastructure problem and
//! is reported as a warning. On the default branch every non-passing check
//! run and push status is an error.

use std::collections::HashSet;

use chrono::{DateTime, Duration, TimeZone, Utc};
use ci_audit_github::{
    collect_all, paginate, CheckRun, CommitStatus, GithubError, PullQuery, PullRequest,
    RecordSource,
};
use futures::stream::{BoxStream, StreamExt};
use tracing::{debug, info};

use crate::report::{Finding, Report};

pub const DEFAULT_CHECK_NAME: &str = "Azure Pipelines";
pub const DEFAULT_PR_STATUS_CONTEXT: &str = "Taskcluster (pull_request)";
pub const DEFAULT_PUSH_STATUS_CONTEXT: &str = "Taskcluster (push)";

/// When the named CI check started running on pull requests. Pull requests
/// created earlier may legitimately lack it.
pub fn pipelines_since() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2018, 11, 6, 17, 7, 56)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// A check run without a conclusion that started less than `window` ago.
pub fn is_recently_pending_check(check: &CheckRun, now: DateTime<Utc>, window: Duration) -> bool {
    match (&check.conclusion, check.started_at) {
        (None, Some(started_at)) => now - started_at < window,
        _ => false,
    }
}

/// A `pending` status updated less than `window` ago.
pub fn is_recently_pending_status(
    status: &CommitStatus,
    now: DateTime<Utc>,
    window: Duration,
) -> bool {
    status.state == "pending" && now - status.updated_at < window
}

/// Keep only the first status per context. Statuses arrive newest first, so
/// this keeps the current one.
pub fn dedupe_statuses(statuses: Vec<CommitStatus>) -> Vec<CommitStatus> {
    let mut seen = HashSet::new();
    statuses
        .into_iter()
        .filter(|s| seen.insert(s.context.clone()))
        .collect()
}

/// Every check run on `git_ref`.
pub async fn check_runs_for(
    source: &dyn RecordSource,
    git_ref: &str,
) -> Result<Vec<CheckRun>, GithubError> {
    collect_all(paginate(move |page| source.list_check_runs_page(git_ref, page))).await
}

/// Current status per context on `git_ref`.
pub async fn statuses_for(
    source: &dyn RecordSource,
    git_ref: &str,
) -> Result<Vec<CommitStatus>, GithubError> {
    let statuses =
        collect_all(paginate(move |page| source.list_statuses_page(git_ref, page))).await?;
    Ok(dedupe_statuses(statuses))
}

/// Open pull requests, most recently updated first.
pub fn open_pulls(source: &dyn RecordSource) -> BoxStream<'_, Result<PullRequest, GithubError>> {
    let query = PullQuery {
        state: "open".to_string(),
        sort: "updated".to_string(),
        direction: "desc".to_string(),
    };
    paginate(move |page| {
        let query = query.clone();
        async move { source.list_pulls_page(&query, page).await }
    })
}

#[derive(Debug, Clone)]
pub struct ChecksAuditConfig {
    /// Name of the check run expected on every pull request.
    pub check_name: String,
    pub pr_status_context: String,
    pub push_status_context: String,
    /// Only records updated (or committed) after this are audited.
    pub since: DateTime<Utc>,
    /// Pull requests created before this may lack the named check.
    pub check_introduced: DateTime<Utc>,
    pub check_pending_window: Duration,
    pub status_pending_window: Duration,
    pub now: DateTime<Utc>,
}

impl Default for ChecksAuditConfig {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            check_name: DEFAULT_CHECK_NAME.to_string(),
            pr_status_context: DEFAULT_PR_STATUS_CONTEXT.to_string(),
            push_status_context: DEFAULT_PUSH_STATUS_CONTEXT.to_string(),
            since: now - Duration::days(7),
            check_introduced: pipelines_since(),
            check_pending_window: Duration::hours(6),
            status_pending_window: Duration::hours(2),
            now,
        }
    }
}

impl ChecksAuditConfig {
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = since;
        self
    }
}

pub struct ChecksAudit<'a> {
    source: &'a dyn RecordSource,
    config: ChecksAuditConfig,
}

impl<'a> ChecksAudit<'a> {
    pub fn new(source: &'a dyn RecordSource, config: ChecksAuditConfig) -> Self {
        Self { source, config }
    }

    /// Audit open pull requests updated after `since`. The stream must be
    /// ordered most recently updated first; it is abandoned at the first
    /// record at or before `since`.
    pub async fn run_open_pulls(
        &self,
        mut pulls: BoxStream<'_, Result<PullRequest, GithubError>>,
    ) -> Result<Report, GithubError> {
        let mut report = Report::new();
        let mut audited = 0usize;

        while let Some(pr) = pulls.next().await {
            let pr = pr?;
            if pr.updated_at <= self.config.since {
                break;
            }
            if !pr.is_open() {
                continue;
            }
            audited += 1;
            report.extend(self.check_pull(&pr).await?);
        }

        info!(
            pulls = audited,
            since = %self.config.since,
            "audited open pull requests"
        );
        Ok(report)
    }

    /// Findings for the head commit of one open pull request.
    pub async fn check_pull(&self, pr: &PullRequest) -> Result<Vec<Finding>, GithubError> {
        let subject = format!("#{}", pr.number);
        let sha = pr.head.sha.as_str();
        let mut findings = Vec::new();

        let checks = check_runs_for(self.source, sha).await?;
        match checks.iter().find(|c| c.name == self.config.check_name) {
            Some(check) => {
                let pending = is_recently_pending_check(
                    check,
                    self.config.now,
                    self.config.check_pending_window,
                );
                if !pending && !check.is_completed() {
                    let mut finding = Finding::warning(
                        subject.clone(),
                        format!("{}: {} (likely infra problem)", check.name, check.status),
                    );
                    if let Some(url) = &check.details_url {
                        finding = finding.with_url(url.clone());
                    }
                    findings.push(finding);
                }
            }
            None if pr.created_at >= self.config.check_introduced => {
                findings.push(Finding::warning(
                    subject.clone(),
                    format!("no {} check", self.config.check_name),
                ));
            }
            None => debug!(number = pr.number, "created before check was introduced"),
        }

        let statuses = statuses_for(self.source, sha).await?;
        match statuses
            .iter()
            .find(|s| s.context == self.config.pr_status_context)
        {
            Some(status) => {
                let pending = is_recently_pending_status(
                    status,
                    self.config.now,
                    self.config.status_pending_window,
                );
                if !pending && status.state != "success" && status.state != "failure" {
                    let mut finding = Finding::warning(
                        subject.clone(),
                        format!("{}: {} (likely infra problem)", status.context, status.state),
                    );
                    if let Some(url) = &status.target_url {
                        finding = finding.with_url(url.clone());
                    }
                    findings.push(finding);
                }
            }
            None => findings.push(Finding::warning(
                subject,
                format!("no {} status", self.config.pr_status_context),
            )),
        }

        Ok(findings)
    }

    /// Audit every default-branch commit since `since`.
    pub async fn run_default_branch(&self) -> Result<Report, GithubError> {
        let source = self.source;
        let since = self.config.since;
        let commits = collect_all(paginate(move |page| source.list_commits_page(since, page))).await?;

        info!(commits = commits.len(), since = %since, "auditing default branch");

        let mut report = Report::new();
        for commit in &commits {
            report.extend(self.check_commit(&commit.sha).await?);
        }
        Ok(report)
    }

    /// Findings for one default-branch commit.
    pub async fn check_commit(&self, sha: &str) -> Result<Vec<Finding>, GithubError> {
        let mut findings = Vec::new();

        for check in check_runs_for(self.source, sha).await? {
            if matches!(check.conclusion.as_deref(), Some("success") | Some("neutral")) {
                continue;
            }
            if is_recently_pending_check(&check, self.config.now, self.config.check_pending_window)
            {
                continue;
            }
            let outcome = check.conclusion.as_deref().unwrap_or(check.status.as_str());
            let mut finding = Finding::error(sha, format!("{}: {}", check.name, outcome));
            if let Some(url) = check.details_url {
                finding = finding.with_url(url);
            }
            findings.push(finding);
        }

        let statuses = statuses_for(self.source, sha).await?;
        if let Some(status) = statuses
            .iter()
            .find(|s| s.context == self.config.push_status_context)
        {
            let pending = is_recently_pending_status(
                status,
                self.config.now,
                self.config.status_pending_window,
            );
            if !pending && status.state != "success" {
                let mut finding =
                    Finding::error(sha, format!("{}: {}", status.context, status.state));
                if let Some(url) = &status.target_url {
                    finding = finding.with_url(url.clone());
                }
                findings.push(finding);
            }
        }

        Ok(findings)
    }
}
