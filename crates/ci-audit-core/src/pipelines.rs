//! Per-PR status of the named CI check on the last commit of every open pull
//! request updated since the check was introduced.

use chrono::{DateTime, Utc};
use ci_audit_github::{collect_all, paginate, GithubError, IssueSearchItem, RecordSource};
use futures::stream::StreamExt;
use tracing::{debug, info};

use crate::ci_status::{check_runs_for, pipelines_since, DEFAULT_CHECK_NAME};
use crate::report::{Finding, Report};

#[derive(Debug, Clone)]
pub struct PipelinesAuditConfig {
    pub check_name: String,
    /// Search lower bound; pull requests created earlier may lack the check.
    pub since: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

impl Default for PipelinesAuditConfig {
    fn default() -> Self {
        Self {
            check_name: DEFAULT_CHECK_NAME.to_string(),
            since: pipelines_since(),
            now: Utc::now(),
        }
    }
}

pub struct PipelinesAudit<'a> {
    source: &'a dyn RecordSource,
    config: PipelinesAuditConfig,
}

impl<'a> PipelinesAudit<'a> {
    pub fn new(source: &'a dyn RecordSource, config: PipelinesAuditConfig) -> Self {
        Self { source, config }
    }

    pub async fn run(&self) -> Result<Report, GithubError> {
        let source = self.source;
        let since = self.config.since;
        let mut items = paginate(move |page| source.search_open_pulls_page(since, page));

        let mut report = Report::new();
        let mut searched = 0usize;
        while let Some(item) = items.next().await {
            let item = item?;
            searched += 1;
            if let Some(finding) = self.check_item(&item).await? {
                report.push(finding);
            }
        }

        info!(pulls = searched, check = %self.config.check_name, "pipelines audit finished");
        Ok(report)
    }

    /// Status of the named check on the last commit of one pull request.
    /// `None` when the pull request predates the check and has no run.
    pub async fn check_item(
        &self,
        item: &IssueSearchItem,
    ) -> Result<Option<Finding>, GithubError> {
        let subject = format!("#{}", item.number);
        let source = self.source;
        let number = item.number;
        let commits =
            collect_all(paginate(move |page| source.list_pull_commits_page(number, page))).await?;

        let Some(last) = commits.last() else {
            return Ok(Some(Finding::warning(subject, "no commits")));
        };

        let checks = check_runs_for(self.source, &last.sha).await?;
        let Some(run) = checks.into_iter().find(|c| c.name == self.config.check_name) else {
            if item.created_at < self.config.since {
                debug!(number, "created before check was introduced");
                return Ok(None);
            }
            return Ok(Some(Finding::warning(subject, "no check")));
        };

        let finding = if !run.is_completed() {
            let message = match run.started_at {
                Some(started_at) => format!(
                    "{} (started {} min ago)",
                    run.status,
                    (self.config.now - started_at).num_minutes()
                ),
                None => run.status.clone(),
            };
            Finding::info(subject, message)
        } else {
            let conclusion = run.conclusion.clone().unwrap_or_else(|| "unknown".to_string());
            if conclusion == "failure" {
                Finding::error(subject, conclusion)
            } else {
                Finding::info(subject, conclusion)
            }
        };

        Ok(Some(match run.details_url {
            Some(url) => finding.with_url(url),
            None => finding,
        }))
    }
}
