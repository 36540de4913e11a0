//! Findings and the per-run report.
//!
//! Every audit appends [`Finding`]s to a [`Report`] instead of printing as it
//! goes. The binary prints the report and derives the exit code from it: a
//! run fails iff at least one finding has [`Severity::Error`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// How bad a finding is. Ordered from harmless to fatal-for-the-run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Record checked and fine.
    Ok,
    /// Expected absence or plain status information.
    Info,
    /// Probably an infrastructure problem; does not fail the run.
    Warning,
    /// Policy violation; fails the run.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Ok => "ok",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}

/// One diagnostic about one record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Finding {
    /// What the finding is about, e.g. `merge_pr_123` or `#123`.
    pub subject: String,
    pub severity: Severity,
    pub message: String,
    /// Where to look (release page, check run details, status target).
    pub url: Option<String>,
}

impl Finding {
    pub fn new(subject: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            severity,
            message: message.into(),
            url: None,
        }
    }

    pub fn ok(subject: impl Into<String>) -> Self {
        Self::new(subject, Severity::Ok, "OK")
    }

    pub fn info(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(subject, Severity::Info, message)
    }

    pub fn warning(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(subject, Severity::Warning, message)
    }

    pub fn error(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(subject, Severity::Error, message)
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Ok | Severity::Info => write!(f, "{}: {}", self.subject, self.message)?,
            severity => write!(f, "{}: {}: {}", self.subject, severity, self.message)?,
        }
        if let Some(url) = &self.url {
            write!(f, " ({})", url)?;
        }
        Ok(())
    }
}

/// Counts per severity.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportSummary {
    pub ok: usize,
    pub info: usize,
    pub warnings: usize,
    pub errors: usize,
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ok, {} info, {} warning(s), {} error(s)",
            self.ok, self.info, self.warnings, self.errors
        )
    }
}

/// Ordered accumulator of findings for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Report {
    findings: Vec<Finding>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    pub fn extend(&mut self, findings: impl IntoIterator<Item = Finding>) {
        self.findings.extend(findings);
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// Findings about one subject, in insertion order.
    pub fn for_subject<'a>(&'a self, subject: &'a str) -> impl Iterator<Item = &'a Finding> + 'a {
        self.findings.iter().filter(move |f| f.subject == subject)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            ok: self.count(Severity::Ok),
            info: self.count(Severity::Info),
            warnings: self.count(Severity::Warning),
            errors: self.count(Severity::Error),
        }
    }

    /// 0 when the run found no errors, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.has_errors() {
            1
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_passes() {
        let report = Report::new();
        assert!(!report.has_errors());
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.summary(), ReportSummary::default());
    }

    #[test]
    fn test_warnings_do_not_fail_the_run() {
        let mut report = Report::new();
        report.push(Finding::ok("merge_pr_1"));
        report.push(Finding::warning("#2", "no Taskcluster status"));
        report.push(Finding::info("merge_pr_3", "no release"));

        assert!(!report.has_errors());
        assert_eq!(report.exit_code(), 0);
        assert_eq!(
            report.summary(),
            ReportSummary {
                ok: 1,
                info: 1,
                warnings: 1,
                errors: 0
            }
        );
    }

    #[test]
    fn test_single_error_fails_the_run() {
        let mut report = Report::new();
        report.push(Finding::ok("merge_pr_1"));
        report.push(Finding::error("merge_pr_2", "no gz manifest found"));
        assert!(report.has_errors());
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_finding_display() {
        assert_eq!(Finding::ok("merge_pr_7").to_string(), "merge_pr_7: OK");
        assert_eq!(
            Finding::error("merge_pr_7", "manifest too small (10)")
                .with_url("https://example.invalid/r/7")
                .to_string(),
            "merge_pr_7: error: manifest too small (10) (https://example.invalid/r/7)"
        );
    }

    #[test]
    fn test_for_subject_filters() {
        let mut report = Report::new();
        report.extend(vec![
            Finding::error("a", "one"),
            Finding::error("b", "two"),
            Finding::error("a", "three"),
        ]);
        let messages: Vec<&str> = report.for_subject("a").map(|f| f.message.as_str()).collect();
        assert_eq!(messages, vec!["one", "three"]);
    }

    #[test]
    fn test_severity_serde() {
        let json = serde_json::to_string(&Severity::Warning).expect("serialize");
        assert_eq!(json, "\"warning\"");
    }
}
