//! CI status audit against the in-memory source.

use chrono::{DateTime, Duration, TimeZone, Utc};
use ci_audit_core::{open_pulls, ChecksAudit, ChecksAuditConfig, Severity};
use ci_audit_github::fakes::MemorySource;
use ci_audit_github::{BaseRef, CheckRun, Commit, CommitStatus, HeadRef, PullRequest};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn open_pr(number: u64, sha: &str, updated_at: DateTime<Utc>) -> PullRequest {
    PullRequest {
        number,
        state: "open".to_string(),
        base: BaseRef {
            ref_name: "master".to_string(),
        },
        head: HeadRef {
            sha: sha.to_string(),
        },
        merged_at: None,
        created_at: updated_at - Duration::days(1),
        updated_at,
        html_url: format!("https://github.com/o/r/pull/{}", number),
    }
}

fn check(name: &str, status: &str, conclusion: Option<&str>, started_at: DateTime<Utc>) -> CheckRun {
    CheckRun {
        name: name.to_string(),
        status: status.to_string(),
        conclusion: conclusion.map(str::to_string),
        details_url: Some(format!("https://ci.example/{}", name.replace(' ', "-"))),
        started_at: Some(started_at),
    }
}

fn status(context: &str, state: &str, updated_at: DateTime<Utc>) -> CommitStatus {
    CommitStatus {
        context: context.to_string(),
        state: state.to_string(),
        target_url: Some("https://tc.example/task".to_string()),
        updated_at,
    }
}

fn config() -> ChecksAuditConfig {
    ChecksAuditConfig::default()
        .with_now(now())
        .with_since(now() - Duration::days(7))
}

#[tokio::test]
async fn test_healthy_pull_has_no_findings() {
    let source = MemorySource::new()
        .with_check_runs(
            "a1",
            vec![check("Azure Pipelines", "completed", Some("failure"), now())],
        )
        .with_statuses("a1", vec![status("Taskcluster (pull_request)", "failure", now())]);
    let audit = ChecksAudit::new(&source, config());

    let findings = audit
        .check_pull(&open_pr(1, "a1", now() - Duration::hours(1)))
        .await
        .unwrap();
    assert!(findings.is_empty(), "{findings:?}");
}

#[tokio::test]
async fn test_stuck_check_and_missing_status_are_warnings() {
    let source = MemorySource::new().with_check_runs(
        "b2",
        vec![check(
            "Azure Pipelines",
            "queued",
            None,
            now() - Duration::hours(8),
        )],
    );
    let audit = ChecksAudit::new(&source, config());

    let findings = audit
        .check_pull(&open_pr(2, "b2", now() - Duration::hours(1)))
        .await
        .unwrap();

    assert_eq!(findings.len(), 2);
    assert!(findings.iter().all(|f| f.severity == Severity::Warning));
    assert!(findings[0].message.contains("queued"));
    assert_eq!(findings[1].message, "no Taskcluster (pull_request) status");
}

#[tokio::test]
async fn test_recently_pending_is_quiet() {
    let source = MemorySource::new()
        .with_check_runs(
            "c3",
            vec![check(
                "Azure Pipelines",
                "in_progress",
                None,
                now() - Duration::hours(1),
            )],
        )
        .with_statuses(
            "c3",
            vec![status(
                "Taskcluster (pull_request)",
                "pending",
                now() - Duration::minutes(20),
            )],
        );
    let audit = ChecksAudit::new(&source, config());

    let findings = audit
        .check_pull(&open_pr(3, "c3", now() - Duration::hours(1)))
        .await
        .unwrap();
    assert!(findings.is_empty(), "{findings:?}");
}

#[tokio::test]
async fn test_newest_status_wins() {
    let source = MemorySource::new()
        .with_check_runs(
            "d4",
            vec![check("Azure Pipelines", "completed", Some("success"), now())],
        )
        .with_statuses(
            "d4",
            vec![
                status("Taskcluster (pull_request)", "success", now()),
                status(
                    "Taskcluster (pull_request)",
                    "error",
                    now() - Duration::hours(5),
                ),
            ],
        );
    let audit = ChecksAudit::new(&source, config());

    let findings = audit
        .check_pull(&open_pr(4, "d4", now() - Duration::hours(1)))
        .await
        .unwrap();
    assert!(findings.is_empty(), "{findings:?}");
}

#[tokio::test]
async fn test_open_pull_scan_stops_at_since() {
    let source = MemorySource::new()
        .with_page_size(1)
        .with_pulls(vec![
            open_pr(10, "e5", now() - Duration::days(1)),
            open_pr(11, "f6", now() - Duration::days(9)),
            open_pr(12, "g7", now() - Duration::days(10)),
        ]);
    let audit = ChecksAudit::new(&source, config());

    let report = audit.run_open_pulls(open_pulls(&source)).await.unwrap();

    assert_eq!(report.for_subject("#10").count(), 2);
    assert_eq!(report.for_subject("#11").count(), 0);
    assert_eq!(source.request_count("pulls?state=open"), 2);
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_default_branch_failures_are_errors() {
    let source = MemorySource::new()
        .with_commits(vec![
            Commit {
                sha: "h8".to_string(),
            },
            Commit {
                sha: "i9".to_string(),
            },
        ])
        .with_check_runs(
            "h8",
            vec![
                check("lint", "completed", Some("success"), now()),
                check("wpt-chrome", "completed", Some("failure"), now()),
                check("wpt-firefox", "in_progress", None, now() - Duration::hours(1)),
            ],
        )
        .with_statuses("i9", vec![status("Taskcluster (push)", "error", now())]);
    let audit = ChecksAudit::new(&source, config());

    let report = audit.run_default_branch().await.unwrap();

    let messages: Vec<String> = report.findings().iter().map(|f| f.to_string()).collect();
    assert_eq!(
        messages,
        vec![
            "h8: error: wpt-chrome: failure (https://ci.example/wpt-chrome)".to_string(),
            "i9: error: Taskcluster (push): error (https://tc.example/task)".to_string(),
        ]
    );
    assert_eq!(report.exit_code(), 1);
}
