//! End-to-end manifest audit: release cache, eligibility, lookup, validation.

use chrono::{DateTime, Duration, TimeZone, Utc};
use ci_audit_core::{
    pulls_from_source, EligibilityPolicy, ManifestAudit, ManifestAuditConfig, ReleaseCache,
    Severity, SkipReason,
};
use ci_audit_github::fakes::MemorySource;
use ci_audit_github::{Asset, BaseRef, HeadRef, PullRequest, Release};

const MANIFEST_GZ: &str = "MANIFEST-89ab89ab89ab89ab89ab89ab89ab89ab89ab89ab.json.gz";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn merged_on_main(number: u64, updated_at: DateTime<Utc>) -> PullRequest {
    let merged_at = Utc.with_ymd_and_hms(2017, 7, 2, 9, 30, 0).unwrap();
    PullRequest {
        number,
        state: "closed".to_string(),
        base: BaseRef {
            ref_name: "main".to_string(),
        },
        head: HeadRef {
            sha: "e".repeat(40),
        },
        merged_at: Some(merged_at),
        created_at: merged_at - Duration::days(2),
        updated_at,
        html_url: format!("https://github.com/web-platform-tests/wpt/pull/{}", number),
    }
}

fn release_with(number: u64, state: &str) -> Release {
    Release {
        id: 9000 + number,
        tag_name: format!("merge_pr_{}", number),
        html_url: format!(
            "https://github.com/web-platform-tests/wpt/releases/tag/merge_pr_{}",
            number
        ),
        draft: false,
        created_at: now() - Duration::hours(3),
        assets: vec![Asset {
            name: MANIFEST_GZ.to_string(),
            state: state.to_string(),
            size: 1_700_000,
        }],
    }
}

fn config() -> ManifestAuditConfig {
    ManifestAuditConfig {
        eligibility: EligibilityPolicy::default()
            .with_now(now())
            .with_grace_window(Duration::hours(1)),
        ..Default::default()
    }
}

async fn audit(source: &MemorySource) -> ci_audit_core::ManifestAuditOutcome {
    let cache = ReleaseCache::load(source, now() - Duration::days(30))
        .await
        .expect("cache");
    let audit = ManifestAudit::new(source, &cache, config());
    audit.run(pulls_from_source(source)).await.expect("run")
}

#[tokio::test]
async fn test_uploaded_manifest_reports_ok() {
    let source = MemorySource::new()
        .with_pulls(vec![merged_on_main(6400, now() - Duration::hours(2))])
        .with_release_page(vec![release_with(6400, "uploaded")]);

    let outcome = audit(&source).await;

    assert_eq!(outcome.checked, 1);
    let findings = outcome.report.findings();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].severity, Severity::Ok);
    assert_eq!(findings[0].message, "OK");
    assert_eq!(outcome.report.exit_code(), 0);
    // resolved from the cache
    assert_eq!(source.request_count("releases/tags/"), 0);
}

#[tokio::test]
async fn test_pending_manifest_fails_run() {
    let source = MemorySource::new()
        .with_pulls(vec![merged_on_main(6400, now() - Duration::hours(2))])
        .with_release_page(vec![release_with(6400, "pending")]);

    let outcome = audit(&source).await;

    let findings = outcome.report.findings();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].severity, Severity::Error);
    assert!(findings[0].message.contains("pending"));
    assert_eq!(outcome.report.exit_code(), 1);
}

#[tokio::test]
async fn test_mixed_stream() {
    let mut unmerged = merged_on_main(3, now() - Duration::hours(4));
    unmerged.merged_at = None;

    let source = MemorySource::new()
        .with_page_size(2)
        .with_pulls(vec![
            merged_on_main(5, now() - Duration::minutes(10)),
            merged_on_main(4, now() - Duration::hours(3)),
            unmerged,
            merged_on_main(2, now() - Duration::hours(5)),
        ])
        .with_release_page(vec![release_with(4, "uploaded")])
        .with_tag_ref("merge_pr_2");

    let outcome = audit(&source).await;

    assert_eq!(outcome.scanned, 4);
    assert_eq!(outcome.checked, 2);
    assert_eq!(outcome.skipped.get(&SkipReason::RecentlyUpdated), Some(&1));
    assert_eq!(outcome.skipped.get(&SkipReason::NotMerged), Some(&1));

    let two: Vec<_> = outcome.report.for_subject("merge_pr_2").collect();
    assert_eq!(two.len(), 1);
    assert_eq!(two[0].message, "no release");
    assert_eq!(outcome.report.exit_code(), 0);
    assert_eq!(source.request_count("pulls?"), 2);
}
