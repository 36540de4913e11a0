//! Snapshot refresh against the in-memory source.

use chrono::{TimeZone, Utc};
use ci_audit_github::fakes::MemorySource;
use ci_audit_github::{
    BaseRef, HeadRef, PullRequest, Release, SnapshotStore, Tag, TagCommit, UpdateSummary,
};

fn pr(number: u64) -> PullRequest {
    let at = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap();
    PullRequest {
        number,
        state: "closed".to_string(),
        base: BaseRef {
            ref_name: "master".to_string(),
        },
        head: HeadRef {
            sha: "a".repeat(40),
        },
        merged_at: Some(at),
        created_at: at,
        updated_at: at,
        html_url: format!("https://github.com/o/r/pull/{}", number),
    }
}

fn release(id: u64) -> Release {
    Release {
        id,
        tag_name: format!("merge_pr_{}", id),
        html_url: format!("https://github.com/o/r/releases/{}", id),
        draft: false,
        created_at: Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap(),
        assets: Vec::new(),
    }
}

#[tokio::test]
async fn test_update_all_then_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path());

    let source = MemorySource::new()
        .with_page_size(2)
        .with_pulls(vec![pr(2), pr(10), pr(9)])
        .with_tags(vec![Tag {
            name: "merge_pr_9".to_string(),
            commit: TagCommit { sha: "b".repeat(40) },
        }])
        .with_release_page(vec![release(12), release(3)])
        .with_release_page(vec![release(100)]);

    let summary = store.update_all(&source).await.expect("update");
    assert_eq!(
        summary,
        UpdateSummary {
            pulls: 3,
            tags: 1,
            releases: 3
        }
    );

    let numbers: Vec<u64> = store
        .read_pulls()
        .unwrap()
        .into_iter()
        .map(|p| p.number)
        .collect();
    assert_eq!(numbers, vec![2, 9, 10], "pulls read back in numeric order");

    let ids: Vec<u64> = store
        .read_releases()
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![3, 12, 100]);

    assert_eq!(store.read_tags().unwrap()[0].name, "merge_pr_9");
    assert_eq!(source.request_count("pulls?"), 2);
}

#[tokio::test]
async fn test_update_overwrites_existing_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path());

    let source = MemorySource::new().with_pulls(vec![pr(1)]);
    store.update_pulls(&source).await.unwrap();

    let mut reopened = pr(1);
    reopened.state = "open".to_string();
    let source = MemorySource::new().with_pulls(vec![reopened]);
    store.update_pulls(&source).await.unwrap();

    let pulls = store.read_pulls().unwrap();
    assert_eq!(pulls.len(), 1);
    assert!(pulls[0].is_open());
}
