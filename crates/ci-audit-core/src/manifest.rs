//! Manifest asset classification and release validation.
//!
//! A manifest asset is named `MANIFEST-<40 hex sha>.json.<ext>`. A release
//! passes when it carries at most one manifest per format, every manifest is
//! uploaded and at least `min_asset_size` bytes, and every required format is
//! present. All violations are collected; validation never stops early.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use ci_audit_github::{Asset, Release};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default size floor. The compressed manifest has been well above this for
/// years; anything smaller is almost certainly truncated.
pub const DEFAULT_MIN_ASSET_SIZE: u64 = 1_700_000;

fn manifest_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^MANIFEST-([0-9a-f]{40})\.json\.([A-Za-z0-9]+)$")
            .expect("manifest pattern is a valid regex")
    })
}

/// Parsed manifest asset name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestName {
    /// Commit the manifest was generated for.
    pub sha: String,
    /// Format extension, e.g. `gz` or `br`.
    pub format: String,
}

/// Classify an asset name. `None` for anything that is not a manifest.
pub fn classify_asset_name(name: &str) -> Option<ManifestName> {
    let caps = manifest_pattern().captures(name)?;
    Some(ManifestName {
        sha: caps[1].to_string(),
        format: caps[2].to_string(),
    })
}

/// Thresholds for release validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestPolicy {
    /// Smallest acceptable manifest, in bytes.
    pub min_asset_size: u64,
    /// Formats that must be present.
    pub required_formats: Vec<String>,
}

impl Default for ManifestPolicy {
    fn default() -> Self {
        Self {
            min_asset_size: DEFAULT_MIN_ASSET_SIZE,
            required_formats: vec!["gz".to_string()],
        }
    }
}

impl ManifestPolicy {
    pub fn with_min_asset_size(mut self, min_asset_size: u64) -> Self {
        self.min_asset_size = min_asset_size;
        self
    }

    pub fn with_required_formats(mut self, formats: Vec<String>) -> Self {
        self.required_formats = formats;
        self
    }
}

/// A single problem with a release's manifest assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Violation {
    AssetNotUploaded { asset: String, state: String },
    MultipleManifests { format: String, count: usize },
    AssetTooSmall { asset: String, size: u64, min: u64 },
    MissingFormat { format: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::AssetNotUploaded { asset, state } => {
                write!(f, "{} is in state {} (expected uploaded)", asset, state)
            }
            Violation::MultipleManifests { format, count } => {
                write!(f, "multiple manifests ({} {} assets)", count, format)
            }
            Violation::AssetTooSmall { asset, size, min } => {
                write!(f, "{} too small ({} < {} bytes)", asset, size, min)
            }
            Violation::MissingFormat { format } => write!(f, "no {} manifest found", format),
        }
    }
}

/// Validate every manifest asset of `release` against `policy`.
pub fn validate_release(release: &Release, policy: &ManifestPolicy) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut by_format: BTreeMap<String, Vec<&Asset>> = BTreeMap::new();

    for asset in &release.assets {
        let Some(name) = classify_asset_name(&asset.name) else {
            continue;
        };
        by_format.entry(name.format).or_default().push(asset);

        if !asset.is_uploaded() {
            violations.push(Violation::AssetNotUploaded {
                asset: asset.name.clone(),
                state: asset.state.clone(),
            });
        }
        if asset.size < policy.min_asset_size {
            violations.push(Violation::AssetTooSmall {
                asset: asset.name.clone(),
                size: asset.size,
                min: policy.min_asset_size,
            });
        }
    }

    for (format, assets) in &by_format {
        if assets.len() > 1 {
            violations.push(Violation::MultipleManifests {
                format: format.clone(),
                count: assets.len(),
            });
        }
    }

    for format in &policy.required_formats {
        if !by_format.contains_key(format) {
            violations.push(Violation::MissingFormat {
                format: format.clone(),
            });
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const SHA: &str = "0123456789abcdef0123456789abcdef01234567";

    fn asset(name: &str, state: &str, size: u64) -> Asset {
        Asset {
            name: name.to_string(),
            state: state.to_string(),
            size,
        }
    }

    fn manifest(ext: &str, state: &str, size: u64) -> Asset {
        asset(&format!("MANIFEST-{}.json.{}", SHA, ext), state, size)
    }

    fn release(assets: Vec<Asset>) -> Release {
        Release {
            id: 1,
            tag_name: "merge_pr_1".to_string(),
            html_url: "https://github.com/o/r/releases/tag/merge_pr_1".to_string(),
            draft: false,
            created_at: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            assets,
        }
    }

    #[test]
    fn test_gz_manifest_classifies() {
        let name = classify_asset_name(&format!("MANIFEST-{}.json.gz", SHA)).expect("match");
        assert_eq!(name.format, "gz");
        assert_eq!(name.sha, SHA);
    }

    #[test]
    fn test_non_manifest_names_do_not_match() {
        for name in [
            "MANIFEST.json.gz".to_string(),
            "MANIFEST-.json.gz".to_string(),
            format!("MANIFEST-{}.json.gz", &SHA[..39]),
            format!("MANIFEST-{}0.json.gz", SHA),
            format!("MANIFEST-{}.json.gz", SHA.replace('a', "g")),
            format!("MANIFEST-{}.json.gz", SHA.to_uppercase()),
            format!("MANIFEST-{}.json", SHA),
            format!("MANIFEST-{}xjson.gz", SHA),
            "wpt-report.json".to_string(),
        ] {
            assert_eq!(classify_asset_name(&name), None, "{name} should not match");
        }
    }

    #[test]
    fn test_valid_release_has_no_violations() {
        let release = release(vec![
            manifest("gz", "uploaded", 1_700_000),
            manifest("bz2", "uploaded", 1_800_000),
            asset("notes.txt", "uploaded", 3),
        ]);
        assert!(validate_release(&release, &ManifestPolicy::default()).is_empty());
    }

    #[test]
    fn test_duplicate_format_reported_and_rest_still_checked() {
        let release = release(vec![
            manifest("gz", "uploaded", 2_000_000),
            asset(
                "MANIFEST-ffffffffffffffffffffffffffffffffffffffff.json.gz",
                "uploaded",
                2_000_000,
            ),
            manifest("br", "pending", 10),
        ]);

        let violations = validate_release(&release, &ManifestPolicy::default());
        assert!(violations.contains(&Violation::MultipleManifests {
            format: "gz".to_string(),
            count: 2
        }));
        assert!(violations
            .iter()
            .any(|v| matches!(v, Violation::AssetNotUploaded { state, .. } if state == "pending")));
        assert!(violations
            .iter()
            .any(|v| matches!(v, Violation::AssetTooSmall { size: 10, .. })));
        assert_eq!(violations.len(), 3);
    }

    #[test]
    fn test_missing_gz_reported_once() {
        let release = release(vec![manifest("br", "uploaded", 1_800_000)]);
        let violations = validate_release(&release, &ManifestPolicy::default());
        assert_eq!(
            violations,
            vec![Violation::MissingFormat {
                format: "gz".to_string()
            }]
        );
        assert_eq!(violations[0].to_string(), "no gz manifest found");
    }

    #[test]
    fn test_empty_release_only_missing_format() {
        let violations = validate_release(&release(Vec::new()), &ManifestPolicy::default());
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn test_size_floor_is_configurable() {
        let release = release(vec![manifest("gz", "uploaded", 1_700_000)]);
        let strict = ManifestPolicy::default().with_min_asset_size(2_000_000);
        assert_eq!(
            validate_release(&release, &strict),
            vec![Violation::AssetTooSmall {
                asset: format!("MANIFEST-{}.json.gz", SHA),
                size: 1_700_000,
                min: 2_000_000
            }]
        );
    }

    #[test]
    fn test_pending_asset_is_state_violation() {
        let release = release(vec![manifest("gz", "pending", 1_700_000)]);
        let violations = validate_release(&release, &ManifestPolicy::default());
        assert_eq!(
            violations,
            vec![Violation::AssetNotUploaded {
                asset: format!("MANIFEST-{}.json.gz", SHA),
                state: "pending".to_string()
            }]
        );
    }
}
