//! ci-audit-core: audit logic for ci-audit
//!
//! - [`eligibility`]: which merged pull requests should have a release
//! - [`release_cache`]: bounded release scan with by-tag fallback
//! - [`manifest`]: manifest asset validation
//! - [`reconcile`]: the manifest audit driver
//! - [`ci_status`] and [`pipelines`]: CI check and status audits
//! - [`report`]: findings and exit status
//! - [`telemetry`]: tracing setup for the binary

pub mod ci_status;
pub mod eligibility;
pub mod manifest;
pub mod pipelines;
pub mod reconcile;
pub mod release_cache;
pub mod report;
pub mod telemetry;

pub use ci_status::{
    dedupe_statuses, is_recently_pending_check, is_recently_pending_status, open_pulls,
    pipelines_since, ChecksAudit, ChecksAuditConfig,
};
pub use eligibility::{default_tags_since, EligibilityPolicy, SkipReason};
pub use manifest::{
    classify_asset_name, validate_release, ManifestName, ManifestPolicy, Violation,
    DEFAULT_MIN_ASSET_SIZE,
};
pub use pipelines::{PipelinesAudit, PipelinesAuditConfig};
pub use reconcile::{
    pulls_from_snapshot, pulls_from_source, ManifestAudit, ManifestAuditConfig,
    ManifestAuditOutcome,
};
pub use release_cache::ReleaseCache;
pub use report::{Finding, Report, ReportSummary, Severity};
pub use telemetry::init_tracing;
