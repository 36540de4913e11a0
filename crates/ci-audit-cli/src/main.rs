//! ci-audit - audit CI artifacts and check statuses of a GitHub repository
//!
//! ## Commands
//!
//! - `manifest`: every eligible merged pull request has a `merge_pr_<N>`
//!   release carrying a well-formed manifest
//! - `checks`: open pull requests (and optionally the default branch) carry
//!   the expected CI checks and statuses
//! - `pipelines`: status of the named CI check on open pull requests
//! - `update-data`: refresh the local JSON snapshot of pulls, tags, releases
//!
//! Report lines go to stdout, logs to stderr. The exit code is 1 when any
//! finding is an error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};

use ci_audit_core::{
    default_tags_since, open_pulls, pipelines_since, pulls_from_snapshot, pulls_from_source,
    ChecksAudit, ChecksAuditConfig, EligibilityPolicy, ManifestAudit, ManifestAuditConfig,
    ManifestPolicy, PipelinesAudit, PipelinesAuditConfig, ReleaseCache, Report, Severity,
    DEFAULT_MIN_ASSET_SIZE,
};
use ci_audit_github::{
    GithubClient, GithubConfig, GithubError, SnapshotStore, DEFAULT_API_BASE,
};

/// Upper bound for `--grace-hours` (one year).
const MAX_GRACE_HOURS: i64 = 24 * 365;
/// Upper bound for day-count lookbacks (a century).
const MAX_LOOKBACK_DAYS: i64 = 36_500;

#[derive(Parser, Debug)]
#[command(name = "ci-audit")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Audit CI artifacts and check statuses of a GitHub repository", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Report output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Repository owner
    #[arg(long, global = true, env = "CI_AUDIT_OWNER", default_value = "web-platform-tests")]
    owner: String,

    /// Repository name
    #[arg(long, global = true, env = "CI_AUDIT_REPO", default_value = "wpt")]
    repo: String,

    /// GitHub API root
    #[arg(long, global = true, env = "GITHUB_API_URL", default_value = DEFAULT_API_BASE)]
    api_url: String,

    /// Personal access token
    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Retries after a rate-limit rejection before giving up
    #[arg(long, global = true, default_value = "2", value_parser = clap::value_parser!(u32).range(0..=10))]
    max_retries: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that merged pull requests have a release with a valid manifest
    Manifest {
        /// Merges before this instant are not expected to have tags
        #[arg(long)]
        tags_since: Option<DateTime<Utc>>,

        /// Skip pull requests updated within this many hours
        #[arg(long, default_value = "1", value_parser = clap::value_parser!(i64).range(0..=MAX_GRACE_HOURS))]
        grace_hours: i64,

        /// Pull request numbers never checked (comma-separated or repeated)
        #[arg(long, value_delimiter = ',')]
        ignore: Vec<u64>,

        /// Accepted base branches
        #[arg(long = "base-branch", value_delimiter = ',', default_values = ["master", "main"])]
        base_branches: Vec<String>,

        /// Smallest acceptable manifest asset, in bytes
        #[arg(long, default_value_t = DEFAULT_MIN_ASSET_SIZE)]
        min_asset_size: u64,

        /// Manifest formats that must be present
        #[arg(long = "required-format", value_delimiter = ',', default_values = ["gz"])]
        required_formats: Vec<String>,

        /// How far back the release listing is cached, in days
        #[arg(long, default_value = "90", value_parser = clap::value_parser!(i64).range(0..=MAX_LOOKBACK_DAYS))]
        release_cache_days: i64,

        /// Stop scanning at pull requests updated before this (default: tags-since)
        #[arg(long)]
        scan_floor: Option<DateTime<Utc>>,

        /// Read pull requests from a local snapshot instead of the API
        #[arg(long)]
        from_snapshot: Option<PathBuf>,

        /// Report a missing release as an error
        #[arg(long)]
        strict: bool,
    },

    /// Check CI checks and statuses of open pull requests
    Checks {
        /// Look back this many days
        #[arg(long, default_value = "7", value_parser = clap::value_parser!(i64).range(0..=MAX_LOOKBACK_DAYS))]
        days: i64,

        /// Also audit commits on the default branch
        #[arg(long)]
        default_branch: bool,

        /// Check run expected on every pull request
        #[arg(long, default_value = ci_audit_core::ci_status::DEFAULT_CHECK_NAME)]
        check_name: String,

        /// Status context expected on every pull request
        #[arg(long, default_value = ci_audit_core::ci_status::DEFAULT_PR_STATUS_CONTEXT)]
        pr_status: String,

        /// Status context expected on default-branch commits
        #[arg(long, default_value = ci_audit_core::ci_status::DEFAULT_PUSH_STATUS_CONTEXT)]
        push_status: String,
    },

    /// Show the named CI check's status on open pull requests
    Pipelines {
        /// Check run to report
        #[arg(long, default_value = ci_audit_core::ci_status::DEFAULT_CHECK_NAME)]
        check_name: String,

        /// Only pull requests updated after this (default: when the check was introduced)
        #[arg(long)]
        since: Option<DateTime<Utc>>,
    },

    /// Refresh the local snapshot of pulls, tags and releases
    UpdateData {
        /// Snapshot directory
        #[arg(long, default_value = "data")]
        snapshot_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    ci_audit_core::init_tracing(cli.json, level);

    let client = build_client(&cli)?;
    let format = cli.format;

    let report = match cli.command {
        Commands::Manifest {
            tags_since,
            grace_hours,
            ignore,
            base_branches,
            min_asset_size,
            required_formats,
            release_cache_days,
            scan_floor,
            from_snapshot,
            strict,
        } => {
            let eligibility = EligibilityPolicy::default()
                .with_tags_since(tags_since.unwrap_or_else(default_tags_since))
                .with_grace_window(
                    Duration::try_hours(grace_hours).context("--grace-hours out of range")?,
                )
                .with_ignore(ignore)
                .with_base_branches(base_branches);
            let config = ManifestAuditConfig {
                scan_floor: scan_floor.unwrap_or(eligibility.tags_since),
                eligibility,
                manifest: ManifestPolicy::default()
                    .with_min_asset_size(min_asset_size)
                    .with_required_formats(required_formats),
                missing_release: if strict {
                    Severity::Error
                } else {
                    Severity::Info
                },
            };
            cmd_manifest(
                &client,
                config,
                Duration::try_days(release_cache_days)
                    .context("--release-cache-days out of range")?,
                from_snapshot.as_deref(),
            )
            .await?
        }
        Commands::Checks {
            days,
            default_branch,
            check_name,
            pr_status,
            push_status,
        } => {
            let now = Utc::now();
            let span = Duration::try_days(days).context("--days out of range")?;
            let config = ChecksAuditConfig {
                check_name,
                pr_status_context: pr_status,
                push_status_context: push_status,
                since: lookback(now, span)?,
                now,
                ..Default::default()
            };
            cmd_checks(&client, config, default_branch).await?
        }
        Commands::Pipelines { check_name, since } => {
            let config = PipelinesAuditConfig {
                check_name,
                since: since.unwrap_or_else(pipelines_since),
                now: Utc::now(),
            };
            cmd_pipelines(&client, config).await?
        }
        Commands::UpdateData { snapshot_dir } => {
            cmd_update_data(&client, &snapshot_dir).await?;
            return Ok(ExitCode::SUCCESS);
        }
    };

    print_report(&report, format)?;
    Ok(ExitCode::from(report.exit_code()))
}

fn build_client(cli: &Cli) -> Result<GithubClient> {
    let token = cli
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or(GithubError::MissingToken)?;

    let config = GithubConfig::new(&cli.owner, &cli.repo)
        .with_token(token)
        .with_max_rate_limit_retries(cli.max_retries)
        .with_api_base(&cli.api_url);
    GithubClient::new(config).context("Failed to build GitHub client")
}

/// `now - span`, or an error when that is not a representable instant.
fn lookback(now: DateTime<Utc>, span: Duration) -> Result<DateTime<Utc>> {
    now.checked_sub_signed(span)
        .with_context(|| format!("{} before {} is out of range", span, now))
}

fn print_report(report: &Report, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for finding in report.findings() {
                println!("{}", finding);
            }
            println!();
            println!("Summary: {}", report.summary());
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "findings": report.findings(),
                "summary": report.summary(),
                "passed": !report.has_errors(),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&json).context("Failed to encode report")?
            );
        }
    }
    Ok(())
}

async fn cmd_manifest(
    client: &GithubClient,
    config: ManifestAuditConfig,
    cache_window: Duration,
    from_snapshot: Option<&Path>,
) -> Result<Report> {
    let cutoff = lookback(config.eligibility.now, cache_window)?;
    let cache = ReleaseCache::load(client, cutoff)
        .await
        .context("Failed to load releases")?;

    let pulls = match from_snapshot {
        Some(dir) => {
            let store = SnapshotStore::new(dir);
            let pulls = store
                .read_pulls()
                .with_context(|| format!("Failed to read snapshot in {}", dir.display()))?;
            info!(pulls = pulls.len(), dir = %dir.display(), "read pull request snapshot");
            pulls_from_snapshot(pulls)
        }
        None => pulls_from_source(client),
    };

    let audit = ManifestAudit::new(client, &cache, config);
    let outcome = audit.run(pulls).await.context("Manifest audit failed")?;

    for (reason, count) in &outcome.skipped {
        info!(%reason, count, "skipped");
    }
    Ok(outcome.report)
}

async fn cmd_checks(
    client: &GithubClient,
    config: ChecksAuditConfig,
    default_branch: bool,
) -> Result<Report> {
    let audit = ChecksAudit::new(client, config);

    let mut report = Report::new();
    if default_branch {
        let branch = audit
            .run_default_branch()
            .await
            .context("Default branch audit failed")?;
        report.extend(branch.findings().iter().cloned());
    }

    let pulls = audit
        .run_open_pulls(open_pulls(client))
        .await
        .context("Pull request audit failed")?;
    report.extend(pulls.findings().iter().cloned());
    Ok(report)
}

async fn cmd_pipelines(client: &GithubClient, config: PipelinesAuditConfig) -> Result<Report> {
    PipelinesAudit::new(client, config)
        .run()
        .await
        .context("Pipelines audit failed")
}

async fn cmd_update_data(client: &GithubClient, snapshot_dir: &Path) -> Result<()> {
    let store = SnapshotStore::new(snapshot_dir);
    let summary = store
        .update_all(client)
        .await
        .with_context(|| format!("Failed to update snapshot in {}", snapshot_dir.display()))?;

    println!(
        "Updated {}: {} pulls, {} tags, {} releases",
        snapshot_dir.display(),
        summary.pulls,
        summary.tags,
        summary.releases
    );
    Ok(())
}
