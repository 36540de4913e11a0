//! Local JSON snapshot of repository records
//!
//! Layout: `<root>/pull/<number>.json`, `<root>/tag/<name>.json`,
//! `<root>/release/<id>.json`, one record per file. Files are written
//! atomically (temp file in the same directory, then rename) and read back in
//! numeric order for pulls and releases, lexical order for tags.

use std::cmp::Ordering;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use crate::error::GithubError;
use crate::models::{PullRequest, Release, Tag};
use crate::source::{paginate, PullQuery, RecordSource};

/// Errors from snapshot operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid record in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("fetching records failed: {0}")]
    Source(#[from] GithubError),
}

pub type SnapshotResult<T> = std::result::Result<T, SnapshotError>;

/// Record counts written by [`SnapshotStore::update_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub pulls: usize,
    pub tags: usize,
    pub releases: usize,
}

#[derive(Debug, Clone, Copy)]
enum FileOrder {
    Numeric,
    Lexical,
}

/// Filesystem-backed snapshot of pulls, tags and releases.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    /// Open a snapshot rooted at `root`. Nothing is created until the first write.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pull_dir(&self) -> PathBuf {
        self.root.join("pull")
    }

    fn tag_dir(&self) -> PathBuf {
        self.root.join("tag")
    }

    fn release_dir(&self) -> PathBuf {
        self.root.join("release")
    }

    /// Refresh pulls, tags and releases in that order.
    pub async fn update_all(&self, source: &dyn RecordSource) -> SnapshotResult<UpdateSummary> {
        let pulls = self.update_pulls(source).await?;
        let tags = self.update_tags(source).await?;
        let releases = self.update_releases(source).await?;
        Ok(UpdateSummary {
            pulls,
            tags,
            releases,
        })
    }

    /// Write every pull request, oldest created first.
    pub async fn update_pulls(&self, source: &dyn RecordSource) -> SnapshotResult<usize> {
        let dir = self.pull_dir();
        let query = PullQuery::oldest_created();
        let query = &query;
        let mut pulls = paginate(move |page| source.list_pulls_page(query, page));

        let mut written = 0;
        while let Some(pr) = pulls.next().await {
            let pr = pr?;
            let path = write_record(&dir, &pr.number.to_string(), &pr)?;
            debug!(path = %path.display(), url = %pr.html_url, "wrote pull request");
            written += 1;
        }
        info!(count = written, dir = %dir.display(), "pull requests updated");
        Ok(written)
    }

    pub async fn update_tags(&self, source: &dyn RecordSource) -> SnapshotResult<usize> {
        let dir = self.tag_dir();
        let mut tags = paginate(move |page| source.list_tags_page(page));

        let mut written = 0;
        while let Some(tag) = tags.next().await {
            let tag = tag?;
            let path = write_record(&dir, &file_stem_for_name(&tag.name), &tag)?;
            debug!(path = %path.display(), tag = %tag.name, "wrote tag");
            written += 1;
        }
        info!(count = written, dir = %dir.display(), "tags updated");
        Ok(written)
    }

    pub async fn update_releases(&self, source: &dyn RecordSource) -> SnapshotResult<usize> {
        let dir = self.release_dir();
        let mut releases = paginate(move |page| source.list_releases_page(page));

        let mut written = 0;
        while let Some(release) = releases.next().await {
            let release = release?;
            let path = write_record(&dir, &release.id.to_string(), &release)?;
            debug!(path = %path.display(), url = %release.html_url, "wrote release");
            written += 1;
        }
        info!(count = written, dir = %dir.display(), "releases updated");
        Ok(written)
    }

    /// Pull requests sorted by number.
    pub fn read_pulls(&self) -> SnapshotResult<Vec<PullRequest>> {
        read_records(&self.pull_dir(), FileOrder::Numeric)
    }

    /// Tags sorted by file name.
    pub fn read_tags(&self) -> SnapshotResult<Vec<Tag>> {
        read_records(&self.tag_dir(), FileOrder::Lexical)
    }

    /// Releases sorted by id.
    pub fn read_releases(&self) -> SnapshotResult<Vec<Release>> {
        read_records(&self.release_dir(), FileOrder::Numeric)
    }
}

/// Tag names may contain `/` (e.g. `epochs/daily/...`).
fn file_stem_for_name(name: &str) -> String {
    name.replace('%', "%25").replace('/', "%2F")
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> SnapshotError + '_ {
    move |source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn write_record<T: Serialize>(dir: &Path, stem: &str, record: &T) -> SnapshotResult<PathBuf> {
    fs::create_dir_all(dir).map_err(io_err(dir))?;
    let path = dir.join(format!("{}.json", stem));

    let bytes = serde_json::to_vec(record).map_err(|source| SnapshotError::Json {
        path: path.clone(),
        source,
    })?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err(dir))?;
    tmp.write_all(&bytes).map_err(io_err(&path))?;
    tmp.persist(&path).map_err(|e| SnapshotError::Io {
        path: path.clone(),
        source: e.error,
    })?;

    Ok(path)
}

fn read_records<T: DeserializeOwned>(dir: &Path, order: FileOrder) -> SnapshotResult<Vec<T>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(dir)(e)),
    };

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(io_err(dir))?.path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            paths.push(path);
        }
    }

    paths.sort_by(|a, b| compare_paths(a, b, order));

    paths
        .iter()
        .map(|path| {
            let bytes = fs::read(path).map_err(io_err(path))?;
            serde_json::from_slice(&bytes).map_err(|source| SnapshotError::Json {
                path: path.clone(),
                source,
            })
        })
        .collect()
}

fn compare_paths(a: &Path, b: &Path, order: FileOrder) -> Ordering {
    let stem = |p: &Path| {
        p.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    };
    let (a, b) = (stem(a), stem(b));
    match order {
        FileOrder::Lexical => a.cmp(&b),
        FileOrder::Numeric => match (a.parse::<u64>(), b.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => a.cmp(&b),
        },
    }
}
