//! Git repository source.
//!
//! The repository is cloned (default branch, depth 1) into a temporary
//! directory on first use. The clone is shared by every later `read` and
//! `resolve` on the same source, and file contents are always taken from
//! the HEAD commit tree rather than the working copy.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use globset::{Glob, GlobMatcher};
use tempfile::TempDir;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::error::{DiscoveryError, SourceResult};
use super::file::File;
use super::stream::{Stream, StreamSender};
use super::{is_supported_file, Source};

/// Discovers files from the HEAD commit of a remote repository.
#[derive(Debug)]
pub struct Git {
    url: String,
    filter: Option<GlobMatcher>,
    checkout: Mutex<Option<Arc<TempDir>>>,
}

impl Git {
    /// Create a source for the clone URL `url`.
    pub fn new(url: impl Into<String>, filter: Option<&str>) -> SourceResult<Self> {
        let filter = match filter {
            Some(pattern) => Some(Glob::new(pattern)?.compile_matcher()),
            None => None,
        };

        Ok(Self {
            url: url.into(),
            filter,
            checkout: Mutex::new(None),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn matches(&self, path: &str) -> bool {
        match &self.filter {
            Some(filter) => filter.is_match(path),
            None => true,
        }
    }

    /// Clone once; later callers wait on the lock and reuse the clone.
    #[instrument(skip(self, cancel), fields(url = %self.url))]
    async fn checkout(&self, cancel: &CancellationToken) -> Result<Arc<TempDir>, String> {
        let mut guard = self.checkout.lock().await;

        if let Some(dir) = guard.as_ref() {
            return Ok(Arc::clone(dir));
        }

        let dir = tempfile::tempdir().map_err(|e| format!("create checkout directory: {e}"))?;

        info!("cloning repository");

        let args = ["clone", "--quiet", "--depth", "1", self.url.as_str(), "."];
        let clone = git(dir.path(), &args);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err("clone cancelled".to_string()),
            res = clone => { res?; }
        }

        let dir = Arc::new(dir);
        *guard = Some(Arc::clone(&dir));

        Ok(dir)
    }

    async fn discover(self: Arc<Self>, tx: StreamSender) {
        let source: Arc<dyn Source> = self.clone();

        let checkout = match self.checkout(tx.cancellation()).await {
            Ok(dir) => dir,
            Err(err) => {
                tx.error(DiscoveryError::new(self.url.clone(), err).into_fatal()).await;
                return;
            }
        };

        let listing = match git(checkout.path(), &["ls-tree", "-r", "-z", "--name-only", "HEAD"]).await {
            Ok(listing) => listing,
            Err(err) => {
                tx.error(DiscoveryError::new(self.url.clone(), err).into_fatal()).await;
                return;
            }
        };

        for path in listing
            .split(|b| *b == 0)
            .filter(|entry| !entry.is_empty())
            .map(|entry| String::from_utf8_lossy(entry).into_owned())
        {
            if tx.is_cancelled() {
                debug!(url = %self.url, "git discovery cancelled");
                return;
            }

            if !is_supported_file(&path) || !self.matches(&path) {
                continue;
            }

            let sent = match read_blob(checkout.path(), &path).await {
                Ok(content) => tx.file(File::new(Arc::clone(&source), path, content)).await,
                Err(err) => tx.error(DiscoveryError::new(path, err)).await,
            };

            if !sent {
                return;
            }
        }
    }
}

impl Source for Git {
    fn read(self: Arc<Self>, cancel: CancellationToken) -> Stream {
        let (tx, stream) = Stream::channel(cancel);
        tokio::spawn(self.discover(tx));
        stream
    }

    fn resolve(self: Arc<Self>, cancel: CancellationToken, base: &str, reference: &str) -> Stream {
        let Some(path) = join_repo_path(base, reference) else {
            return Stream::failed(DiscoveryError::new(
                reference,
                "reference points outside of the repository",
            ));
        };

        let (tx, stream) = Stream::channel(cancel);

        tokio::spawn(async move {
            let checkout = match self.checkout(tx.cancellation()).await {
                Ok(dir) => dir,
                Err(err) => {
                    tx.error(DiscoveryError::new(path, err)).await;
                    return;
                }
            };

            match read_blob(checkout.path(), &path).await {
                Ok(content) => {
                    let source: Arc<dyn Source> = self;
                    tx.file(File::new(source, path, content)).await;
                }
                Err(err) => {
                    tx.error(DiscoveryError::new(path, err)).await;
                }
            }
        });

        stream
    }
}

async fn read_blob(repo: &Path, path: &str) -> Result<Vec<u8>, String> {
    let object = format!("HEAD:{path}");
    git(repo, &["cat-file", "blob", object.as_str()]).await
}

async fn git(cwd: &Path, args: &[&str]) -> Result<Vec<u8>, String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| format!("failed to run git: {e}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("git {} failed: {}", args[0], stderr.trim()));
    }

    Ok(output.stdout)
}

/// Join `reference` onto the directory of `base`, both repository paths.
///
/// A leading `/` makes the reference relative to the repository root.
/// Returns `None` when `..` climbs above the root.
fn join_repo_path(base: &str, reference: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();

    if !reference.starts_with('/') {
        parts.extend(base.split('/').filter(|p| !p.is_empty()));
        // Drop the file name itself.
        parts.pop();
    }

    for part in reference.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return None;
    }

    Some(parts.join("/"))
}
