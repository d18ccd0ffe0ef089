//! Local filesystem source.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use globset::{Glob, GlobMatcher};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::error::{DiscoveryError, SourceResult};
use super::file::File;
use super::stream::{Stream, StreamSender};
use super::{is_supported_file, Source};

/// Discovers files under a directory, or a single file.
#[derive(Debug, Clone)]
pub struct FileSystem {
    root: PathBuf,
    filter: Option<GlobMatcher>,
}

impl FileSystem {
    /// Create a source rooted at `path`. Relative paths are made absolute
    /// against the current directory.
    pub fn new(path: impl AsRef<Path>, filter: Option<&str>) -> SourceResult<Self> {
        let path = path.as_ref();
        let root = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let filter = match filter {
            Some(pattern) => Some(Glob::new(pattern)?.compile_matcher()),
            None => None,
        };

        Ok(Self {
            root: normalize(&root),
            filter,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn matches(&self, path: &Path) -> bool {
        match &self.filter {
            Some(filter) => filter.is_match(path),
            None => true,
        }
    }

    fn walk(&self, source: &Arc<dyn Source>, tx: &StreamSender) {
        let root = &self.root;

        let meta = match std::fs::metadata(root) {
            Ok(meta) => meta,
            Err(err) => {
                tx.blocking_error(DiscoveryError::from_error(display(root), err).into_fatal());
                return;
            }
        };

        // A single file named directly.
        if meta.is_file() {
            let name = display(root);

            if !is_supported_file(&name) {
                tx.blocking_error(DiscoveryError::new(name, "unsupported file type").into_fatal());
                return;
            }

            if self.matches(root) {
                read_file(source, tx, root);
            }

            return;
        }

        for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
            if tx.is_cancelled() {
                debug!(root = %root.display(), "filesystem discovery cancelled");
                return;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let name = err.path().map(display).unwrap_or_else(|| display(root));
                    warn!(path = %name, error = %err, "failed to walk directory entry");
                    if !tx.blocking_error(DiscoveryError::from_error(name, err)) {
                        return;
                    }
                    continue;
                }
            };

            // Directories are always descended; filters apply to files only.
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();

            if !is_supported_file(&display(path)) || !self.matches(path) {
                continue;
            }

            if !read_file(source, tx, path) {
                return;
            }
        }
    }
}

impl Source for FileSystem {
    fn read(self: Arc<Self>, cancel: CancellationToken) -> Stream {
        let (tx, stream) = Stream::channel(cancel);

        tokio::task::spawn_blocking(move || {
            let source: Arc<dyn Source> = self.clone();
            self.walk(&source, &tx);
        });

        stream
    }

    fn resolve(self: Arc<Self>, cancel: CancellationToken, base: &str, reference: &str) -> Stream {
        let (tx, stream) = Stream::channel(cancel);
        let target = self.resolve_path(Path::new(base), reference);

        tokio::spawn(async move {
            let name = display(&target);
            debug!(base = %name, "resolving filesystem reference");

            if tx.is_cancelled() {
                return;
            }

            match tokio::fs::read(&target).await {
                Ok(content) => {
                    let source: Arc<dyn Source> = self;
                    tx.file(File::new(source, name, content)).await;
                }
                Err(err) => {
                    tx.error(DiscoveryError::from_error(name, err)).await;
                }
            }
        });

        stream
    }
}

impl FileSystem {
    /// Target of `reference` as seen from the directory holding `base`.
    fn resolve_path(&self, base: &Path, reference: &str) -> PathBuf {
        let reference = Path::new(reference);

        if reference.is_absolute() {
            return normalize(reference);
        }

        let base = if base.is_absolute() {
            base.to_path_buf()
        } else {
            self.root.join(base)
        };

        let dir = base.parent().unwrap_or(&self.root);
        normalize(&dir.join(reference))
    }
}

fn read_file(source: &Arc<dyn Source>, tx: &StreamSender, path: &Path) -> bool {
    let name = display(path);

    match std::fs::read(path) {
        Ok(content) => tx.blocking_file(File::new(Arc::clone(source), name, content)),
        Err(err) => tx.blocking_error(DiscoveryError::from_error(name, err)),
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Lexically resolve `.` and `..` components.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }

    out
}
