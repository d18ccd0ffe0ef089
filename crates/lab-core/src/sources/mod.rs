//! Sources: where test files live.
//!
//! A [`Source`] discovers files from one backend and resolves references
//! relative to files it produced earlier. Backends:
//!
//! - [`fs`]: local directories and files
//! - [`git`]: a remote repository, cloned once per source
//! - [`http`]: a single file fetched over HTTP with retries
//! - [`aggregate`]: several backends read in order, failing fast
//! - [`noop`]: nothing at all
//!
//! Locations are turned into sources by [`new`].

pub mod aggregate;
pub mod error;
pub mod file;
pub mod fs;
pub mod git;
pub mod http;
pub mod location;
pub mod noop;
pub mod stream;

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub use aggregate::Aggregate;
pub use error::{DiscoveryError, SourceError, SourceResult};
pub use file::File;
pub use fs::FileSystem;
pub use git::Git;
pub use http::{Http, HttpOptions};
pub use location::{create, new};
pub use noop::Noop;
pub use stream::{Discovered, Stream, StreamSender};

/// Extension of unit test scripts.
pub const SCRIPT_EXTENSION: &str = ".fql";

/// Extensions of suite manifests.
pub const MANIFEST_EXTENSIONS: [&str; 2] = [".yaml", ".yml"];

/// Discovery capability of one backend.
///
/// Both operations return immediately and produce their output on a
/// background task. Cancellation is checked before each discovered unit.
pub trait Source: fmt::Debug + Send + Sync {
    /// Discover every supported file of this source.
    fn read(self: Arc<Self>, cancel: CancellationToken) -> Stream;

    /// Resolve `reference` relative to `base`, the name of a file this source
    /// produced. The stream carries one file or one error.
    fn resolve(self: Arc<Self>, cancel: CancellationToken, base: &str, reference: &str) -> Stream;
}

/// Whether `name` has an extension a test case can be built from.
pub fn is_supported_file(name: &str) -> bool {
    match file::extension_of(name) {
        Some(ext) => ext == SCRIPT_EXTENSION || MANIFEST_EXTENSIONS.contains(&ext.as_str()),
        None => false,
    }
}
