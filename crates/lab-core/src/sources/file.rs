//! A discovered test artifact.

use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::error::DiscoveryError;
use super::stream::Stream;
use super::Source;

/// One file produced by a [`Source`].
///
/// The file keeps a handle to the source it came from, so references inside
/// it (a suite pointing at a query script) are resolved against the same
/// backend and the same base location.
#[derive(Debug, Clone)]
pub struct File {
    /// Path, repository path or URL identifying the file.
    pub name: String,
    /// Raw content. Undefined when `error` is set.
    pub content: Vec<u8>,
    pub source: Arc<dyn Source>,
    pub error: Option<DiscoveryError>,
}

impl File {
    pub fn new(source: Arc<dyn Source>, name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content,
            source,
            error: None,
        }
    }

    /// A file that was located but could not be read.
    pub fn failed(source: Arc<dyn Source>, name: impl Into<String>, err: DiscoveryError) -> Self {
        Self {
            name: name.into(),
            content: Vec::new(),
            source,
            error: Some(err),
        }
    }

    /// Content decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }

    /// The name without a URL query string or fragment.
    pub fn path(&self) -> &str {
        path_of(&self.name)
    }

    /// Extension of the file name including the leading dot, if any.
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.name)
    }

    /// Resolve `reference` relative to this file through its own source.
    pub fn resolve(&self, cancel: CancellationToken, reference: &str) -> Stream {
        Arc::clone(&self.source).resolve(cancel, &self.name, reference)
    }
}

// URLs may carry a query string or fragment after the file name.
fn path_of(name: &str) -> &str {
    name.split(['?', '#']).next().unwrap_or(name)
}

pub(crate) fn extension_of(name: &str) -> Option<String> {
    Path::new(path_of(name))
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::noop::Noop;

    #[test]
    fn extension_includes_dot() {
        let file = File::new(Arc::new(Noop), "tests/login.fql", Vec::new());
        assert_eq!(file.extension().as_deref(), Some(".fql"));
    }

    #[test]
    fn extension_ignores_url_query() {
        assert_eq!(
            extension_of("https://example.com/suite.yaml?token=1").as_deref(),
            Some(".yaml")
        );
    }

    #[test]
    fn path_drops_query_and_fragment() {
        let file = File::new(Arc::new(Noop), "https://example.com/t.fail.fql?v=1#top", Vec::new());
        assert_eq!(file.path(), "https://example.com/t.fail.fql");

        let file = File::new(Arc::new(Noop), "tests/a.fql", Vec::new());
        assert_eq!(file.path(), "tests/a.fql");
    }

    #[test]
    fn text_is_lossy() {
        let file = File::new(Arc::new(Noop), "a.fql", vec![b'R', 0xff]);
        assert_eq!(file.text(), "R\u{fffd}");
    }
}
