//! Source used when no locations are given.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::stream::Stream;
use super::Source;

/// Yields nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct Noop;

impl Source for Noop {
    fn read(self: Arc<Self>, _cancel: CancellationToken) -> Stream {
        Stream::empty()
    }

    fn resolve(self: Arc<Self>, cancel: CancellationToken, _base: &str, _reference: &str) -> Stream {
        self.read(cancel)
    }
}
