//! Several sources read as one.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::DiscoveryError;
use super::stream::{Discovered, Stream};
use super::Source;

/// Reads its backends in order, forwarding files as they arrive.
///
/// Per-file errors are forwarded and discovery goes on. The first fatal error
/// from any backend ends the whole discovery: backends that have not
/// finished are cancelled and that single error is forwarded.
#[derive(Debug, Default)]
pub struct Aggregate {
    sources: Vec<Arc<dyn Source>>,
}

impl Aggregate {
    pub fn new(sources: Vec<Arc<dyn Source>>) -> Self {
        Self { sources }
    }

    pub fn add(&mut self, source: Arc<dyn Source>) {
        self.sources.push(source);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Source for Aggregate {
    fn read(self: Arc<Self>, cancel: CancellationToken) -> Stream {
        let (tx, stream) = Stream::channel(cancel.clone());

        tokio::spawn(async move {
            // Backends observe a derived token so a failure here can stop
            // them without cancelling the caller's run.
            let backends = cancel.child_token();

            for (index, source) in self.sources.iter().enumerate() {
                if backends.is_cancelled() {
                    return;
                }

                debug!(index, "reading aggregated source");
                let mut inner = Arc::clone(source).read(backends.clone());

                while let Some(item) = inner.next().await {
                    match item {
                        Discovered::File(file) => {
                            if !tx.file(file).await {
                                backends.cancel();
                                return;
                            }
                        }
                        Discovered::Error(err) if err.fatal => {
                            warn!(index, error = %err, "source failed, stopping discovery");
                            backends.cancel();
                            tx.error(err).await;
                            return;
                        }
                        Discovered::Error(err) => {
                            if !tx.error(err).await {
                                backends.cancel();
                                return;
                            }
                        }
                    }
                }
            }
        });

        stream
    }

    /// Ask each backend in turn; the first file wins.
    fn resolve(self: Arc<Self>, cancel: CancellationToken, base: &str, reference: &str) -> Stream {
        let (tx, stream) = Stream::channel(cancel.clone());
        let base = base.to_string();
        let reference = reference.to_string();

        tokio::spawn(async move {
            let mut last_error = DiscoveryError::new(reference.clone(), "file not found");

            for source in &self.sources {
                if cancel.is_cancelled() {
                    return;
                }

                match Arc::clone(source)
                    .resolve(cancel.clone(), &base, &reference)
                    .single(&reference)
                    .await
                {
                    Ok(file) => {
                        tx.file(file).await;
                        return;
                    }
                    Err(err) => last_error = err,
                }
            }

            tx.error(last_error).await;
        });

        stream
    }
}
