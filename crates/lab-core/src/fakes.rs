//! In-process fakes for the runtime and source traits (testing only)
//!
//! `ScriptedRuntime` answers queries from a closure and records how it was
//! called; `MemorySource` serves files from a map without touching disk.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::runtime::{Runtime, RuntimeError, RuntimeResult};
use crate::sources::{DiscoveryError, File, Source, Stream};

// ---------------------------------------------------------------------------
// ScriptedRuntime
// ---------------------------------------------------------------------------

type Handler = dyn Fn(&str, &Map<String, Value>) -> RuntimeResult<Vec<u8>> + Send + Sync;

/// One recorded `run` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub query: String,
    pub params: Map<String, Value>,
}

/// Runtime whose answers come from a closure.
pub struct ScriptedRuntime {
    handler: Box<Handler>,
    version: String,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    invocations: Mutex<Vec<Invocation>>,
}

impl std::fmt::Debug for ScriptedRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedRuntime")
            .field("version", &self.version)
            .field("delay", &self.delay)
            .field("calls", &self.calls())
            .finish()
    }
}

impl ScriptedRuntime {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &Map<String, Value>) -> RuntimeResult<Vec<u8>> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            version: "0.0.0".to_string(),
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Every query returns `output`.
    pub fn ok(output: Vec<u8>) -> Self {
        Self::new(move |_, _| Ok(output.clone()))
    }

    /// Every query fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(move |_, _| Err(RuntimeError::Query(message.clone())))
    }

    /// Fail the first `failures` calls, then return `output`.
    pub fn flaky(failures: usize, output: Vec<u8>) -> Self {
        let seen = AtomicUsize::new(0);
        Self::new(move |_, _| {
            if seen.fetch_add(1, Ordering::SeqCst) < failures {
                Err(RuntimeError::Query("flaky failure".to_string()))
            } else {
                Ok(output.clone())
            }
        })
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sleep before answering each query.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `run` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of `run` calls observed in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

/// Decrements the in-flight counter even when the call is dropped mid-way.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Runtime for ScriptedRuntime {
    async fn version(&self) -> RuntimeResult<String> {
        Ok(self.version.clone())
    }

    async fn run(&self, query: &str, params: &Map<String, Value>) -> RuntimeResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.invocations.lock().unwrap().push(Invocation {
            query: query.to_string(),
            params: params.clone(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        (self.handler)(query, params)
    }
}

// ---------------------------------------------------------------------------
// MemorySource
// ---------------------------------------------------------------------------

/// Source serving files from memory, keyed by name.
///
/// `read` emits every file in name order. `resolve` looks the reference up
/// verbatim, ignoring the base.
#[derive(Debug, Default)]
pub struct MemorySource {
    files: BTreeMap<String, Vec<u8>>,
    errors: Vec<DiscoveryError>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(name.into(), content.into());
        self
    }

    /// Emit `err` after the files on every read.
    pub fn with_error(mut self, err: DiscoveryError) -> Self {
        self.errors.push(err);
        self
    }

    pub fn into_source(self) -> Arc<dyn Source> {
        Arc::new(self)
    }
}

impl Source for MemorySource {
    fn read(self: Arc<Self>, cancel: CancellationToken) -> Stream {
        let (tx, stream) = Stream::channel(cancel);
        let source: Arc<dyn Source> = self.clone();

        tokio::spawn(async move {
            for (name, content) in &self.files {
                let file = File::new(Arc::clone(&source), name.clone(), content.clone());
                if !tx.file(file).await {
                    return;
                }
            }
            for err in &self.errors {
                if !tx.error(err.clone()).await {
                    return;
                }
            }
        });

        stream
    }

    fn resolve(self: Arc<Self>, cancel: CancellationToken, _base: &str, reference: &str) -> Stream {
        let Some(content) = self.files.get(reference).cloned() else {
            return Stream::failed(DiscoveryError::new(reference, "file not found"));
        };

        let (tx, stream) = Stream::channel(cancel);
        let file = File::new(self, reference, content);
        tokio::spawn(async move {
            tx.file(file).await;
        });
        stream
    }
}
