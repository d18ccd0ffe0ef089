//! Concurrent execution of discovered cases.
//!
//! A run is two tasks talking over channels:
//!
//! - the dispatcher drains the discovery stream, builds a [`Case`] per file
//!   and spawns it once a pool permit is free;
//! - the collector owns the counters, forwards every [`TestResult`] to the
//!   caller and emits the [`Summary`] after the dispatcher reports it is done.
//!
//! Workers only send results; they never touch the counters.

pub mod error;
pub mod options;
pub mod result;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::runtime::Runtime;
use crate::sources::stream::STREAM_CAPACITY;
use crate::sources::{Discovered, DiscoveryError, Source};
use crate::testing::{Case, CaseOptions, Params};

pub use error::{RunnerError, RunnerResult};
pub use options::RunnerOptions;
pub use result::{Summary, TestResult};

/// Live output of a run.
#[derive(Debug)]
pub struct RunStream {
    /// One result per discovered file, in completion order. Closed before
    /// the summary is sent.
    pub progress: mpsc::Receiver<TestResult>,
    pub summary: oneshot::Receiver<Summary>,
}

impl RunStream {
    /// Drain the progress channel, then wait for the summary.
    pub async fn collect(mut self) -> RunnerResult<(Vec<TestResult>, Summary)> {
        let mut results = Vec::new();
        while let Some(result) = self.progress.recv().await {
            results.push(result);
        }

        let summary = self.summary.await.map_err(|_| RunnerError::Interrupted)?;
        Ok((results, summary))
    }
}

/// Messages from the dispatcher and the workers to the collector.
enum Event {
    /// A case finished, or could not be built.
    Finished(TestResult),
    /// A discovery error not attached to any file.
    Discovery(DiscoveryError),
    /// Discovery is exhausted and every spawned case has reported.
    Done,
}

/// Runs cases from a source against one runtime.
pub struct Runner {
    runtime: Arc<dyn Runtime>,
    options: RunnerOptions,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Runner {
    pub fn new(runtime: Arc<dyn Runtime>, options: RunnerOptions) -> RunnerResult<Self> {
        options.validate()?;
        Ok(Self { runtime, options })
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Start a run. Returns immediately; results arrive on the stream.
    ///
    /// Cancelling `cancel` stops discovery and dispatch. Cases already
    /// running see the cancellation and report it as their error.
    pub fn run(&self, cancel: CancellationToken, params: Params, source: Arc<dyn Source>) -> RunStream {
        let (progress_tx, progress_rx) = mpsc::channel(STREAM_CAPACITY);
        let (summary_tx, summary_rx) = oneshot::channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        tokio::spawn(collect(events_rx, progress_tx, summary_tx));
        tokio::spawn(dispatch(
            Arc::clone(&self.runtime),
            self.options.clone(),
            cancel,
            params,
            source,
            events_tx,
        ));

        RunStream {
            progress: progress_rx,
            summary: summary_rx,
        }
    }
}

#[instrument(skip_all, fields(pool_size = options.pool_size))]
async fn dispatch(
    runtime: Arc<dyn Runtime>,
    options: RunnerOptions,
    cancel: CancellationToken,
    params: Params,
    source: Arc<dyn Source>,
    events: mpsc::UnboundedSender<Event>,
) {
    let options = Arc::new(options);
    let pool = Arc::new(Semaphore::new(options.pool_size));
    let mut workers = JoinSet::new();
    let mut stream = source.read(cancel.clone());

    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            item = stream.next() => item,
        };

        let file = match item {
            Some(Discovered::File(file)) => file,
            Some(Discovered::Error(err)) => {
                warn!(file = %err.filename, error = %err.message, "discovery error");
                let _ = events.send(Event::Discovery(err));
                continue;
            }
            None => break,
        };

        let filename = file.name.clone();
        let case = match Case::new(CaseOptions {
            file,
            timeout: options.timeout,
        }) {
            Ok(case) => case,
            Err(err) => {
                debug!(file = %filename, error = %err, "invalid case");
                let _ = events.send(Event::Finished(TestResult {
                    filename,
                    duration: Duration::ZERO,
                    times: 1,
                    attempts: 0,
                    error: Some(err),
                }));
                continue;
            }
        };

        // Blocks while the pool is saturated.
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = Arc::clone(&pool).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        debug!(file = %case.file().name, "dispatching case");

        let runtime = Arc::clone(&runtime);
        let options = Arc::clone(&options);
        let cancel = cancel.clone();
        let events = events.clone();
        let params = params.clone();

        workers.spawn(async move {
            let _permit = permit;
            let result = worker::execute(&case, runtime.as_ref(), &params, &options, &cancel).await;
            let _ = events.send(Event::Finished(result));
        });
    }

    // Stop the source if dispatch ended early.
    drop(stream);

    while let Some(joined) = workers.join_next().await {
        if let Err(err) = joined {
            warn!(error = %err, "case task failed");
        }
    }

    let _ = events.send(Event::Done);
}

async fn collect(
    mut events: mpsc::UnboundedReceiver<Event>,
    progress: mpsc::Sender<TestResult>,
    summary: oneshot::Sender<Summary>,
) {
    let started = Instant::now();
    let mut totals = Summary::default();

    while let Some(event) = events.recv().await {
        let result = match event {
            Event::Finished(result) => {
                if result.passed() {
                    totals.passed += 1;
                } else {
                    totals.failed += 1;
                }
                result
            }
            Event::Discovery(err) => {
                totals.errors.push(err.clone());
                TestResult::from_discovery(err)
            }
            Event::Done => break,
        };

        // A caller that stopped listening still gets the summary.
        let _ = progress.send(result).await;
    }

    totals.duration = started.elapsed();
    drop(progress);

    info!(
        passed = totals.passed,
        failed = totals.failed,
        errors = totals.errors.len(),
        duration = ?totals.duration,
        "run finished"
    );

    let _ = summary.send(totals);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{MemorySource, ScriptedRuntime};

    #[test]
    fn invalid_options_are_rejected() {
        let rt: Arc<dyn Runtime> = Arc::new(ScriptedRuntime::ok(Vec::new()));
        let err = Runner::new(
            rt,
            RunnerOptions {
                pool_size: 0,
                ..RunnerOptions::default()
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("pool size"));
    }

    #[tokio::test]
    async fn one_result_per_file() {
        let rt: Arc<dyn Runtime> = Arc::new(ScriptedRuntime::ok(Vec::new()));
        let source = MemorySource::new()
            .with_file("a.fql", "RETURN 1")
            .with_file("b.fail.fql", "RETURN 1")
            .with_file("c.txt", "")
            .into_source();

        let runner = Runner::new(rt, RunnerOptions::default()).unwrap();
        let (results, summary) = runner
            .run(CancellationToken::new(), Params::new(), source)
            .collect()
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 2);
        assert!(summary.errors.is_empty());
        assert!(summary.has_errors());

        let unknown = results.iter().find(|r| r.filename == "c.txt").unwrap();
        assert!(unknown.error.is_some());
    }

    #[tokio::test]
    async fn discovery_errors_become_rows_and_summary_errors() {
        let rt: Arc<dyn Runtime> = Arc::new(ScriptedRuntime::ok(Vec::new()));
        let source = MemorySource::new()
            .with_file("a.fql", "RETURN 1")
            .with_error(DiscoveryError::new("b.fql", "permission denied"))
            .into_source();

        let runner = Runner::new(rt, RunnerOptions::default()).unwrap();
        let (results, summary) = runner
            .run(CancellationToken::new(), Params::new(), source)
            .collect()
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.errors, vec![DiscoveryError::new("b.fql", "permission denied")]);
        assert!(summary.has_errors());
    }

    #[tokio::test]
    async fn empty_source_yields_empty_summary() {
        let rt: Arc<dyn Runtime> = Arc::new(ScriptedRuntime::ok(Vec::new()));
        let runner = Runner::new(rt, RunnerOptions::default()).unwrap();
        let (results, summary) = runner
            .run(
                CancellationToken::new(),
                Params::new(),
                Arc::new(crate::sources::Noop),
            )
            .collect()
            .await
            .unwrap();

        assert!(results.is_empty());
        assert_eq!(summary.passed + summary.failed, 0);
        assert!(!summary.has_errors());
    }

    #[tokio::test]
    async fn cancelled_run_still_sends_summary() {
        let rt = Arc::new(ScriptedRuntime::ok(Vec::new()).with_delay(Duration::from_secs(3600)));
        let source = MemorySource::new()
            .with_file("a.fql", "RETURN 1")
            .with_file("b.fql", "RETURN 1")
            .into_source();

        let cancel = CancellationToken::new();
        let runner = Runner::new(rt.clone(), RunnerOptions::default()).unwrap();
        let stream = runner.run(cancel.clone(), Params::new(), source);

        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
            }
        });

        let (results, summary) = tokio::time::timeout(Duration::from_secs(5), stream.collect())
            .await
            .expect("run did not stop after cancellation")
            .unwrap();

        // The first case was running and reports the cancellation; the
        // second was never dispatched.
        assert_eq!(results.len(), 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(rt.calls(), 1);
    }
}
