//! Per-case repeat/retry loop.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::runtime::Runtime;
use crate::testing::{Case, CaseError, Params};

use super::options::RunnerOptions;
use super::result::TestResult;

/// Run `case` until it has succeeded `options.times` times, or a failure
/// happens once `options.attempts` runs have been spent.
///
/// Runs are strictly sequential. Every run receives its own copy of `params`.
pub(crate) async fn execute(
    case: &Case,
    runtime: &dyn Runtime,
    params: &Params,
    options: &RunnerOptions,
    cancel: &CancellationToken,
) -> TestResult {
    let filename = case.file().name.clone();
    let mut attempts: u32 = 0;
    let mut times: u32 = 0;
    let mut elapsed = Duration::ZERO;
    let mut error = None;

    while times < options.times {
        if attempts > 0 && !options.times_interval.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    error = Some(CaseError::Cancelled);
                    break;
                }
                _ = tokio::time::sleep(options.times_interval) => {}
            }
        }

        attempts += 1;
        let started = Instant::now();

        match case.run(cancel, runtime, params.clone()).await {
            Ok(()) => {
                times += 1;
                elapsed += started.elapsed();
            }
            Err(err) => {
                if attempts >= options.attempts || cancel.is_cancelled() {
                    error = Some(err);
                    break;
                }
                debug!(file = %filename, attempt = attempts, error = %err, "run failed, retrying");
            }
        }
    }

    // No successful run still reports one repeat so the mean is defined.
    let times = times.max(1);

    TestResult {
        filename,
        duration: elapsed / times,
        times,
        attempts,
        error,
    }
}
