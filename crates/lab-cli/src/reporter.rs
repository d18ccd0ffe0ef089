//! Console reporter: one log line per result, then the summary.

use anyhow::{bail, Result};
use lab_core::runner::{RunStream, Summary, TestResult};
use tracing::{error, info, warn};

/// Consume a run and log it. Fails when the run has errors.
pub async fn report(stream: RunStream) -> Result<Summary> {
    let RunStream {
        mut progress,
        summary,
    } = stream;

    while let Some(result) = progress.recv().await {
        log_result(&result);
    }

    let Ok(summary) = summary.await else {
        bail!("run ended without a summary");
    };

    for err in &summary.errors {
        warn!(file = %err.filename, error = %err.message, "discovery error");
    }

    info!(
        passed = summary.passed,
        failed = summary.failed,
        duration = ?summary.duration,
        "done"
    );

    if summary.has_errors() {
        bail!("has errors");
    }

    Ok(summary)
}

fn log_result(result: &TestResult) {
    match &result.error {
        None => info!(
            file = %result.filename,
            duration = ?result.duration,
            attempts = result.attempts,
            times = result.times,
            "passed"
        ),
        Some(err) => error!(
            file = %result.filename,
            duration = ?result.duration,
            attempts = result.attempts,
            times = result.times,
            error = %err,
            "failed"
        ),
    }
}
