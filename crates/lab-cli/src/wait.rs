//! `--wait`: block until remote resources answer before running tests.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::Url;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long to keep probing each resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOptions {
    /// Probes per resource before giving up.
    pub attempts: u32,
    /// Timeout of one probe, and the pause between two probes.
    pub interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval: Duration::from_secs(5),
        }
    }
}

/// Wait until every resource responds with a success status.
///
/// Resources are probed concurrently. The first one that stays unavailable
/// after all attempts fails the wait.
pub async fn wait_for(cancel: &CancellationToken, resources: &[String], options: &WaitOptions) -> Result<()> {
    if options.attempts == 0 {
        bail!("wait attempts must be at least 1");
    }

    let client = reqwest::Client::builder()
        .timeout(options.interval)
        .build()
        .context("failed to build HTTP client")?;

    let mut probes = JoinSet::new();

    for resource in resources {
        let url = parse(resource)?;
        let client = client.clone();
        let options = options.clone();
        let cancel = cancel.clone();

        probes.spawn(async move { probe(&client, &url, &options, &cancel).await });
    }

    while let Some(joined) = probes.join_next().await {
        joined.context("wait task failed")??;
    }

    Ok(())
}

fn parse(resource: &str) -> Result<Url> {
    let url = Url::parse(resource).with_context(|| format!("invalid wait resource '{resource}'"))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => bail!("unsupported wait resource '{resource}': scheme {other}"),
    }
}

async fn probe(client: &reqwest::Client, url: &Url, options: &WaitOptions, cancel: &CancellationToken) -> Result<()> {
    let mut attempt = 0;

    loop {
        attempt += 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => bail!("waiting for {url} cancelled"),
            res = client.get(url.clone()).send() => res,
        };

        let err = match outcome {
            Ok(response) if response.status().is_success() => {
                info!(resource = %url, attempt, "resource is available");
                return Ok(());
            }
            Ok(response) => format!("unexpected status {}", response.status()),
            Err(e) => e.to_string(),
        };

        if attempt >= options.attempts {
            return Err(anyhow!(
                "resource {url} is not available after {attempt} attempt(s): {err}"
            ));
        }

        debug!(resource = %url, attempt, error = %err, "resource not available yet");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => bail!("waiting for {url} cancelled"),
            _ = tokio::time::sleep(options.interval) => {}
        }
    }
}

/// Log and run [`wait_for`] when any resource is configured.
pub async fn wait_if_needed(cancel: &CancellationToken, resources: &[String], options: &WaitOptions) -> Result<()> {
    if resources.is_empty() {
        return Ok(());
    }

    info!(resources = ?resources, attempts = options.attempts, "waiting for resources");
    wait_for(cancel, resources, options).await.map_err(|err| {
        warn!(error = %err, "resources are not available");
        err.context("timeout")
    })
}
