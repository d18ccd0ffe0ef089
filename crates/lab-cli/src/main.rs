//! Lab - FQL test runner
//!
//! `lab [OPTIONS] [FILES]...` discovers test scripts (`*.fql`) and suites
//! (`*.yaml`, `*.yml`) from local paths, git repositories and HTTP URLs and
//! runs them against a Ferret runtime.
//!
//! ## Commands
//!
//! - *(default)*: run every discovered test
//! - `version`: print runner and runtime versions

mod params;
mod reporter;
mod wait;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use lab_core::runtime::{self, BuildInfo, RuntimeOptions};
use lab_core::{sources, Params, Runner, RunnerOptions};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Level};
use wait::WaitOptions;

#[derive(Parser)]
#[command(name = "lab")]
#[command(author = "MontFerret Lab Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Test runner for FQL scripts", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    runtime: RuntimeArgs,

    #[command(flatten)]
    run: RunArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print runner and runtime versions
    Version,
}

#[derive(Args)]
struct RuntimeArgs {
    /// Runtime location: http(s)://host:port for a worker, bin:<path> for a local executable
    #[arg(short, long, env = "LAB_RUNTIME", global = true)]
    runtime: Option<String>,

    /// Runtime parameter as name:json (repeatable)
    #[arg(long = "runtime-param", env = "LAB_RUNTIME_PARAM", global = true)]
    runtime_params: Vec<String>,

    /// Chrome DevTools Protocol address for local runtimes
    #[arg(long, env = "LAB_CDP", global = true)]
    cdp: Option<String>,
}

#[derive(Args)]
struct RunArgs {
    /// Locations of tests: paths, git+http(s):// repositories or http(s):// files
    #[arg(env = "LAB_FILES", value_delimiter = ',')]
    files: Vec<String>,

    /// Per-run timeout in seconds
    #[arg(short, long, env = "LAB_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Number of tests running at once
    #[arg(short, long, env = "LAB_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Successful runs required per test
    #[arg(long, env = "LAB_TIMES", default_value_t = 1)]
    times: u32,

    /// Runs a test may consume before its failure is final
    #[arg(short, long, env = "LAB_ATTEMPTS", default_value_t = 1)]
    attempts: u32,

    /// Pause between runs of one test, in seconds
    #[arg(long = "times-interval", env = "LAB_TIMES_INTERVAL", default_value_t = 0)]
    times_interval: u64,

    /// Query parameter as name:json (repeatable)
    #[arg(short, long = "param", env = "LAB_PARAM")]
    params: Vec<String>,

    /// HTTP endpoint that must respond before tests run (repeatable)
    #[arg(short, long, env = "LAB_WAIT", value_delimiter = ',')]
    wait: Vec<String>,

    /// Timeout of one availability check, and the pause between checks, in seconds
    #[arg(long = "wait-timeout", env = "LAB_WAIT_TIMEOUT", default_value_t = 5)]
    wait_timeout: u64,

    /// Availability checks per endpoint before giving up
    #[arg(long = "wait-attempts", env = "LAB_WAIT_ATTEMPTS", default_value_t = 5)]
    wait_attempts: u32,
}

impl RuntimeArgs {
    fn options(&self) -> Result<RuntimeOptions> {
        Ok(RuntimeOptions {
            location: self.runtime.clone().unwrap_or_default(),
            cdp_address: self.cdp.clone(),
            params: params::parse(&self.runtime_params).context("invalid runtime parameters")?,
        })
    }
}

impl RunArgs {
    fn options(&self) -> RunnerOptions {
        RunnerOptions {
            pool_size: self.concurrency,
            timeout: Duration::from_secs(self.timeout),
            attempts: self.attempts,
            times: self.times,
            times_interval: Duration::from_secs(self.times_interval),
        }
    }

    fn wait_options(&self) -> WaitOptions {
        WaitOptions {
            attempts: self.wait_attempts,
            interval: Duration::from_secs(self.wait_timeout),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    lab_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Some(Commands::Version) => cmd_version(&cli.runtime).await,
        None => cmd_run(&cli.runtime, &cli.run).await,
    }
}

async fn cmd_version(args: &RuntimeArgs) -> Result<()> {
    let rt = runtime::new(args.options()?).context("failed to create runtime")?;
    let info = BuildInfo::collect(lab_core::VERSION, rt.as_ref())
        .await
        .context("failed to get runtime version")?;

    println!("Version:");
    println!("  Self: {}", info.runner);
    println!("  Runtime: {}", info.runtime);

    Ok(())
}

async fn cmd_run(runtime_args: &RuntimeArgs, args: &RunArgs) -> Result<()> {
    if args.files.is_empty() {
        anyhow::bail!("no test locations given (pass FILES or set LAB_FILES)");
    }

    let rt = runtime::new(runtime_args.options()?).context("failed to create runtime")?;
    let runner = Runner::new(rt, args.options()).context("invalid runner options")?;
    let source = sources::new(args.files.as_slice()).context("invalid test location")?;

    let mut query_params = Params::new();
    query_params.set_user_values(params::parse(&args.params).context("invalid parameters")?);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling run");
                cancel.cancel();
            }
        }
    });

    wait::wait_if_needed(&cancel, &args.wait, &args.wait_options()).await?;

    debug!(locations = ?args.files, "starting run");
    reporter::report(runner.run(cancel, query_params, source)).await?;

    Ok(())
}
