//! Lab Core Library
//!
//! Discovers FQL test files, turns them into cases and runs them against a
//! query runtime with bounded concurrency.
//!
//! ```ignore
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use lab_core::{runtime, sources, Params, Runner, RunnerOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! let source = sources::new(&["./tests"])?;
//! let rt = runtime::new(runtime::RuntimeOptions {
//!     location: "http://127.0.0.1:8080".to_string(),
//!     ..Default::default()
//! })?;
//!
//! let runner = Runner::new(rt, RunnerOptions::default())?;
//! let (_, summary) = runner
//!     .run(CancellationToken::new(), Params::new(), source)
//!     .collect()
//!     .await?;
//! assert!(!summary.has_errors());
//! # Ok(())
//! # }
//! ```

pub mod fakes;
pub mod runner;
pub mod runtime;
pub mod sources;
pub mod telemetry;
pub mod testing;

/// Version of this library, reported as the runner version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use runner::{RunStream, Runner, RunnerError, RunnerOptions, Summary, TestResult};
pub use runtime::{BuildInfo, Runtime, RuntimeError, RuntimeOptions};
pub use sources::{DiscoveryError, File, Source, SourceError};
pub use testing::{Case, CaseError, CaseOptions, Params};
