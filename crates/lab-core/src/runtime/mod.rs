//! Runtimes: the engines that execute FQL scripts.
//!
//! The runner never inspects which runtime it is driving. Two are built in:
//!
//! - [`remote`]: a Ferret worker reached over HTTP
//! - [`binary`]: a local `ferret` executable
//!
//! Both are selected from a location string by [`new`].

pub mod binary;
pub mod error;
pub mod remote;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use binary::Binary;
pub use error::{RuntimeError, RuntimeResult};
pub use remote::Remote;

/// Default Chrome DevTools Protocol address handed to local runtimes.
pub const DEFAULT_CDP_ADDRESS: &str = "http://127.0.0.1:9222";

/// Prefix of locations naming a local runtime executable.
pub const BINARY_PREFIX: &str = "bin:";

/// An engine able to execute a script with parameters.
///
/// Implementations are cancelled by dropping the returned future.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Version of the query engine behind this runtime.
    async fn version(&self) -> RuntimeResult<String>;

    /// Execute `query` and return its raw (JSON) output.
    async fn run(&self, query: &str, params: &Map<String, Value>) -> RuntimeResult<Vec<u8>>;
}

/// How to reach a runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeOptions {
    /// `http(s)://...` for a remote worker, `bin:<path>` for an executable.
    pub location: String,
    /// Browser address forwarded to local runtimes.
    pub cdp_address: Option<String>,
    /// Runtime-specific parameters (headers, cookies, shared query params).
    pub params: Map<String, Value>,
}

/// Versions reported by the `version` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    /// Version of this runner.
    pub runner: String,
    /// Version of the runtime, as reported by the runtime itself.
    pub runtime: String,
}

impl BuildInfo {
    /// Query `runtime` for its version and pair it with `runner`.
    pub async fn collect(runner: impl Into<String>, runtime: &dyn Runtime) -> RuntimeResult<Self> {
        Ok(Self {
            runner: runner.into(),
            runtime: runtime.version().await?,
        })
    }
}

/// Build a runtime from its location.
pub fn new(options: RuntimeOptions) -> RuntimeResult<Arc<dyn Runtime>> {
    let location = options.location.trim();

    if location.is_empty() {
        return Err(RuntimeError::InvalidConfig(
            "runtime location is required (http(s)://... or bin:<path>)".to_string(),
        ));
    }

    if let Some(path) = location.strip_prefix(BINARY_PREFIX) {
        let cdp = options
            .cdp_address
            .unwrap_or_else(|| DEFAULT_CDP_ADDRESS.to_string());
        return Ok(Arc::new(Binary::new(path, cdp, options.params)));
    }

    if location.starts_with("http://") || location.starts_with("https://") {
        return Ok(Arc::new(Remote::new(location, &options.params)?));
    }

    Err(RuntimeError::InvalidConfig(format!(
        "unsupported runtime location: {location}"
    )))
}
