//! Test cases: what a discovered file means and how it is run.
//!
//! The file extension picks the kind of case:
//!
//! - `.fql`: a [`Unit`], one script that must run cleanly (or fail, for
//!   `*.fail.fql`)
//! - `.yaml` / `.yml`: a [`Suite`], a query script followed by an assertion
//!   script that receives the query output

pub mod error;
pub mod manifest;
pub mod params;
pub mod suite;
pub mod unit;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::runtime::Runtime;
use crate::sources::{File, MANIFEST_EXTENSIONS, SCRIPT_EXTENSION};

pub use error::{CaseError, CaseResult};
pub use manifest::{Script, ScriptDescriptor, SuiteManifest};
pub use params::{deep_merge, DataContext, Params, QueryData, SYSTEM_NAMESPACE};
pub use suite::Suite;
pub use unit::{Unit, MUST_FAIL_SUFFIX};

/// Input for building a [`Case`].
#[derive(Debug, Clone)]
pub struct CaseOptions {
    pub file: File,
    /// Per-run timeout unless the case overrides it.
    pub timeout: Duration,
}

/// One executable test.
#[derive(Debug, Clone)]
pub enum Case {
    Unit { unit: Unit, timeout: Duration },
    Suite { suite: Suite, timeout: Duration },
}

impl Case {
    /// Build a case from a discovered file.
    ///
    /// Fails for files carrying a discovery error, unknown extensions and
    /// invalid suite manifests.
    pub fn new(options: CaseOptions) -> CaseResult<Self> {
        let CaseOptions { file, timeout } = options;

        if let Some(err) = &file.error {
            return Err(CaseError::Discovery(err.clone()));
        }

        match file.extension().as_deref() {
            Some(SCRIPT_EXTENSION) => Ok(Case::Unit {
                unit: Unit::new(file),
                timeout,
            }),
            Some(ext) if MANIFEST_EXTENSIONS.contains(&ext) => {
                let suite = Suite::new(file)?;
                let timeout = suite.manifest().timeout().unwrap_or(timeout);
                Ok(Case::Suite { suite, timeout })
            }
            _ => Err(CaseError::UnknownFileType(file.name)),
        }
    }

    pub fn file(&self) -> &File {
        match self {
            Case::Unit { unit, .. } => unit.file(),
            Case::Suite { suite, .. } => suite.file(),
        }
    }

    /// Upper bound of a single run.
    pub fn timeout(&self) -> Duration {
        match self {
            Case::Unit { timeout, .. } | Case::Suite { timeout, .. } => *timeout,
        }
    }

    /// Run once, bounded by [`Case::timeout`] and `cancel`.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        runtime: &dyn Runtime,
        params: Params,
    ) -> CaseResult<()> {
        let timeout = self.timeout();

        let execution = async {
            match self {
                Case::Unit { unit, .. } => unit.run(runtime, params).await,
                Case::Suite { suite, .. } => suite.run(cancel, runtime, params).await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CaseError::Cancelled),
            res = tokio::time::timeout(timeout, execution) => {
                res.unwrap_or(Err(CaseError::Timeout(timeout)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedRuntime;
    use crate::sources::{DiscoveryError, Noop};
    use std::sync::Arc;

    fn options(name: &str, content: &str) -> CaseOptions {
        CaseOptions {
            file: File::new(Arc::new(Noop), name, content.as_bytes().to_vec()),
            timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn extension_selects_kind() {
        assert!(matches!(
            Case::new(options("a.fql", "RETURN 1")).unwrap(),
            Case::Unit { .. }
        ));
        assert!(matches!(
            Case::new(options("a.yaml", "query: a\nassert: b\n")).unwrap(),
            Case::Suite { .. }
        ));
        assert!(matches!(
            Case::new(options("a.yml", "query: a\nassert: b\n")).unwrap(),
            Case::Suite { .. }
        ));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = Case::new(options("README.md", "")).unwrap_err();
        assert_eq!(err, CaseError::UnknownFileType("README.md".to_string()));
    }

    #[test]
    fn discovery_error_is_carried() {
        let file = File::failed(
            Arc::new(Noop),
            "a.fql",
            DiscoveryError::new("a.fql", "permission denied"),
        );
        let err = Case::new(CaseOptions {
            file,
            timeout: Duration::from_secs(1),
        })
        .unwrap_err();
        assert!(matches!(err, CaseError::Discovery(_)));
    }

    #[test]
    fn suite_timeout_overrides_default() {
        let case = Case::new(options("a.yaml", "timeout: 3\nquery: a\nassert: b\n")).unwrap();
        assert_eq!(case.timeout(), Duration::from_secs(3));

        let case = Case::new(options("a.fql", "RETURN 1")).unwrap();
        assert_eq!(case.timeout(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_run_times_out() {
        let case = Case::new(CaseOptions {
            timeout: Duration::from_secs(1),
            ..options("a.fql", "RETURN 1")
        })
        .unwrap();
        let rt = ScriptedRuntime::ok(Vec::new()).with_delay(Duration::from_secs(10));

        let err = case
            .run(&CancellationToken::new(), &rt, Params::new())
            .await
            .unwrap_err();
        assert_eq!(err, CaseError::Timeout(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn cancelled_run_stops() {
        let case = Case::new(options("a.fql", "RETURN 1")).unwrap();
        let rt = ScriptedRuntime::ok(Vec::new()).with_delay(Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = case.run(&cancel, &rt, Params::new()).await.unwrap_err();
        assert_eq!(err, CaseError::Cancelled);
    }
}
