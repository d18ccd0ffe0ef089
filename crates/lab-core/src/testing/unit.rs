use tracing::debug;

use crate::runtime::Runtime;
use crate::sources::File;

use super::error::{CaseError, CaseResult};
use super::params::Params;

/// File name suffix of scripts that must fail to pass.
pub const MUST_FAIL_SUFFIX: &str = ".fail.fql";

/// A bare script: passes when the runtime executes it without error.
#[derive(Debug, Clone)]
pub struct Unit {
    file: File,
}

impl Unit {
    pub fn new(file: File) -> Self {
        Self { file }
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    /// Whether success and failure are inverted for this script.
    pub fn must_fail(&self) -> bool {
        self.file.path().ends_with(MUST_FAIL_SUFFIX)
    }

    pub async fn run(&self, runtime: &dyn Runtime, params: Params) -> CaseResult<()> {
        let outcome = runtime.run(&self.file.text(), &params.to_map()).await;

        if self.must_fail() {
            return match outcome {
                Ok(_) => Err(CaseError::ExpectedToFail),
                Err(err) => {
                    debug!(file = %self.file.name, error = %err, "script failed as expected");
                    Ok(())
                }
            };
        }

        outcome.map(|_| ()).map_err(CaseError::from)
    }
}
