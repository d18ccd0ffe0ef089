use std::time::Duration;

use crate::sources::DiscoveryError;
use crate::testing::CaseError;

/// Outcome of one case, or of one discovery failure.
#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    pub filename: String,
    /// Mean duration of the successful runs.
    pub duration: Duration,
    /// Successful runs completed, at least 1.
    pub times: u32,
    /// Runs consumed, failed ones included.
    pub attempts: u32,
    pub error: Option<CaseError>,
}

impl TestResult {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }

    /// A row for a file that never became a case.
    pub fn from_discovery(err: DiscoveryError) -> Self {
        Self {
            filename: err.filename.clone(),
            duration: Duration::ZERO,
            times: 1,
            attempts: 0,
            error: Some(CaseError::Discovery(err)),
        }
    }
}

/// Totals of a whole run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    /// Wall-clock time of the run.
    pub duration: Duration,
    /// Discovery errors that did not belong to any case.
    pub errors: Vec<DiscoveryError>,
}

impl Summary {
    pub fn has_errors(&self) -> bool {
        self.failed > 0 || !self.errors.is_empty()
    }
}
