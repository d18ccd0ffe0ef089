use std::time::Duration;

use super::error::{RunnerError, RunnerResult};

/// Run policy shared by every case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerOptions {
    /// Maximum number of cases executing at once.
    pub pool_size: usize,
    /// Upper bound of a single run of a case.
    pub timeout: Duration,
    /// Runs a case may consume before its failure is final.
    pub attempts: u32,
    /// Successful runs required for a case to pass.
    pub times: u32,
    /// Pause between consecutive runs of one case.
    pub times_interval: Duration,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            pool_size: 1,
            timeout: Duration::from_secs(30),
            attempts: 1,
            times: 1,
            times_interval: Duration::ZERO,
        }
    }
}

impl RunnerOptions {
    pub fn validate(&self) -> RunnerResult<()> {
        if self.pool_size == 0 {
            return Err(RunnerError::InvalidOption {
                name: "pool size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.attempts == 0 {
            return Err(RunnerError::InvalidOption {
                name: "attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.times == 0 {
            return Err(RunnerError::InvalidOption {
                name: "times",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.timeout.is_zero() {
            return Err(RunnerError::InvalidOption {
                name: "timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
