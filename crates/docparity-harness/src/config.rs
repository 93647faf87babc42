//! Runner configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use docparity_error::{HarnessError, Result};

use crate::matrix::MatrixOptions;

pub const ENV_CASE_WORKERS: &str = "DOCPARITY_CASE_WORKERS";
pub const ENV_EXECUTION_WORKERS: &str = "DOCPARITY_EXECUTION_WORKERS";
pub const ENV_TIMEOUT_SECS: &str = "DOCPARITY_TIMEOUT_SECS";
pub const ENV_SEQUENTIAL_CALLS: &str = "DOCPARITY_SEQUENTIAL_CALLS";

/// Configuration for a group run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Cases run concurrently.
    pub case_workers: usize,
    /// Executions of one case run concurrently.
    pub execution_workers: usize,
    /// Issue the SUT and reference calls of an execution concurrently.
    pub concurrent_calls: bool,
    /// Deadline for the whole group.
    pub global_timeout: Duration,
    /// Reject a matrix without the nonexistent-collection pairing.
    pub require_nonexistent: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            case_workers: 8,
            execution_workers: 4,
            concurrent_calls: true,
            global_timeout: Duration::from_secs(300),
            require_nonexistent: true,
        }
    }
}

impl RunnerConfig {
    /// Defaults overlaid with `DOCPARITY_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`RunnerConfig::from_env`] with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_CASE_WORKERS) {
            config.case_workers = parse_number(ENV_CASE_WORKERS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_EXECUTION_WORKERS) {
            config.execution_workers = parse_number(ENV_EXECUTION_WORKERS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            config.global_timeout = Duration::from_secs(parse_number(ENV_TIMEOUT_SECS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_SEQUENTIAL_CALLS) {
            config.concurrent_calls = !matches!(raw.trim(), "1" | "true" | "yes");
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.case_workers == 0 {
            return Err(HarnessError::invalid_config("case_workers must be at least 1"));
        }
        if self.execution_workers == 0 {
            return Err(HarnessError::invalid_config("execution_workers must be at least 1"));
        }
        if self.global_timeout.is_zero() {
            return Err(HarnessError::invalid_config("global_timeout must be positive"));
        }
        Ok(())
    }

    pub const fn matrix_options(&self) -> MatrixOptions {
        MatrixOptions {
            require_nonexistent: self.require_nonexistent,
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| HarnessError::invalid_config(format!("{key}={raw:?} is not a number")))
}
