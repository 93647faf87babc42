//! Compatibility suites for the docparity harness.
//!
//! Loads the built-in fixture catalog into a SUT/reference
//! [`Deployment`], establishes the pairing matrix and runs case tables
//! through [`GroupRunner`]. The suites themselves live under `tests/`; this
//! crate holds the shared setup and the fault-injecting backend wrappers.

pub mod faults;

use std::sync::Arc;

use tracing::{error, info, warn};

use docparity_error::Result;
use docparity_harness::{CaseTable, CaseVerdict, CollectionHandle, GroupReport, GroupRunner, Matrix, RunnerConfig};
use docparity_memdb::{Deployment, SetupOpts, catalog};

pub use faults::{FaultSpec, FaultyHandle, StalledHandle};

/// A deployment and the matrix built over it.
#[derive(Debug)]
pub struct CompatSetup {
    pub deployment: Deployment,
    pub matrix: Matrix,
}

impl CompatSetup {
    /// Deploy the built-in catalog and build the matrix for `group`.
    pub fn new(group: impl Into<String>, opts: &SetupOpts, config: &RunnerConfig) -> Result<Self> {
        let group = group.into();
        let deployment = Deployment::setup(catalog(), opts)?;
        let matrix = deployment.matrix(group, config.matrix_options())?;
        Ok(Self { deployment, matrix })
    }

    /// Like [`CompatSetup::new`], with every SUT handle passed through
    /// `wrap` before the matrix is built.
    pub fn wrapped(
        group: impl Into<String>,
        opts: &SetupOpts,
        config: &RunnerConfig,
        wrap: impl Fn(&str, Arc<dyn CollectionHandle>) -> Arc<dyn CollectionHandle>,
    ) -> Result<Self> {
        let deployment = Deployment::setup(catalog(), opts)?;
        let pairings = deployment.pairings_with_sut(wrap);
        let matrix = Matrix::from_pairings(group, pairings, config.matrix_options())?;
        Ok(Self { deployment, matrix })
    }

    pub fn run(&self, table: &CaseTable, config: &RunnerConfig) -> Result<GroupReport> {
        GroupRunner::new(config.clone())?.run(table, &self.matrix)
    }
}

/// Build the table, deploy with default options and run it.
pub fn run_suite(table: &CaseTable) -> Result<GroupReport> {
    let config = RunnerConfig::default();
    let report = CompatSetup::new(table.group(), &SetupOpts::default(), &config)
        .and_then(|setup| setup.run(table, &config))
        .inspect_err(|err| {
            error!(
                group = table.group(),
                error = %err,
                suggestion = err.suggestion().unwrap_or("none"),
                "suite could not run"
            );
        })?;

    let quirks = report.quirks();
    for (issue, cases) in quirks.active() {
        info!(group = %report.group, issue = %issue, cases = ?cases, "known divergence tracked");
    }
    for (issue, cases) in quirks.stale() {
        warn!(group = %report.group, issue = %issue, cases = ?cases, "known divergence annotation is stale");
    }
    info!(
        group = %report.group,
        passed = report.summary.passed,
        expected_failures = report.summary.expected_failures,
        "suite finished"
    );
    Ok(report)
}

/// Panic with the rendered report unless every case passed or failed as
/// expected.
#[track_caller]
pub fn assert_green(report: &GroupReport) {
    assert!(report.is_green(), "{}", report.render_text());
}

/// Panic unless `case` ended as an expected failure.
#[track_caller]
pub fn assert_expected_fail(report: &GroupReport, case: &str) {
    match report.verdict(case) {
        Some(CaseVerdict::ExpectedFail { .. }) => {}
        other => panic!("{case}: expected a tracked failure, got {other:?}\n{}", report.render_text()),
    }
}
