//! Known-divergence annotation.
//!
//! An annotation never suppresses the comparator. It only changes how a
//! mismatch is reported, and turns "matched everywhere" into an anomaly so
//! stale annotations cannot accumulate.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::case::{CaseMode, IssueRef};
use crate::compare::Comparison;
use crate::report::{CaseVerdict, ExecutionVerdict, FailureReason};

/// Annotate one execution's comparison.
pub fn annotate_execution(comparison: &Comparison, mode: &CaseMode) -> ExecutionVerdict {
    match (comparison, mode) {
        (Comparison::Match, _) => ExecutionVerdict::Match,
        (Comparison::Mismatch(_), CaseMode::Strict) => ExecutionVerdict::Mismatch,
        (Comparison::Mismatch(_), CaseMode::KnownDivergent(_)) => ExecutionVerdict::ExpectedMismatch,
    }
}

/// Raw outcome of one case before annotation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseOutcome {
    /// One entry per mismatching execution.
    pub divergences: Vec<FailureReason>,
    /// Shape violation of the case's own premise, if any.
    pub shape_violation: Option<FailureReason>,
}

/// Turn a case outcome into the reported verdict.
///
/// For a known-divergent case, divergences become an expected failure and
/// the absence of any divergence is an anomaly. A shape violation is a
/// failure of the case's premise, not of the SUT, and is never demoted.
pub fn annotate(case: &str, outcome: CaseOutcome, mode: &CaseMode) -> CaseVerdict {
    let CaseOutcome {
        divergences,
        shape_violation,
    } = outcome;

    if let Some(violation) = shape_violation {
        let mut reasons = vec![violation];
        reasons.extend(divergences);
        return CaseVerdict::Fail { reasons };
    }

    match mode {
        CaseMode::Strict if divergences.is_empty() => CaseVerdict::Pass,
        CaseMode::Strict => CaseVerdict::Fail {
            reasons: divergences,
        },
        CaseMode::KnownDivergent(issue) if divergences.is_empty() => {
            warn!(case, issue = %issue, "known divergence unexpectedly fixed");
            CaseVerdict::Anomaly {
                issue: issue.clone(),
            }
        }
        CaseMode::KnownDivergent(issue) => CaseVerdict::ExpectedFail {
            issue: issue.clone(),
            reasons: divergences,
        },
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QuirkSummary {
    pub active: usize,
    pub stale: usize,
}

/// Ledger of known-divergence annotations observed in a run, keyed by
/// issue.
#[derive(Debug, Clone, Default)]
pub struct QuirkRegistry {
    active: BTreeMap<IssueRef, Vec<String>>,
    stale: BTreeMap<IssueRef, Vec<String>>,
}

impl QuirkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a case verdict. Verdicts without an annotation are ignored.
    pub fn observe(&mut self, case: &str, verdict: &CaseVerdict) {
        match verdict {
            CaseVerdict::ExpectedFail { issue, .. } => {
                self.active.entry(issue.clone()).or_default().push(case.to_owned());
            }
            CaseVerdict::Anomaly { issue } => {
                self.stale.entry(issue.clone()).or_default().push(case.to_owned());
            }
            _ => {}
        }
    }

    /// Annotations whose cases still diverge, with the affected cases.
    pub fn active(&self) -> impl Iterator<Item = (&IssueRef, &[String])> {
        self.active.iter().map(|(issue, cases)| (issue, cases.as_slice()))
    }

    /// Annotations whose cases now match and should be removed.
    pub fn stale(&self) -> impl Iterator<Item = (&IssueRef, &[String])> {
        self.stale.iter().map(|(issue, cases)| (issue, cases.as_slice()))
    }

    pub fn summary(&self) -> QuirkSummary {
        QuirkSummary {
            active: self.active.values().map(Vec::len).sum(),
            stale: self.stale.values().map(Vec::len).sum(),
        }
    }
}
