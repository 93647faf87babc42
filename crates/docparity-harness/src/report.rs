//! Verdicts and reports.
//!
//! Every case ends in exactly one [`CaseVerdict`]. Fail and expected-fail
//! verdicts keep the concrete pairing and both raw results of every
//! execution that did not match.

use std::fmt::{self, Write as _};
use std::path::Path;

use serde::{Deserialize, Serialize};

use docparity_error::{BackendSide, HarnessError, Result};

use crate::case::{IssueRef, ResultShape};
use crate::compare::MismatchDetail;
use crate::executor::Outcome;
use crate::quirks::QuirkRegistry;

/// Per-execution verdict after quirk annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionVerdict {
    Match,
    Mismatch,
    /// Mismatch in a known-divergent case.
    ExpectedMismatch,
}

/// Why a case did not pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    /// The backends disagreed on this pairing.
    Divergence {
        pairing: String,
        detail: MismatchDetail,
    },
    /// The matrix as a whole violated the case's expected shape.
    ShapeViolation {
        expected: ResultShape,
        /// Pairings that produced a meaningful result on both sides.
        non_empty_pairings: Vec<String>,
    },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Divergence { pairing, detail } => write!(
                f,
                "{pairing}: {:?} at '{}': sut={} reference={}",
                detail.kind, detail.path, detail.sut, detail.reference
            ),
            Self::ShapeViolation {
                expected,
                non_empty_pairings,
            } => {
                if non_empty_pairings.is_empty() {
                    write!(f, "expected {expected} result, no pairing produced one")
                } else {
                    write!(
                        f,
                        "expected {expected} result, non-empty on: {}",
                        non_empty_pairings.join(", ")
                    )
                }
            }
        }
    }
}

/// Why a case produced no verdict of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "abort", rename_all = "snake_case")]
pub enum AbortReason {
    Transport {
        pairing: String,
        side: BackendSide,
        detail: String,
    },
    /// The group deadline passed before the case finished.
    Deadline,
    Cancelled {
        reason: String,
    },
    Internal {
        detail: String,
    },
}

impl AbortReason {
    pub fn from_error(err: &HarnessError) -> Self {
        match err {
            HarnessError::Transport {
                pairing,
                side,
                detail,
            } => Self::Transport {
                pairing: pairing.clone(),
                side: *side,
                detail: detail.clone(),
            },
            HarnessError::DeadlineExceeded { .. } => Self::Deadline,
            HarnessError::Cancelled { reason } => Self::Cancelled {
                reason: reason.clone(),
            },
            other => Self::Internal {
                detail: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum CaseVerdict {
    Pass,
    Fail { reasons: Vec<FailureReason> },
    /// Tracked, non-blocking failure of a known-divergent case.
    ExpectedFail {
        issue: IssueRef,
        reasons: Vec<FailureReason>,
    },
    /// A known-divergent case matched everywhere: the annotation is stale.
    Anomaly { issue: IssueRef },
    Aborted { reason: AbortReason },
}

impl CaseVerdict {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail { .. } => "fail",
            Self::ExpectedFail { .. } => "expected-fail",
            Self::Anomaly { .. } => "anomaly",
            Self::Aborted { .. } => "aborted",
        }
    }

    /// Whether this verdict blocks a green run.
    pub const fn is_blocking(&self) -> bool {
        matches!(self, Self::Fail { .. } | Self::Anomaly { .. } | Self::Aborted { .. })
    }
}

impl fmt::Display for CaseVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub pairing: String,
    pub verdict: ExecutionVerdict,
    /// Both sides succeeded and at least one reply was meaningful.
    pub non_empty: bool,
    pub elapsed_us: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<MismatchDetail>,
    /// Raw SUT result, kept for executions that did not match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sut: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<Outcome>,
    /// Matched in a known-divergent case whose other executions still
    /// diverge: the quirk is fixed for this pairing only.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stale: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseReport {
    pub case: String,
    pub verdict: CaseVerdict,
    /// Completed executions in matrix order.
    pub executions: Vec<ExecutionReport>,
}

impl CaseReport {
    pub fn execution(&self, pairing: &str) -> Option<&ExecutionReport> {
        self.executions.iter().find(|e| e.pairing == pairing)
    }

    /// Pairings on which a known divergence no longer reproduces.
    pub fn stale_pairings(&self) -> impl Iterator<Item = &str> {
        self.executions.iter().filter(|e| e.stale).map(|e| e.pairing.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub expected_failures: usize,
    pub anomalies: usize,
    pub aborted: usize,
}

impl GroupSummary {
    pub fn tally<'a>(verdicts: impl IntoIterator<Item = &'a CaseVerdict>) -> Self {
        let mut summary = Self::default();
        for verdict in verdicts {
            summary.total += 1;
            match verdict {
                CaseVerdict::Pass => summary.passed += 1,
                CaseVerdict::Fail { .. } => summary.failed += 1,
                CaseVerdict::ExpectedFail { .. } => summary.expected_failures += 1,
                CaseVerdict::Anomaly { .. } => summary.anomalies += 1,
                CaseVerdict::Aborted { .. } => summary.aborted += 1,
            }
        }
        summary
    }
}

impl fmt::Display for GroupSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cases: {} passed, {} failed, {} expected failures, {} anomalies, {} aborted",
            self.total, self.passed, self.failed, self.expected_failures, self.anomalies, self.aborted
        )
    }
}

/// Outcome of one group run. Cases appear in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupReport {
    pub group: String,
    /// Fingerprint of the case table that was run.
    pub fingerprint: String,
    pub elapsed_ms: u64,
    pub summary: GroupSummary,
    pub cases: Vec<CaseReport>,
}

impl GroupReport {
    pub fn new(group: String, fingerprint: String, elapsed_ms: u64, cases: Vec<CaseReport>) -> Self {
        let summary = GroupSummary::tally(cases.iter().map(|c| &c.verdict));
        Self {
            group,
            fingerprint,
            elapsed_ms,
            summary,
            cases,
        }
    }

    pub fn case(&self, name: &str) -> Option<&CaseReport> {
        self.cases.iter().find(|c| c.case == name)
    }

    pub fn verdict(&self, name: &str) -> Option<&CaseVerdict> {
        self.case(name).map(|c| &c.verdict)
    }

    /// No failures, anomalies or aborted cases.
    pub fn is_green(&self) -> bool {
        self.cases.iter().all(|c| !c.verdict.is_blocking())
    }

    pub fn blocking(&self) -> impl Iterator<Item = &CaseReport> {
        self.cases.iter().filter(|c| c.verdict.is_blocking())
    }

    /// Cases aborted by a transport failure.
    pub fn transport_failures(&self) -> impl Iterator<Item = &CaseReport> {
        self.cases.iter().filter(|c| {
            matches!(
                c.verdict,
                CaseVerdict::Aborted {
                    reason: AbortReason::Transport { .. }
                }
            )
        })
    }

    /// Quirk ledger built from this report's known-divergent cases.
    pub fn quirks(&self) -> QuirkRegistry {
        let mut registry = QuirkRegistry::new();
        for case in &self.cases {
            registry.observe(&case.case, &case.verdict);
        }
        registry
    }

    /// Surface transport failures as an error for the enclosing run, after
    /// sibling cases have completed.
    pub fn into_result(self) -> Result<Self> {
        let first = self.transport_failures().find_map(|c| match &c.verdict {
            CaseVerdict::Aborted {
                reason:
                    AbortReason::Transport {
                        pairing,
                        side,
                        detail,
                    },
            } => Some(HarnessError::transport(pairing.clone(), *side, detail.clone())),
            _ => None,
        });
        match first {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| HarnessError::Serialization(e.to_string()))
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// One line per non-passing case, then the quirk ledger.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "group {}: {}", self.group, self.summary);
        for case in self.cases.iter().filter(|c| c.verdict != CaseVerdict::Pass) {
            let _ = write!(out, "  {} [{}]", case.case, case.verdict);
            match &case.verdict {
                CaseVerdict::Fail { reasons } => {
                    for reason in reasons {
                        let _ = write!(out, "\n    - {reason}");
                    }
                }
                CaseVerdict::ExpectedFail { reasons, .. } => {
                    for reason in reasons {
                        let _ = write!(out, "\n    - {reason}");
                    }
                    let stale: Vec<&str> = case.stale_pairings().collect();
                    if !stale.is_empty() {
                        let _ = write!(out, "\n    fixed on: {}", stale.join(", "));
                    }
                }
                CaseVerdict::Anomaly { issue } => {
                    let _ = write!(out, " unexpectedly fixed; remove annotation {issue}");
                }
                CaseVerdict::Aborted { reason } => {
                    let _ = write!(out, " {reason:?}");
                }
                CaseVerdict::Pass => {}
            }
            out.push('\n');
        }

        let quirks = self.quirks();
        for (issue, cases) in quirks.active() {
            let _ = writeln!(out, "quirk {issue}: still diverging in {}", cases.join(", "));
        }
        for (issue, cases) in quirks.stale() {
            let _ = writeln!(out, "quirk {issue}: stale, matched in {}", cases.join(", "));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::MismatchKind;

    fn issue() -> IssueRef {
        IssueRef::parse("org/repo#1").unwrap()
    }

    fn report(verdicts: Vec<(&str, CaseVerdict)>) -> GroupReport {
        let cases = verdicts
            .into_iter()
            .map(|(name, verdict)| CaseReport {
                case: name.to_owned(),
                verdict,
                executions: Vec::new(),
            })
            .collect();
        GroupReport::new("g".to_owned(), "f".repeat(64), 5, cases)
    }

    fn divergence() -> FailureReason {
        FailureReason::Divergence {
            pairing: "Strings".to_owned(),
            detail: MismatchDetail {
                kind: MismatchKind::Value,
                path: "n".to_owned(),
                sut: "1".to_owned(),
                reference: "2".to_owned(),
            },
        }
    }

    #[test]
    fn summary_counts_each_verdict() {
        let r = report(vec![
            ("a", CaseVerdict::Pass),
            ("b", CaseVerdict::Fail { reasons: vec![divergence()] }),
            ("c", CaseVerdict::ExpectedFail { issue: issue(), reasons: vec![] }),
            ("d", CaseVerdict::Anomaly { issue: issue() }),
            ("e", CaseVerdict::Aborted { reason: AbortReason::Deadline }),
        ]);
        assert_eq!(
            r.summary,
            GroupSummary {
                total: 5,
                passed: 1,
                failed: 1,
                expected_failures: 1,
                anomalies: 1,
                aborted: 1,
            }
        );
        assert!(!r.is_green());
        assert_eq!(r.blocking().count(), 3);
    }

    #[test]
    fn expected_failures_keep_run_green() {
        let r = report(vec![
            ("a", CaseVerdict::Pass),
            ("b", CaseVerdict::ExpectedFail { issue: issue(), reasons: vec![divergence()] }),
        ]);
        assert!(r.is_green());
        assert!(r.into_result().is_ok());
    }

    #[test]
    fn transport_abort_surfaces_as_error() {
        let r = report(vec![
            ("a", CaseVerdict::Pass),
            (
                "b",
                CaseVerdict::Aborted {
                    reason: AbortReason::Transport {
                        pairing: "Strings".to_owned(),
                        side: BackendSide::Reference,
                        detail: "reset".to_owned(),
                    },
                },
            ),
        ]);
        assert_eq!(r.transport_failures().count(), 1);
        let err = r.into_result().unwrap_err();
        assert!(matches!(err, HarnessError::Transport { side: BackendSide::Reference, .. }));
    }

    #[test]
    fn abort_reason_from_error() {
        assert_eq!(
            AbortReason::from_error(&HarnessError::DeadlineExceeded { elapsed_ms: 3 }),
            AbortReason::Deadline
        );
        assert!(matches!(
            AbortReason::from_error(&HarnessError::internal("worker panicked")),
            AbortReason::Internal { .. }
        ));
    }

    #[test]
    fn json_export_round_trips_through_file() {
        let r = report(vec![
            ("a", CaseVerdict::Pass),
            ("b", CaseVerdict::Fail { reasons: vec![divergence()] }),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        r.write_json(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let back: GroupReport = serde_json::from_str(&text).unwrap();
        assert_eq!(back, r);
        assert!(text.contains("\"verdict\": \"fail\""));
    }

    #[test]
    fn text_rendering_lists_non_passing_cases() {
        let r = report(vec![
            ("Quiet", CaseVerdict::Pass),
            ("Loud", CaseVerdict::Fail { reasons: vec![divergence()] }),
            ("Stale", CaseVerdict::Anomaly { issue: issue() }),
        ]);
        let text = r.render_text();
        assert!(!text.contains("Quiet"));
        assert!(text.contains("Loud [fail]"));
        assert!(text.contains("Strings: Value at 'n'"));
        assert!(text.contains("remove annotation org/repo#1"));
        assert!(text.contains("quirk org/repo#1: stale, matched in Stale"));
    }

    #[test]
    fn partially_fixed_quirk_names_matching_pairings() {
        let execution = |pairing: &str, verdict, stale| ExecutionReport {
            pairing: pairing.to_owned(),
            verdict,
            non_empty: true,
            elapsed_us: 0,
            detail: None,
            sut: None,
            reference: None,
            stale,
        };
        let mut r = report(vec![(
            "Tracked",
            CaseVerdict::ExpectedFail { issue: issue(), reasons: vec![divergence()] },
        )]);
        r.cases[0].executions = vec![
            execution("Strings", ExecutionVerdict::ExpectedMismatch, false),
            execution("Bools", ExecutionVerdict::Match, true),
        ];

        assert_eq!(r.cases[0].stale_pairings().collect::<Vec<_>>(), vec!["Bools"]);
        let text = r.render_text();
        assert!(text.contains("fixed on: Bools"), "{text}");
        assert!(text.contains("quirk org/repo#1: still diverging in Tracked"), "{text}");

        let json = r.to_json().unwrap();
        assert_eq!(json.matches("\"stale\": true").count(), 1);
        let back: GroupReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
