//! Concurrent group runner.
//!
//! # Architecture
//!
//! Cases of a group are pulled from a shared cursor by `case_workers` scoped
//! threads. Each case gets a child [`Cx`] of the group root and pulls its
//! executions from a shared lazy [`Expansion`](crate::matrix::Expansion) on
//! `execution_workers` threads; each execution issues its two backend calls
//! concurrently. Results land in per-slot mutexes written exactly once, so
//! reports come out in declaration order regardless of scheduling.
//!
//! Per case:
//!
//! ```text
//! Pending -> Expanding -> Running -> Aggregating -> Reported
//! ```
//!
//! A transport failure cancels the remaining executions of its case only.
//! The group deadline cancels everything still running; those cases are
//! reported as aborted, never as failed.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use docparity_error::{HarnessError, Result};

use crate::case::{Case, CaseTable};
use crate::classify::{classify, contributes_non_empty};
use crate::compare::{Comparison, compare};
use crate::config::RunnerConfig;
use crate::cx::{CancelReason, Cx};
use crate::executor::{DualExecutor, ExecutionRecord};
use crate::matrix::{Matrix, PairingKind};
use crate::quirks::{CaseOutcome, annotate, annotate_execution};
use crate::report::{AbortReason, CaseReport, CaseVerdict, ExecutionReport, ExecutionVerdict, FailureReason, GroupReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaseState {
    Pending,
    Expanding,
    Running,
    Aggregating,
    Reported,
}

impl fmt::Display for CaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Expanding => "expanding",
            Self::Running => "running",
            Self::Aggregating => "aggregating",
            Self::Reported => "reported",
        };
        f.write_str(name)
    }
}

fn transition(case: &str, from: CaseState, to: CaseState) {
    debug!(case, from = %from, to = %to, "case state");
}

/// Run every case of `table` against every pairing of `matrix`.
///
/// Fails only on configuration errors; everything else is a verdict in the
/// returned report. Use [`GroupReport::into_result`] to surface transport
/// failures as an error.
pub fn run_group(table: &CaseTable, matrix: &Matrix, config: &RunnerConfig) -> Result<GroupReport> {
    GroupRunner::new(config.clone())?.run(table, matrix)
}

#[derive(Debug, Clone)]
pub struct GroupRunner {
    config: RunnerConfig,
    executor: DualExecutor,
}

impl GroupRunner {
    pub fn new(config: RunnerConfig) -> Result<Self> {
        config.validate()?;
        let executor = DualExecutor::new(config.concurrent_calls);
        Ok(Self { config, executor })
    }

    pub const fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn run(&self, table: &CaseTable, matrix: &Matrix) -> Result<GroupReport> {
        let group = table.group();
        if matrix.is_empty() {
            return Err(HarnessError::EmptyMatrix {
                group: group.to_owned(),
            });
        }
        if self.config.require_nonexistent
            && !matrix
                .pairings()
                .iter()
                .any(|p| *p.kind() == PairingKind::Nonexistent)
        {
            return Err(HarnessError::MissingNonexistentPairing {
                group: group.to_owned(),
            });
        }

        let cases = table.cases();
        let fingerprint = table.fingerprint();
        let started = Instant::now();
        let root = Cx::with_timeout(self.config.global_timeout);
        info!(
            group,
            cases = cases.len(),
            pairings = matrix.len(),
            case_workers = self.config.case_workers,
            execution_workers = self.config.execution_workers,
            fingerprint = %fingerprint,
            "group run starting"
        );

        let slots: Vec<Mutex<Option<CaseReport>>> = cases.iter().map(|_| Mutex::new(None)).collect();
        let cursor = AtomicUsize::new(0);
        let workers = self.config.case_workers.min(cases.len());

        thread::scope(|s| {
            let (slots, cursor, root) = (&slots, &cursor, &root);
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    s.spawn(move || {
                        loop {
                            let idx = cursor.fetch_add(1, Ordering::SeqCst);
                            let Some(case) = cases.get(idx) else { break };
                            let report = self.run_case(root, matrix, case);
                            *slots[idx].lock() = Some(report);
                        }
                    })
                })
                .collect();
            for handle in handles {
                if handle.join().is_err() {
                    error!(group, "case worker panicked");
                }
            }
        });

        let reports: Vec<CaseReport> = slots
            .into_iter()
            .zip(cases)
            .map(|(slot, case)| {
                slot.into_inner().unwrap_or_else(|| CaseReport {
                    case: case.name().to_owned(),
                    verdict: CaseVerdict::Aborted {
                        reason: AbortReason::Internal {
                            detail: "case worker panicked before reporting".to_owned(),
                        },
                    },
                    executions: Vec::new(),
                })
            })
            .collect();

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let report = GroupReport::new(group.to_owned(), fingerprint, elapsed_ms, reports);
        info!(
            group,
            elapsed_ms,
            passed = report.summary.passed,
            failed = report.summary.failed,
            expected_failures = report.summary.expected_failures,
            anomalies = report.summary.anomalies,
            aborted = report.summary.aborted,
            "group run finished"
        );
        Ok(report)
    }

    /// Run one case under a child of `root`.
    pub fn run_case(&self, root: &Cx, matrix: &Matrix, case: &Case) -> CaseReport {
        let name = case.name();
        let cx = root.create_child();

        transition(name, CaseState::Pending, CaseState::Expanding);
        let expansion = match matrix.expand(case) {
            Ok(expansion) => expansion,
            Err(err) => return aborted(case, AbortReason::from_error(&err), Vec::new()),
        };
        let total = expansion.len();
        let queue = Mutex::new(expansion);
        let records: Vec<Mutex<Option<ExecutionRecord>>> = (0..total).map(|_| Mutex::new(None)).collect();
        let abort: Mutex<Option<AbortReason>> = Mutex::new(None);

        transition(name, CaseState::Expanding, CaseState::Running);
        let workers = self.config.execution_workers.min(total).max(1);
        thread::scope(|s| {
            let (queue, records, abort, cx) = (&queue, &records, &abort, &cx);
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    s.spawn(move || {
                        loop {
                            if cx.checkpoint().is_err() {
                                break;
                            }
                            let next = queue.lock().next();
                            let Some(execution) = next else { break };
                            match self.executor.execute(cx, &execution) {
                                Ok(record) => *records[execution.index].lock() = Some(record),
                                Err(err) => {
                                    // Record before cancelling so siblings' interruptions cannot win.
                                    abort.lock().get_or_insert_with(|| AbortReason::from_error(&err));
                                    if matches!(err, HarnessError::Transport { .. }) {
                                        cx.cancel_with_reason(CancelReason::Transport);
                                    }
                                    break;
                                }
                            }
                        }
                    })
                })
                .collect();
            for handle in handles {
                if handle.join().is_err() {
                    abort.lock().get_or_insert_with(|| AbortReason::Internal {
                        detail: "execution worker panicked".to_owned(),
                    });
                }
            }
        });

        transition(name, CaseState::Running, CaseState::Aggregating);
        let records: Vec<Option<ExecutionRecord>> = records.into_iter().map(Mutex::into_inner).collect();
        let incomplete = records.iter().any(Option::is_none);
        let completed: Vec<ExecutionRecord> = records.into_iter().flatten().collect();

        if let Some(reason) = abort.into_inner() {
            let executions = execution_reports(case, &completed).0;
            return aborted(case, reason, executions);
        }
        if incomplete {
            let reason = match cx.cancel_reason() {
                Some(CancelReason::Deadline) => AbortReason::Deadline,
                Some(other) => AbortReason::Cancelled {
                    reason: other.to_string(),
                },
                None => AbortReason::Internal {
                    detail: "execution never completed".to_owned(),
                },
            };
            let executions = execution_reports(case, &completed).0;
            return aborted(case, reason, executions);
        }

        let (mut executions, divergences, non_empty_pairings) = execution_reports(case, &completed);
        let outcome = CaseOutcome {
            divergences,
            shape_violation: classify(case, &non_empty_pairings),
        };
        let verdict = annotate(name, outcome, case.mode());
        match &verdict {
            CaseVerdict::Fail { reasons } => {
                for reason in reasons {
                    error!(case = name, reason = %reason, "case failed");
                }
            }
            CaseVerdict::ExpectedFail { issue, .. } => {
                info!(case = name, issue = %issue, "known divergence still present");
                for execution in executions
                    .iter_mut()
                    .filter(|e| e.verdict == ExecutionVerdict::Match)
                {
                    execution.stale = true;
                    warn!(case = name, issue = %issue, pairing = %execution.pairing, "known divergence fixed on pairing");
                }
            }
            _ => {}
        }
        transition(name, CaseState::Aggregating, CaseState::Reported);
        CaseReport {
            case: name.to_owned(),
            verdict,
            executions,
        }
    }
}

/// Compare and annotate completed executions. Returns the per-execution
/// reports, the divergences, and the pairings that contributed a
/// non-empty result.
fn execution_reports(
    case: &Case,
    records: &[ExecutionRecord],
) -> (Vec<ExecutionReport>, Vec<FailureReason>, Vec<String>) {
    let mut reports = Vec::with_capacity(records.len());
    let mut divergences = Vec::new();
    let mut non_empty_pairings = Vec::new();

    for record in records {
        let comparison = compare(&record.sut, &record.reference, case.compare_options());
        let verdict = annotate_execution(&comparison, case.mode());
        let non_empty = contributes_non_empty(case.command(), record);
        if non_empty {
            non_empty_pairings.push(record.pairing.clone());
        }
        let detail = match comparison {
            Comparison::Match => None,
            Comparison::Mismatch(detail) => {
                warn!(
                    case = case.name(),
                    pairing = %record.pairing,
                    kind = ?detail.kind,
                    path = %detail.path,
                    sut = %detail.sut,
                    reference = %detail.reference,
                    expected = verdict == ExecutionVerdict::ExpectedMismatch,
                    "divergence"
                );
                divergences.push(FailureReason::Divergence {
                    pairing: record.pairing.clone(),
                    detail: detail.clone(),
                });
                Some(detail)
            }
        };
        let keep_raw = verdict != ExecutionVerdict::Match;
        reports.push(ExecutionReport {
            pairing: record.pairing.clone(),
            verdict,
            non_empty,
            elapsed_us: u64::try_from(record.elapsed.as_micros()).unwrap_or(u64::MAX),
            detail,
            sut: keep_raw.then(|| record.sut.clone()),
            reference: keep_raw.then(|| record.reference.clone()),
            stale: false,
        });
    }
    (reports, divergences, non_empty_pairings)
}

fn aborted(case: &Case, reason: AbortReason, executions: Vec<ExecutionReport>) -> CaseReport {
    match &reason {
        AbortReason::Transport { pairing, side, detail } => error!(
            case = case.name(),
            pairing = %pairing,
            side = %side,
            detail = %detail,
            "case aborted by transport failure"
        ),
        other => warn!(case = case.name(), reason = ?other, "case aborted"),
    }
    transition(case.name(), CaseState::Aggregating, CaseState::Reported);
    CaseReport {
        case: case.name().to_owned(),
        verdict: CaseVerdict::Aborted { reason },
        executions,
    }
}
