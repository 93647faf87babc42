//! Differential compatibility harness.
//!
//! Runs identical read commands against a system under test and a trusted
//! reference backend, then compares the outcomes with document-aware
//! equality. Hand-written [`Case`]s are expanded over a [`Matrix`] of
//! collection pairings, executed concurrently, compared, annotated with
//! known divergences and classified against their expected result shape.
//!
//! ```text
//! CaseTable ──► Matrix::expand ──► DualExecutor ──► compare ──► annotate ──► classify ──► GroupReport
//! ```

pub mod backend;
pub mod case;
pub mod classify;
pub mod compare;
pub mod config;
pub mod cx;
pub mod executor;
pub mod matrix;
pub mod provider;
pub mod quirks;
pub mod report;
pub mod runner;

pub use backend::{BackendError, CollectionHandle, CommandError, ErrorInfo};
pub use case::{
    Case, CaseBuilder, CaseMode, CaseTable, CommandSpec, CompareOptions, ErrorMatch, IssueRef,
    NumericMode, ResultShape, SequenceOrder,
};
pub use compare::{Comparison, MismatchDetail, MismatchKind, compare};
pub use config::RunnerConfig;
pub use cx::{CancelReason, Cx};
pub use executor::{DualExecutor, ExecutionRecord, Outcome};
pub use matrix::{Execution, Expansion, Matrix, MatrixOptions, NONEXISTENT_PAIRING, Pairing, PairingKind, PairingSource};
pub use provider::{Provider, ProviderCatalog};
pub use quirks::{QuirkRegistry, annotate, annotate_execution};
pub use report::{
    AbortReason, CaseReport, CaseVerdict, ExecutionReport, ExecutionVerdict, FailureReason,
    GroupReport, GroupSummary,
};
pub use runner::{CaseState, GroupRunner, run_group};

pub use docparity_error::{BackendSide, ErrorCategory, ErrorCode, HarnessError, Result};
