//! Dual executor: one rendered command, two backends.

use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use docparity_error::{BackendSide, HarnessError, Result};
use docparity_types::Document;

use crate::backend::{BackendError, CollectionHandle, CommandError};
use crate::cx::Cx;
use crate::matrix::Execution;

/// What one backend answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success(Document),
    Failure(CommandError),
}

impl Outcome {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub const fn success(&self) -> Option<&Document> {
        match self {
            Self::Success(doc) => Some(doc),
            Self::Failure(_) => None,
        }
    }

    pub const fn failure(&self) -> Option<&CommandError> {
        match self {
            Self::Success(_) => None,
            Self::Failure(err) => Some(err),
        }
    }
}

/// Both outcomes of one execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
    pub pairing: String,
    pub sut: Outcome,
    pub reference: Outcome,
    pub elapsed: Duration,
}

/// Issues an execution's command against both backends of its pairing.
#[derive(Debug, Clone, Copy)]
pub struct DualExecutor {
    concurrent: bool,
}

impl Default for DualExecutor {
    fn default() -> Self {
        Self { concurrent: true }
    }
}

impl DualExecutor {
    /// `concurrent = false` issues the SUT call first, then the reference.
    pub const fn new(concurrent: bool) -> Self {
        Self { concurrent }
    }

    /// Run both calls. The reference call is attempted even when the SUT
    /// call fails. A transport failure on either side is returned as
    /// [`HarnessError::Transport`], never folded into an [`Outcome`].
    pub fn execute(&self, cx: &Cx, execution: &Execution<'_>) -> Result<ExecutionRecord> {
        if let Err(reason) = cx.checkpoint() {
            return Err(cx.cancelled_error(reason));
        }

        let pairing = execution.pairing;
        let command = execution.case.command();
        let sut = pairing.handle(BackendSide::Sut);
        let reference = pairing.handle(BackendSide::Reference);
        let sut_command = command.render(sut.name());
        let reference_command = command.render(reference.name());

        let started = Instant::now();
        let (sut_reply, reference_reply) = if self.concurrent {
            thread::scope(|s| {
                let reference_call = s.spawn(|| reference.run_command(cx, &reference_command));
                let sut_reply = call(sut, cx, &sut_command);
                let reference_reply = reference_call
                    .join()
                    .unwrap_or_else(|_| Err(BackendError::Transport("reference call panicked".to_owned())));
                (sut_reply, reference_reply)
            })
        } else {
            let sut_reply = call(sut, cx, &sut_command);
            let reference_reply = call(reference, cx, &reference_command);
            (sut_reply, reference_reply)
        };
        let elapsed = started.elapsed();

        let case = execution.case.name();
        let sut = into_outcome(cx, case, pairing.name(), BackendSide::Sut, sut_reply)?;
        let reference = into_outcome(cx, case, pairing.name(), BackendSide::Reference, reference_reply)?;

        debug!(
            case,
            pairing = pairing.name(),
            sut_ok = sut.is_success(),
            reference_ok = reference.is_success(),
            elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            "execution completed"
        );

        Ok(ExecutionRecord {
            pairing: pairing.name().to_owned(),
            sut,
            reference,
            elapsed,
        })
    }
}

fn call(handle: &dyn CollectionHandle, cx: &Cx, command: &Document) -> std::result::Result<Document, BackendError> {
    handle.run_command(cx, command)
}

fn into_outcome(
    cx: &Cx,
    case: &str,
    pairing: &str,
    side: BackendSide,
    reply: std::result::Result<Document, BackendError>,
) -> Result<Outcome> {
    match reply {
        Ok(doc) => Ok(Outcome::Success(doc)),
        Err(BackendError::Command(err)) => {
            debug!(
                case,
                pairing,
                %side,
                code = err.info.code,
                code_name = %err.info.code_name,
                message = %err.message,
                "command error"
            );
            Ok(Outcome::Failure(err))
        }
        Err(BackendError::Transport(detail)) => {
            error!(case, pairing, %side, detail = %detail, "transport failure");
            Err(HarnessError::transport(pairing, side, detail))
        }
        Err(BackendError::Interrupted(reason)) => {
            debug!(case, pairing, %side, %reason, "call interrupted");
            Err(cx.cancelled_error(reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::case::Case;
    use crate::matrix::Pairing;
    use docparity_error::ErrorCode;
    use docparity_types::{Value, doc};

    /// Echoes the command target back as the reply.
    struct Echo {
        name: &'static str,
        calls: AtomicUsize,
    }

    impl Echo {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl CollectionHandle for Echo {
        fn name(&self) -> &str {
            self.name
        }

        fn run_command(&self, _cx: &Cx, command: &Document) -> std::result::Result<Document, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let target = command.get("count").cloned().unwrap_or(Value::Null);
            Ok(doc! { "target" => target, "n" => 1_i32 })
        }
    }

    struct Failing(BackendError);

    impl CollectionHandle for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn run_command(&self, _cx: &Cx, _command: &Document) -> std::result::Result<Document, BackendError> {
            Err(self.0.clone())
        }
    }

    fn case() -> Case {
        Case::count("Empty").filter(Document::new()).build().unwrap()
    }

    fn run(executor: DualExecutor, pairing: &Pairing) -> Result<ExecutionRecord> {
        let case = case();
        let execution = Execution {
            case: &case,
            pairing,
            index: 0,
        };
        executor.execute(&Cx::new(), &execution)
    }

    #[test]
    fn renders_per_side_target() {
        for concurrent in [true, false] {
            let pairing = Pairing::provider("Strings", Echo::new("sut-strings"), Echo::new("ref-strings"));
            let record = run(DualExecutor::new(concurrent), &pairing).unwrap();
            assert_eq!(
                record.sut.success().and_then(|d| d.get("target")),
                Some(&Value::from("sut-strings"))
            );
            assert_eq!(
                record.reference.success().and_then(|d| d.get("target")),
                Some(&Value::from("ref-strings"))
            );
            assert_eq!(record.pairing, "Strings");
        }
    }

    #[test]
    fn reference_called_even_when_sut_fails() {
        let reference = Echo::new("ref");
        let sut = Arc::new(Failing(BackendError::Command(CommandError::new(
            ErrorCode::BadValue,
            "bad skip",
        ))));
        let pairing = Pairing::provider("Strings", sut, Arc::clone(&reference) as Arc<dyn CollectionHandle>);
        let record = run(DualExecutor::new(false), &pairing).unwrap();
        assert_eq!(reference.calls.load(Ordering::SeqCst), 1);
        assert_eq!(record.sut.failure().map(CommandError::code), Some(2));
        assert!(record.reference.is_success());
    }

    #[test]
    fn transport_failure_is_distinct() {
        let reference = Echo::new("ref");
        let sut = Arc::new(Failing(BackendError::Transport("connection refused".to_owned())));
        let pairing = Pairing::provider("Strings", sut, Arc::clone(&reference) as Arc<dyn CollectionHandle>);
        let err = run(DualExecutor::default(), &pairing).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Transport { ref pairing, side: BackendSide::Sut, .. } if pairing == "Strings"
        ));
        assert_eq!(reference.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_scope_makes_no_calls() {
        let sut = Echo::new("sut");
        let reference = Echo::new("ref");
        let pairing = Pairing::provider(
            "Strings",
            Arc::clone(&sut) as Arc<dyn CollectionHandle>,
            Arc::clone(&reference) as Arc<dyn CollectionHandle>,
        );
        let cx = Cx::new();
        cx.cancel_with_reason(crate::cx::CancelReason::GroupAbort);
        let case = case();
        let execution = Execution {
            case: &case,
            pairing: &pairing,
            index: 0,
        };
        let err = DualExecutor::default().execute(&cx, &execution).unwrap_err();
        assert!(matches!(err, HarnessError::Cancelled { .. }));
        assert_eq!(sut.calls.load(Ordering::SeqCst), 0);
        assert_eq!(reference.calls.load(Ordering::SeqCst), 0);
    }
}
