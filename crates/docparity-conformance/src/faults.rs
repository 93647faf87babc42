//! Backend wrappers that misbehave on purpose.
//!
//! [`FaultyHandle`] injects transport failures according to a
//! [`FaultSpec`]; [`StalledHandle`] never answers until its scope is
//! cancelled. Both exist to exercise the runner's abort paths.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use tracing::debug;

use docparity_harness::{BackendError, CollectionHandle, Cx};
use docparity_types::Document;

/// When a [`FaultyHandle`] fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultSpec {
    /// Every call after the first `n`.
    AfterCalls(usize),
    /// Calls whose command carries this field.
    WhenField(String),
}

impl FaultSpec {
    fn fires(&self, call: usize, command: &Document) -> bool {
        match self {
            Self::AfterCalls(n) => call >= *n,
            Self::WhenField(field) => command.contains_key(field),
        }
    }
}

/// Forwards to an inner handle unless the fault spec fires, in which case
/// the call fails with a transport error and the inner handle is not called.
pub struct FaultyHandle {
    inner: Arc<dyn CollectionHandle>,
    spec: FaultSpec,
    detail: String,
    calls: AtomicUsize,
    injected: AtomicUsize,
}

impl FaultyHandle {
    pub fn new(inner: Arc<dyn CollectionHandle>, spec: FaultSpec) -> Self {
        Self {
            inner,
            spec,
            detail: "connection reset by peer".to_owned(),
            calls: AtomicUsize::new(0),
            injected: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    /// Faults injected so far.
    pub fn injected(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CollectionHandle for FaultyHandle {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn run_command(&self, cx: &Cx, command: &Document) -> Result<Document, BackendError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.spec.fires(call, command) {
            self.injected.fetch_add(1, Ordering::SeqCst);
            debug!(collection = self.inner.name(), call, spec = ?self.spec, "injecting transport fault");
            return Err(BackendError::Transport(self.detail.clone()));
        }
        self.inner.run_command(cx, command)
    }
}

/// Polls its scope until cancelled, then reports the interruption.
pub struct StalledHandle {
    name: String,
    poll: Duration,
    calls: AtomicUsize,
}

impl StalledHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            poll: Duration::from_millis(5),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CollectionHandle for StalledHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn run_command(&self, cx: &Cx, _command: &Document) -> Result<Document, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        loop {
            if let Err(reason) = cx.checkpoint() {
                debug!(collection = %self.name, %reason, "stalled call released");
                return Err(BackendError::Interrupted(reason));
            }
            thread::sleep(self.poll);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docparity_harness::CancelReason;
    use docparity_memdb::{Dialect, MemoryStore};
    use docparity_types::doc;

    fn inner() -> Arc<dyn CollectionHandle> {
        let store = MemoryStore::new("test", Dialect::Reference);
        store.create_collection("values", [doc! { "_id" => 1_i32 }]);
        Arc::new(store.collection("values"))
    }

    #[test]
    fn after_calls_passes_then_fails() {
        let handle = FaultyHandle::new(inner(), FaultSpec::AfterCalls(1)).with_detail("boom");
        let command = doc! { "count" => "values" };
        assert!(handle.run_command(&Cx::new(), &command).is_ok());
        assert_eq!(
            handle.run_command(&Cx::new(), &command),
            Err(BackendError::Transport("boom".to_owned()))
        );
        assert_eq!((handle.calls(), handle.injected()), (2, 1));
    }

    #[test]
    fn when_field_matches_command_shape() {
        let handle = FaultyHandle::new(inner(), FaultSpec::WhenField("skip".to_owned()));
        assert!(handle.run_command(&Cx::new(), &doc! { "count" => "values" }).is_ok());
        assert!(matches!(
            handle.run_command(&Cx::new(), &doc! { "count" => "values", "skip" => 1_i32 }),
            Err(BackendError::Transport(_))
        ));
        assert_eq!(handle.name(), "values");
    }

    #[test]
    fn stalled_handle_waits_for_cancellation() {
        let handle = StalledHandle::new("stalled");
        let cx = Cx::with_timeout(Duration::from_millis(30));
        let result = handle.run_command(&cx, &doc! { "count" => "stalled" });
        assert_eq!(result, Err(BackendError::Interrupted(CancelReason::Deadline)));
        assert_eq!(handle.calls(), 1);
    }
}
