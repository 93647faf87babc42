//! Cancellation context for group and case scopes.
//!
//! A run builds a small tree: one root per group (carrying the global
//! deadline) and one child per case. Cancelling a node cancels every
//! descendant; a child's cancellation never reaches its parent or siblings.
//! Backends receive the context and should poll [`Cx::checkpoint`] while
//! waiting so that a passed deadline interrupts them.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use docparity_error::HarnessError;

/// Reason for cancellation, ordered from weakest to strongest.
///
/// Repeated cancel requests are monotone: the strongest reason wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The group deadline passed.
    Deadline = 0,
    /// A backend in this scope failed below the command layer.
    Transport = 1,
    /// The whole group is being torn down.
    GroupAbort = 2,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deadline => f.write_str("deadline exceeded"),
            Self::Transport => f.write_str("transport failure"),
            Self::GroupAbort => f.write_str("group aborted"),
        }
    }
}

#[derive(Debug)]
struct CxInner {
    cancel_requested: AtomicBool,
    cancel_reason: Mutex<Option<CancelReason>>,
    children: Mutex<Vec<Arc<Self>>>,
}

impl CxInner {
    fn new() -> Self {
        Self {
            cancel_requested: AtomicBool::new(false),
            cancel_reason: Mutex::new(None),
            children: Mutex::new(Vec::new()),
        }
    }
}

/// Mark `inner` and all its descendants cancelled.
///
/// Each node's lock is released before recursing into its children.
fn propagate_cancel(inner: &CxInner, reason: CancelReason) {
    inner.cancel_requested.store(true, Ordering::Release);
    {
        let mut current = inner.cancel_reason.lock();
        match *current {
            Some(existing) if existing >= reason => {}
            _ => *current = Some(reason),
        }
    }
    let children: Vec<Arc<CxInner>> = inner.children.lock().clone();
    for child in &children {
        propagate_cancel(child, reason);
    }
}

/// Cancellation scope handed to every backend call.
#[derive(Debug, Clone)]
pub struct Cx {
    inner: Arc<CxInner>,
    started: Instant,
    deadline: Option<Instant>,
}

impl Default for Cx {
    fn default() -> Self {
        Self::new()
    }
}

impl Cx {
    /// A root scope without a deadline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CxInner::new()),
            started: Instant::now(),
            deadline: None,
        }
    }

    /// A root scope that cancels itself once `timeout` has elapsed.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            inner: Arc::new(CxInner::new()),
            started,
            deadline: started.checked_add(timeout),
        }
    }

    /// Create a child scope sharing this scope's deadline. Cancelling this
    /// scope propagates to the child; a child created under an already
    /// cancelled parent starts cancelled.
    #[must_use]
    pub fn create_child(&self) -> Self {
        let child = Self {
            inner: Arc::new(CxInner::new()),
            started: Instant::now(),
            deadline: self.deadline,
        };
        self.inner.children.lock().push(Arc::clone(&child.inner));
        if let Some(reason) = self.cancel_reason() {
            propagate_cancel(&child.inner, reason);
        }
        child
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.inner.cancel_requested.load(Ordering::Acquire)
    }

    /// Request cancellation of this scope and all descendants.
    pub fn cancel_with_reason(&self, reason: CancelReason) {
        propagate_cancel(&self.inner, reason);
    }

    /// The strongest reason recorded so far.
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        *self.inner.cancel_reason.lock()
    }

    /// Yield point. Observes both explicit cancellation and the deadline;
    /// a passed deadline cancels this scope (and its descendants) with
    /// [`CancelReason::Deadline`].
    pub fn checkpoint(&self) -> Result<(), CancelReason> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.cancel_with_reason(CancelReason::Deadline);
            }
        }
        if !self.is_cancel_requested() {
            return Ok(());
        }
        Err(self.cancel_reason().unwrap_or(CancelReason::GroupAbort))
    }

    /// Convert an observed cancellation into the harness error for it.
    pub fn cancelled_error(&self, reason: CancelReason) -> HarnessError {
        match reason {
            CancelReason::Deadline => HarnessError::DeadlineExceeded {
                elapsed_ms: u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX),
            },
            other => HarnessError::Cancelled {
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_scope_is_not_cancelled() {
        let cx = Cx::new();
        assert!(cx.checkpoint().is_ok());
        assert_eq!(cx.cancel_reason(), None);
        assert_eq!(cx.remaining(), None);
    }

    #[test]
    fn cancel_propagates_to_children() {
        let root = Cx::new();
        let child = root.create_child();
        let grandchild = child.create_child();

        root.cancel_with_reason(CancelReason::GroupAbort);
        assert_eq!(child.checkpoint(), Err(CancelReason::GroupAbort));
        assert_eq!(grandchild.checkpoint(), Err(CancelReason::GroupAbort));
    }

    #[test]
    fn child_cancel_does_not_reach_parent_or_siblings() {
        let root = Cx::new();
        let a = root.create_child();
        let b = root.create_child();

        a.cancel_with_reason(CancelReason::Transport);
        assert!(a.is_cancel_requested());
        assert!(root.checkpoint().is_ok());
        assert!(b.checkpoint().is_ok());
    }

    #[test]
    fn strongest_reason_wins() {
        let cx = Cx::new();
        cx.cancel_with_reason(CancelReason::Transport);
        cx.cancel_with_reason(CancelReason::Deadline);
        assert_eq!(cx.cancel_reason(), Some(CancelReason::Transport));
        cx.cancel_with_reason(CancelReason::GroupAbort);
        assert_eq!(cx.cancel_reason(), Some(CancelReason::GroupAbort));
    }

    #[test]
    fn child_of_cancelled_parent_starts_cancelled() {
        let root = Cx::new();
        root.cancel_with_reason(CancelReason::Deadline);
        let late = root.create_child();
        assert_eq!(late.checkpoint(), Err(CancelReason::Deadline));
    }

    #[test]
    fn deadline_cancels_scope_and_descendants() {
        let root = Cx::with_timeout(Duration::ZERO);
        let child = root.create_child();
        assert_eq!(root.checkpoint(), Err(CancelReason::Deadline));
        assert_eq!(child.cancel_reason(), Some(CancelReason::Deadline));

        let err = root.cancelled_error(CancelReason::Deadline);
        assert!(matches!(err, HarnessError::DeadlineExceeded { .. }));
    }

    #[test]
    fn child_inherits_deadline() {
        let root = Cx::with_timeout(Duration::from_secs(3600));
        let child = root.create_child();
        assert_eq!(child.deadline(), root.deadline());
        assert!(child.remaining().is_some_and(|left| left > Duration::from_secs(3000)));
    }
}
