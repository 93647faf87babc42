//! The narrow interface the harness needs from a live backend.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use docparity_error::{ErrorCategory, ErrorCode};
use docparity_types::Document;

use crate::cx::{CancelReason, Cx};

/// Machine-readable part of a command error. Compared by the harness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: i32,
    pub code_name: String,
}

impl ErrorInfo {
    pub fn new(code: i32, code_name: impl Into<String>) -> Self {
        Self {
            code,
            code_name: code_name.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::of_code(self.code)
    }
}

impl From<ErrorCode> for ErrorInfo {
    fn from(code: ErrorCode) -> Self {
        Self::new(code.code(), code.name())
    }
}

/// A command-level failure reported by a backend.
///
/// `message` is human-oriented and never compared; it is logged only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandError {
    pub info: ErrorInfo,
    pub message: String,
}

impl CommandError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            info: code.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> i32 {
        self.info.code
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {}",
            self.info.code_name, self.info.code, self.message
        )
    }
}

impl std::error::Error for CommandError {}

/// Why a backend call produced no reply document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The backend answered with a command error.
    #[error("command failed: {0}")]
    Command(#[from] CommandError),

    /// The backend could not be reached or the call broke below the command
    /// layer.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The call gave up because its scope was cancelled.
    #[error("interrupted: {0}")]
    Interrupted(CancelReason),
}

/// A live collection on one backend.
///
/// Handles are shared read-only across worker threads. Implementations
/// should poll `cx.checkpoint()` while blocked so a passed deadline can
/// interrupt them.
pub trait CollectionHandle: Send + Sync {
    /// Collection name used as the command target.
    fn name(&self) -> &str;

    /// Send a rendered command and return the raw reply.
    fn run_command(&self, cx: &Cx, command: &Document) -> Result<Document, BackendError>;
}
