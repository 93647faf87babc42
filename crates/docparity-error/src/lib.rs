use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Primary error type for the docparity harness.
///
/// Divergences between backends are *not* errors: they are verdicts. This
/// type covers the conditions that stop a case or a whole group from
/// producing a verdict at all.
#[derive(Error, Debug)]
pub enum HarnessError {
    // === Configuration Errors ===
    /// A case was declared without the filter every command requires.
    #[error("case '{case}' declares no filter")]
    MissingFilter { case: String },

    /// Two cases in one group share a name.
    #[error("case '{case}' declared more than once in group '{group}'")]
    DuplicateCase { group: String, case: String },

    /// The matrix for a group has no pairings to expand into.
    #[error("matrix for group '{group}' has no pairings")]
    EmptyMatrix { group: String },

    /// The matrix lacks the designated nonexistent-collection pairing.
    #[error("matrix for group '{group}' lacks the nonexistent-collection pairing")]
    MissingNonexistentPairing { group: String },

    /// Two pairings in one matrix share a name.
    #[error("pairing '{pairing}' declared more than once in group '{group}'")]
    DuplicatePairing { group: String, pairing: String },

    /// A known-divergence annotation carries an unusable issue reference.
    #[error("invalid issue reference: '{value}'")]
    InvalidIssueRef { value: String },

    /// The provider catalog has no provider with this name.
    #[error("unknown provider: '{name}'")]
    UnknownProvider { name: String },

    /// Runner configuration is unusable.
    #[error("invalid configuration: {detail}")]
    InvalidConfig { detail: String },

    // === Execution Errors ===
    /// A backend could not be reached or the call failed below the command
    /// layer. Never folded into a command error.
    #[error("transport failure on pairing '{pairing}' ({side}): {detail}")]
    Transport {
        pairing: String,
        side: BackendSide,
        detail: String,
    },

    /// The group deadline passed before the work finished.
    #[error("deadline exceeded after {elapsed_ms} ms")]
    DeadlineExceeded { elapsed_ms: u64 },

    /// Work was cancelled by an enclosing scope.
    #[error("cancelled: {reason}")]
    Cancelled { reason: String },

    // === Internal Errors ===
    /// Report serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// File I/O error while writing reports.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal logic error (a worker panicked, a slot was never filled).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Which backend of a pairing an error or result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendSide {
    /// The system under test.
    Sut,
    /// The trusted reference implementation.
    Reference,
}

impl fmt::Display for BackendSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sut => f.write_str("sut"),
            Self::Reference => f.write_str("reference"),
        }
    }
}

/// Coarse classification of a [`HarnessError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Transport,
    Cancelled,
    Internal,
    Io,
}

impl HarnessError {
    /// Classify this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingFilter { .. }
            | Self::DuplicateCase { .. }
            | Self::EmptyMatrix { .. }
            | Self::MissingNonexistentPairing { .. }
            | Self::DuplicatePairing { .. }
            | Self::InvalidIssueRef { .. }
            | Self::UnknownProvider { .. }
            | Self::InvalidConfig { .. } => ErrorKind::Configuration,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::DeadlineExceeded { .. } | Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Serialization(_) | Self::Internal(_) => ErrorKind::Internal,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Configuration errors stop a run before any backend call is made.
    pub const fn is_configuration(&self) -> bool {
        matches!(self.kind(), ErrorKind::Configuration)
    }

    /// Human-friendly suggestion for fixing this error.
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::MissingFilter { .. } => Some("Every case needs a filter; use an empty document to match all"),
            Self::EmptyMatrix { .. } | Self::UnknownProvider { .. } => {
                Some("Check the provider catalog passed to setup")
            }
            Self::MissingNonexistentPairing { .. } => {
                Some("Enable the nonexistent-collection pairing during setup")
            }
            Self::InvalidIssueRef { .. } => {
                Some("Reference a tracker issue URL or an ORG/REPO#N id")
            }
            Self::Transport { .. } => Some("Check that both backends are reachable"),
            Self::DeadlineExceeded { .. } => Some("Raise DOCPARITY_TIMEOUT_SECS or split the group"),
            _ => None,
        }
    }

    /// Create a transport error.
    pub fn transport(
        pairing: impl Into<String>,
        side: BackendSide,
        detail: impl Into<String>,
    ) -> Self {
        Self::Transport {
            pairing: pairing.into(),
            side,
            detail: detail.into(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(detail: impl Into<String>) -> Self {
        Self::InvalidConfig {
            detail: detail.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using `HarnessError`.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Command error codes reported by document backends.
///
/// Numeric values follow the document database wire protocol. Backends may
/// return codes outside this set; those are carried as raw integers and
/// classify as [`ErrorCategory::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorCode {
    /// Unexpected server-side failure.
    InternalError = 1,
    /// A command argument has an unusable value.
    BadValue = 2,
    /// A command or filter could not be parsed.
    FailedToParse = 9,
    /// A command argument has the wrong type.
    TypeMismatch = 14,
    /// The target namespace does not exist.
    NamespaceNotFound = 26,
    /// The command name is not recognised.
    CommandNotFound = 59,
    /// `skip` was negative.
    NegativeSkip = 51024,
}

impl ErrorCode {
    const ALL: [Self; 7] = [
        Self::InternalError,
        Self::BadValue,
        Self::FailedToParse,
        Self::TypeMismatch,
        Self::NamespaceNotFound,
        Self::CommandNotFound,
        Self::NegativeSkip,
    ];

    /// Numeric wire code.
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Wire code name (`codeName` in replies).
    pub const fn name(self) -> &'static str {
        match self {
            Self::InternalError => "InternalError",
            Self::BadValue => "BadValue",
            Self::FailedToParse => "FailedToParse",
            Self::TypeMismatch => "TypeMismatch",
            Self::NamespaceNotFound => "NamespaceNotFound",
            Self::CommandNotFound => "CommandNotFound",
            Self::NegativeSkip => "Location51024",
        }
    }

    /// Look up a known code.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    /// Coarse category of this code.
    pub const fn category(self) -> ErrorCategory {
        match self {
            Self::BadValue | Self::NegativeSkip => ErrorCategory::InvalidArgument,
            Self::FailedToParse => ErrorCategory::Parse,
            Self::TypeMismatch => ErrorCategory::TypeMismatch,
            Self::NamespaceNotFound | Self::CommandNotFound => ErrorCategory::NotFound,
            Self::InternalError => ErrorCategory::Internal,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// Coarse error classes used when a case compares errors by category
/// instead of by exact code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    InvalidArgument,
    Parse,
    TypeMismatch,
    NotFound,
    Internal,
    /// Code not known to this crate.
    Other,
}

impl ErrorCategory {
    /// Category of a raw wire code.
    pub fn of_code(code: i32) -> Self {
        ErrorCode::from_code(code).map_or(Self::Other, ErrorCode::category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = HarnessError::MissingFilter {
            case: "Empty".to_owned(),
        };
        assert_eq!(err.to_string(), "case 'Empty' declares no filter");
    }

    #[test]
    fn error_display_transport() {
        let err = HarnessError::transport("Strings", BackendSide::Reference, "connection reset");
        assert_eq!(
            err.to_string(),
            "transport failure on pairing 'Strings' (reference): connection reset"
        );
    }

    #[test]
    fn kind_mapping() {
        assert_eq!(
            HarnessError::EmptyMatrix {
                group: "g".to_owned()
            }
            .kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            HarnessError::transport("p", BackendSide::Sut, "x").kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            HarnessError::DeadlineExceeded { elapsed_ms: 10 }.kind(),
            ErrorKind::Cancelled
        );
        assert_eq!(HarnessError::internal("bug").kind(), ErrorKind::Internal);
    }

    #[test]
    fn configuration_classification() {
        let err = HarnessError::invalid_config("zero workers");
        assert!(err.is_configuration());

        let err = HarnessError::transport("p", BackendSide::Sut, "x");
        assert!(!err.is_configuration());
    }

    #[test]
    fn suggestions() {
        assert!(
            HarnessError::MissingNonexistentPairing {
                group: "g".to_owned()
            }
            .suggestion()
            .is_some()
        );
        assert!(HarnessError::internal("x").suggestion().is_none());
    }

    #[test]
    fn io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: HarnessError = io_err.into();
        assert!(matches!(err, HarnessError::Io(_)));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn error_code_values() {
        assert_eq!(ErrorCode::BadValue.code(), 2);
        assert_eq!(ErrorCode::TypeMismatch.code(), 14);
        assert_eq!(ErrorCode::NegativeSkip.code(), 51024);
        assert_eq!(ErrorCode::NegativeSkip.name(), "Location51024");
        assert_eq!(ErrorCode::from_code(59), Some(ErrorCode::CommandNotFound));
        assert_eq!(ErrorCode::from_code(12345), None);
    }

    #[test]
    fn categories() {
        assert_eq!(ErrorCategory::of_code(2), ErrorCategory::InvalidArgument);
        assert_eq!(ErrorCategory::of_code(51024), ErrorCategory::InvalidArgument);
        assert_eq!(ErrorCategory::of_code(14), ErrorCategory::TypeMismatch);
        assert_eq!(ErrorCategory::of_code(-7), ErrorCategory::Other);
    }

    #[test]
    fn side_serializes_snake_case() {
        let json = serde_json::to_string(&BackendSide::Reference).unwrap();
        assert_eq!(json, "\"reference\"");
        assert_eq!(BackendSide::Sut.to_string(), "sut");
    }
}
