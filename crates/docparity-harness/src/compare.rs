//! Semantics-aware outcome comparison.
//!
//! Two successful replies match when their document trees are equivalent:
//! key sets equal (order ignored), values equal per [`CompareOptions`].
//! Two failures match when their error codes (or categories) agree; the
//! message text is never compared. A success against a failure never
//! matches.
//!
//! The comparator is symmetric: `compare(a, b)` and `compare(b, a)` agree on
//! the verdict, the mismatch kind, and the mismatch path.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use docparity_types::{Document, Value};

use crate::backend::CommandError;
use crate::case::{CompareOptions, ErrorMatch, NumericMode, SequenceOrder};
use crate::executor::Outcome;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Match,
    Mismatch(MismatchDetail),
}

impl Comparison {
    pub const fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    /// One side succeeded, the other failed.
    SuccessVsFailure,
    /// Both failed with different codes.
    ErrorCode,
    /// Both failed in different error categories.
    ErrorCategory,
    /// Values of different types at the same path.
    Type,
    /// Same type, different value.
    Value,
    /// Documents with different key sets.
    KeySet,
    /// Arrays of different lengths.
    Length,
    /// Arrays with the same length but different element multisets.
    Multiset,
}

/// First difference found, with both sides rendered at that path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MismatchDetail {
    pub kind: MismatchKind,
    /// Dotted path into the reply, e.g. `cursor.firstBatch[2].v`. Empty for
    /// the reply root.
    pub path: String,
    pub sut: String,
    pub reference: String,
}

/// Compare the SUT outcome against the reference outcome.
pub fn compare(sut: &Outcome, reference: &Outcome, options: &CompareOptions) -> Comparison {
    let result = match (sut, reference) {
        (Outcome::Success(a), Outcome::Success(b)) => documents_equal(a, b, options, ""),
        (Outcome::Failure(a), Outcome::Failure(b)) => errors_equal(a, b, options.errors),
        (Outcome::Success(a), Outcome::Failure(b)) => Err(MismatchDetail {
            kind: MismatchKind::SuccessVsFailure,
            path: String::new(),
            sut: a.to_string(),
            reference: b.to_string(),
        }),
        (Outcome::Failure(a), Outcome::Success(b)) => Err(MismatchDetail {
            kind: MismatchKind::SuccessVsFailure,
            path: String::new(),
            sut: a.to_string(),
            reference: b.to_string(),
        }),
    };
    match result {
        Ok(()) => Comparison::Match,
        Err(detail) => Comparison::Mismatch(detail),
    }
}

fn errors_equal(a: &CommandError, b: &CommandError, mode: ErrorMatch) -> Result<(), MismatchDetail> {
    if a.message != b.message {
        debug!(
            sut_message = %a.message,
            reference_message = %b.message,
            "error messages differ; not compared"
        );
    }
    let (equal, kind) = match mode {
        ErrorMatch::Code => (a.info.code == b.info.code, MismatchKind::ErrorCode),
        ErrorMatch::Category => (a.info.category() == b.info.category(), MismatchKind::ErrorCategory),
    };
    if equal {
        Ok(())
    } else {
        Err(MismatchDetail {
            kind,
            path: String::new(),
            sut: format!("{} ({})", a.info.code_name, a.info.code),
            reference: format!("{} ({})", b.info.code_name, b.info.code),
        })
    }
}

fn mismatch(kind: MismatchKind, path: &str, a: &dyn ToString, b: &dyn ToString) -> MismatchDetail {
    MismatchDetail {
        kind,
        path: path.to_owned(),
        sut: a.to_string(),
        reference: b.to_string(),
    }
}

fn child_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_owned()
    } else {
        format!("{path}.{key}")
    }
}

fn documents_equal(a: &Document, b: &Document, options: &CompareOptions, path: &str) -> Result<(), MismatchDetail> {
    let keys_a: BTreeSet<&str> = a.keys().collect();
    let keys_b: BTreeSet<&str> = b.keys().collect();
    if let Some(key) = keys_a.symmetric_difference(&keys_b).next() {
        let render = |d: &Document| d.get(key).map_or_else(|| "<missing>".to_owned(), ToString::to_string);
        return Err(MismatchDetail {
            kind: MismatchKind::KeySet,
            path: child_path(path, key),
            sut: render(a),
            reference: render(b),
        });
    }
    // Sorted key order keeps the first reported difference independent of
    // argument order.
    for key in keys_a {
        if let (Some(va), Some(vb)) = (a.get(key), b.get(key)) {
            values_equal(va, vb, options, &child_path(path, key))?;
        }
    }
    Ok(())
}

/// Recursive semantic equality of two values.
pub fn values_equal(a: &Value, b: &Value, options: &CompareOptions, path: &str) -> Result<(), MismatchDetail> {
    if a.is_number() && b.is_number() {
        if options.numeric == NumericMode::TypePreserving && a.type_alias() != b.type_alias() {
            return Err(mismatch(MismatchKind::Type, path, a, b));
        }
        return if a.numeric_eq(b) == Some(true) {
            Ok(())
        } else {
            Err(mismatch(MismatchKind::Value, path, a, b))
        };
    }
    if a.type_alias() != b.type_alias() {
        return Err(mismatch(MismatchKind::Type, path, a, b));
    }
    match (a, b) {
        (Value::Document(da), Value::Document(db)) => documents_equal(da, db, options, path),
        (Value::Array(xa), Value::Array(xb)) => {
            if xa.len() != xb.len() {
                return Err(mismatch(MismatchKind::Length, path, &xa.len(), &xb.len()));
            }
            match options.sequences {
                SequenceOrder::Ordered => {
                    for (i, (x, y)) in xa.iter().zip(xb).enumerate() {
                        values_equal(x, y, options, &format!("{path}[{i}]"))?;
                    }
                    Ok(())
                }
                SequenceOrder::Multiset => {
                    if multiset_equal(xa, xb, options) {
                        Ok(())
                    } else {
                        Err(mismatch(MismatchKind::Multiset, path, a, b))
                    }
                }
            }
        }
        _ if a.canonical_cmp(b).is_eq() => Ok(()),
        _ => Err(mismatch(MismatchKind::Value, path, a, b)),
    }
}

/// Greedy matching; sound because element equality is an equivalence.
fn multiset_equal(a: &[Value], b: &[Value], options: &CompareOptions) -> bool {
    let mut used = vec![false; b.len()];
    a.iter().all(|x| {
        let found = b
            .iter()
            .enumerate()
            .find(|(j, y)| !used[*j] && values_equal(x, y, options, "").is_ok())
            .map(|(j, _)| j);
        found.is_some_and(|j| {
            used[j] = true;
            true
        })
    })
}
