//! Backend dialects.
//!
//! The reference dialect follows the conformant behaviour. A SUT dialect
//! carries a set of [`Quirk`]s, each a documented deviation that the
//! conformance suites track as a known divergence.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quirk {
    /// A non-negative fractional `skip` is rejected with `BadValue` instead
    /// of being truncated.
    RejectFractionalSkip,
    /// `{$size: Infinity}` matches nothing instead of failing to parse.
    SizeInfinityMatchesNothing,
    /// `$elemMatch` silently drops field keys mixed with operators instead
    /// of rejecting the filter.
    ElemMatchIgnoresFieldKeys,
}

impl Quirk {
    pub const ALL: [Self; 3] = [
        Self::RejectFractionalSkip,
        Self::SizeInfinityMatchesNothing,
        Self::ElemMatchIgnoresFieldKeys,
    ];

    /// Tracker id of the issue describing this deviation.
    pub const fn issue(self) -> &'static str {
        match self {
            Self::RejectFractionalSkip => "docparity/docparity#405",
            Self::SizeInfinityMatchesNothing => "docparity/docparity#245",
            Self::ElemMatchIgnoresFieldKeys => "docparity/docparity#785",
        }
    }
}

impl fmt::Display for Quirk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RejectFractionalSkip => "reject_fractional_skip",
            Self::SizeInfinityMatchesNothing => "size_infinity_matches_nothing",
            Self::ElemMatchIgnoresFieldKeys => "elem_match_ignores_field_keys",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuirkSet(BTreeSet<Quirk>);

impl QuirkSet {
    pub fn none() -> Self {
        Self::default()
    }

    /// Every known quirk.
    pub fn all() -> Self {
        Quirk::ALL.into_iter().collect()
    }

    #[must_use]
    pub fn with(mut self, quirk: Quirk) -> Self {
        self.0.insert(quirk);
        self
    }

    #[must_use]
    pub fn without(mut self, quirk: Quirk) -> Self {
        self.0.remove(&quirk);
        self
    }

    pub fn contains(&self, quirk: Quirk) -> bool {
        self.0.contains(&quirk)
    }

    pub fn iter(&self) -> impl Iterator<Item = Quirk> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Quirk> for QuirkSet {
    fn from_iter<I: IntoIterator<Item = Quirk>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    #[default]
    Reference,
    Sut(QuirkSet),
}

impl Dialect {
    pub fn has(&self, quirk: Quirk) -> bool {
        match self {
            Self::Reference => false,
            Self::Sut(quirks) => quirks.contains(quirk),
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Reference => "reference",
            Self::Sut(_) => "sut",
        }
    }
}
