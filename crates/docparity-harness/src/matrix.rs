//! Matrix establishment and case expansion.
//!
//! The matrix is established once per group, before any case is scheduled,
//! and is read-only afterwards. Expansion never filters: every case runs
//! against every pairing.

use std::collections::HashSet;
use std::fmt;
use std::iter::FusedIterator;
use std::sync::Arc;

use tracing::info;

use docparity_error::{BackendSide, HarnessError, Result};

use crate::backend::CollectionHandle;
use crate::case::Case;

/// Name used for the designated nonexistent-collection pairing.
pub const NONEXISTENT_PAIRING: &str = "nonexistent";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PairingKind {
    /// Collections seeded from the named provider.
    Provider(String),
    /// Collections that do not exist on either backend.
    Nonexistent,
}

/// One SUT collection paired with the matching reference collection.
#[derive(Clone)]
pub struct Pairing {
    name: String,
    kind: PairingKind,
    sut: Arc<dyn CollectionHandle>,
    reference: Arc<dyn CollectionHandle>,
}

impl Pairing {
    pub fn provider(
        provider: impl Into<String>,
        sut: Arc<dyn CollectionHandle>,
        reference: Arc<dyn CollectionHandle>,
    ) -> Self {
        let provider = provider.into();
        Self {
            name: provider.clone(),
            kind: PairingKind::Provider(provider),
            sut,
            reference,
        }
    }

    pub fn nonexistent(sut: Arc<dyn CollectionHandle>, reference: Arc<dyn CollectionHandle>) -> Self {
        Self {
            name: NONEXISTENT_PAIRING.to_owned(),
            kind: PairingKind::Nonexistent,
            sut,
            reference,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn kind(&self) -> &PairingKind {
        &self.kind
    }

    pub fn handle(&self, side: BackendSide) -> &dyn CollectionHandle {
        match side {
            BackendSide::Sut => self.sut.as_ref(),
            BackendSide::Reference => self.reference.as_ref(),
        }
    }
}

impl fmt::Debug for Pairing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pairing")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("sut", &self.sut.name())
            .field("reference", &self.reference.name())
            .finish()
    }
}

/// Supplies the pairings of a group. Implemented by setup code.
pub trait PairingSource {
    fn pairings(&self) -> Vec<Pairing>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixOptions {
    /// Reject a matrix without the nonexistent-collection pairing.
    pub require_nonexistent: bool,
}

impl Default for MatrixOptions {
    fn default() -> Self {
        Self {
            require_nonexistent: true,
        }
    }
}

/// The validated set of pairings for one group.
#[derive(Debug, Clone)]
pub struct Matrix {
    group: String,
    pairings: Arc<[Pairing]>,
}

impl Matrix {
    /// Establish the matrix for `group` from a pairing source.
    pub fn establish(group: impl Into<String>, source: &dyn PairingSource, options: MatrixOptions) -> Result<Self> {
        Self::from_pairings(group, source.pairings(), options)
    }

    pub fn from_pairings(
        group: impl Into<String>,
        pairings: Vec<Pairing>,
        options: MatrixOptions,
    ) -> Result<Self> {
        let group = group.into();
        if pairings.is_empty() {
            return Err(HarnessError::EmptyMatrix { group });
        }
        let mut seen = HashSet::with_capacity(pairings.len());
        for pairing in &pairings {
            if !seen.insert(pairing.name()) {
                return Err(HarnessError::DuplicatePairing {
                    group,
                    pairing: pairing.name().to_owned(),
                });
            }
        }
        if options.require_nonexistent
            && !pairings
                .iter()
                .any(|p| *p.kind() == PairingKind::Nonexistent)
        {
            return Err(HarnessError::MissingNonexistentPairing { group });
        }
        info!(
            group = %group,
            pairings = pairings.len(),
            "matrix established"
        );
        Ok(Self {
            group,
            pairings: pairings.into(),
        })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn pairings(&self) -> &[Pairing] {
        &self.pairings
    }

    pub fn len(&self) -> usize {
        self.pairings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairings.is_empty()
    }

    /// Expand `case` into one execution per pairing.
    pub fn expand<'a>(&'a self, case: &'a Case) -> Result<Expansion<'a>> {
        if self.pairings.is_empty() {
            return Err(HarnessError::EmptyMatrix {
                group: self.group.clone(),
            });
        }
        Ok(Expansion {
            case,
            pairings: self.pairings.iter().enumerate(),
        })
    }
}

/// One (case, pairing) cell of the matrix.
#[derive(Debug, Clone, Copy)]
pub struct Execution<'a> {
    pub case: &'a Case,
    pub pairing: &'a Pairing,
    /// Position of the pairing in the matrix.
    pub index: usize,
}

/// Lazy, finite sequence of executions for one case.
#[derive(Debug)]
pub struct Expansion<'a> {
    case: &'a Case,
    pairings: std::iter::Enumerate<std::slice::Iter<'a, Pairing>>,
}

impl<'a> Iterator for Expansion<'a> {
    type Item = Execution<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, pairing) = self.pairings.next()?;
        Some(Execution {
            case: self.case,
            pairing,
            index,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.pairings.size_hint()
    }
}

impl ExactSizeIterator for Expansion<'_> {}
impl FusedIterator for Expansion<'_> {}
