//! Paired SUT/reference stores loaded from a provider catalog.

use std::sync::Arc;

use tracing::info;

use docparity_error::{HarnessError, Result};
use docparity_harness::{CollectionHandle, Matrix, MatrixOptions, Pairing, PairingKind, PairingSource, ProviderCatalog};

use crate::dialect::{Dialect, QuirkSet};
use crate::store::MemoryStore;

/// Collection name used by the nonexistent pairing. Never created.
pub const NONEXISTENT_COLLECTION: &str = "docparity-nonexistent";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupOpts {
    /// Database name of both stores, so reply namespaces agree.
    pub database: String,
    /// Providers to load, by name; `None` loads the whole catalog.
    pub providers: Option<Vec<String>>,
    pub add_nonexistent_collection: bool,
    pub sut_quirks: QuirkSet,
}

impl Default for SetupOpts {
    fn default() -> Self {
        Self {
            database: "docparity".to_owned(),
            providers: None,
            add_nonexistent_collection: true,
            sut_quirks: QuirkSet::all(),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    kind: PairingKind,
    collection: String,
}

/// A SUT store and a reference store holding the same fixtures.
#[derive(Debug, Clone)]
pub struct Deployment {
    sut: MemoryStore,
    reference: MemoryStore,
    entries: Vec<Entry>,
}

impl Deployment {
    pub fn setup(catalog: &dyn ProviderCatalog, opts: &SetupOpts) -> Result<Self> {
        let providers = match &opts.providers {
            None => catalog.list_providers(),
            Some(names) => names
                .iter()
                .map(|name| {
                    catalog
                        .provider(name)
                        .ok_or_else(|| HarnessError::UnknownProvider { name: name.clone() })
                })
                .collect::<Result<Vec<_>>>()?,
        };

        let sut = MemoryStore::new(opts.database.clone(), Dialect::Sut(opts.sut_quirks.clone()));
        let reference = MemoryStore::new(opts.database.clone(), Dialect::Reference);
        let mut entries = Vec::with_capacity(providers.len() + 1);
        for provider in &providers {
            let name = provider.name().to_owned();
            sut.create_collection(name.clone(), provider.documents().iter().cloned());
            reference.create_collection(name.clone(), provider.documents().iter().cloned());
            entries.push(Entry {
                kind: PairingKind::Provider(name.clone()),
                collection: name,
            });
        }
        if opts.add_nonexistent_collection {
            entries.push(Entry {
                kind: PairingKind::Nonexistent,
                collection: NONEXISTENT_COLLECTION.to_owned(),
            });
        }

        info!(
            database = %opts.database,
            providers = providers.len(),
            nonexistent = opts.add_nonexistent_collection,
            quirks = ?opts.sut_quirks.iter().map(|q| q.to_string()).collect::<Vec<_>>(),
            "deployment ready"
        );
        Ok(Self {
            sut,
            reference,
            entries,
        })
    }

    pub const fn sut(&self) -> &MemoryStore {
        &self.sut
    }

    pub const fn reference(&self) -> &MemoryStore {
        &self.reference
    }

    /// Pairings with each SUT handle passed through `wrap`, which receives
    /// the pairing name.
    pub fn pairings_with_sut(
        &self,
        wrap: impl Fn(&str, Arc<dyn CollectionHandle>) -> Arc<dyn CollectionHandle>,
    ) -> Vec<Pairing> {
        self.entries
            .iter()
            .map(|entry| {
                let reference: Arc<dyn CollectionHandle> = Arc::new(self.reference.collection(entry.collection.clone()));
                let sut: Arc<dyn CollectionHandle> = Arc::new(self.sut.collection(entry.collection.clone()));
                match &entry.kind {
                    PairingKind::Provider(name) => Pairing::provider(name.clone(), wrap(name, sut), reference),
                    PairingKind::Nonexistent => {
                        let name = docparity_harness::NONEXISTENT_PAIRING;
                        Pairing::nonexistent(wrap(name, sut), reference)
                    }
                }
            })
            .collect()
    }

    /// The validated matrix of this deployment's pairings.
    pub fn matrix(&self, group: impl Into<String>, options: MatrixOptions) -> Result<Matrix> {
        Matrix::establish(group, self, options)
    }
}

impl PairingSource for Deployment {
    fn pairings(&self) -> Vec<Pairing> {
        self.pairings_with_sut(|_, handle| handle)
    }
}
