//! Provider catalog interface.
//!
//! Providers are named, finite, re-iterable sets of fixture documents. The
//! harness never generates data; it only asks a catalog what exists so that
//! setup code can build one pairing per provider.

use docparity_types::Document;

/// A named set of fixture documents with a known schema.
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// The fixture documents. Calling this twice yields the same documents.
    fn documents(&self) -> &[Document];
}

/// A set of providers.
pub trait ProviderCatalog {
    fn list_providers(&self) -> Vec<&dyn Provider>;

    fn provider(&self, name: &str) -> Option<&dyn Provider> {
        self.list_providers().into_iter().find(|p| p.name() == name)
    }
}
