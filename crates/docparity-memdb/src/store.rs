//! In-memory collections.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use docparity_harness::{BackendError, CollectionHandle, Cx};
use docparity_types::Document;

use crate::command;
use crate::dialect::Dialect;

#[derive(Debug, Default)]
struct StoreInner {
    collections: BTreeMap<String, Arc<[Document]>>,
}

/// A database of named, read-only collections answering commands under one
/// [`Dialect`].
///
/// Clones share the same collections. A name with no collection behaves as
/// an empty collection.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    database: Arc<str>,
    dialect: Arc<Dialect>,
    inner: Arc<RwLock<StoreInner>>,
}

impl MemoryStore {
    pub fn new(database: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            database: Arc::from(database.into()),
            dialect: Arc::new(dialect),
            inner: Arc::default(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Create `name` with `documents`, replacing any existing collection.
    pub fn create_collection(&self, name: impl Into<String>, documents: impl IntoIterator<Item = Document>) {
        let name = name.into();
        let documents: Arc<[Document]> = documents.into_iter().collect();
        debug!(
            database = %self.database,
            dialect = self.dialect.label(),
            collection = %name,
            documents = documents.len(),
            "collection created"
        );
        self.inner.write().collections.insert(name, documents);
    }

    pub fn drop_collection(&self, name: &str) -> bool {
        self.inner.write().collections.remove(name).is_some()
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.inner.read().collections.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().collections.contains_key(name)
    }

    /// Snapshot of a collection's documents.
    pub fn documents(&self, name: &str) -> Option<Arc<[Document]>> {
        self.inner.read().collections.get(name).map(Arc::clone)
    }

    /// A handle bound to `name`. The collection need not exist.
    pub fn collection(&self, name: impl Into<String>) -> MemoryCollection {
        MemoryCollection {
            store: self.clone(),
            name: name.into(),
        }
    }

    /// Run a database command. The command's first key names it and its
    /// value names the target collection.
    pub fn run_command(&self, cx: &Cx, command: &Document) -> Result<Document, BackendError> {
        command::execute(self, cx, command)
    }
}

/// A collection handle of a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryCollection {
    store: MemoryStore,
    name: String,
}

impl MemoryCollection {
    pub const fn store(&self) -> &MemoryStore {
        &self.store
    }
}

impl CollectionHandle for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn run_command(&self, cx: &Cx, command: &Document) -> Result<Document, BackendError> {
        self.store.run_command(cx, command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docparity_types::doc;

    #[test]
    fn create_replace_and_drop() {
        let store = MemoryStore::new("test", Dialect::Reference);
        store.create_collection("values", [doc! { "_id" => 1_i32 }]);
        store.create_collection("values", [doc! { "_id" => 1_i32 }, doc! { "_id" => 2_i32 }]);
        assert_eq!(store.documents("values").map(|d| d.len()), Some(2));
        assert_eq!(store.collection_names(), vec!["values".to_owned()]);
        assert!(store.drop_collection("values"));
        assert!(!store.drop_collection("values"));
        assert!(store.documents("values").is_none());
    }

    #[test]
    fn clones_share_collections() {
        let store = MemoryStore::new("test", Dialect::Reference);
        let handle = store.collection("later");
        assert!(!handle.store().contains("later"));
        store.create_collection("later", [doc! { "_id" => 1_i32 }]);
        assert!(handle.store().contains("later"));
        assert_eq!(handle.name(), "later");
        assert_eq!(handle.store().database(), "test");
    }
}
