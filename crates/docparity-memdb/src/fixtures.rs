//! Built-in fixture providers.
//!
//! Each provider is a small named collection whose documents share the
//! `{_id, v}` shape, with `v` covering one family of values. The catalog is
//! deterministic: [`FixtureCatalog::build`] always produces the same
//! documents in the same order.

use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use docparity_harness::{Provider, ProviderCatalog};
use docparity_types::{Document, ObjectId, Value, array, doc};

/// A named, fixed set of documents.
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureProvider {
    name: String,
    documents: Vec<Document>,
}

impl FixtureProvider {
    pub fn new(name: impl Into<String>, documents: Vec<Document>) -> Self {
        Self {
            name: name.into(),
            documents,
        }
    }
}

impl Provider for FixtureProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn documents(&self) -> &[Document] {
        &self.documents
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixtureCatalog {
    providers: Vec<FixtureProvider>,
}

impl FixtureCatalog {
    /// The built-in providers.
    pub fn build() -> Self {
        Self {
            providers: vec![
                strings(),
                int32s(),
                int64s(),
                doubles(),
                bools(),
                nulls(),
                object_id_keys(),
                composites(),
                nested(),
            ],
        }
    }

    pub fn from_providers(providers: Vec<FixtureProvider>) -> Self {
        Self { providers }
    }

    pub fn total_documents(&self) -> usize {
        self.providers.iter().map(|p| p.documents.len()).sum()
    }

    /// Provider name → document count, plus `total`.
    pub fn summary(&self) -> BTreeMap<String, usize> {
        let mut m: BTreeMap<String, usize> = self
            .providers
            .iter()
            .map(|p| (p.name.clone(), p.documents.len()))
            .collect();
        m.insert("total".to_owned(), self.total_documents());
        m
    }

    /// `provider/_id` of every document whose `_id` repeats within its
    /// provider, or that has no `_id`.
    pub fn validate_unique_ids(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for provider in &self.providers {
            let mut seen = HashSet::new();
            for doc in &provider.documents {
                match doc.get("_id") {
                    Some(id) => {
                        let id = id.to_string();
                        if !seen.insert(id.clone()) {
                            problems.push(format!("{}/{id}", provider.name));
                        }
                    }
                    None => problems.push(format!("{}/<missing _id>", provider.name)),
                }
            }
        }
        problems
    }
}

impl ProviderCatalog for FixtureCatalog {
    fn list_providers(&self) -> Vec<&dyn Provider> {
        self.providers.iter().map(|p| p as &dyn Provider).collect()
    }
}

/// The shared built-in catalog.
pub fn catalog() -> &'static FixtureCatalog {
    static CATALOG: OnceLock<FixtureCatalog> = OnceLock::new();
    CATALOG.get_or_init(FixtureCatalog::build)
}

fn entry(id: impl Into<Value>, v: impl Into<Value>) -> Document {
    doc! { "_id" => id.into(), "v" => v.into() }
}

fn strings() -> FixtureProvider {
    FixtureProvider::new(
        "Strings",
        vec![
            entry("string", "foo"),
            entry("string-duplicate", "foo"),
            entry("string-empty", ""),
            entry("string-whole", "42"),
            entry("string-double", "42.13"),
        ],
    )
}

fn int32s() -> FixtureProvider {
    FixtureProvider::new(
        "Int32s",
        vec![
            entry("int32", 42_i32),
            entry("int32-zero", 0_i32),
            entry("int32-max", i32::MAX),
            entry("int32-min", i32::MIN),
        ],
    )
}

fn int64s() -> FixtureProvider {
    FixtureProvider::new(
        "Int64s",
        vec![
            entry("int64", 42_i64),
            entry("int64-zero", 0_i64),
            entry("int64-big", 1_i64 << 61),
        ],
    )
}

fn doubles() -> FixtureProvider {
    FixtureProvider::new(
        "Doubles",
        vec![
            entry("double", 42.13),
            entry("double-whole", 42.0),
            entry("double-zero", 0.0),
            entry("double-max", f64::MAX),
            entry("double-smallest", f64::from_bits(1)),
            entry("double-nan", f64::NAN),
        ],
    )
}

fn bools() -> FixtureProvider {
    FixtureProvider::new("Bools", vec![entry("bool-false", false), entry("bool-true", true)])
}

fn nulls() -> FixtureProvider {
    FixtureProvider::new("Nulls", vec![entry("null", Value::Null)])
}

fn object_id_keys() -> FixtureProvider {
    FixtureProvider::new(
        "ObjectIdKeys",
        vec![
            entry(ObjectId::NIL, "nil-id"),
            entry(ObjectId::new([0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]), "object-id"),
        ],
    )
}

fn composites() -> FixtureProvider {
    FixtureProvider::new(
        "Composites",
        vec![
            entry("array", array![42_i32]),
            entry("array-three", array![42_i32, "foo", Value::Null]),
            entry("array-three-reverse", array![Value::Null, "foo", 42_i32]),
            entry("array-empty", array![]),
            entry("array-null", array![Value::Null]),
            entry("array-numbers", array![42_i32, 43_i32, 44_i32]),
            entry("array-pair", array!["bar", "baz"]),
            entry(
                "document-composite",
                doc! { "foo" => 42_i32, "42" => "foo", "array" => array![42_i32, "foo", Value::Null] },
            ),
        ],
    )
}

fn nested() -> FixtureProvider {
    FixtureProvider::new(
        "Nested",
        vec![
            entry(
                "array-documents-nested",
                array![doc! { "foo" => array![doc! { "bar" => "hello" }] }],
            ),
            entry("document-nested", doc! { "foo" => doc! { "bar" => "baz" } }),
            entry(
                "document-punctuation",
                doc! {
                    "foo[0]" => 42_i32,
                    "foo[*]" => 42_i32,
                    "*" => 42_i32,
                    "@" => 42_i32,
                    "f,oo" => 42_i32,
                },
            ),
        ],
    )
}
