//! In-memory document backend.
//!
//! A [`MemoryStore`] answers `count` and `find` commands over named,
//! read-only collections. Every store speaks a [`Dialect`]: the reference
//! dialect behaves conformantly, while a SUT dialect can carry [`Quirk`]s
//! that reproduce known deviations. [`Deployment`] loads the same fixture
//! catalog into one store of each kind and hands the harness its pairings.

mod command;
pub mod deployment;
pub mod dialect;
pub mod filter;
pub mod fixtures;
pub mod store;

pub use deployment::{Deployment, NONEXISTENT_COLLECTION, SetupOpts};
pub use dialect::{Dialect, Quirk, QuirkSet};
pub use filter::Filter;
pub use fixtures::{FixtureCatalog, FixtureProvider, catalog};
pub use store::{MemoryCollection, MemoryStore};
