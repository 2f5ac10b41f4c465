//! Storage abstraction and implementations for Lectern.
//!
//! This crate provides the catalog and enrollment store traits with a JSON
//! file reference implementation and an optional SQLite backend.

#![warn(missing_docs)]

pub mod trait_;
pub mod json_storage;
#[cfg(feature = "sqlite")]
pub mod sqlite_storage;

pub use trait_::{
    CatalogStore, EnrollmentFilter, EnrollmentStore, Result, Storage, StorageError,
};
pub use json_storage::JsonStorage;
#[cfg(feature = "sqlite")]
pub use sqlite_storage::SqliteStorage;
