//! Catalog Management
//!
//! Courses, modules and lectures: creation, numbering, cascading deletes, and
//! enrollment-gated lecture access.

#![warn(missing_docs)]

pub mod error;
pub mod manager;

pub use error::{CatalogError, Result};
pub use manager::{
    BasicCatalogManager, CatalogConfig, CatalogManager, CourseSpec, LecturePatch, ModulePatch,
};
