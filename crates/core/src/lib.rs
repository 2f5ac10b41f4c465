//! Lectern core data models.
//!
//! Courses, their ordered modules and lectures, and the per-user enrollments
//! that track unlock and completion progress through them.

#![warn(missing_docs)]

// Core identities
mod id;
mod actor;
mod error;

// Catalog
mod course;
mod module;
mod lecture;
mod outline;

// Progression
mod enrollment;

// Re-exports
pub use id::*;
pub use actor::{Actor, Role};
pub use error::{ModelError, Result};

pub use course::{Course, CoursePatch};
pub use module::Module;
pub use lecture::Lecture;
pub use outline::{CourseOutline, ModuleOutline, TraversalKey};

pub use enrollment::Enrollment;

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
