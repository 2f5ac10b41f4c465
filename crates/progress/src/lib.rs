//! Progress Engine
//!
//! Lecture unlocking, progress calculation, and the enrollment lifecycle.

#![warn(missing_docs)]

pub mod error;
pub mod calculator;
pub mod unlock;
pub mod lifecycle;

#[cfg(test)]
mod fixtures;

pub use error::{ErrorKind, LifecycleError, Result};
pub use calculator::{calculate_progress, ProgressCalculator};
pub use unlock::{ExactSuccessor, SortedSuccessor, Traversal, TraversalStrategy, UnlockEngine};
pub use lifecycle::{Completion, EnrollmentController, LifecycleConfig};
