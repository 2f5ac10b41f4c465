//! Module model - an ordered section of a course.

use serde::{Deserialize, Serialize};
use crate::error::{ModelError, Result};
use crate::id::{CourseId, ModuleId};
use crate::Time;

/// A module belongs to exactly one course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    /// Unique identifier
    pub id: ModuleId,

    /// Owning course
    pub course_id: CourseId,

    /// Module title
    pub title: String,

    /// 1-based position, unique within the course
    pub number: u32,

    /// When created
    pub created_at: Time,

    /// Last updated
    pub updated_at: Time,
}

impl Module {
    /// Create a new module at the given position.
    pub fn new(course_id: CourseId, title: impl Into<String>, number: u32) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: ModuleId::new(),
            course_id,
            title: title.into(),
            number,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check the model invariants.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(ModelError::invalid("title", "must not be empty"));
        }
        if self.number == 0 {
            return Err(ModelError::invalid("number", "module numbers start at 1"));
        }
        Ok(())
    }
}
