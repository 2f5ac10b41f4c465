//! Lecture model - the unit of unlocking and completion.

use serde::{Deserialize, Serialize};
use crate::error::{ModelError, Result};
use crate::id::{LectureId, ModuleId};
use crate::Time;

/// A lecture belongs to exactly one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lecture {
    /// Unique identifier
    pub id: LectureId,

    /// Owning module
    pub module_id: ModuleId,

    /// Lecture title
    pub title: String,

    /// 1-based position, unique within the module
    pub order: u32,

    /// Video reference
    pub video_url: String,

    /// When created
    pub created_at: Time,

    /// Last updated
    pub updated_at: Time,
}

impl Lecture {
    /// Create a new lecture at the given position.
    pub fn new(
        module_id: ModuleId,
        title: impl Into<String>,
        order: u32,
        video_url: impl Into<String>,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: LectureId::new(),
            module_id,
            title: title.into(),
            order,
            video_url: video_url.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Check the model invariants.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(ModelError::invalid("title", "must not be empty"));
        }
        if self.order == 0 {
            return Err(ModelError::invalid("order", "lecture orders start at 1"));
        }
        if self.video_url.trim().is_empty() {
            return Err(ModelError::invalid("video_url", "must not be empty"));
        }
        Ok(())
    }
}
