//! Course model - the top of the catalog hierarchy.

use serde::{Deserialize, Serialize};
use crate::error::{ModelError, Result};
use crate::id::CourseId;
use crate::Time;

/// A course offered in the catalog.
///
/// Modules are not embedded here; they are looked up by course id through the
/// catalog store so the course never holds a stale copy of its structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    /// Unique identifier
    pub id: CourseId,

    /// Course title
    pub title: String,

    /// Detailed description
    pub description: String,

    /// Price, never negative
    pub price: f64,

    /// Path of the thumbnail image
    #[serde(default)]
    pub thumbnail_path: String,

    /// When created
    pub created_at: Time,

    /// Last updated
    pub updated_at: Time,
}

impl Course {
    /// Create a new course.
    pub fn new(title: impl Into<String>, description: impl Into<String>, price: f64) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: CourseId::new(),
            title: title.into(),
            description: description.into(),
            price,
            thumbnail_path: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the thumbnail path.
    pub fn with_thumbnail(mut self, path: impl Into<String>) -> Self {
        self.thumbnail_path = path.into();
        self
    }

    /// Check the model invariants.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(ModelError::invalid("title", "must not be empty"));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(ModelError::invalid("price", format!("{} is not a non-negative amount", self.price)));
        }
        Ok(())
    }

    /// Apply a partial update. Returns true if anything changed.
    pub fn apply(&mut self, patch: CoursePatch) -> bool {
        let mut changed = false;
        if let Some(title) = patch.title {
            self.title = title;
            changed = true;
        }
        if let Some(description) = patch.description {
            self.description = description;
            changed = true;
        }
        if let Some(price) = patch.price {
            self.price = price;
            changed = true;
        }
        if let Some(path) = patch.thumbnail_path {
            self.thumbnail_path = path;
            changed = true;
        }
        if changed {
            self.updated_at = chrono::Utc::now();
        }
        changed
    }
}

/// Partial update for a course; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoursePatch {
    /// New title
    pub title: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New price
    pub price: Option<f64>,
    /// New thumbnail path
    pub thumbnail_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_price_rejected() {
        let course = Course::new("Rust", "Ownership and borrowing", -1.0);
        assert!(matches!(course.validate(), Err(ModelError::Invalid { field: "price", .. })));
    }

    #[test]
    fn test_free_course_is_valid() {
        let course = Course::new("Rust", "Ownership and borrowing", 0.0);
        assert!(course.validate().is_ok());
    }

    #[test]
    fn test_patch_only_touches_supplied_fields() {
        let mut course = Course::new("Rust", "Ownership", 10.0);
        let changed = course.apply(CoursePatch {
            price: Some(0.0),
            ..Default::default()
        });

        assert!(changed);
        assert_eq!(course.title, "Rust");
        assert_eq!(course.price, 0.0);
        assert!(!course.apply(CoursePatch::default()));
    }
}
