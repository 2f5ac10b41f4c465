//! Enrollment model - a user's unlock and completion state within a course.

use std::collections::BTreeSet;
use serde::{Deserialize, Serialize};
use crate::error::{ModelError, Result};
use crate::id::{CourseId, EnrollmentId, LectureId, UserId};
use crate::Time;

/// Per (user, course) progression state.
///
/// `completed` and `unlocked` only ever grow, except through [`Enrollment::reset`]
/// and [`Enrollment::prune`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    /// Unique identifier
    pub id: EnrollmentId,

    /// Enrolled user
    pub user_id: UserId,

    /// Course being followed
    pub course_id: CourseId,

    /// Percentage complete (0-100)
    pub progress: u8,

    /// Lectures marked completed
    pub completed: BTreeSet<LectureId>,

    /// Lectures available to the user
    pub unlocked: BTreeSet<LectureId>,

    /// Optimistic concurrency token, bumped by the store on every save
    #[serde(default)]
    pub version: u64,

    /// When created
    pub created_at: Time,

    /// Last updated
    pub updated_at: Time,
}

impl Enrollment {
    /// Create a fresh enrollment with only `first_lecture` unlocked.
    pub fn new(user_id: UserId, course_id: CourseId, first_lecture: Option<LectureId>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: EnrollmentId::new(),
            user_id,
            course_id,
            progress: 0,
            completed: BTreeSet::new(),
            unlocked: first_lecture.into_iter().collect(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check the model invariants.
    pub fn validate(&self) -> Result<()> {
        if self.progress > 100 {
            return Err(ModelError::invalid("progress", format!("{} exceeds 100", self.progress)));
        }
        Ok(())
    }

    /// Whether the lecture has been unlocked.
    pub fn is_unlocked(&self, lecture: LectureId) -> bool {
        self.unlocked.contains(&lecture)
    }

    /// Whether the lecture has been completed.
    pub fn is_completed(&self, lecture: LectureId) -> bool {
        self.completed.contains(&lecture)
    }

    /// Unlock a lecture. Returns false if it was already unlocked.
    pub fn unlock(&mut self, lecture: LectureId) -> bool {
        self.unlocked.insert(lecture)
    }

    /// Mark a lecture completed. Returns false if it was already completed.
    pub fn mark_completed(&mut self, lecture: LectureId) -> bool {
        self.completed.insert(lecture)
    }

    /// Back to the freshly-enrolled state, with `first_lecture` as the only unlock.
    pub fn reset(&mut self, first_lecture: Option<LectureId>) {
        self.progress = 0;
        self.completed.clear();
        self.unlocked = first_lecture.into_iter().collect();
        self.touch();
    }

    /// Drop references to lectures that no longer exist.
    ///
    /// Returns true if either set changed.
    pub fn prune(&mut self, removed: &BTreeSet<LectureId>) -> bool {
        let before = (self.completed.len(), self.unlocked.len());
        self.completed.retain(|id| !removed.contains(id));
        self.unlocked.retain(|id| !removed.contains(id));
        before != (self.completed.len(), self.unlocked.len())
    }

    /// Mark as updated now.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enrollment(first: Option<LectureId>) -> Enrollment {
        Enrollment::new(UserId::new("alice"), CourseId::new(), first)
    }

    #[test]
    fn test_new_enrollment_unlocks_first_lecture() {
        let first = LectureId::new();
        let e = enrollment(Some(first));
        assert_eq!(e.unlocked, BTreeSet::from([first]));
        assert!(e.completed.is_empty());
        assert_eq!(e.progress, 0);
    }

    #[test]
    fn test_new_enrollment_without_lectures_is_empty() {
        let e = enrollment(None);
        assert!(e.unlocked.is_empty());
    }

    #[test]
    fn test_unlock_is_idempotent() {
        let mut e = enrollment(None);
        let id = LectureId::new();
        assert!(e.unlock(id));
        assert!(!e.unlock(id));
        assert_eq!(e.unlocked.len(), 1);
    }

    #[test]
    fn test_reset_clears_completion() {
        let first = LectureId::new();
        let second = LectureId::new();
        let mut e = enrollment(Some(first));
        e.mark_completed(first);
        e.unlock(second);
        e.progress = 50;

        e.reset(Some(first));

        assert_eq!(e.progress, 0);
        assert!(e.completed.is_empty());
        assert_eq!(e.unlocked, BTreeSet::from([first]));
    }

    #[test]
    fn test_prune_removes_dangling_ids() {
        let keep = LectureId::new();
        let gone = LectureId::new();
        let mut e = enrollment(Some(keep));
        e.unlock(gone);
        e.mark_completed(gone);

        assert!(e.prune(&BTreeSet::from([gone])));
        assert_eq!(e.unlocked, BTreeSet::from([keep]));
        assert!(e.completed.is_empty());
        assert!(!e.prune(&BTreeSet::from([gone])));
    }

    #[test]
    fn test_progress_over_100_is_invalid() {
        let mut e = enrollment(None);
        e.progress = 101;
        assert!(e.validate().is_err());
    }
}
