//! Enrollment lifecycle - enroll, complete, reset, delete.

use std::sync::Arc;
use lectern_core::{Actor, CourseId, Enrollment, EnrollmentId, Lecture, LectureId, Module};
use lectern_storage::{EnrollmentFilter, Storage};
use serde::Serialize;
use tracing::{debug, info};

use crate::calculator::ProgressCalculator;
use crate::error::{LifecycleError, Result};
use crate::unlock::{Traversal, UnlockEngine};

/// Configuration for the enrollment controller.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// How the next lecture is chosen
    pub traversal: Traversal,
    /// Refuse to complete lectures the user has not unlocked yet
    pub require_unlocked: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            traversal: Traversal::Exact,
            require_unlocked: false,
        }
    }
}

/// Outcome of a completion request.
#[derive(Debug, Clone, Serialize)]
pub struct Completion {
    /// Enrollment state after the request
    pub enrollment: Enrollment,
    /// False when the lecture was already completed and nothing changed
    pub newly_completed: bool,
    /// Lecture that follows the completed one, if any
    pub next_lecture: Option<LectureId>,
}

/// Orchestrates enrollment state changes.
///
/// Every mutation is a single read-modify-write of one enrollment, committed
/// with an optimistic version check.
pub struct EnrollmentController<S: Storage> {
    storage: Arc<S>,
    unlock: UnlockEngine,
    calculator: ProgressCalculator,
    config: LifecycleConfig,
}

impl<S: Storage + 'static> EnrollmentController<S> {
    /// Create a new controller with the default configuration.
    pub fn new(storage: Arc<S>) -> Self {
        Self::build(storage, LifecycleConfig::default())
    }

    /// Set the configuration.
    pub fn with_config(self, config: LifecycleConfig) -> Self {
        Self::build(self.storage, config)
    }

    fn build(storage: Arc<S>, config: LifecycleConfig) -> Self {
        let unlock = UnlockEngine::new(storage.clone()).with_strategy(config.traversal.strategy());
        let calculator = ProgressCalculator::new(storage.clone());
        Self {
            storage,
            unlock,
            calculator,
            config,
        }
    }

    /// First lecture of the lowest-numbered module of a course, read fresh.
    pub async fn first_lecture(&self, course_id: CourseId) -> Result<Option<LectureId>> {
        let modules = self.storage.find_modules_by_course(course_id).await?;
        let Some(first_module) = modules.first() else {
            return Ok(None);
        };
        let lectures = self.storage.find_lectures_by_module(first_module.id).await?;
        Ok(lectures.first().map(|l| l.id))
    }

    /// Enroll the actor in a course.
    pub async fn enroll(&self, actor: &Actor, course_id: CourseId) -> Result<Enrollment> {
        if self.storage.load_course(course_id).await?.is_none() {
            return Err(LifecycleError::NotFound(format!("course {}", course_id)));
        }

        if self.storage.find_enrollment(&actor.user_id, course_id).await?.is_some() {
            return Err(LifecycleError::Conflict(format!(
                "user {} is already enrolled in course {}",
                actor.user_id, course_id
            )));
        }

        let first = self.first_lecture(course_id).await?;
        let mut enrollment = Enrollment::new(actor.user_id.clone(), course_id, first);
        enrollment.validate()?;
        enrollment.version = self.storage.insert_enrollment(&enrollment).await?;

        info!(
            "Enrolled {} in course {} (enrollment {}, first lecture {:?})",
            actor.user_id, course_id, enrollment.id, first
        );
        Ok(enrollment)
    }

    /// Load an enrollment the actor may see.
    pub async fn enrollment(&self, actor: &Actor, id: EnrollmentId) -> Result<Enrollment> {
        let enrollment = self.load(id).await?;
        authorize(actor, &enrollment)?;
        Ok(enrollment)
    }

    /// The actor's own enrollment in a course.
    pub async fn enrollment_for_course(&self, actor: &Actor, course_id: CourseId) -> Result<Enrollment> {
        self.storage
            .find_enrollment(&actor.user_id, course_id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("enrollment of {} in course {}", actor.user_id, course_id)))
    }

    /// All enrollments of the actor, newest first.
    pub async fn my_enrollments(&self, actor: &Actor) -> Result<Vec<Enrollment>> {
        let filter = EnrollmentFilter {
            user_id: Some(actor.user_id.clone()),
            ..Default::default()
        };
        Ok(self.storage.list_enrollments(&filter).await?)
    }

    /// All enrollments matching a filter. Elevated only.
    pub async fn list_enrollments(&self, actor: &Actor, filter: &EnrollmentFilter) -> Result<Vec<Enrollment>> {
        require_elevated(actor)?;
        Ok(self.storage.list_enrollments(filter).await?)
    }

    /// Mark a lecture completed, unlock its successor and recompute progress.
    ///
    /// Completing an already-completed lecture changes nothing.
    pub async fn complete_lecture(
        &self,
        actor: &Actor,
        enrollment_id: EnrollmentId,
        lecture_id: LectureId,
    ) -> Result<Completion> {
        let (lecture, module) = self.resolve_lecture(lecture_id).await?;
        let mut enrollment = self.load(enrollment_id).await?;
        authorize(actor, &enrollment)?;

        if module.course_id != enrollment.course_id {
            return Err(LifecycleError::Invalid(format!(
                "lecture {} is not part of course {}",
                lecture_id, enrollment.course_id
            )));
        }

        if enrollment.is_completed(lecture_id) {
            debug!("Lecture {} already completed in {}", lecture_id, enrollment_id);
            return Ok(Completion {
                enrollment,
                newly_completed: false,
                next_lecture: None,
            });
        }

        if self.config.require_unlocked && !enrollment.is_unlocked(lecture_id) {
            return Err(LifecycleError::Forbidden(format!("lecture {} is not unlocked", lecture_id)));
        }

        enrollment.mark_completed(lecture_id);
        let next = self.unlock.unlock_next(&mut enrollment, &module, &lecture).await?;
        self.calculator.recalculate(&mut enrollment).await?;
        enrollment.touch();
        self.save(&mut enrollment).await?;

        info!(
            "Completed lecture {} in enrollment {} (progress {}%, unlocked {:?})",
            lecture_id,
            enrollment_id,
            enrollment.progress,
            next.as_ref().map(|l| l.id)
        );

        Ok(Completion {
            enrollment,
            newly_completed: true,
            next_lecture: next.map(|l| l.id),
        })
    }

    /// Complete a lecture in the actor's own enrollment for the lecture's course.
    pub async fn complete_lecture_for_user(&self, actor: &Actor, lecture_id: LectureId) -> Result<Completion> {
        let (_, module) = self.resolve_lecture(lecture_id).await?;
        let Some(enrollment) = self.storage.find_enrollment(&actor.user_id, module.course_id).await? else {
            return Err(LifecycleError::Forbidden("not enrolled in this course".to_string()));
        };
        self.complete_lecture(actor, enrollment.id, lecture_id).await
    }

    /// Clear all progress, leaving only the course's first lecture unlocked. Elevated only.
    pub async fn reset_progress(&self, actor: &Actor, enrollment_id: EnrollmentId) -> Result<Enrollment> {
        require_elevated(actor)?;
        let mut enrollment = self.load(enrollment_id).await?;

        let first = self.first_lecture(enrollment.course_id).await?;
        enrollment.reset(first);
        self.save(&mut enrollment).await?;

        info!("Reset progress of enrollment {}", enrollment_id);
        Ok(enrollment)
    }

    /// Recompute progress against the current catalog and persist it.
    pub async fn recalculate_progress(&self, actor: &Actor, enrollment_id: EnrollmentId) -> Result<u8> {
        let mut enrollment = self.load(enrollment_id).await?;
        authorize(actor, &enrollment)?;

        let before = enrollment.progress;
        let progress = self.calculator.recalculate(&mut enrollment).await?;
        if progress != before {
            enrollment.touch();
            self.save(&mut enrollment).await?;
            debug!("Progress of {} moved {} -> {}", enrollment_id, before, progress);
        }
        Ok(progress)
    }

    /// Remove an enrollment.
    pub async fn delete_enrollment(&self, actor: &Actor, enrollment_id: EnrollmentId) -> Result<()> {
        let enrollment = self.load(enrollment_id).await?;
        authorize(actor, &enrollment)?;
        self.storage.delete_enrollment(enrollment_id).await?;
        info!("Deleted enrollment {}", enrollment_id);
        Ok(())
    }

    async fn load(&self, id: EnrollmentId) -> Result<Enrollment> {
        let enrollment = self
            .storage
            .load_enrollment(id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("enrollment {}", id)))?;
        enrollment.validate()?;
        Ok(enrollment)
    }

    /// Commit a modified enrollment, refusing invalid state and stale versions.
    async fn save(&self, enrollment: &mut Enrollment) -> Result<()> {
        enrollment.validate()?;
        enrollment.version = self.storage.save_enrollment(enrollment).await?;
        Ok(())
    }

    async fn resolve_lecture(&self, id: LectureId) -> Result<(Lecture, Module)> {
        let lecture = self
            .storage
            .load_lecture(id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("lecture {}", id)))?;
        let module = self
            .storage
            .load_module(lecture.module_id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("module {}", lecture.module_id)))?;
        Ok((lecture, module))
    }
}

fn authorize(actor: &Actor, enrollment: &Enrollment) -> Result<()> {
    if actor.can_act_for(&enrollment.user_id) {
        Ok(())
    } else {
        Err(LifecycleError::Forbidden(format!(
            "enrollment {} belongs to another user",
            enrollment.id
        )))
    }
}

fn require_elevated(actor: &Actor) -> Result<()> {
    if actor.is_elevated() {
        Ok(())
    } else {
        Err(LifecycleError::Forbidden("elevated privilege required".to_string()))
    }
}
