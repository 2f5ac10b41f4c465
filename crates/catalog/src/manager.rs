//! Catalog management service.

use std::collections::BTreeSet;
use std::sync::Arc;
use async_trait::async_trait;
use lectern_core::{
    Actor, Course, CourseId, CourseOutline, CoursePatch, Lecture, LectureId, Module, ModuleId,
};
use lectern_progress::ProgressCalculator;
use lectern_storage::{EnrollmentFilter, Storage, StorageError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CatalogError, Result};

/// Attempts per enrollment when pruning races with a learner's own writes.
const PRUNE_ATTEMPTS: usize = 3;

/// Catalog management service.
#[async_trait]
pub trait CatalogManager: Send + Sync {
    /// Create a new course.
    async fn create_course(&self, spec: CourseSpec) -> Result<Course>;

    /// Apply a partial update to a course.
    async fn update_course(&self, id: CourseId, patch: CoursePatch) -> Result<Course>;

    /// Delete a course with its modules, lectures and enrollments.
    async fn delete_course(&self, id: CourseId) -> Result<()>;

    /// Load a course.
    async fn course(&self, id: CourseId) -> Result<Course>;

    /// All courses, newest first.
    async fn list_courses(&self) -> Result<Vec<Course>>;

    /// Append a module to a course.
    async fn create_module(&self, course_id: CourseId, title: String) -> Result<Module>;

    /// Rename or renumber a module.
    async fn update_module(&self, id: ModuleId, patch: ModulePatch) -> Result<Module>;

    /// Apply a batch of module numbers at once.
    async fn reorder_modules(
        &self,
        course_id: CourseId,
        assignments: Vec<(ModuleId, u32)>,
    ) -> Result<Vec<Module>>;

    /// Delete a module and its lectures.
    async fn delete_module(&self, id: ModuleId) -> Result<()>;

    /// Append a lecture to a module.
    async fn create_lecture(&self, module_id: ModuleId, title: String, video_url: String) -> Result<Lecture>;

    /// Rename, reposition or repoint a lecture.
    async fn update_lecture(&self, id: LectureId, patch: LecturePatch) -> Result<Lecture>;

    /// Delete a lecture.
    async fn delete_lecture(&self, id: LectureId) -> Result<()>;

    /// The course with its modules and lectures in traversal order.
    async fn course_outline(&self, id: CourseId) -> Result<CourseOutline>;

    /// A lecture, if the actor may watch it.
    async fn lecture_for(&self, actor: &Actor, id: LectureId) -> Result<Lecture>;
}

/// Specification for creating a course.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseSpec {
    /// Course title
    pub title: String,
    /// Detailed description
    pub description: String,
    /// Price, never negative
    pub price: f64,
    /// Path of the thumbnail image
    pub thumbnail_path: Option<String>,
}

/// Partial update for a module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModulePatch {
    /// New title
    pub title: Option<String>,
    /// New position; must be free within the course
    pub number: Option<u32>,
}

/// Partial update for a lecture.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LecturePatch {
    /// New title
    pub title: Option<String>,
    /// New position; must be free within the module
    pub order: Option<u32>,
    /// New video reference
    pub video_url: Option<String>,
}

/// Configuration for the catalog manager.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Remove deleted lectures from enrollments and recompute their progress
    pub prune_enrollments: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            prune_enrollments: true,
        }
    }
}

/// Basic catalog manager implementation.
pub struct BasicCatalogManager<S: Storage> {
    storage: Arc<S>,
    calculator: ProgressCalculator,
    config: CatalogConfig,
}

impl<S: Storage + 'static> BasicCatalogManager<S> {
    /// Create a new catalog manager.
    pub fn new(storage: Arc<S>) -> Self {
        let calculator = ProgressCalculator::new(storage.clone());
        Self {
            storage,
            calculator,
            config: CatalogConfig::default(),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: CatalogConfig) -> Self {
        self.config = config;
        self
    }

    async fn load_module(&self, id: ModuleId) -> Result<Module> {
        self.storage
            .load_module(id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(format!("module {}", id)))
    }

    async fn load_lecture(&self, id: LectureId) -> Result<Lecture> {
        self.storage
            .load_lecture(id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(format!("lecture {}", id)))
    }

    /// Drop removed lectures from every enrollment in the course and refresh
    /// progress against the shrunken catalog.
    async fn prune_enrollments(&self, course_id: CourseId, removed: &BTreeSet<LectureId>) -> Result<()> {
        if !self.config.prune_enrollments {
            return Ok(());
        }

        let filter = EnrollmentFilter {
            course_id: Some(course_id),
            ..Default::default()
        };
        let enrollments = self.storage.list_enrollments(&filter).await?;
        let mut touched = 0;

        for listed in enrollments {
            let mut attempt = 0;
            loop {
                attempt += 1;
                let Some(mut enrollment) = self.storage.load_enrollment(listed.id).await? else {
                    break;
                };

                let before = enrollment.progress;
                let pruned = enrollment.prune(removed);
                self.calculator.recalculate(&mut enrollment).await?;
                if !pruned && enrollment.progress == before {
                    break;
                }

                enrollment.touch();
                enrollment.validate()?;
                match self.storage.save_enrollment(&enrollment).await {
                    Ok(_) => {
                        touched += 1;
                        break;
                    }
                    Err(StorageError::VersionConflict { .. }) if attempt < PRUNE_ATTEMPTS => {
                        debug!("Enrollment {} changed while pruning, retrying", enrollment.id);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        if touched > 0 {
            info!("Pruned {} enrollment(s) of course {}", touched, course_id);
        }
        Ok(())
    }
}

#[async_trait]
impl<S: Storage + 'static> CatalogManager for BasicCatalogManager<S> {
    async fn create_course(&self, spec: CourseSpec) -> Result<Course> {
        let mut course = Course::new(spec.title, spec.description, spec.price);
        if let Some(path) = spec.thumbnail_path {
            course = course.with_thumbnail(path);
        }
        course.validate()?;

        self.storage.save_course(&course).await?;
        info!("Created course {} ({})", course.id, course.title);
        Ok(course)
    }

    async fn update_course(&self, id: CourseId, patch: CoursePatch) -> Result<Course> {
        let mut course = self.course(id).await?;
        if course.apply(patch) {
            course.validate()?;
            self.storage.save_course(&course).await?;
            debug!("Updated course {}", id);
        }
        Ok(course)
    }

    async fn delete_course(&self, id: CourseId) -> Result<()> {
        let course = self.course(id).await?;

        let enrollments = self.storage.delete_enrollments_by_course(id).await?;
        let modules = self.storage.find_modules_by_course(id).await?;
        let mut lectures = 0;
        for module in &modules {
            for lecture in self.storage.find_lectures_by_module(module.id).await? {
                self.storage.delete_lecture(lecture.id).await?;
                lectures += 1;
            }
            self.storage.delete_module(module.id).await?;
        }
        self.storage.delete_course(id).await?;

        info!(
            "Deleted course {} ({}) with {} module(s), {} lecture(s), {} enrollment(s)",
            id,
            course.title,
            modules.len(),
            lectures,
            enrollments
        );
        Ok(())
    }

    async fn course(&self, id: CourseId) -> Result<Course> {
        self.storage
            .load_course(id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(format!("course {}", id)))
    }

    async fn list_courses(&self) -> Result<Vec<Course>> {
        Ok(self.storage.list_courses().await?)
    }

    async fn create_module(&self, course_id: CourseId, title: String) -> Result<Module> {
        self.course(course_id).await?;

        let modules = self.storage.find_modules_by_course(course_id).await?;
        let number = modules.iter().map(|m| m.number).max().unwrap_or(0) + 1;

        let module = Module::new(course_id, title, number);
        module.validate()?;
        self.storage.save_module(&module).await?;

        info!("Created module {} #{} in course {}", module.id, number, course_id);
        Ok(module)
    }

    async fn update_module(&self, id: ModuleId, patch: ModulePatch) -> Result<Module> {
        let mut module = self.load_module(id).await?;

        if let Some(number) = patch.number.filter(|n| *n != module.number) {
            let taken = self
                .storage
                .find_module_by_course_and_number(module.course_id, number)
                .await?;
            if taken.is_some() {
                return Err(CatalogError::Conflict(format!(
                    "module number {} is already used in course {}",
                    number, module.course_id
                )));
            }
            module.number = number;
        }
        if let Some(title) = patch.title {
            module.title = title;
        }

        module.validate()?;
        module.updated_at = chrono::Utc::now();
        self.storage.save_module(&module).await?;
        debug!("Updated module {}", id);
        Ok(module)
    }

    async fn reorder_modules(
        &self,
        course_id: CourseId,
        assignments: Vec<(ModuleId, u32)>,
    ) -> Result<Vec<Module>> {
        self.course(course_id).await?;

        let mut seen = BTreeSet::new();
        for (id, number) in &assignments {
            if *number == 0 {
                return Err(CatalogError::Invalid(format!("module {} cannot be numbered 0", id)));
            }
            if !seen.insert(*id) {
                return Err(CatalogError::Invalid(format!("module {} assigned twice", id)));
            }
        }

        let modules = self.storage.renumber_modules(course_id, &assignments).await?;
        info!("Reordered {} module(s) in course {}", assignments.len(), course_id);
        Ok(modules)
    }

    async fn delete_module(&self, id: ModuleId) -> Result<()> {
        let module = self.load_module(id).await?;

        let mut removed = BTreeSet::new();
        for lecture in self.storage.find_lectures_by_module(id).await? {
            self.storage.delete_lecture(lecture.id).await?;
            removed.insert(lecture.id);
        }
        self.storage.delete_module(id).await?;
        info!("Deleted module {} with {} lecture(s)", id, removed.len());

        self.prune_enrollments(module.course_id, &removed).await
    }

    async fn create_lecture(&self, module_id: ModuleId, title: String, video_url: String) -> Result<Lecture> {
        self.load_module(module_id).await?;

        let lectures = self.storage.find_lectures_by_module(module_id).await?;
        let order = lectures.iter().map(|l| l.order).max().unwrap_or(0) + 1;

        let lecture = Lecture::new(module_id, title, order, video_url);
        lecture.validate()?;
        self.storage.save_lecture(&lecture).await?;

        info!("Created lecture {} #{} in module {}", lecture.id, order, module_id);
        Ok(lecture)
    }

    async fn update_lecture(&self, id: LectureId, patch: LecturePatch) -> Result<Lecture> {
        let mut lecture = self.load_lecture(id).await?;

        if let Some(order) = patch.order.filter(|o| *o != lecture.order) {
            let taken = self
                .storage
                .find_lecture_by_module_and_order(lecture.module_id, order)
                .await?;
            if taken.is_some() {
                return Err(CatalogError::Conflict(format!(
                    "lecture order {} is already used in module {}",
                    order, lecture.module_id
                )));
            }
            lecture.order = order;
        }
        if let Some(title) = patch.title {
            lecture.title = title;
        }
        if let Some(url) = patch.video_url {
            lecture.video_url = url;
        }

        lecture.validate()?;
        lecture.updated_at = chrono::Utc::now();
        self.storage.save_lecture(&lecture).await?;
        debug!("Updated lecture {}", id);
        Ok(lecture)
    }

    async fn delete_lecture(&self, id: LectureId) -> Result<()> {
        let lecture = self.load_lecture(id).await?;
        let module = self.storage.load_module(lecture.module_id).await?;

        self.storage.delete_lecture(id).await?;
        info!("Deleted lecture {}", id);

        match module {
            Some(module) => self.prune_enrollments(module.course_id, &BTreeSet::from([id])).await,
            None => {
                warn!("Lecture {} had no module; enrollments left as they are", id);
                Ok(())
            }
        }
    }

    async fn course_outline(&self, id: CourseId) -> Result<CourseOutline> {
        let course = self.course(id).await?;

        let mut modules = Vec::new();
        for module in self.storage.find_modules_by_course(id).await? {
            let lectures = self.storage.find_lectures_by_module(module.id).await?;
            modules.push((module, lectures));
        }

        Ok(CourseOutline::new(course, modules))
    }

    async fn lecture_for(&self, actor: &Actor, id: LectureId) -> Result<Lecture> {
        let lecture = self.load_lecture(id).await?;
        if actor.is_elevated() {
            return Ok(lecture);
        }

        let module = self.load_module(lecture.module_id).await?;
        let Some(enrollment) = self
            .storage
            .find_enrollment(&actor.user_id, module.course_id)
            .await?
        else {
            return Err(CatalogError::Forbidden("not enrolled in this course".to_string()));
        };

        if !enrollment.is_unlocked(id) {
            return Err(CatalogError::Forbidden(format!("lecture {} is not unlocked", id)));
        }
        Ok(lecture)
    }
}
