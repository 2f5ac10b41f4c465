//! Storage trait abstraction.

use async_trait::async_trait;
use lectern_core::{
    Course, CourseId, Enrollment, EnrollmentId, Lecture, LectureId, Module, ModuleId, UserId,
};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint would be violated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The enrollment was saved by someone else since it was loaded
    #[error("Enrollment {id} was modified concurrently (expected version {expected}, found {found})")]
    VersionConflict {
        /// Enrollment being saved
        id: EnrollmentId,
        /// Version the caller loaded
        expected: u64,
        /// Version currently stored
        found: u64,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Read and write access to courses, modules and lectures.
///
/// Structural relations (a course's modules, a module's lectures) are always
/// answered by query, never cached on the parent record.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    // === Course operations ===

    /// Save a course (create or update).
    async fn save_course(&self, course: &Course) -> Result<()>;

    /// Load a course by ID.
    async fn load_course(&self, id: CourseId) -> Result<Option<Course>>;

    /// List all courses, newest first.
    async fn list_courses(&self) -> Result<Vec<Course>>;

    /// Delete a course record. Children are not touched.
    async fn delete_course(&self, id: CourseId) -> Result<()>;

    // === Module operations ===

    /// Save a module (create or update).
    ///
    /// Fails with [`StorageError::Conflict`] if another module of the same
    /// course already uses `module.number`.
    async fn save_module(&self, module: &Module) -> Result<()>;

    /// Load a module by ID.
    async fn load_module(&self, id: ModuleId) -> Result<Option<Module>>;

    /// Delete a module record. Lectures are not touched.
    async fn delete_module(&self, id: ModuleId) -> Result<()>;

    /// All modules of a course, ascending by number.
    async fn find_modules_by_course(&self, course_id: CourseId) -> Result<Vec<Module>>;

    /// The module of a course at exactly `number`.
    async fn find_module_by_course_and_number(
        &self,
        course_id: CourseId,
        number: u32,
    ) -> Result<Option<Module>>;

    /// Apply a batch of module renumberings atomically.
    ///
    /// The resulting numbering must be unique within the course.
    async fn renumber_modules(
        &self,
        course_id: CourseId,
        assignments: &[(ModuleId, u32)],
    ) -> Result<Vec<Module>>;

    // === Lecture operations ===

    /// Save a lecture (create or update).
    ///
    /// Fails with [`StorageError::Conflict`] if another lecture of the same
    /// module already uses `lecture.order`.
    async fn save_lecture(&self, lecture: &Lecture) -> Result<()>;

    /// Load a lecture by ID.
    async fn load_lecture(&self, id: LectureId) -> Result<Option<Lecture>>;

    /// Delete a lecture record.
    async fn delete_lecture(&self, id: LectureId) -> Result<()>;

    /// All lectures of a module, ascending by order.
    async fn find_lectures_by_module(&self, module_id: ModuleId) -> Result<Vec<Lecture>>;

    /// The lecture of a module at exactly `order`.
    async fn find_lecture_by_module_and_order(
        &self,
        module_id: ModuleId,
        order: u32,
    ) -> Result<Option<Lecture>>;

    /// Number of lectures across the given modules.
    async fn count_lectures_in_modules(&self, module_ids: &[ModuleId]) -> Result<usize>;
}

/// Filter for listing enrollments.
#[derive(Debug, Clone, Default)]
pub struct EnrollmentFilter {
    /// Only enrollments in this course
    pub course_id: Option<CourseId>,
    /// Only enrollments of this user
    pub user_id: Option<UserId>,
}

impl EnrollmentFilter {
    /// Whether an enrollment passes the filter.
    pub fn matches(&self, enrollment: &Enrollment) -> bool {
        self.course_id.map_or(true, |c| enrollment.course_id == c)
            && self.user_id.as_ref().map_or(true, |u| &enrollment.user_id == u)
    }
}

/// Versioned persistence for enrollments.
#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    /// Insert a new enrollment.
    ///
    /// Fails with [`StorageError::Conflict`] if the user is already enrolled in
    /// the course. Returns the stored version.
    async fn insert_enrollment(&self, enrollment: &Enrollment) -> Result<u64>;

    /// Save an existing enrollment if nobody else saved it since it was loaded.
    ///
    /// `enrollment.version` must equal the stored version, otherwise
    /// [`StorageError::VersionConflict`] is returned and nothing is written.
    /// Returns the new version.
    async fn save_enrollment(&self, enrollment: &Enrollment) -> Result<u64>;

    /// Load an enrollment by ID.
    async fn load_enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>>;

    /// The enrollment of a user in a course.
    async fn find_enrollment(
        &self,
        user_id: &UserId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>>;

    /// List enrollments matching the filter, newest first.
    async fn list_enrollments(&self, filter: &EnrollmentFilter) -> Result<Vec<Enrollment>>;

    /// Delete an enrollment.
    async fn delete_enrollment(&self, id: EnrollmentId) -> Result<()>;

    /// Delete every enrollment in a course. Returns how many were removed.
    async fn delete_enrollments_by_course(&self, course_id: CourseId) -> Result<usize>;
}

/// A backend providing both catalog and enrollment persistence.
pub trait Storage: CatalogStore + EnrollmentStore {}

impl<T: CatalogStore + EnrollmentStore + ?Sized> Storage for T {}
