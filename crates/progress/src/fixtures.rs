//! Test catalogs.

use std::sync::Arc;
use async_trait::async_trait;
use lectern_core::{
    Course, CourseId, Enrollment, EnrollmentId, Lecture, LectureId, Module, ModuleId, UserId,
};
use lectern_storage::{CatalogStore, EnrollmentFilter, EnrollmentStore, JsonStorage, Result};
use tokio::sync::Barrier;

pub(crate) struct Fixture {
    pub _dir: tempfile::TempDir,
    pub storage: Arc<JsonStorage>,
    pub course: Course,
    pub modules: Vec<Module>,
    pub lectures: Vec<Vec<Lecture>>,
}

/// A course with one module per `(number, lecture_count)` entry; lectures are
/// numbered from 1.
pub(crate) async fn catalog_with(layout: &[(u32, u32)]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(JsonStorage::new(dir.path()).await.unwrap());

    let course = Course::new("Rust", "Ownership and borrowing", 0.0);
    storage.save_course(&course).await.unwrap();

    let mut modules = Vec::new();
    let mut lectures = Vec::new();
    for &(number, count) in layout {
        let module = Module::new(course.id, format!("Module {}", number), number);
        storage.save_module(&module).await.unwrap();

        let mut in_module = Vec::new();
        for order in 1..=count {
            let lecture = Lecture::new(
                module.id,
                format!("Lecture {}.{}", number, order),
                order,
                format!("https://videos.example/{}/{}", number, order),
            );
            storage.save_lecture(&lecture).await.unwrap();
            in_module.push(lecture);
        }

        modules.push(module);
        lectures.push(in_module);
    }

    Fixture {
        _dir: dir,
        storage,
        course,
        modules,
        lectures,
    }
}

/// Storage whose `load_enrollment` waits until `parties` callers have loaded,
/// so concurrent read-modify-write cycles all start from the same version.
pub(crate) struct LockstepLoads {
    inner: Arc<JsonStorage>,
    barrier: Barrier,
}

impl LockstepLoads {
    pub(crate) fn new(inner: Arc<JsonStorage>, parties: usize) -> Self {
        Self {
            inner,
            barrier: Barrier::new(parties),
        }
    }
}

#[async_trait]
impl CatalogStore for LockstepLoads {
    async fn save_course(&self, course: &Course) -> Result<()> {
        self.inner.save_course(course).await
    }
    async fn load_course(&self, id: CourseId) -> Result<Option<Course>> {
        self.inner.load_course(id).await
    }
    async fn list_courses(&self) -> Result<Vec<Course>> {
        self.inner.list_courses().await
    }
    async fn delete_course(&self, id: CourseId) -> Result<()> {
        self.inner.delete_course(id).await
    }
    async fn save_module(&self, module: &Module) -> Result<()> {
        self.inner.save_module(module).await
    }
    async fn load_module(&self, id: ModuleId) -> Result<Option<Module>> {
        self.inner.load_module(id).await
    }
    async fn delete_module(&self, id: ModuleId) -> Result<()> {
        self.inner.delete_module(id).await
    }
    async fn find_modules_by_course(&self, course_id: CourseId) -> Result<Vec<Module>> {
        self.inner.find_modules_by_course(course_id).await
    }
    async fn find_module_by_course_and_number(&self, course_id: CourseId, number: u32) -> Result<Option<Module>> {
        self.inner.find_module_by_course_and_number(course_id, number).await
    }
    async fn renumber_modules(&self, course_id: CourseId, assignments: &[(ModuleId, u32)]) -> Result<Vec<Module>> {
        self.inner.renumber_modules(course_id, assignments).await
    }
    async fn save_lecture(&self, lecture: &Lecture) -> Result<()> {
        self.inner.save_lecture(lecture).await
    }
    async fn load_lecture(&self, id: LectureId) -> Result<Option<Lecture>> {
        self.inner.load_lecture(id).await
    }
    async fn delete_lecture(&self, id: LectureId) -> Result<()> {
        self.inner.delete_lecture(id).await
    }
    async fn find_lectures_by_module(&self, module_id: ModuleId) -> Result<Vec<Lecture>> {
        self.inner.find_lectures_by_module(module_id).await
    }
    async fn find_lecture_by_module_and_order(&self, module_id: ModuleId, order: u32) -> Result<Option<Lecture>> {
        self.inner.find_lecture_by_module_and_order(module_id, order).await
    }
    async fn count_lectures_in_modules(&self, module_ids: &[ModuleId]) -> Result<usize> {
        self.inner.count_lectures_in_modules(module_ids).await
    }
}

#[async_trait]
impl EnrollmentStore for LockstepLoads {
    async fn insert_enrollment(&self, enrollment: &Enrollment) -> Result<u64> {
        self.inner.insert_enrollment(enrollment).await
    }
    async fn save_enrollment(&self, enrollment: &Enrollment) -> Result<u64> {
        self.inner.save_enrollment(enrollment).await
    }
    async fn load_enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>> {
        let loaded = self.inner.load_enrollment(id).await;
        self.barrier.wait().await;
        loaded
    }
    async fn find_enrollment(&self, user_id: &UserId, course_id: CourseId) -> Result<Option<Enrollment>> {
        self.inner.find_enrollment(user_id, course_id).await
    }
    async fn list_enrollments(&self, filter: &EnrollmentFilter) -> Result<Vec<Enrollment>> {
        self.inner.list_enrollments(filter).await
    }
    async fn delete_enrollment(&self, id: EnrollmentId) -> Result<()> {
        self.inner.delete_enrollment(id).await
    }
    async fn delete_enrollments_by_course(&self, course_id: CourseId) -> Result<usize> {
        self.inner.delete_enrollments_by_course(course_id).await
    }
}
