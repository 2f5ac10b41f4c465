//! JSON file storage implementation.
//!
//! Stores one JSON file per record under a root directory (`.lectern` by
//! default). Writes go through a temp file and a rename so readers never see a
//! half-written record. Every write and delete is serialised by an in-process
//! lock, so check-then-write sequences (uniqueness, versions) see no interleaving
//! and no two writers share a temp file.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use async_trait::async_trait;
use lectern_core::{
    Course, CourseId, Enrollment, EnrollmentId, Lecture, LectureId, Module, ModuleId, UserId,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use super::{CatalogStore, EnrollmentFilter, EnrollmentStore, Result, StorageError};

/// File-based JSON storage backend.
#[derive(Clone)]
pub struct JsonStorage {
    root: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl JsonStorage {
    /// Open storage at `root`, creating the record directories if needed.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("courses")).await?;
        fs::create_dir_all(root.join("modules")).await?;
        fs::create_dir_all(root.join("lectures")).await?;
        fs::create_dir_all(root.join("enrollments")).await?;

        debug!("Opened JSON storage at {}", root.display());

        Ok(Self {
            root,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn course_path(&self, id: CourseId) -> PathBuf {
        self.root.join("courses").join(format!("{}.json", id))
    }
    fn module_path(&self, id: ModuleId) -> PathBuf {
        self.root.join("modules").join(format!("{}.json", id))
    }
    fn lecture_path(&self, id: LectureId) -> PathBuf {
        self.root.join("lectures").join(format!("{}.json", id))
    }
    fn enrollment_path(&self, id: EnrollmentId) -> PathBuf {
        self.root.join("enrollments").join(format!("{}.json", id))
    }

    async fn all_modules(&self) -> Result<Vec<Module>> {
        list_dir(&self.root.join("modules")).await
    }

    async fn all_lectures(&self) -> Result<Vec<Lecture>> {
        list_dir(&self.root.join("lectures")).await
    }

    async fn all_enrollments(&self) -> Result<Vec<Enrollment>> {
        list_dir(&self.root.join("enrollments")).await
    }
}

#[async_trait]
impl CatalogStore for JsonStorage {
    async fn save_course(&self, course: &Course) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        write_json(&self.course_path(course.id), course).await
    }

    async fn load_course(&self, id: CourseId) -> Result<Option<Course>> {
        read_json(&self.course_path(id)).await
    }

    async fn list_courses(&self) -> Result<Vec<Course>> {
        let mut courses: Vec<Course> = list_dir(&self.root.join("courses")).await?;
        courses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(courses)
    }

    async fn delete_course(&self, id: CourseId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        remove_file(&self.course_path(id)).await
    }

    async fn save_module(&self, module: &Module) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let clash = self
            .all_modules()
            .await?
            .into_iter()
            .any(|m| m.course_id == module.course_id && m.number == module.number && m.id != module.id);
        if clash {
            return Err(StorageError::Conflict(format!(
                "module number {} already exists in course {}",
                module.number, module.course_id
            )));
        }

        write_json(&self.module_path(module.id), module).await
    }

    async fn load_module(&self, id: ModuleId) -> Result<Option<Module>> {
        read_json(&self.module_path(id)).await
    }

    async fn delete_module(&self, id: ModuleId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        remove_file(&self.module_path(id)).await
    }

    async fn find_modules_by_course(&self, course_id: CourseId) -> Result<Vec<Module>> {
        let mut modules: Vec<Module> = self
            .all_modules()
            .await?
            .into_iter()
            .filter(|m| m.course_id == course_id)
            .collect();
        modules.sort_by_key(|m| m.number);
        Ok(modules)
    }

    async fn find_module_by_course_and_number(
        &self,
        course_id: CourseId,
        number: u32,
    ) -> Result<Option<Module>> {
        Ok(self
            .all_modules()
            .await?
            .into_iter()
            .find(|m| m.course_id == course_id && m.number == number))
    }

    async fn renumber_modules(
        &self,
        course_id: CourseId,
        assignments: &[(ModuleId, u32)],
    ) -> Result<Vec<Module>> {
        let _guard = self.write_lock.lock().await;

        let mut modules: HashMap<ModuleId, Module> = self
            .all_modules()
            .await?
            .into_iter()
            .filter(|m| m.course_id == course_id)
            .map(|m| (m.id, m))
            .collect();

        let now = chrono::Utc::now();
        for (id, number) in assignments {
            let module = modules
                .get_mut(id)
                .ok_or_else(|| StorageError::NotFound(format!("module {} in course {}", id, course_id)))?;
            module.number = *number;
            module.updated_at = now;
        }

        let mut seen = HashSet::new();
        for module in modules.values() {
            if !seen.insert(module.number) {
                return Err(StorageError::Conflict(format!(
                    "module number {} used twice in course {}",
                    module.number, course_id
                )));
            }
        }

        let mut changed = Vec::with_capacity(assignments.len());
        for (id, _) in assignments {
            if let Some(module) = modules.get(id) {
                write_json(&self.module_path(module.id), module).await?;
                changed.push(module.clone());
            }
        }
        changed.sort_by_key(|m| m.number);
        Ok(changed)
    }

    async fn save_lecture(&self, lecture: &Lecture) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let clash = self
            .all_lectures()
            .await?
            .into_iter()
            .any(|l| l.module_id == lecture.module_id && l.order == lecture.order && l.id != lecture.id);
        if clash {
            return Err(StorageError::Conflict(format!(
                "lecture order {} already exists in module {}",
                lecture.order, lecture.module_id
            )));
        }

        write_json(&self.lecture_path(lecture.id), lecture).await
    }

    async fn load_lecture(&self, id: LectureId) -> Result<Option<Lecture>> {
        read_json(&self.lecture_path(id)).await
    }

    async fn delete_lecture(&self, id: LectureId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        remove_file(&self.lecture_path(id)).await
    }

    async fn find_lectures_by_module(&self, module_id: ModuleId) -> Result<Vec<Lecture>> {
        let mut lectures: Vec<Lecture> = self
            .all_lectures()
            .await?
            .into_iter()
            .filter(|l| l.module_id == module_id)
            .collect();
        lectures.sort_by_key(|l| l.order);
        Ok(lectures)
    }

    async fn find_lecture_by_module_and_order(
        &self,
        module_id: ModuleId,
        order: u32,
    ) -> Result<Option<Lecture>> {
        Ok(self
            .all_lectures()
            .await?
            .into_iter()
            .find(|l| l.module_id == module_id && l.order == order))
    }

    async fn count_lectures_in_modules(&self, module_ids: &[ModuleId]) -> Result<usize> {
        let wanted: HashSet<&ModuleId> = module_ids.iter().collect();
        Ok(self
            .all_lectures()
            .await?
            .iter()
            .filter(|l| wanted.contains(&l.module_id))
            .count())
    }
}

#[async_trait]
impl EnrollmentStore for JsonStorage {
    async fn insert_enrollment(&self, enrollment: &Enrollment) -> Result<u64> {
        let _guard = self.write_lock.lock().await;

        let exists = self
            .all_enrollments()
            .await?
            .into_iter()
            .any(|e| e.user_id == enrollment.user_id && e.course_id == enrollment.course_id);
        if exists {
            return Err(StorageError::Conflict(format!(
                "user {} is already enrolled in course {}",
                enrollment.user_id, enrollment.course_id
            )));
        }

        let mut stored = enrollment.clone();
        stored.version = 1;
        write_json(&self.enrollment_path(stored.id), &stored).await?;
        Ok(stored.version)
    }

    async fn save_enrollment(&self, enrollment: &Enrollment) -> Result<u64> {
        let _guard = self.write_lock.lock().await;

        let path = self.enrollment_path(enrollment.id);
        let current: Enrollment = read_json(&path)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("enrollment {}", enrollment.id)))?;

        if current.version != enrollment.version {
            warn!(
                "Rejected stale write to enrollment {} (have v{}, stored v{})",
                enrollment.id, enrollment.version, current.version
            );
            return Err(StorageError::VersionConflict {
                id: enrollment.id,
                expected: enrollment.version,
                found: current.version,
            });
        }

        let mut stored = enrollment.clone();
        stored.version = current.version + 1;
        write_json(&path, &stored).await?;
        Ok(stored.version)
    }

    async fn load_enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>> {
        read_json(&self.enrollment_path(id)).await
    }

    async fn find_enrollment(
        &self,
        user_id: &UserId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>> {
        Ok(self
            .all_enrollments()
            .await?
            .into_iter()
            .find(|e| &e.user_id == user_id && e.course_id == course_id))
    }

    async fn list_enrollments(&self, filter: &EnrollmentFilter) -> Result<Vec<Enrollment>> {
        let mut enrollments: Vec<Enrollment> = self
            .all_enrollments()
            .await?
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect();
        enrollments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(enrollments)
    }

    async fn delete_enrollment(&self, id: EnrollmentId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        remove_file(&self.enrollment_path(id)).await
    }

    async fn delete_enrollments_by_course(&self, course_id: CourseId) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let doomed: Vec<EnrollmentId> = self
            .all_enrollments()
            .await?
            .into_iter()
            .filter(|e| e.course_id == course_id)
            .map(|e| e.id)
            .collect();
        for id in &doomed {
            remove_file(&self.enrollment_path(*id)).await?;
        }
        Ok(doomed.len())
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json.as_bytes()).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn remove_file(path: &Path) -> Result<()> {
    fs::remove_file(path).await.or_else(|e| {
        if e.kind() == std::io::ErrorKind::NotFound { Ok(()) } else { Err(e) }
    })?;
    Ok(())
}

async fn list_dir<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        match read_json(&entry.path()).await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => {}
            Err(e) => warn!("Skipping unreadable record {}: {}", entry.path().display(), e),
        }
    }
    Ok(items)
}
