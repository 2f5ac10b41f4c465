//! SQLite storage backend for Lectern.
//!
//! Records are kept as JSON in a `data` column, with the fields needed for
//! lookups and uniqueness constraints (parent ids, positions, versions) mirrored
//! into real columns.

use std::collections::HashSet;
use std::path::Path;
use async_trait::async_trait;
use lectern_core::{
    Course, CourseId, Enrollment, EnrollmentId, Lecture, LectureId, Module, ModuleId, UserId,
};
use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::Row;
use tracing::warn;

use super::trait_::{CatalogStore, EnrollmentFilter, EnrollmentStore, Result, StorageError};

/// SQLite storage implementation.
#[derive(Clone)]
pub struct SqliteStorage {
    /// Database connection pool
    pool: sqlx::SqlitePool,
}

impl SqliteStorage {
    /// Open (creating if needed) a database file.
    pub async fn new_from_path(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create an in-memory SQLite storage for testing.
    pub async fn in_memory() -> Result<Self> {
        // A single connection, otherwise every pooled connection gets its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Initialize the database schema.
    async fn init_schema(&self) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS courses (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS modules (
                id TEXT PRIMARY KEY,
                course_id TEXT NOT NULL,
                number INTEGER NOT NULL,
                data TEXT NOT NULL,
                UNIQUE (course_id, number)
            )",
            "CREATE TABLE IF NOT EXISTS lectures (
                id TEXT PRIMARY KEY,
                module_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                data TEXT NOT NULL,
                UNIQUE (module_id, position)
            )",
            "CREATE TABLE IF NOT EXISTS enrollments (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                course_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (user_id, course_id)
            )",
            "CREATE INDEX IF NOT EXISTS idx_enrollments_course ON enrollments(course_id)",
        ];

        for sql in statements {
            sqlx::query(sql).execute(&self.pool).await.map_err(db_err)?;
        }

        Ok(())
    }

    /// Check if the database is healthy.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    async fn fetch_one_data<T: DeserializeOwned>(&self, sql: &str, id: String) -> Result<Option<T>> {
        let row = sqlx::query(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(|row| decode(&row)).transpose()
    }
}

fn decode<T: DeserializeOwned>(row: &sqlx::sqlite::SqliteRow) -> Result<T> {
    let data: String = row.try_get("data").map_err(db_err)?;
    Ok(serde_json::from_str(&data)?)
}

fn decode_all<T: DeserializeOwned>(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<T>> {
    rows.iter().map(decode).collect()
}

fn db_err(e: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StorageError::Conflict(db.message().to_string());
        }
    }
    StorageError::Other(e.to_string())
}

#[async_trait]
impl CatalogStore for SqliteStorage {
    async fn save_course(&self, course: &Course) -> Result<()> {
        let data = serde_json::to_string(course)?;

        sqlx::query(
            "INSERT INTO courses (id, data, created_at) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET data = excluded.data",
        )
        .bind(course.id.to_string())
        .bind(data)
        .bind(course.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn load_course(&self, id: CourseId) -> Result<Option<Course>> {
        self.fetch_one_data("SELECT data FROM courses WHERE id = ?", id.to_string()).await
    }

    async fn list_courses(&self) -> Result<Vec<Course>> {
        let rows = sqlx::query("SELECT data FROM courses ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        decode_all(rows)
    }

    async fn delete_course(&self, id: CourseId) -> Result<()> {
        sqlx::query("DELETE FROM courses WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn save_module(&self, module: &Module) -> Result<()> {
        let data = serde_json::to_string(module)?;

        sqlx::query(
            "INSERT INTO modules (id, course_id, number, data) VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET course_id = excluded.course_id,
                number = excluded.number, data = excluded.data",
        )
        .bind(module.id.to_string())
        .bind(module.course_id.to_string())
        .bind(module.number as i64)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn load_module(&self, id: ModuleId) -> Result<Option<Module>> {
        self.fetch_one_data("SELECT data FROM modules WHERE id = ?", id.to_string()).await
    }

    async fn delete_module(&self, id: ModuleId) -> Result<()> {
        sqlx::query("DELETE FROM modules WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn find_modules_by_course(&self, course_id: CourseId) -> Result<Vec<Module>> {
        let rows = sqlx::query("SELECT data FROM modules WHERE course_id = ? ORDER BY number")
            .bind(course_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        decode_all(rows)
    }

    async fn find_module_by_course_and_number(
        &self,
        course_id: CourseId,
        number: u32,
    ) -> Result<Option<Module>> {
        let row = sqlx::query("SELECT data FROM modules WHERE course_id = ? AND number = ?")
            .bind(course_id.to_string())
            .bind(number as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|row| decode(&row)).transpose()
    }

    async fn renumber_modules(
        &self,
        course_id: CourseId,
        assignments: &[(ModuleId, u32)],
    ) -> Result<Vec<Module>> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let rows = sqlx::query("SELECT data FROM modules WHERE course_id = ?")
            .bind(course_id.to_string())
            .fetch_all(&mut *tx)
            .await
            .map_err(db_err)?;
        let mut modules: Vec<Module> = decode_all(rows)?;

        let now = chrono::Utc::now();
        for (id, number) in assignments {
            let module = modules
                .iter_mut()
                .find(|m| m.id == *id)
                .ok_or_else(|| StorageError::NotFound(format!("module {} in course {}", id, course_id)))?;
            module.number = *number;
            module.updated_at = now;
        }

        let mut seen = HashSet::new();
        if let Some(dup) = modules.iter().find(|m| !seen.insert(m.number)) {
            return Err(StorageError::Conflict(format!(
                "module number {} used twice in course {}",
                dup.number, course_id
            )));
        }

        // Park the moved rows on negative numbers first so swaps never trip the unique index.
        for (id, _) in assignments {
            sqlx::query("UPDATE modules SET number = -number WHERE id = ? AND number > 0")
                .bind(id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        let mut changed = Vec::with_capacity(assignments.len());
        for (id, _) in assignments {
            if let Some(module) = modules.iter().find(|m| m.id == *id) {
                sqlx::query("UPDATE modules SET number = ?, data = ? WHERE id = ?")
                    .bind(module.number as i64)
                    .bind(serde_json::to_string(module)?)
                    .bind(module.id.to_string())
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                changed.push(module.clone());
            }
        }

        tx.commit().await.map_err(db_err)?;

        changed.sort_by_key(|m| m.number);
        Ok(changed)
    }

    async fn save_lecture(&self, lecture: &Lecture) -> Result<()> {
        let data = serde_json::to_string(lecture)?;

        sqlx::query(
            "INSERT INTO lectures (id, module_id, position, data) VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET module_id = excluded.module_id,
                position = excluded.position, data = excluded.data",
        )
        .bind(lecture.id.to_string())
        .bind(lecture.module_id.to_string())
        .bind(lecture.order as i64)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn load_lecture(&self, id: LectureId) -> Result<Option<Lecture>> {
        self.fetch_one_data("SELECT data FROM lectures WHERE id = ?", id.to_string()).await
    }

    async fn delete_lecture(&self, id: LectureId) -> Result<()> {
        sqlx::query("DELETE FROM lectures WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn find_lectures_by_module(&self, module_id: ModuleId) -> Result<Vec<Lecture>> {
        let rows = sqlx::query("SELECT data FROM lectures WHERE module_id = ? ORDER BY position")
            .bind(module_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        decode_all(rows)
    }

    async fn find_lecture_by_module_and_order(
        &self,
        module_id: ModuleId,
        order: u32,
    ) -> Result<Option<Lecture>> {
        let row = sqlx::query("SELECT data FROM lectures WHERE module_id = ? AND position = ?")
            .bind(module_id.to_string())
            .bind(order as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|row| decode(&row)).transpose()
    }

    async fn count_lectures_in_modules(&self, module_ids: &[ModuleId]) -> Result<usize> {
        let mut total = 0usize;
        for id in module_ids {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lectures WHERE module_id = ?")
                .bind(id.to_string())
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
            total += count as usize;
        }
        Ok(total)
    }
}

#[async_trait]
impl EnrollmentStore for SqliteStorage {
    async fn insert_enrollment(&self, enrollment: &Enrollment) -> Result<u64> {
        let mut stored = enrollment.clone();
        stored.version = 1;
        let data = serde_json::to_string(&stored)?;

        sqlx::query(
            "INSERT INTO enrollments (id, user_id, course_id, version, data, created_at)
            VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(stored.id.to_string())
        .bind(stored.user_id.as_str())
        .bind(stored.course_id.to_string())
        .bind(stored.version as i64)
        .bind(data)
        .bind(stored.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(stored.version)
    }

    async fn save_enrollment(&self, enrollment: &Enrollment) -> Result<u64> {
        let mut stored = enrollment.clone();
        stored.version = enrollment.version + 1;
        let data = serde_json::to_string(&stored)?;

        let result = sqlx::query("UPDATE enrollments SET version = ?, data = ? WHERE id = ? AND version = ?")
            .bind(stored.version as i64)
            .bind(data)
            .bind(enrollment.id.to_string())
            .bind(enrollment.version as i64)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 1 {
            return Ok(stored.version);
        }

        let found: Option<i64> = sqlx::query_scalar("SELECT version FROM enrollments WHERE id = ?")
            .bind(enrollment.id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match found {
            Some(found) => {
                warn!(
                    "Rejected stale write to enrollment {} (have v{}, stored v{})",
                    enrollment.id, enrollment.version, found
                );
                Err(StorageError::VersionConflict {
                    id: enrollment.id,
                    expected: enrollment.version,
                    found: found as u64,
                })
            }
            None => Err(StorageError::NotFound(format!("enrollment {}", enrollment.id))),
        }
    }

    async fn load_enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>> {
        self.fetch_one_data("SELECT data FROM enrollments WHERE id = ?", id.to_string()).await
    }

    async fn find_enrollment(
        &self,
        user_id: &UserId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>> {
        let row = sqlx::query("SELECT data FROM enrollments WHERE user_id = ? AND course_id = ?")
            .bind(user_id.as_str())
            .bind(course_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|row| decode(&row)).transpose()
    }

    async fn list_enrollments(&self, filter: &EnrollmentFilter) -> Result<Vec<Enrollment>> {
        let rows = sqlx::query("SELECT data FROM enrollments ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut enrollments: Vec<Enrollment> = decode_all(rows)?;
        enrollments.retain(|e| filter.matches(e));
        Ok(enrollments)
    }

    async fn delete_enrollment(&self, id: EnrollmentId) -> Result<()> {
        sqlx::query("DELETE FROM enrollments WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_enrollments_by_course(&self, course_id: CourseId) -> Result<usize> {
        let result = sqlx::query("DELETE FROM enrollments WHERE course_id = ?")
            .bind(course_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        assert!(storage.health_check().await);
    }

    #[tokio::test]
    async fn test_duplicate_module_number_conflicts() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let course = CourseId::new();
        storage.save_module(&Module::new(course, "A", 1)).await.unwrap();

        let err = storage.save_module(&Module::new(course, "B", 1)).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_renumber_swaps_modules() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let course = CourseId::new();
        let a = Module::new(course, "A", 1);
        let b = Module::new(course, "B", 2);
        storage.save_module(&a).await.unwrap();
        storage.save_module(&b).await.unwrap();

        storage.renumber_modules(course, &[(a.id, 2), (b.id, 1)]).await.unwrap();

        let modules = storage.find_modules_by_course(course).await.unwrap();
        assert_eq!(modules.iter().map(|m| m.id).collect::<Vec<_>>(), vec![b.id, a.id]);
        assert_eq!(modules[0].number, 1);
    }

    #[tokio::test]
    async fn test_lecture_counts() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let m1 = ModuleId::new();
        let m2 = ModuleId::new();
        storage.save_lecture(&Lecture::new(m1, "One", 1, "v1")).await.unwrap();
        storage.save_lecture(&Lecture::new(m1, "Two", 2, "v2")).await.unwrap();
        storage.save_lecture(&Lecture::new(m2, "Three", 1, "v3")).await.unwrap();

        assert_eq!(storage.count_lectures_in_modules(&[m1, m2]).await.unwrap(), 3);
        let second = storage.find_lecture_by_module_and_order(m1, 2).await.unwrap().unwrap();
        assert_eq!(second.title, "Two");
    }

    #[tokio::test]
    async fn test_stale_enrollment_write_rejected() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let enrollment = Enrollment::new(UserId::new("alice"), CourseId::new(), None);
        storage.insert_enrollment(&enrollment).await.unwrap();

        let mut a = storage.load_enrollment(enrollment.id).await.unwrap().unwrap();
        let mut b = a.clone();
        a.unlock(LectureId::new());
        b.unlock(LectureId::new());

        assert_eq!(storage.save_enrollment(&a).await.unwrap(), 2);
        let err = storage.save_enrollment(&b).await.unwrap_err();
        assert!(matches!(err, StorageError::VersionConflict { expected: 1, found: 2, .. }));
    }

    #[tokio::test]
    async fn test_duplicate_enrollment_conflicts() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let course = CourseId::new();
        storage
            .insert_enrollment(&Enrollment::new(UserId::new("alice"), course, None))
            .await
            .unwrap();

        let err = storage
            .insert_enrollment(&Enrollment::new(UserId::new("alice"), course, None))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }
}
