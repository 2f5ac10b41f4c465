//! Progress percentage calculation.

use std::sync::Arc;
use lectern_core::{CourseId, Enrollment};
use lectern_storage::{CatalogStore, Result};

/// Percentage of `total` represented by `completed`, rounded half up.
///
/// Zero lectures means zero progress. Completed counts above the total (left
/// over after lectures were removed) are capped at 100.
pub fn calculate_progress(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total);
    // round(c / t * 100) == floor((200c + t) / 2t) for non-negative integers
    ((completed * 200 + total) / (2 * total)) as u8
}

/// Derives enrollment progress from the current catalog.
#[derive(Clone)]
pub struct ProgressCalculator {
    catalog: Arc<dyn CatalogStore>,
}

impl ProgressCalculator {
    /// Create a new progress calculator.
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    /// Number of lectures currently in the course, summed over its modules.
    pub async fn total_lectures(&self, course_id: CourseId) -> Result<usize> {
        let module_ids: Vec<_> = self
            .catalog
            .find_modules_by_course(course_id)
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect();
        self.catalog.count_lectures_in_modules(&module_ids).await
    }

    /// Recompute and store `enrollment.progress`. Does not persist.
    pub async fn recalculate(&self, enrollment: &mut Enrollment) -> Result<u8> {
        let total = self.total_lectures(enrollment.course_id).await?;
        enrollment.progress = calculate_progress(enrollment.completed.len(), total);
        Ok(enrollment.progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_lectures_means_zero() {
        assert_eq!(calculate_progress(0, 0), 0);
        assert_eq!(calculate_progress(3, 0), 0);
    }

    #[test]
    fn test_edges() {
        for total in 1..50 {
            assert_eq!(calculate_progress(0, total), 0);
            assert_eq!(calculate_progress(total, total), 100);
        }
    }

    #[test]
    fn test_rounds_half_up() {
        assert_eq!(calculate_progress(1, 2), 50);
        assert_eq!(calculate_progress(1, 3), 33);
        assert_eq!(calculate_progress(2, 3), 67);
        assert_eq!(calculate_progress(1, 8), 13);
        assert_eq!(calculate_progress(1, 200), 1);
        assert_eq!(calculate_progress(1, 201), 0);
    }

    #[test]
    fn test_monotonic_and_bounded() {
        for total in 1..40 {
            let mut last = 0;
            for completed in 0..=total + 3 {
                let p = calculate_progress(completed, total);
                assert!(p <= 100);
                assert!(p >= last, "{}/{} went backwards", completed, total);
                last = p;
            }
        }
    }

    #[test]
    fn test_excess_completions_capped() {
        assert_eq!(calculate_progress(5, 4), 100);
    }
}
