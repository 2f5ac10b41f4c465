//! Unlock engine - finds and unlocks the lecture after a completed one.

use std::str::FromStr;
use std::sync::Arc;
use async_trait::async_trait;
use lectern_core::{Enrollment, Lecture, LectureId, Module, TraversalKey};
use lectern_storage::{CatalogStore, Result};
use tracing::debug;

/// Rule for picking the lecture that follows another in a course.
#[async_trait]
pub trait TraversalStrategy: Send + Sync {
    /// The lecture after `lecture` (which lives in `module`), if any.
    async fn next_after(
        &self,
        catalog: &dyn CatalogStore,
        module: &Module,
        lecture: &Lecture,
    ) -> Result<Option<Lecture>>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Successor by exact position: lecture `order + 1` in the same module, else
/// lecture 1 of module `number + 1`.
///
/// Numbering gaps end traversal: with modules 1 and 3 and no module 2, the
/// last lecture of module 1 has no successor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactSuccessor;

#[async_trait]
impl TraversalStrategy for ExactSuccessor {
    async fn next_after(
        &self,
        catalog: &dyn CatalogStore,
        module: &Module,
        lecture: &Lecture,
    ) -> Result<Option<Lecture>> {
        if let Some(order) = lecture.order.checked_add(1) {
            if let Some(next) = catalog.find_lecture_by_module_and_order(module.id, order).await? {
                return Ok(Some(next));
            }
        }

        let Some(number) = module.number.checked_add(1) else {
            return Ok(None);
        };
        let Some(next_module) = catalog
            .find_module_by_course_and_number(module.course_id, number)
            .await?
        else {
            return Ok(None);
        };

        catalog.find_lecture_by_module_and_order(next_module.id, 1).await
    }

    fn name(&self) -> &'static str {
        "exact"
    }
}

/// Successor by sort order: the next lecture in traversal order, skipping
/// numbering gaps and empty modules.
#[derive(Debug, Clone, Copy, Default)]
pub struct SortedSuccessor;

#[async_trait]
impl TraversalStrategy for SortedSuccessor {
    async fn next_after(
        &self,
        catalog: &dyn CatalogStore,
        module: &Module,
        lecture: &Lecture,
    ) -> Result<Option<Lecture>> {
        let current = TraversalKey::of(module, lecture);
        let mut best: Option<(TraversalKey, Lecture)> = None;

        let later = catalog
            .find_modules_by_course(module.course_id)
            .await?
            .into_iter()
            .filter(|m| m.number >= module.number);

        for candidate in later {
            for next in catalog.find_lectures_by_module(candidate.id).await? {
                let key = TraversalKey::of(&candidate, &next);
                if key > current && best.as_ref().map_or(true, |(k, _)| key < *k) {
                    best = Some((key, next));
                }
            }
            // Modules come back ascending, so the first one with a successor wins.
            if best.is_some() {
                break;
            }
        }

        Ok(best.map(|(_, l)| l))
    }

    fn name(&self) -> &'static str {
        "sorted"
    }
}

/// Selectable traversal rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Traversal {
    /// [`ExactSuccessor`]
    #[default]
    Exact,
    /// [`SortedSuccessor`]
    Sorted,
}

impl Traversal {
    /// The strategy implementing this rule.
    pub fn strategy(self) -> Box<dyn TraversalStrategy> {
        match self {
            Traversal::Exact => Box::new(ExactSuccessor),
            Traversal::Sorted => Box::new(SortedSuccessor),
        }
    }
}

impl FromStr for Traversal {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact" => Ok(Traversal::Exact),
            "sorted" => Ok(Traversal::Sorted),
            other => Err(format!("unknown traversal '{}', expected 'exact' or 'sorted'", other)),
        }
    }
}

/// Unlocks lectures as their predecessors are completed.
pub struct UnlockEngine {
    catalog: Arc<dyn CatalogStore>,
    strategy: Box<dyn TraversalStrategy>,
}

impl UnlockEngine {
    /// Create an engine using [`ExactSuccessor`].
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self {
            catalog,
            strategy: Box::new(ExactSuccessor),
        }
    }

    /// Set the traversal strategy.
    pub fn with_strategy(mut self, strategy: Box<dyn TraversalStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// The lecture following `current` in its course.
    ///
    /// Returns `None` at the end of the course, and also when `current` or its
    /// module no longer exist.
    pub async fn find_next_lecture(&self, current: LectureId) -> Result<Option<Lecture>> {
        let Some(lecture) = self.catalog.load_lecture(current).await? else {
            debug!("Lecture {} not found; nothing to unlock", current);
            return Ok(None);
        };
        let Some(module) = self.catalog.load_module(lecture.module_id).await? else {
            debug!("Module {} of lecture {} not found", lecture.module_id, current);
            return Ok(None);
        };
        self.next_after(&module, &lecture).await
    }

    /// The lecture following an already-resolved lecture.
    pub async fn next_after(&self, module: &Module, lecture: &Lecture) -> Result<Option<Lecture>> {
        let next = self
            .strategy
            .next_after(self.catalog.as_ref(), module, lecture)
            .await?;
        debug!(
            "Next after {} ({} traversal): {:?}",
            lecture.id,
            self.strategy.name(),
            next.as_ref().map(|l| l.id)
        );
        Ok(next)
    }

    /// Add a lecture to the enrollment's unlocked set. Idempotent.
    pub fn unlock_lecture(enrollment: &mut Enrollment, lecture: LectureId) -> bool {
        enrollment.unlock(lecture)
    }

    /// Unlock whatever follows `module`/`lecture`, returning it.
    pub async fn unlock_next(
        &self,
        enrollment: &mut Enrollment,
        module: &Module,
        lecture: &Lecture,
    ) -> Result<Option<Lecture>> {
        let next = self.next_after(module, lecture).await?;
        if let Some(next) = &next {
            Self::unlock_lecture(enrollment, next.id);
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{catalog_with, Fixture};
    use lectern_core::{CourseId, UserId};

    #[tokio::test]
    async fn test_next_in_same_module() {
        let Fixture { _dir, storage, lectures, .. } = catalog_with(&[(1, 2)]).await;
        let engine = UnlockEngine::new(storage);

        let next = engine.find_next_lecture(lectures[0][0].id).await.unwrap();
        assert_eq!(next.map(|l| l.id), Some(lectures[0][1].id));
    }

    #[tokio::test]
    async fn test_crosses_into_next_module() {
        let Fixture { _dir, storage, lectures, .. } = catalog_with(&[(1, 2), (2, 1)]).await;
        let engine = UnlockEngine::new(storage);

        let next = engine.find_next_lecture(lectures[0][1].id).await.unwrap();
        assert_eq!(next.map(|l| l.id), Some(lectures[1][0].id));
    }

    #[tokio::test]
    async fn test_end_of_course_has_no_next() {
        let Fixture { _dir, storage, lectures, .. } = catalog_with(&[(1, 2), (2, 1)]).await;
        let engine = UnlockEngine::new(storage);

        assert!(engine.find_next_lecture(lectures[1][0].id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_module_gap_stops_exact_traversal() {
        let Fixture { _dir, storage, lectures, .. } = catalog_with(&[(1, 1), (3, 1)]).await;
        let engine = UnlockEngine::new(storage);

        assert!(engine.find_next_lecture(lectures[0][0].id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sorted_traversal_skips_gaps() {
        let Fixture { _dir, storage, lectures, .. } = catalog_with(&[(1, 1), (3, 0), (4, 2)]).await;
        let engine = UnlockEngine::new(storage).with_strategy(Traversal::Sorted.strategy());

        let next = engine.find_next_lecture(lectures[0][0].id).await.unwrap();
        assert_eq!(next.map(|l| l.id), Some(lectures[2][0].id));
    }

    #[tokio::test]
    async fn test_sorted_traversal_skips_order_gaps() {
        let Fixture { _dir, storage, modules, lectures, .. } = catalog_with(&[(1, 1), (2, 1)]).await;
        let appendix = Lecture::new(modules[0].id, "Appendix", 5, "https://videos.example/1/5");
        storage.save_lecture(&appendix).await.unwrap();

        let exact = UnlockEngine::new(storage.clone());
        let sorted = UnlockEngine::new(storage).with_strategy(Traversal::Sorted.strategy());

        let next = exact.find_next_lecture(lectures[0][0].id).await.unwrap();
        assert_eq!(next.map(|l| l.id), Some(lectures[1][0].id));

        let next = sorted.find_next_lecture(lectures[0][0].id).await.unwrap();
        assert_eq!(next.map(|l| l.id), Some(appendix.id));
        let next = sorted.find_next_lecture(appendix.id).await.unwrap();
        assert_eq!(next.map(|l| l.id), Some(lectures[1][0].id));
        assert!(sorted.find_next_lecture(lectures[1][0].id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_lecture_has_no_next() {
        let Fixture { _dir, storage, .. } = catalog_with(&[(1, 1)]).await;
        let engine = UnlockEngine::new(storage);

        assert!(engine.find_next_lecture(LectureId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unlock_next_is_idempotent() {
        let Fixture { _dir, storage, modules, lectures, .. } = catalog_with(&[(1, 2)]).await;
        let engine = UnlockEngine::new(storage);
        let mut enrollment = Enrollment::new(UserId::new("alice"), CourseId::new(), Some(lectures[0][0].id));

        for _ in 0..2 {
            engine
                .unlock_next(&mut enrollment, &modules[0], &lectures[0][0])
                .await
                .unwrap();
        }

        assert_eq!(enrollment.unlocked.len(), 2);
        assert!(enrollment.is_unlocked(lectures[0][1].id));
    }

    #[test]
    fn test_traversal_from_str() {
        assert_eq!("exact".parse::<Traversal>().unwrap(), Traversal::Exact);
        assert_eq!("Sorted".parse::<Traversal>().unwrap(), Traversal::Sorted);
        assert!("sideways".parse::<Traversal>().is_err());
    }
}
