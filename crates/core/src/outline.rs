//! Traversal ordering and derived course outlines.

use serde::{Deserialize, Serialize};
use crate::course::Course;
use crate::lecture::Lecture;
use crate::module::Module;

/// Position of a lecture in course traversal order.
///
/// Ordered by module number first, then lecture order within the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TraversalKey {
    /// Owning module's number
    pub module_number: u32,
    /// Lecture order within the module
    pub lecture_order: u32,
}

impl TraversalKey {
    /// Key for a lecture inside the given module.
    pub fn of(module: &Module, lecture: &Lecture) -> Self {
        Self {
            module_number: module.number,
            lecture_order: lecture.order,
        }
    }
}

/// A module together with its lectures, sorted by order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleOutline {
    /// The module itself
    pub module: Module,
    /// Its lectures, ascending by order
    pub lectures: Vec<Lecture>,
}

/// A course with its full structure, as derived from the catalog at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseOutline {
    /// The course itself
    pub course: Course,
    /// Its modules, ascending by number
    pub modules: Vec<ModuleOutline>,
}

impl CourseOutline {
    /// Assemble an outline, sorting modules by number and lectures by order.
    pub fn new(course: Course, modules: Vec<(Module, Vec<Lecture>)>) -> Self {
        let mut modules: Vec<ModuleOutline> = modules
            .into_iter()
            .map(|(module, mut lectures)| {
                lectures.sort_by_key(|l| l.order);
                ModuleOutline { module, lectures }
            })
            .collect();
        modules.sort_by_key(|m| m.module.number);
        Self { course, modules }
    }

    /// Lectures in traversal order.
    pub fn lectures(&self) -> impl Iterator<Item = (&Module, &Lecture)> {
        self.modules
            .iter()
            .flat_map(|m| m.lectures.iter().map(move |l| (&m.module, l)))
    }

    /// Total number of lectures in the course.
    pub fn lecture_count(&self) -> usize {
        self.modules.iter().map(|m| m.lectures.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traversal_key_orders_by_module_then_lecture() {
        let a = TraversalKey { module_number: 1, lecture_order: 9 };
        let b = TraversalKey { module_number: 2, lecture_order: 1 };
        let c = TraversalKey { module_number: 2, lecture_order: 2 };
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_outline_sorts_structure() {
        let course = Course::new("Rust", "Basics", 0.0);
        let m2 = Module::new(course.id, "Traits", 2);
        let m1 = Module::new(course.id, "Intro", 1);
        let l2 = Lecture::new(m1.id, "Cargo", 2, "https://v/2");
        let l1 = Lecture::new(m1.id, "Hello", 1, "https://v/1");
        let l3 = Lecture::new(m2.id, "Dyn", 1, "https://v/3");

        let outline = CourseOutline::new(
            course,
            vec![(m2, vec![l3.clone()]), (m1, vec![l2.clone(), l1.clone()])],
        );

        let order: Vec<_> = outline.lectures().map(|(_, l)| l.id).collect();
        assert_eq!(order, vec![l1.id, l2.id, l3.id]);
        assert_eq!(outline.lecture_count(), 3);
    }
}
