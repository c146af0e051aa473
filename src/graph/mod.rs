// src/graph/mod.rs

//! Task graph data model.
//!
//! - [`name`] defines the structured [`TaskName`] identity.
//! - [`arena`] holds the node arena with two-way dependency adjacency.
//! - [`iter`] implements child enumeration, topological iteration and
//!   lookup.

pub mod arena;
pub mod iter;
pub mod name;

pub use arena::{TaskGraph, TaskId};
pub use iter::AllTasks;
pub use name::TaskName;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TaskdagError;
    use crate::flux::Step;
    use crate::task::{StepContext, Task};

    struct Noop;

    impl Task for Noop {
        fn run(&self, step: Step<StepContext>) {
            step.advance();
        }
    }

    fn leaf(g: &mut TaskGraph, parent: TaskId, name: &str) -> TaskId {
        g.add_task(TaskName::new("noop", name), parent, Box::new(Noop))
            .unwrap()
    }

    #[test]
    fn dependency_edges_stay_symmetric() {
        let mut g = TaskGraph::new();
        let root = g.add_graph(TaskName::new("graph", "root"), None).unwrap();
        let a = leaf(&mut g, root, "a");
        let b = leaf(&mut g, root, "b");

        g.add_dependency(b, a).unwrap();
        // Idempotent.
        g.add_dependency(b, a).unwrap();

        assert_eq!(g.dependencies(b), &[a]);
        assert_eq!(g.dependents(a), &[b]);
        assert_eq!(g.dependencies(a), &[]);
    }

    #[test]
    fn self_and_cyclic_dependencies_are_rejected() {
        let mut g = TaskGraph::new();
        let root = g.add_graph(TaskName::new("graph", "root"), None).unwrap();
        let a = leaf(&mut g, root, "a");
        let b = leaf(&mut g, root, "b");
        let c = leaf(&mut g, root, "c");

        assert!(matches!(
            g.add_dependency(a, a),
            Err(TaskdagError::Graph(_))
        ));

        g.add_dependency(b, a).unwrap();
        g.add_dependency(c, b).unwrap();
        assert!(matches!(
            g.add_dependency(a, c),
            Err(TaskdagError::Cycle(_))
        ));
        // The failed attempt must not leave a half-added edge behind.
        assert_eq!(g.dependencies(a), &[]);
        assert_eq!(g.dependents(c), &[]);
    }

    #[test]
    fn inputs_are_children_without_sibling_deps() {
        let mut g = TaskGraph::new();
        let root = g.add_graph(TaskName::new("graph", "root"), None).unwrap();
        let a = leaf(&mut g, root, "a");
        let b = leaf(&mut g, root, "b");
        let c = leaf(&mut g, root, "c");
        g.add_dependency(b, a).unwrap();
        g.add_dependency(c, a).unwrap();

        assert_eq!(g.inputs(root), vec![a]);
    }

    #[test]
    fn all_tasks_recursive_yields_closure_once_in_insertion_order() {
        let mut g = TaskGraph::new();
        let root = g.add_graph(TaskName::new("graph", "root"), None).unwrap();
        let a = leaf(&mut g, root, "a");
        let sub = g
            .add_graph(TaskName::new("graph", "sub"), Some(root))
            .unwrap();
        let s1 = leaf(&mut g, sub, "s1");
        let s2 = leaf(&mut g, sub, "s2");
        let b = leaf(&mut g, root, "b");

        let shallow: Vec<_> = g.all_tasks(root, false).collect();
        assert_eq!(shallow, vec![a, sub, b]);

        let deep: Vec<_> = g.all_tasks(root, true).collect();
        assert_eq!(deep, vec![a, sub, s1, s2, b]);
    }

    #[test]
    fn iterate_respects_topological_order_and_early_stop() {
        let mut g = TaskGraph::new();
        let root = g.add_graph(TaskName::new("graph", "root"), None).unwrap();
        // Insertion order deliberately conflicts with dependency order.
        let late = leaf(&mut g, root, "late");
        let early = leaf(&mut g, root, "early");
        g.add_dependency(late, early).unwrap();

        let mut order = Vec::new();
        let completed = g.iterate(root, false, &mut |id| {
            order.push(id);
            true
        });
        assert!(completed);
        assert_eq!(order, vec![early, late]);

        // Early stop: visitor halts the walk at the first node.
        let mut seen = 0;
        let completed = g.iterate(root, false, &mut |_| {
            seen += 1;
            false
        });
        assert!(!completed);
        assert_eq!(seen, 1);
    }

    #[test]
    fn find_task_returns_first_topological_match() {
        let mut g = TaskGraph::new();
        let root = g.add_graph(TaskName::new("graph", "root"), None).unwrap();
        let a = leaf(&mut g, root, "a");
        let b = leaf(&mut g, root, "b");
        g.add_dependency(b, a).unwrap();

        let hit = g.find_task(root, true, |id| g.name(id).name == "b");
        assert_eq!(hit, Some(b));
        let miss = g.find_task(root, true, |id| g.name(id).name == "zz");
        assert_eq!(miss, None);
    }
}
