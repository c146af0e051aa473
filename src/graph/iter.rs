// src/graph/iter.rs

//! Graph traversal: child enumeration, topological iteration, lookup.

use std::collections::HashSet;

use crate::graph::arena::{TaskGraph, TaskId};

/// Lazy iterator over a graph's children in insertion order, recursing into
/// child graphs when constructed with `recursive = true`.
///
/// Each node is yielded exactly once; the iterator is restartable by asking
/// the graph for a fresh one.
pub struct AllTasks<'g> {
    graph: &'g TaskGraph,
    recursive: bool,
    /// Stack of (children slice, next index) frames, outermost first.
    frames: Vec<(TaskId, usize)>,
}

impl<'g> AllTasks<'g> {
    pub(crate) fn new(graph: &'g TaskGraph, root: TaskId, recursive: bool) -> Self {
        Self {
            graph,
            recursive,
            frames: vec![(root, 0)],
        }
    }
}

impl Iterator for AllTasks<'_> {
    type Item = TaskId;

    fn next(&mut self) -> Option<TaskId> {
        loop {
            let (owner, idx) = *self.frames.last()?;
            let children = self.graph.children(owner);
            if idx >= children.len() {
                self.frames.pop();
                continue;
            }
            self.frames.last_mut().unwrap().1 += 1;
            let child = children[idx];
            if self.recursive && self.graph.is_graph(child) {
                self.frames.push((child, 0));
            }
            return Some(child);
        }
    }
}

impl TaskGraph {
    /// Enumerate the children of `root` in insertion order.
    ///
    /// With `recursive = true` the iterator also descends into child
    /// graphs, yielding the transitive closure of reachable nodes, each
    /// exactly once.
    pub fn all_tasks(&self, root: TaskId, recursive: bool) -> AllTasks<'_> {
        AllTasks::new(self, root, recursive)
    }

    /// Topological walk over the children of `root`: a node is visited only
    /// after every dependency it has on a sibling of the same graph.
    ///
    /// With `recursive = true`, child graphs are visited (in topological
    /// position) and then their own children are walked the same way.
    /// The visitor returning `false` stops the whole walk early; the
    /// return value tells whether the walk ran to completion.
    pub fn iterate(
        &self,
        root: TaskId,
        recursive: bool,
        visitor: &mut dyn FnMut(TaskId) -> bool,
    ) -> bool {
        let mut visited = HashSet::new();
        self.iterate_graph(root, recursive, visitor, &mut visited)
    }

    /// First node under `root` matching `predicate`, in topological order.
    pub fn find_task(
        &self,
        root: TaskId,
        recursive: bool,
        predicate: impl Fn(TaskId) -> bool,
    ) -> Option<TaskId> {
        let mut found = None;
        self.iterate(root, recursive, &mut |id| {
            if predicate(id) {
                found = Some(id);
                false
            } else {
                true
            }
        });
        found
    }

    fn iterate_graph(
        &self,
        owner: TaskId,
        recursive: bool,
        visitor: &mut dyn FnMut(TaskId) -> bool,
        visited: &mut HashSet<TaskId>,
    ) -> bool {
        for &child in self.children(owner) {
            if !self.visit_after_deps(owner, child, recursive, visitor, visited) {
                return false;
            }
        }
        true
    }

    fn visit_after_deps(
        &self,
        owner: TaskId,
        node: TaskId,
        recursive: bool,
        visitor: &mut dyn FnMut(TaskId) -> bool,
        visited: &mut HashSet<TaskId>,
    ) -> bool {
        if visited.contains(&node) {
            return true;
        }
        // Intra-graph dependencies first; construction guarantees there is
        // no cycle to recurse into.
        let siblings = self.children(owner);
        for &dep in self.dependencies(node) {
            if siblings.contains(&dep)
                && !self.visit_after_deps(owner, dep, recursive, visitor, visited)
            {
                return false;
            }
        }
        if !visited.insert(node) {
            return true;
        }
        if !visitor(node) {
            return false;
        }
        if recursive && self.is_graph(node) {
            return self.iterate_graph(node, recursive, visitor, visited);
        }
        true
    }
}
