// src/runner/plan.rs

//! Run plan: the set of leaf tasks a run must execute, with nested graphs
//! flattened away.
//!
//! A graph participates in scheduling only through its children: each leaf
//! inherits the dependencies of every enclosing graph, and a dependency
//! *on* a graph expands to all of that graph's leaves. The scheduler core
//! therefore only ever deals in leaf tasks, and a graph is Done exactly
//! when all of its children are.

use std::collections::{HashMap, HashSet};

use crate::errors::Result;
use crate::graph::{TaskGraph, TaskId};

#[derive(Debug, Default)]
pub(crate) struct PlanNode {
    pub deps: Vec<TaskId>,
    pub dependents: Vec<TaskId>,
}

/// The flattened, target-filtered execution plan for one run.
#[derive(Debug, Default)]
pub struct RunPlan {
    nodes: HashMap<TaskId, PlanNode>,
}

impl RunPlan {
    /// Build the plan for `root` (a graph node).
    ///
    /// With `targets` empty every leaf under `root` is planned; otherwise
    /// only the requested targets (graphs expand to their leaves) plus
    /// their transitive dependencies.
    pub fn build(graph: &TaskGraph, root: TaskId, targets: &[TaskId]) -> Result<RunPlan> {
        let seeds: Vec<TaskId> = if targets.is_empty() {
            leaves_of(graph, root)
        } else {
            let mut seeds = Vec::new();
            for &target in targets {
                for leaf in leaves_of(graph, target) {
                    if !seeds.contains(&leaf) {
                        seeds.push(leaf);
                    }
                }
            }
            seeds
        };

        // Close over effective dependencies so that a target subset still
        // runs everything it transitively needs.
        let mut nodes: HashMap<TaskId, PlanNode> = HashMap::new();
        let mut queue: Vec<TaskId> = seeds;
        let mut enqueued: HashSet<TaskId> = queue.iter().copied().collect();

        while let Some(leaf) = queue.pop() {
            let deps = effective_deps(graph, leaf);
            for &dep in &deps {
                if enqueued.insert(dep) {
                    queue.push(dep);
                }
            }
            nodes.entry(leaf).or_default().deps = deps;
        }

        // Inverse edges for completion propagation.
        let ids: Vec<TaskId> = nodes.keys().copied().collect();
        for id in ids {
            let deps = nodes[&id].deps.clone();
            for dep in deps {
                nodes.entry(dep).or_default().dependents.push(id);
            }
        }

        Ok(RunPlan { nodes })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn deps(&self, id: TaskId) -> &[TaskId] {
        self.nodes.get(&id).map(|n| n.deps.as_slice()).unwrap_or(&[])
    }

    pub fn dependents(&self, id: TaskId) -> &[TaskId] {
        self.nodes
            .get(&id)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }
}

/// Leaf tasks reachable from `node`: itself if it is a leaf, otherwise all
/// leaf descendants in insertion order.
fn leaves_of(graph: &TaskGraph, node: TaskId) -> Vec<TaskId> {
    if !graph.is_graph(node) {
        return vec![node];
    }
    graph
        .all_tasks(node, true)
        .filter(|&id| !graph.is_graph(id))
        .collect()
}

/// Direct dependencies of `leaf` in the flattened plan: its own edges plus
/// the edges of every enclosing graph, each expanded to leaf tasks.
fn effective_deps(graph: &TaskGraph, leaf: TaskId) -> Vec<TaskId> {
    let mut out = Vec::new();
    let mut sources = vec![leaf];
    sources.extend(graph.ancestors(leaf));

    for source in sources {
        for &dep in graph.dependencies(source) {
            for dep_leaf in leaves_of(graph, dep) {
                if dep_leaf != leaf && !out.contains(&dep_leaf) {
                    out.push(dep_leaf);
                }
            }
        }
    }
    out
}
