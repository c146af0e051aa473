// src/graph/arena.rs

//! Arena-based task graph.
//!
//! Nodes are addressed by opaque [`TaskId`] handles; dependency edges are
//! kept as adjacency lists in both directions (`dependencies` and
//! `dependents`), always symmetric. A node is either a leaf task (a boxed
//! [`Task`] implementation) or a graph owning an ordered list of children,
//! so graphs nest arbitrarily and a graph satisfies the same scheduling
//! contract as a task.

use std::fmt;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::errors::{Result, TaskdagError};
use crate::graph::name::TaskName;
use crate::task::Task;

/// Opaque handle to a node in a [`TaskGraph`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u32);

impl TaskId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) enum NodePayload {
    Task(Box<dyn Task>),
    Graph { children: Vec<TaskId> },
}

pub(crate) struct NodeSlot {
    pub(crate) name: TaskName,
    pub(crate) parent: Option<TaskId>,
    /// Nodes this node must wait on.
    pub(crate) dependencies: Vec<TaskId>,
    /// Inverse edges, maintained symmetrically.
    pub(crate) dependents: Vec<TaskId>,
    pub(crate) payload: NodePayload,
}

/// Arena holding every node of a (possibly nested) task graph.
///
/// Constructed in a single pass by the project loader; no node is ever
/// removed, and adding a dependency that would create a cycle is rejected
/// eagerly as a programmer error.
#[derive(Default)]
pub struct TaskGraph {
    nodes: Vec<NodeSlot>,
}

impl fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskGraph")
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a graph node. Root graphs have no parent.
    pub fn add_graph(&mut self, name: TaskName, parent: Option<TaskId>) -> Result<TaskId> {
        if let Some(parent) = parent {
            self.expect_graph(parent)?;
        }
        let id = self.push(NodeSlot {
            name,
            parent,
            dependencies: Vec::new(),
            dependents: Vec::new(),
            payload: NodePayload::Graph {
                children: Vec::new(),
            },
        });
        if let Some(parent) = parent {
            self.child_list_mut(parent).push(id);
        }
        Ok(id)
    }

    /// Add a leaf task under the given graph.
    pub fn add_task(
        &mut self,
        name: TaskName,
        parent: TaskId,
        task: Box<dyn Task>,
    ) -> Result<TaskId> {
        self.expect_graph(parent)?;
        let id = self.push(NodeSlot {
            name,
            parent: Some(parent),
            dependencies: Vec::new(),
            dependents: Vec::new(),
            payload: NodePayload::Task(task),
        });
        self.child_list_mut(parent).push(id);
        Ok(id)
    }

    /// Make `node` wait on `on`.
    ///
    /// Idempotent: adding an existing edge is a no-op. Self-dependencies
    /// and edges that would close a cycle are rejected.
    pub fn add_dependency(&mut self, node: TaskId, on: TaskId) -> Result<()> {
        self.check(node)?;
        self.check(on)?;
        if node == on {
            return Err(TaskdagError::Graph(format!(
                "task '{}' cannot depend on itself",
                self.name(node)
            )));
        }
        if self.nodes[node.index()].dependencies.contains(&on) {
            return Ok(());
        }
        self.ensure_acyclic(node, on)?;

        self.nodes[node.index()].dependencies.push(on);
        self.nodes[on.index()].dependents.push(node);
        debug!(node = %self.name(node), on = %self.name(on), "dependency added");
        Ok(())
    }

    /// Convenience for adding several dependencies at once.
    pub fn add_dependencies(&mut self, node: TaskId, on: &[TaskId]) -> Result<()> {
        for &dep in on {
            self.add_dependency(node, dep)?;
        }
        Ok(())
    }

    pub fn name(&self, id: TaskId) -> &TaskName {
        &self.nodes[id.index()].name
    }

    pub fn parent(&self, id: TaskId) -> Option<TaskId> {
        self.nodes[id.index()].parent
    }

    /// Chain of enclosing graphs, innermost first.
    pub fn ancestors(&self, id: TaskId) -> Vec<TaskId> {
        let mut out = Vec::new();
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            out.push(p);
            cur = self.parent(p);
        }
        out
    }

    pub fn is_graph(&self, id: TaskId) -> bool {
        matches!(self.nodes[id.index()].payload, NodePayload::Graph { .. })
    }

    /// Leaf task payload, if this node is not a graph.
    pub fn task(&self, id: TaskId) -> Option<&dyn Task> {
        match &self.nodes[id.index()].payload {
            NodePayload::Task(task) => Some(task.as_ref()),
            NodePayload::Graph { .. } => None,
        }
    }

    /// Children of a graph node in insertion order; empty for leaf tasks.
    pub fn children(&self, id: TaskId) -> &[TaskId] {
        match &self.nodes[id.index()].payload {
            NodePayload::Graph { children } => children,
            NodePayload::Task(_) => &[],
        }
    }

    pub fn dependencies(&self, id: TaskId) -> &[TaskId] {
        &self.nodes[id.index()].dependencies
    }

    pub fn dependents(&self, id: TaskId) -> &[TaskId] {
        &self.nodes[id.index()].dependents
    }

    /// Children of `graph` that have no dependency on a sibling child.
    pub fn inputs(&self, graph: TaskId) -> Vec<TaskId> {
        let children = self.children(graph);
        children
            .iter()
            .copied()
            .filter(|&c| {
                !self.nodes[c.index()]
                    .dependencies
                    .iter()
                    .any(|d| children.contains(d))
            })
            .collect()
    }

    fn push(&mut self, slot: NodeSlot) -> TaskId {
        let id = TaskId(self.nodes.len() as u32);
        self.nodes.push(slot);
        id
    }

    fn child_list_mut(&mut self, graph: TaskId) -> &mut Vec<TaskId> {
        match &mut self.nodes[graph.index()].payload {
            NodePayload::Graph { children } => children,
            NodePayload::Task(_) => unreachable!("checked by expect_graph"),
        }
    }

    fn check(&self, id: TaskId) -> Result<()> {
        if id.index() >= self.nodes.len() {
            return Err(TaskdagError::TaskNotFound(id.to_string()));
        }
        Ok(())
    }

    fn expect_graph(&self, id: TaskId) -> Result<()> {
        self.check(id)?;
        if !self.is_graph(id) {
            return Err(TaskdagError::Graph(format!(
                "'{}' is a leaf task, not a graph",
                self.name(id)
            )));
        }
        Ok(())
    }

    /// Reject the candidate edge `node -> on` if it would close a cycle.
    ///
    /// Builds a petgraph view of the current dependency edges plus the
    /// candidate and topologically sorts it, the same way the project
    /// loader validates declarative dependency declarations.
    fn ensure_acyclic(&self, node: TaskId, on: TaskId) -> Result<()> {
        let mut dag: DiGraphMap<u32, ()> = DiGraphMap::new();
        for (idx, slot) in self.nodes.iter().enumerate() {
            dag.add_node(idx as u32);
            for dep in &slot.dependencies {
                dag.add_edge(idx as u32, dep.0, ());
            }
        }
        dag.add_edge(node.0, on.0, ());

        match toposort(&dag, None) {
            Ok(_) => Ok(()),
            Err(cycle) => {
                let culprit = TaskId(cycle.node_id());
                Err(TaskdagError::Cycle(format!(
                    "adding '{}' -> '{}' closes a cycle through '{}'",
                    self.name(node),
                    self.name(on),
                    self.name(culprit)
                )))
            }
        }
    }
}
