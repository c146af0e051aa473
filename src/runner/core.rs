// src/runner/core.rs

//! Pure scheduling core.
//!
//! Tracks per-task state over a [`RunPlan`] and answers two questions with
//! no IO and no clocks: which tasks may start now, and, when one finishes,
//! which become ready or must be skipped. The async shell owns everything
//! else (spawning, timing, events).

use std::collections::HashMap;

use super::plan::RunPlan;
use super::TaskOutcome;
use crate::graph::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    /// Not yet startable; `unmet` direct dependencies are unfinished.
    Waiting { unmet: usize },
    Running,
    Done(TaskOutcome),
}

/// Effect of one task finishing.
#[derive(Debug, Default)]
pub struct CoreStep {
    /// Tasks whose last dependency just satisfied; now Running.
    pub newly_ready: Vec<TaskId>,
    /// Tasks that can never run because a transitive dependency failed.
    pub newly_skipped: Vec<TaskId>,
    /// Every planned task is now Done.
    pub finished: bool,
}

#[derive(Debug)]
pub struct RunCore {
    states: HashMap<TaskId, NodeState>,
    remaining: usize,
}

impl RunCore {
    pub fn new(plan: &RunPlan) -> Self {
        let states: HashMap<TaskId, NodeState> = plan
            .tasks()
            .map(|id| {
                (
                    id,
                    NodeState::Waiting {
                        unmet: plan.deps(id).len(),
                    },
                )
            })
            .collect();
        let remaining = states.len();
        Self { states, remaining }
    }

    /// Mark every dependency-free task Running and return them. Called
    /// once, before the first completion.
    pub fn start_ready(&mut self) -> Vec<TaskId> {
        let mut ready: Vec<TaskId> = self
            .states
            .iter()
            .filter(|(_, s)| matches!(s, NodeState::Waiting { unmet: 0 }))
            .map(|(&id, _)| id)
            .collect();
        ready.sort();
        for id in &ready {
            self.states.insert(*id, NodeState::Running);
        }
        ready
    }

    /// Record `outcome` for `id` and propagate: satisfied dependents of a
    /// successful task become ready, dependents of a failed (or skipped)
    /// task are skipped transitively.
    pub fn on_finished(&mut self, plan: &RunPlan, id: TaskId, outcome: TaskOutcome) -> CoreStep {
        let mut step = CoreStep::default();
        self.settle(id, outcome);

        if outcome.is_success() {
            for &dependent in plan.dependents(id) {
                if let Some(NodeState::Waiting { unmet }) = self.states.get(&dependent).copied() {
                    let unmet = unmet.saturating_sub(1);
                    if unmet == 0 {
                        self.states.insert(dependent, NodeState::Running);
                        step.newly_ready.push(dependent);
                    } else {
                        self.states.insert(dependent, NodeState::Waiting { unmet });
                    }
                }
            }
        } else {
            let mut stack: Vec<TaskId> = plan.dependents(id).to_vec();
            while let Some(next) = stack.pop() {
                if matches!(self.states.get(&next), Some(NodeState::Waiting { .. })) {
                    self.settle(next, TaskOutcome::Skipped);
                    step.newly_skipped.push(next);
                    stack.extend_from_slice(plan.dependents(next));
                }
            }
        }

        step.newly_ready.sort();
        step.newly_skipped.sort();
        step.finished = self.remaining == 0;
        step
    }

    pub fn is_finished(&self) -> bool {
        self.remaining == 0
    }

    pub fn outcome(&self, id: TaskId) -> Option<TaskOutcome> {
        match self.states.get(&id) {
            Some(NodeState::Done(outcome)) => Some(*outcome),
            _ => None,
        }
    }

    fn settle(&mut self, id: TaskId, outcome: TaskOutcome) {
        let prev = self.states.insert(id, NodeState::Done(outcome));
        if !matches!(prev, Some(NodeState::Done(_))) {
            self.remaining -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{TaskGraph, TaskName};
    use crate::task::{StepContext, Task};
    use crate::flux::Step;

    struct Noop;

    impl Task for Noop {
        fn run(&self, step: Step<StepContext>) {
            step.advance();
        }
    }

    fn leaf(graph: &mut TaskGraph, root: TaskId, name: &str) -> TaskId {
        graph
            .add_task(TaskName::new("t", name), root, Box::new(Noop))
            .unwrap()
    }

    /// root { a, b -> a, c -> a } plus an independent d.
    fn diamond() -> (TaskGraph, TaskId, [TaskId; 4]) {
        let mut graph = TaskGraph::new();
        let root = graph.add_graph(TaskName::new("graph", "root"), None).unwrap();
        let a = leaf(&mut graph, root, "a");
        let b = leaf(&mut graph, root, "b");
        let c = leaf(&mut graph, root, "c");
        let d = leaf(&mut graph, root, "d");
        graph.add_dependency(b, a).unwrap();
        graph.add_dependency(c, a).unwrap();
        (graph, root, [a, b, c, d])
    }

    #[test]
    fn success_releases_dependents() {
        let (graph, root, [a, b, c, d]) = diamond();
        let plan = RunPlan::build(&graph, root, &[]).unwrap();
        let mut core = RunCore::new(&plan);

        let ready = core.start_ready();
        assert_eq!(ready, vec![a, d]);

        let step = core.on_finished(&plan, a, TaskOutcome::Success);
        assert_eq!(step.newly_ready, vec![b, c]);
        assert!(step.newly_skipped.is_empty());
        assert!(!step.finished);

        core.on_finished(&plan, d, TaskOutcome::Success);
        core.on_finished(&plan, b, TaskOutcome::Success);
        let last = core.on_finished(&plan, c, TaskOutcome::Success);
        assert!(last.finished);
    }

    #[test]
    fn up_to_date_counts_as_success() {
        let (graph, root, [a, b, c, _]) = diamond();
        let plan = RunPlan::build(&graph, root, &[]).unwrap();
        let mut core = RunCore::new(&plan);
        core.start_ready();

        let step = core.on_finished(&plan, a, TaskOutcome::UpToDate);
        assert_eq!(step.newly_ready, vec![b, c]);
    }

    #[test]
    fn failure_skips_transitive_dependents_only() {
        let mut graph = TaskGraph::new();
        let root = graph.add_graph(TaskName::new("graph", "root"), None).unwrap();
        let a = leaf(&mut graph, root, "a");
        let b = leaf(&mut graph, root, "b");
        let c = leaf(&mut graph, root, "c");
        let d = leaf(&mut graph, root, "d");
        graph.add_dependency(b, a).unwrap();
        graph.add_dependency(c, b).unwrap();

        let plan = RunPlan::build(&graph, root, &[]).unwrap();
        let mut core = RunCore::new(&plan);
        core.start_ready();

        let step = core.on_finished(&plan, a, TaskOutcome::Failed);
        assert_eq!(step.newly_skipped, vec![b, c]);
        assert!(step.newly_ready.is_empty());
        assert!(!step.finished);
        assert_eq!(core.outcome(b), Some(TaskOutcome::Skipped));

        // The disjoint task still runs to completion.
        let last = core.on_finished(&plan, d, TaskOutcome::Success);
        assert!(last.finished);
    }

    #[test]
    fn target_subset_pulls_in_dependencies() {
        let (graph, root, [a, b, _c, _d]) = diamond();
        let plan = RunPlan::build(&graph, root, &[b]).unwrap();
        assert_eq!(plan.len(), 2);
        assert!(plan.contains(a) && plan.contains(b));

        let mut core = RunCore::new(&plan);
        assert_eq!(core.start_ready(), vec![a]);
        let step = core.on_finished(&plan, a, TaskOutcome::Success);
        assert_eq!(step.newly_ready, vec![b]);
    }

    #[test]
    fn depending_on_a_graph_waits_for_every_leaf() {
        let mut graph = TaskGraph::new();
        let root = graph.add_graph(TaskName::new("graph", "root"), None).unwrap();
        let sub = graph.add_graph(TaskName::new("graph", "sub"), Some(root)).unwrap();
        let s1 = leaf(&mut graph, sub, "s1");
        let s2 = leaf(&mut graph, sub, "s2");
        let link = leaf(&mut graph, root, "link");
        graph.add_dependency(link, sub).unwrap();

        let plan = RunPlan::build(&graph, root, &[]).unwrap();
        assert_eq!(plan.deps(link), &[s1, s2]);

        let mut core = RunCore::new(&plan);
        assert_eq!(core.start_ready(), vec![s1, s2]);
        let step = core.on_finished(&plan, s1, TaskOutcome::Success);
        assert!(step.newly_ready.is_empty());
        let step = core.on_finished(&plan, s2, TaskOutcome::Success);
        assert_eq!(step.newly_ready, vec![link]);
    }

    #[test]
    fn graph_dependency_gates_all_children() {
        let mut graph = TaskGraph::new();
        let root = graph.add_graph(TaskName::new("graph", "root"), None).unwrap();
        let sub = graph.add_graph(TaskName::new("graph", "sub"), Some(root)).unwrap();
        let s1 = leaf(&mut graph, sub, "s1");
        let s2 = leaf(&mut graph, sub, "s2");
        let gate = leaf(&mut graph, root, "gate");
        graph.add_dependency(sub, gate).unwrap();

        let plan = RunPlan::build(&graph, root, &[]).unwrap();
        assert_eq!(plan.deps(s1), &[gate]);
        assert_eq!(plan.deps(s2), &[gate]);

        let mut core = RunCore::new(&plan);
        assert_eq!(core.start_ready(), vec![gate]);
        let step = core.on_finished(&plan, gate, TaskOutcome::Success);
        assert_eq!(step.newly_ready, vec![s1, s2]);
    }
}
