#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

use taskdag::flux::Step;
use taskdag::graph::{TaskGraph, TaskId, TaskName};
use taskdag::task::{StepContext, Task};

/// Shared record of which scripted tasks ran, in completion order.
#[derive(Clone, Default)]
pub struct ExecutionLog {
    inner: Arc<Mutex<Vec<String>>>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str) {
        self.inner.lock().unwrap().push(name.to_string());
    }

    pub fn entries(&self) -> Vec<String> {
        self.inner.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.inner.lock().unwrap().iter().position(|n| n == name)
    }

    /// Whether `first` completed before `second`; false if either never ran.
    pub fn ran_before(&self, first: &str, second: &str) -> bool {
        match (self.position(first), self.position(second)) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        }
    }
}

/// A fake task that:
/// - records its name into an `ExecutionLog` when run
/// - succeeds, or reports a scripted error diagnostic
/// - optionally sleeps first, to exercise concurrency paths.
pub struct ScriptedTask {
    name: String,
    log: ExecutionLog,
    fail: bool,
    delay: Option<Duration>,
    key: Option<Value>,
}

impl ScriptedTask {
    pub fn succeeding(name: &str, log: &ExecutionLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            fail: false,
            delay: None,
            key: None,
        }
    }

    pub fn failing(name: &str, log: &ExecutionLog) -> Self {
        Self {
            fail: true,
            ..Self::succeeding(name, log)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Override the structural key (the default derives from the name, so
    /// changing it simulates a reconfigured task).
    pub fn with_key(mut self, key: Value) -> Self {
        self.key = Some(key);
        self
    }
}

impl Task for ScriptedTask {
    fn unique_key(&self) -> Option<Value> {
        Some(
            self.key
                .clone()
                .unwrap_or_else(|| json!({ "scripted": self.name })),
        )
    }

    fn run(&self, step: Step<StepContext>) {
        let name = self.name.clone();
        let log = self.log.clone();
        let fail = self.fail;
        let delay = self.delay;
        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            log.record(&name);
            if fail {
                step.with(|ctx| ctx.reporter.error(format!("scripted failure in '{name}'")));
            }
            step.advance();
        });
    }
}

/// Builder for small task graphs to simplify test setup.
pub struct GraphBuilder {
    graph: TaskGraph,
    root: TaskId,
}

impl GraphBuilder {
    pub fn new() -> Self {
        let mut graph = TaskGraph::new();
        let root = graph
            .add_graph(TaskName::new("graph", "root"), None)
            .expect("fresh graph accepts a root");
        Self { graph, root }
    }

    pub fn root(&self) -> TaskId {
        self.root
    }

    pub fn subgraph(&mut self, name: &str) -> TaskId {
        self.subgraph_in(self.root, name)
    }

    pub fn subgraph_in(&mut self, parent: TaskId, name: &str) -> TaskId {
        self.graph
            .add_graph(TaskName::new("graph", name), Some(parent))
            .expect("builder parents are graphs")
    }

    pub fn task(&mut self, name: &str, task: impl Task + 'static) -> TaskId {
        self.task_in(self.root, name, task)
    }

    pub fn task_in(&mut self, parent: TaskId, name: &str, task: impl Task + 'static) -> TaskId {
        self.graph
            .add_task(TaskName::new("test", name), parent, Box::new(task))
            .expect("builder parents are graphs")
    }

    pub fn dep(&mut self, node: TaskId, on: TaskId) -> &mut Self {
        self.graph
            .add_dependency(node, on)
            .expect("builder graphs stay acyclic");
        self
    }

    pub fn build(self) -> (Arc<TaskGraph>, TaskId) {
        (Arc::new(self.graph), self.root)
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}
