// src/runner/shell.rs

//! Async execution shell around the pure scheduling core.
//!
//! Each ready task is spawned onto the tokio runtime, waits for one of the
//! runner's concurrency slots, runs its action body as a
//! [`flux`](crate::flux) computation, then reports back over a completion
//! channel. The single `run` loop owns the [`RunCore`], so scheduling
//! decisions stay serialized while task bodies run in parallel.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tracing::{debug, info, warn};

use super::core::RunCore;
use super::plan::RunPlan;
use super::{Action, TaskEvent, TaskOutcome};
use crate::errors::{Result, TaskdagError};
use crate::flux::{self, Element, Step};
use crate::graph::{TaskGraph, TaskId};
use crate::pool::ProcessPool;
use crate::report::{Diagnostic, Reporter, RunReport, Severity};
use crate::store::{MemoryStateStore, StateStore, TaskRecord, now_ms};
use crate::task::{RunProbe, StepContext, task_fingerprint};

type SharedStore = Arc<Mutex<Box<dyn StateStore>>>;
type Subscribers = Vec<mpsc::UnboundedSender<TaskEvent>>;

/// Tuning knobs for one run.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Concurrency cap for task bodies (not child processes; see
    /// [`ProcessPool`]). At least 1.
    pub max_concurrent_tasks: usize,
    /// Restrict the run to these nodes plus their transitive dependencies.
    /// Empty means everything under the root.
    pub targets: Vec<TaskId>,
    /// Run every task even when the incremental check says it is
    /// up to date.
    pub force: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            targets: Vec::new(),
            force: false,
        }
    }
}

/// Executes one action over a task graph.
pub struct Runner {
    graph: Arc<TaskGraph>,
    root: TaskId,
    action: Action,
    options: RunnerOptions,
    store: SharedStore,
    pool: ProcessPool,
    subscribers: Subscribers,
}

struct TaskDone {
    id: TaskId,
    outcome: TaskOutcome,
    duration: Duration,
    diagnostics: Vec<Diagnostic>,
}

impl Runner {
    /// A runner over `graph` rooted at `root`, with an in-memory state
    /// store and a default-sized process pool.
    pub fn new(graph: Arc<TaskGraph>, root: TaskId, action: Action) -> Self {
        Self {
            graph,
            root,
            action,
            options: RunnerOptions::default(),
            store: Arc::new(Mutex::new(Box::new(MemoryStateStore::new()))),
            pool: ProcessPool::with_default_limit(),
            subscribers: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: RunnerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_store(mut self, store: Box<dyn StateStore>) -> Self {
        self.store = Arc::new(Mutex::new(store));
        self
    }

    pub fn with_pool(mut self, pool: ProcessPool) -> Self {
        self.pool = pool;
        self
    }

    /// Register a lifecycle event channel. May be called several times;
    /// every subscriber sees every event.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<TaskEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Run the action over the planned tasks and collect the results.
    pub async fn run(self) -> Result<RunReport> {
        let started = Instant::now();
        let plan = RunPlan::build(&self.graph, self.root, &self.options.targets)?;
        let mut core = RunCore::new(&plan);
        let mut report = RunReport::default();

        info!(action = %self.action, tasks = plan.len(), "run started");
        if plan.is_empty() {
            report.duration = started.elapsed();
            return Ok(report);
        }

        let slots = Arc::new(Semaphore::new(self.options.max_concurrent_tasks.max(1)));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        for id in core.start_ready() {
            self.dispatch(id, Arc::clone(&slots), done_tx.clone());
        }

        while !core.is_finished() {
            let done: TaskDone = done_rx
                .recv()
                .await
                .ok_or_else(|| anyhow!("task completion channel closed mid-run"))?;

            let name = self.graph.name(done.id).clone();
            let key = name.storage_key();
            self.emit(TaskEvent::TaskEnd {
                id: done.id,
                name,
                outcome: done.outcome,
                duration: done.duration,
                diagnostics: done.diagnostics.clone(),
            });
            report.attach(&key, done.diagnostics);
            report.record_outcome(&key, done.outcome);

            let step = core.on_finished(&plan, done.id, done.outcome);
            for skipped in step.newly_skipped {
                let name = self.graph.name(skipped).clone();
                warn!(task = %name, "skipped: an upstream dependency failed");
                report.record_outcome(&name.storage_key(), TaskOutcome::Skipped);
                self.emit(TaskEvent::TaskEnd {
                    id: skipped,
                    name,
                    outcome: TaskOutcome::Skipped,
                    duration: Duration::ZERO,
                    diagnostics: Vec::new(),
                });
            }
            for ready in step.newly_ready {
                self.dispatch(ready, Arc::clone(&slots), done_tx.clone());
            }
        }

        report.duration = started.elapsed();
        info!(
            failed = report.failed,
            duration = ?report.duration,
            "run finished"
        );
        Ok(report)
    }

    fn dispatch(
        &self,
        id: TaskId,
        slots: Arc<Semaphore>,
        done_tx: mpsc::UnboundedSender<TaskDone>,
    ) {
        let graph = Arc::clone(&self.graph);
        let store = Arc::clone(&self.store);
        let pool = self.pool.clone();
        let action = self.action;
        let force = self.options.force;
        let subscribers = self.subscribers.clone();

        tokio::spawn(async move {
            let started = Instant::now();
            let (outcome, diagnostics) = match slots.acquire_owned().await {
                Ok(_permit) => {
                    execute_one(&graph, id, action, force, &store, pool, &subscribers)
                        .await
                        .unwrap_or_else(|e| {
                            (
                                TaskOutcome::Failed,
                                vec![Diagnostic::new(Severity::Fatal, e.to_string())],
                            )
                        })
                }
                Err(_) => (
                    TaskOutcome::Failed,
                    vec![Diagnostic::new(
                        Severity::Fatal,
                        "task slots closed before execution",
                    )],
                ),
            };
            let _ = done_tx.send(TaskDone {
                id,
                outcome,
                duration: started.elapsed(),
                diagnostics,
            });
        });
    }

    fn emit(&self, event: TaskEvent) {
        emit(&self.subscribers, event);
    }
}

/// Run one leaf task: incremental check, flux-driven action body, state
/// record update. Returns the outcome plus the task's own diagnostics;
/// an `Err` means the machinery itself failed, not the task's work.
async fn execute_one(
    graph: &Arc<TaskGraph>,
    id: TaskId,
    action: Action,
    force: bool,
    store: &SharedStore,
    pool: ProcessPool,
    subscribers: &Subscribers,
) -> Result<(TaskOutcome, Vec<Diagnostic>)> {
    let name = graph.name(id).clone();
    emit(
        subscribers,
        TaskEvent::TaskBegin {
            id,
            name: name.clone(),
        },
    );

    let task = graph.task(id).ok_or_else(|| {
        TaskdagError::Graph(format!("'{name}' is a graph node, not a runnable task"))
    })?;
    let key = name.storage_key();
    let record = lock_store(store)?.load(&key)?;
    let current = task_fingerprint(&name, task);
    let last_success = record.as_ref().and_then(|r| r.last_success());

    // Always consult the task, even with no recorded history: the default
    // policy answers "run" in that case, but overrides may know better
    // (e.g. a pure content comparison).
    if action == Action::Build && !force {
        let probe = RunProbe {
            action,
            last_success,
            stored: record.as_ref().and_then(|r| r.fingerprint.clone()),
            current: current.clone(),
        };
        if !task.is_run_required(&probe)? {
            debug!(task = %name, "up to date");
            return Ok((TaskOutcome::UpToDate, Vec::new()));
        }
    }

    debug!(task = %name, %action, "running");
    let context = StepContext {
        action,
        reporter: Reporter::new(),
        pool,
        last_success,
    };
    let (tx, rx) = oneshot::channel();
    let graph_for_step = Arc::clone(graph);
    let body = Element::step(move |step: Step<StepContext>| {
        match graph_for_step.task(id) {
            Some(task) => match action {
                Action::Build => task.run(step),
                Action::Clean => task.clean(step),
                Action::Generate => task.generate(step),
            },
            // Unreachable as long as the graph is immutable during a run.
            None => step.advance(),
        }
    });
    flux::run(context, vec![body], move |flux| {
        let result = flux.with(|ctx| (ctx.reporter.failed(), ctx.reporter.diagnostics().to_vec()));
        let _ = tx.send(result);
    });
    let (failed, diagnostics) = rx
        .await
        .map_err(|_| anyhow!("task '{name}' dropped its step without finishing"))?;

    let ended = now_ms();
    if !failed {
        match action {
            Action::Build => {
                lock_store(store)?.save(
                    &key,
                    TaskRecord {
                        fingerprint: current,
                        last_success_ms: ended,
                        last_run_ms: ended,
                    },
                )?;
            }
            Action::Clean => lock_store(store)?.remove(&key)?,
            Action::Generate => {}
        }
    } else if action == Action::Build {
        // A failed build invalidates any previously recorded success.
        lock_store(store)?.save(
            &key,
            TaskRecord {
                fingerprint: None,
                last_success_ms: 0,
                last_run_ms: ended,
            },
        )?;
    }

    let outcome = if failed {
        TaskOutcome::Failed
    } else {
        TaskOutcome::Success
    };
    Ok((outcome, diagnostics))
}

fn emit(subscribers: &Subscribers, event: TaskEvent) {
    for subscriber in subscribers {
        let _ = subscriber.send(event.clone());
    }
}

fn lock_store(store: &SharedStore) -> Result<MutexGuard<'_, Box<dyn StateStore>>> {
    store
        .lock()
        .map_err(|_| TaskdagError::Store("state store lock poisoned".into()))
}
