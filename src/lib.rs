// src/lib.rs

//! taskdag: a dependency-aware task execution engine.
//!
//! A build is modeled as a [`TaskGraph`]: an arena of nodes where leaves
//! are units of work implementing the [`Task`] trait and interior nodes
//! group related leaves. The [`Runner`] flattens the graph into a plan,
//! runs tasks as soon as their dependencies are satisfied (bounded by a
//! concurrency cap), skips work the incremental state says is already
//! done, and aggregates per-task diagnostics into a [`RunReport`].
//!
//! Task bodies are [`flux`] computations: ordered steps that may finish
//! synchronously or park themselves in an async callback, with parallel
//! groups joined through a [`Barrier`](flux::Barrier). Child processes go
//! through a shared [`ProcessPool`] so that task-level parallelism never
//! over-commits the machine.

pub mod errors;
pub mod flux;
pub mod graph;
pub mod logging;
pub mod pool;
pub mod report;
pub mod runner;
pub mod store;
pub mod task;
pub mod tasks;

pub use errors::{Result, TaskdagError};
pub use graph::{TaskGraph, TaskId, TaskName};
pub use pool::{ProcessCommand, ProcessOutput, ProcessPool};
pub use report::{Diagnostic, Reporter, RunReport, Severity};
pub use runner::{Action, RunPlan, Runner, RunnerOptions, TaskEvent, TaskOutcome};
pub use store::{FileStateStore, MemoryStateStore, StateStore, TaskRecord};
pub use task::{Fingerprint, RunProbe, StepContext, Task};
