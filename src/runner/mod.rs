// src/runner/mod.rs

//! Dependency-aware task execution.
//!
//! The runner splits into a pure scheduling [`core`] (which tasks may start,
//! what a completion unlocks) and an async [shell](Runner) that owns
//! spawning, the concurrency cap, state-store updates and event delivery.
//! Nested graphs are flattened into a [`RunPlan`] of leaf tasks before
//! anything runs.

pub mod core;
pub mod plan;
mod shell;

pub use plan::RunPlan;
pub use shell::{Runner, RunnerOptions};

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::graph::{TaskId, TaskName};
use crate::report::Diagnostic;

/// What a run asks of each task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Produce outputs, incrementally.
    Build,
    /// Remove previously produced outputs.
    Clean,
    /// Emit auxiliary files (IDE metadata and the like).
    Generate,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Build => "build",
            Action::Clean => "clean",
            Action::Generate => "generate",
        })
    }
}

/// Terminal state of one planned task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskOutcome {
    /// Ran and reported no error diagnostics.
    Success,
    /// Not run; the incremental check found nothing to do.
    UpToDate,
    /// Ran and reported at least one error, or its execution itself
    /// errored.
    Failed,
    /// Never ran; a transitive dependency failed.
    Skipped,
}

impl TaskOutcome {
    /// Whether dependents may proceed.
    pub fn is_success(self) -> bool {
        matches!(self, TaskOutcome::Success | TaskOutcome::UpToDate)
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskOutcome::Success => "success",
            TaskOutcome::UpToDate => "up-to-date",
            TaskOutcome::Failed => "failed",
            TaskOutcome::Skipped => "skipped",
        })
    }
}

/// Lifecycle notification delivered to [`Runner::subscribe`] channels.
///
/// Every started task produces exactly one `TaskBegin` followed by exactly
/// one `TaskEnd`; a skipped task produces a single `TaskEnd` with outcome
/// [`TaskOutcome::Skipped`].
#[derive(Debug, Clone)]
pub enum TaskEvent {
    TaskBegin {
        id: TaskId,
        name: TaskName,
    },
    TaskEnd {
        id: TaskId,
        name: TaskName,
        outcome: TaskOutcome,
        duration: Duration,
        diagnostics: Vec<Diagnostic>,
    },
}
