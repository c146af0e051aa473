// src/report.rs

//! Task diagnostics and aggregated run reporting.
//!
//! Expected task failures are *values*: a step reports a [`Diagnostic`] of
//! severity [`Severity::Error`] or [`Severity::Fatal`] through its
//! [`Reporter`] and finishes normally. The [`Runner`](crate::runner::Runner)
//! collects every task's reporter into a [`RunReport`].

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::graph::{TaskGraph, TaskId};
use crate::runner::TaskOutcome;

/// Severity of a single diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Note,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// Whether a diagnostic of this severity marks the task as failed.
    pub fn is_failure(self) -> bool {
        matches!(self, Severity::Error | Severity::Fatal)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal error",
        };
        f.write_str(s)
    }
}

/// A single diagnostic attached to a task execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Path or task identity the diagnostic refers to, if any.
    pub path: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}: {}: {}", path, self.severity, self.message),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

/// Per-task diagnostic collector handed to running steps.
#[derive(Debug, Default)]
pub struct Reporter {
    diagnostics: Vec<Diagnostic>,
    failed: bool,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic; an error or fatal diagnostic marks the task
    /// as failed.
    pub fn diagnostic(&mut self, diag: Diagnostic) {
        if diag.severity.is_failure() {
            self.failed = true;
        }
        self.diagnostics.push(diag);
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.diagnostic(Diagnostic::new(Severity::Note, message));
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.diagnostic(Diagnostic::new(Severity::Warning, message));
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.diagnostic(Diagnostic::new(Severity::Error, message));
    }

    pub fn fatal(&mut self, message: impl Into<String>) {
        self.diagnostic(Diagnostic::new(Severity::Fatal, message));
    }

    /// Force the failed flag without attaching a diagnostic (used when an
    /// upstream dependency failed).
    pub fn mark_failed(&mut self) {
        self.failed = true;
    }

    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Consume the reporter, yielding its diagnostics.
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

/// Aggregated result of a whole [`Runner`](crate::runner::Runner) run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Diagnostics per task identity, in completion order within each task.
    pub diagnostics: BTreeMap<String, Vec<Diagnostic>>,
    /// Terminal outcome per task identity.
    pub outcomes: BTreeMap<String, TaskOutcome>,
    /// Whether at least one task failed (or was skipped due to a failure).
    pub failed: bool,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}

impl RunReport {
    pub fn attach(&mut self, task: &str, diagnostics: Vec<Diagnostic>) {
        if diagnostics.is_empty() {
            return;
        }
        self.diagnostics
            .entry(task.to_string())
            .or_default()
            .extend(diagnostics);
    }

    pub fn record_outcome(&mut self, task: &str, outcome: TaskOutcome) {
        if !outcome.is_success() {
            self.failed = true;
        }
        self.outcomes.insert(task.to_string(), outcome);
    }

    pub fn outcome_of(&self, task: &str) -> Option<TaskOutcome> {
        self.outcomes.get(task).copied()
    }

    /// Aggregate outcome of a graph node: `Failed` if any leaf under it
    /// failed, else `Skipped` if any was skipped, else `UpToDate` if no
    /// leaf actually ran, else `Success`. `None` when no leaf under the
    /// node was part of the run.
    pub fn graph_outcome(&self, graph: &TaskGraph, node: TaskId) -> Option<TaskOutcome> {
        let mut seen = None;
        for leaf in graph.all_tasks(node, true) {
            if graph.is_graph(leaf) {
                continue;
            }
            let outcome = match self.outcome_of(&graph.name(leaf).storage_key()) {
                Some(outcome) => outcome,
                None => continue,
            };
            seen = Some(match (seen, outcome) {
                (_, TaskOutcome::Failed) | (Some(TaskOutcome::Failed), _) => TaskOutcome::Failed,
                (_, TaskOutcome::Skipped) | (Some(TaskOutcome::Skipped), _) => TaskOutcome::Skipped,
                (Some(TaskOutcome::Success), _) | (_, TaskOutcome::Success) => TaskOutcome::Success,
                _ => TaskOutcome::UpToDate,
            });
        }
        seen
    }

    /// Count diagnostics of the given severity across all tasks.
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .values()
            .flatten()
            .filter(|d| d.severity == severity)
            .count()
    }

    /// Human-readable summary grouped by severity, most severe first.
    pub fn summary(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        for severity in [
            Severity::Fatal,
            Severity::Error,
            Severity::Warning,
            Severity::Note,
        ] {
            for (task, diags) in &self.diagnostics {
                for diag in diags.iter().filter(|d| d.severity == severity) {
                    let _ = writeln!(out, "[{task}] {diag}");
                }
            }
        }
        let _ = writeln!(
            out,
            "{} in {:.2?} ({} errors, {} warnings)",
            if self.failed { "FAILED" } else { "ok" },
            self.duration,
            self.count(Severity::Error) + self.count(Severity::Fatal),
            self.count(Severity::Warning),
        );
        out
    }
}
