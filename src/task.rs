// src/task.rs

//! The executable task contract and the incremental-rebuild probe.
//!
//! The engine interacts with task kinds exclusively through the [`Task`]
//! trait: a structural [`unique_key`](Task::unique_key) feeding the
//! fingerprint, declared input/output paths, the incremental
//! [`is_run_required`](Task::is_run_required) check, and the `run` /
//! `clean` / `generate` action bodies, each driving a
//! [`flux`](crate::flux) computation through its [`Step`] handle.

use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::errors::Result;
use crate::flux::Step;
use crate::graph::TaskName;
use crate::pool::ProcessPool;
use crate::report::Reporter;
use crate::runner::Action;

/// Structural hash identifying a task's configuration + input identities.
///
/// Built from the canonical JSON form of `{kind, key}`, so two tasks with
/// the same kind and the same structural key collide on purpose: equal
/// fingerprints plus unchanged inputs mean the task is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(kind: &str, key: &Value) -> Self {
        let canonical = json!({ "kind": kind, "key": key });
        // serde_json maps are ordered, so serialization is stable.
        let bytes = serde_json::to_vec(&canonical).expect("JSON value serializes");
        Self(blake3::hash(&bytes).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Fingerprint of a task under its graph name, if the task declares a
/// structural key at all.
pub fn task_fingerprint(name: &TaskName, task: &dyn Task) -> Option<Fingerprint> {
    task.unique_key()
        .map(|key| Fingerprint::of(&name.kind, &key))
}

/// Context shared by every step of one task execution.
pub struct StepContext {
    pub action: Action,
    pub reporter: Reporter,
    pub pool: ProcessPool,
    /// Instant of the last successful run of this task, if any.
    pub last_success: Option<SystemTime>,
}

/// Everything the default incremental policy needs, assembled by the
/// Runner before a task is started.
#[derive(Debug)]
pub struct RunProbe {
    pub action: Action,
    pub last_success: Option<SystemTime>,
    /// Fingerprint stored after the last successful run.
    pub stored: Option<Fingerprint>,
    /// Fingerprint of the task as configured right now.
    pub current: Option<Fingerprint>,
}

impl RunProbe {
    /// The default incremental policy, applied uniformly to every task
    /// kind that does not override it.
    ///
    /// A run is required when any of these holds:
    /// - no prior successful run is recorded,
    /// - the stored and current fingerprints differ (or either is absent),
    /// - a declared input is missing or modified after the last success,
    /// - a declared output is missing.
    pub fn default_policy(&self, inputs: &[PathBuf], outputs: &[PathBuf]) -> Result<bool> {
        let last_success = match self.last_success {
            Some(t) => t,
            None => return Ok(true),
        };
        match (&self.stored, &self.current) {
            (Some(stored), Some(current)) if stored == current => {}
            _ => {
                debug!("fingerprint changed or absent; run required");
                return Ok(true);
            }
        }
        for input in inputs {
            match std::fs::metadata(input) {
                Ok(meta) => {
                    let mtime = meta.modified()?;
                    if mtime > last_success {
                        debug!(path = %input.display(), "input newer than last success");
                        return Ok(true);
                    }
                }
                Err(_) => {
                    debug!(path = %input.display(), "input missing; run required");
                    return Ok(true);
                }
            }
        }
        for output in outputs {
            if !output.exists() {
                debug!(path = %output.display(), "output missing; run required");
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// A unit of executable build work.
///
/// Implementations must be cheap to share (`&self` methods only); all
/// per-run mutable state lives in the [`StepContext`].
pub trait Task: Send + Sync {
    /// Structural configuration data feeding the fingerprint. `None`
    /// means the task has no stable identity and is always considered
    /// changed.
    fn unique_key(&self) -> Option<Value> {
        None
    }

    /// Declared input files, used by the default incremental policy.
    fn input_paths(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    /// Declared output files, used by the default incremental policy and
    /// the default `clean`.
    fn output_paths(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    /// Incremental check; `false` lets the Runner treat the task as
    /// already satisfied without invoking [`run`](Task::run).
    fn is_run_required(&self, probe: &RunProbe) -> Result<bool> {
        probe.default_policy(&self.input_paths(), &self.output_paths())
    }

    /// Perform the task's work. Must advance `step` exactly once when
    /// finished; expected failures are reported through the context's
    /// reporter, not by panicking.
    fn run(&self, step: Step<StepContext>);

    /// Remove previously produced outputs. The default unlinks every
    /// declared output path.
    fn clean(&self, step: Step<StepContext>) {
        for output in self.output_paths() {
            match std::fs::remove_file(&output) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => step.with(|ctx| {
                    ctx.reporter.error(format!(
                        "couldn't remove '{}': {e}",
                        output.display()
                    ));
                }),
            }
        }
        step.advance();
    }

    /// Hook for the `generate` action; default is a no-op.
    fn generate(&self, step: Step<StepContext>) {
        step.advance();
    }
}
