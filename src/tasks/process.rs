// src/tasks/process.rs

//! Runs one tool invocation through the shared [`ProcessPool`].

use std::path::PathBuf;

use serde_json::{Value, json};

use crate::flux::Step;
use crate::pool::{ProcessCommand, ProcessOutput};
use crate::task::{StepContext, Task};

/// Spawns a configured command and fails the task on a non-zero exit.
///
/// Captured stdout/stderr travels with the diagnostics either way, so a
/// compiler's own error listing ends up in the run report next to the
/// command that produced it.
#[derive(Debug)]
pub struct ProcessTask {
    command: ProcessCommand,
    inputs: Vec<PathBuf>,
    outputs: Vec<PathBuf>,
}

impl ProcessTask {
    pub fn new(command: ProcessCommand) -> Self {
        Self {
            command,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Declare files the command reads, for the incremental check.
    pub fn reads(mut self, inputs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.inputs.extend(inputs.into_iter().map(Into::into));
        self
    }

    /// Declare files the command writes, for the incremental check and
    /// `clean`.
    pub fn writes(mut self, outputs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.outputs.extend(outputs.into_iter().map(Into::into));
        self
    }

    pub fn command(&self) -> &ProcessCommand {
        &self.command
    }
}

fn exit_description(out: &ProcessOutput) -> String {
    match (out.code, out.signal) {
        (Some(code), _) => format!("exit code {code}"),
        (None, Some(signal)) => format!("signal {signal}"),
        (None, None) => "unknown exit status".to_string(),
    }
}

impl Task for ProcessTask {
    fn unique_key(&self) -> Option<Value> {
        Some(json!({
            "program": self.command.program,
            "args": self.command.args,
            "env": self.command.env,
            "cwd": self.command.cwd.as_ref().map(|c| c.display().to_string()),
        }))
    }

    fn input_paths(&self) -> Vec<PathBuf> {
        self.inputs.clone()
    }

    fn output_paths(&self) -> Vec<PathBuf> {
        self.outputs.clone()
    }

    fn run(&self, step: Step<StepContext>) {
        let command = self.command.clone();
        let pool = step.with(|ctx| ctx.pool.clone());
        tokio::spawn(async move {
            match pool.run(&command).await {
                Ok(out) if out.success() => {
                    if !out.output.is_empty() {
                        step.with(|ctx| ctx.reporter.note(out.output.clone()));
                    }
                }
                Ok(out) => step.with(|ctx| {
                    ctx.reporter.error(format!(
                        "'{}' failed with {}:\n{}",
                        command.display(),
                        exit_description(&out),
                        out.output
                    ));
                }),
                Err(e) => step.with(|ctx| {
                    ctx.reporter
                        .error(format!("'{}' couldn't run: {e}", command.display()));
                }),
            }
            step.advance();
        });
    }
}
