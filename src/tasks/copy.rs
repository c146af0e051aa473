// src/tasks/copy.rs

//! Copies a configured set of files, creating destination directories as
//! needed.

use std::path::PathBuf;

use serde_json::{Value, json};
use tracing::debug;

use crate::flux::{Barrier, Step};
use crate::task::{StepContext, Task};

/// Copies each `(source, destination)` pair. Incremental by the default
/// policy: sources are inputs, destinations are outputs.
#[derive(Debug, Default)]
pub struct CopyTask {
    pairs: Vec<(PathBuf, PathBuf)>,
}

impl CopyTask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn will_copy_file(mut self, source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        self.pairs.push((source.into(), dest.into()));
        self
    }

    pub fn will_copy_files<I, S, D>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, D)>,
        S: Into<PathBuf>,
        D: Into<PathBuf>,
    {
        self.pairs
            .extend(pairs.into_iter().map(|(s, d)| (s.into(), d.into())));
        self
    }
}

impl Task for CopyTask {
    fn unique_key(&self) -> Option<Value> {
        let pairs: Vec<[String; 2]> = self
            .pairs
            .iter()
            .map(|(s, d)| [s.display().to_string(), d.display().to_string()])
            .collect();
        Some(json!({ "copy": pairs }))
    }

    fn input_paths(&self) -> Vec<PathBuf> {
        self.pairs.iter().map(|(s, _)| s.clone()).collect()
    }

    fn output_paths(&self) -> Vec<PathBuf> {
        self.pairs.iter().map(|(_, d)| d.clone()).collect()
    }

    fn run(&self, step: Step<StepContext>) {
        if self.pairs.is_empty() {
            step.advance();
            return;
        }
        // One concurrent copy per pair, joined on a barrier.
        let barrier = Barrier::new("copy", self.pairs.len() as u64);
        for (source, dest) in self.pairs.clone() {
            let done = barrier.dec_callback();
            let step = step.clone();
            tokio::spawn(async move {
                if let Some(parent) = dest.parent() {
                    if let Err(e) = tokio::fs::create_dir_all(parent).await {
                        step.with(|ctx| {
                            ctx.reporter.error(format!(
                                "couldn't create directory '{}': {e}",
                                parent.display()
                            ));
                        });
                        done();
                        return;
                    }
                }
                match tokio::fs::copy(&source, &dest).await {
                    Ok(_) => {
                        debug!(src = %source.display(), dst = %dest.display(), "copied");
                    }
                    Err(e) => step.with(|ctx| {
                        ctx.reporter.error(format!(
                            "couldn't copy '{}' to '{}': {e}",
                            source.display(),
                            dest.display()
                        ));
                    }),
                }
                done();
            });
        }
        let resume = step.clone();
        barrier.end_with(move || resume.advance());
    }
}
