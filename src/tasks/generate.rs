// src/tasks/generate.rs

//! Writes a file with fixed contents, only when the on-disk contents
//! differ.

use std::path::PathBuf;

use serde_json::{Value, json};
use tracing::debug;

use crate::errors::Result;
use crate::flux::Step;
use crate::task::{RunProbe, StepContext, Task};

/// Emits `content` at `path`. The incremental check is a straight content
/// comparison, so it stays correct even with no recorded history.
#[derive(Debug)]
pub struct GenerateFileTask {
    path: PathBuf,
    content: Vec<u8>,
}

impl GenerateFileTask {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

impl Task for GenerateFileTask {
    fn unique_key(&self) -> Option<Value> {
        Some(json!({
            "path": self.path.display().to_string(),
            "content": blake3::hash(&self.content).to_hex().to_string(),
        }))
    }

    fn output_paths(&self) -> Vec<PathBuf> {
        vec![self.path.clone()]
    }

    fn is_run_required(&self, _probe: &RunProbe) -> Result<bool> {
        match std::fs::read(&self.path) {
            Ok(existing) => Ok(existing != self.content),
            Err(_) => Ok(true),
        }
    }

    fn run(&self, step: Step<StepContext>) {
        let path = self.path.clone();
        let content = self.content.clone();
        tokio::spawn(async move {
            if let Some(parent) = path.parent() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    step.with(|ctx| {
                        ctx.reporter.error(format!(
                            "couldn't create directory '{}': {e}",
                            parent.display()
                        ));
                    });
                    step.advance();
                    return;
                }
            }
            match tokio::fs::write(&path, &content).await {
                Ok(()) => debug!(path = %path.display(), bytes = content.len(), "generated"),
                Err(e) => step.with(|ctx| {
                    ctx.reporter
                        .error(format!("couldn't write '{}': {e}", path.display()));
                }),
            }
            step.advance();
        });
    }
}
