// src/pool.rs

//! Bounded-concurrency process spawning.
//!
//! Building a whole program would happily saturate the machine if every
//! independently-runnable compile/link task spawned its process at once.
//! The pool caps the number of live child processes at a configurable
//! maximum (default: logical CPU count) and queues excess spawn requests
//! in FIFO order; a slot frees when the owning process exits.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::Context;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::errors::Result;

/// Description of one process to spawn.
#[derive(Debug, Clone)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment entries layered over the inherited environment.
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Command line for diagnostics.
    pub fn display(&self) -> String {
        let mut s = self.program.clone();
        for arg in &self.args {
            s.push(' ');
            s.push_str(arg);
        }
        s
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit code; `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    /// Unix termination signal, if any.
    pub signal: Option<i32>,
    /// Captured stdout and stderr, concatenated (not streamed).
    pub output: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Shared handle to the bounded process pool. Cloning is cheap; all clones
/// share the same concurrency budget.
#[derive(Clone)]
pub struct ProcessPool {
    permits: Arc<Semaphore>,
    max: usize,
}

impl std::fmt::Debug for ProcessPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessPool").field("max", &self.max).finish()
    }
}

impl ProcessPool {
    pub fn new(max_concurrent_processes: usize) -> Self {
        let max = max_concurrent_processes.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// Pool sized to the host's logical CPU count.
    pub fn with_default_limit() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(cpus)
    }

    pub fn max_concurrent_processes(&self) -> usize {
        self.max
    }

    /// Spawn `command` once a slot is free, wait for it to exit and return
    /// its captured output.
    ///
    /// Requests past the limit queue in FIFO order (the semaphore is fair).
    /// Spawn failures and signal terminations come back as errors/values
    /// the caller turns into diagnostics; this method never panics on
    /// process trouble.
    pub async fn run(&self, command: &ProcessCommand) -> Result<ProcessOutput> {
        let _permit = self
            .permits
            .acquire()
            .await
            .context("process pool closed")?;

        debug!(cmd = %command.display(), "spawning process");

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &command.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }

        let out = cmd
            .output()
            .await
            .with_context(|| format!("spawning '{}'", command.display()))?;

        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&out.stderr));

        let code = out.status.code();
        let signal = termination_signal(&out.status);

        info!(
            cmd = %command.display(),
            code,
            success = out.status.success(),
            "process exited"
        );

        Ok(ProcessOutput {
            code,
            signal,
            output,
        })
    }
}

#[cfg(unix)]
fn termination_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn termination_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}
