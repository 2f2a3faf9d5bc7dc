//! Runner module - Execution abstraction layer
//!
//! This module provides a unified interface for running child processes:
//! - `HostRunner`: spawns the program directly on the host with a wall-clock
//!   limit, its own process group and capped output capture
//!
//! The runner module does NOT:
//! - Decide what a failed process means for a request
//! - Know about languages, workspaces or the allow-list

pub mod host;

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Command specification for execution
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Program path or name
    pub program: String,
    /// Arguments to the program
    pub args: Vec<String>,
    /// Extra environment variables, set after the host allow-list is applied
    pub env: Vec<(String, String)>,
    /// Working directory
    pub work_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            work_dir: None,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(|a| a.into()).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Create from a command vector (first element is program, rest are args)
    pub fn from_vec(cmd: &[String]) -> Self {
        let mut iter = cmd.iter();
        let program = iter.next().cloned().unwrap_or_default();
        Self::new(program).with_args(iter.cloned())
    }

    /// Space-joined form, for logs only
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.as_str()];
        parts.extend(self.args.iter().map(|a| a.as_str()));
        parts.join(" ")
    }
}

/// Resource limits for execution
#[derive(Debug, Clone)]
pub struct RunLimits {
    /// Wall-clock limit in milliseconds
    pub time_ms: u32,
    /// Address-space limit in MB (None = unlimited)
    pub memory_mb: Option<u32>,
    /// Captured bytes kept per output stream
    pub max_output_bytes: usize,
}

impl RunLimits {
    pub fn new(time_ms: u32) -> Self {
        Self {
            time_ms,
            ..Self::default()
        }
    }

    pub fn with_memory_mb(mut self, memory_mb: Option<u32>) -> Self {
        self.memory_mb = memory_mb;
        self
    }

    pub fn with_max_output_bytes(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            time_ms: 1000,
            memory_mb: None,
            max_output_bytes: 64 * 1024,
        }
    }
}

/// Execution status (raw, no interpretation)
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    /// Program exited normally with given exit code
    Exited(i32),
    /// Wall-clock limit exceeded; the process group was killed
    TimeLimitExceeded,
    /// Killed by signal
    Signaled(i32),
}

impl RunStatus {
    /// Check if execution was successful (exited with code 0)
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Exited(0))
    }
}

/// Outcome of running a program
#[derive(Debug)]
pub struct RunOutcome {
    /// Exit code (-1 if not applicable)
    pub exit_code: i32,
    /// Wall-clock time in milliseconds
    pub time_ms: u32,
    /// Stdout content
    pub stdout: String,
    /// Stderr content
    pub stderr: String,
    /// Execution status
    pub status: RunStatus,
}

impl RunOutcome {
    /// Check if execution was successful
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Short description of why the process did not succeed
    pub fn failure_summary(&self) -> String {
        match self.status {
            RunStatus::Exited(code) => format!("Process exited with code {}", code),
            RunStatus::TimeLimitExceeded => format!("Process timed out after {} ms", self.time_ms),
            RunStatus::Signaled(sig) => format!("Process killed by signal {}", sig),
        }
    }
}

/// Runner trait for executing programs
///
/// `Err` means the process could not be launched or observed at all; anything
/// the process itself did is reported through `RunOutcome`.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run a command with the given limits and optional stdin bytes
    async fn run(
        &self,
        cmd: &CommandSpec,
        limits: &RunLimits,
        stdin: Option<&[u8]>,
    ) -> Result<RunOutcome>;
}

pub use host::HostRunner;

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner for exercising callers without spawning anything

    use super::*;
    use std::sync::Mutex;

    /// Records every command it is asked to run and replays canned outcomes
    #[derive(Default)]
    pub struct ScriptedRunner {
        pub calls: Mutex<Vec<(CommandSpec, Option<Vec<u8>>)>>,
        outcomes: Mutex<Vec<Result<RunOutcome>>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue the outcome for the next call
        pub fn push(&self, outcome: Result<RunOutcome>) {
            self.outcomes.lock().unwrap().insert(0, outcome);
        }

        pub fn push_exit(&self, code: i32, stdout: &str, stderr: &str) {
            self.push(Ok(RunOutcome {
                exit_code: code,
                time_ms: 1,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                status: RunStatus::Exited(code),
            }));
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Runner for ScriptedRunner {
        async fn run(
            &self,
            cmd: &CommandSpec,
            _limits: &RunLimits,
            stdin: Option<&[u8]>,
        ) -> Result<RunOutcome> {
            self.calls
                .lock()
                .unwrap()
                .push((cmd.clone(), stdin.map(|s| s.to_vec())));
            self.outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no scripted outcome left")))
        }
    }
}
