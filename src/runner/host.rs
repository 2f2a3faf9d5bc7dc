//! Host runner implementation
//!
//! Spawns programs directly (argv, never through a shell string) with a
//! cleared environment, a dedicated process group, rlimits applied before
//! exec, raw stdin bytes, capped stdout/stderr capture and a wall-clock
//! limit. When the limit expires, or the future running the process is
//! dropped, the whole process group is killed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use nix::sys::resource::{setrlimit, Resource};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::{setpgid, Pid};
use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{CommandSpec, RunLimits, RunOutcome, RunStatus, Runner};

/// Appended to a stream whose output went past the capture cap
pub const TRUNCATED_MARKER: &str = "\n[output truncated]";

/// Largest file a child may write (256MB)
const MAX_FILE_SIZE_BYTES: u64 = 256 * 1024 * 1024;

/// Runner that executes programs as direct children of the service
#[derive(Debug, Clone, Default)]
pub struct HostRunner {
    /// Host environment variables forwarded to children
    pass_env: Vec<String>,
}

impl HostRunner {
    pub fn new(pass_env: Vec<String>) -> Self {
        Self { pass_env }
    }

    /// Run a program and wait for it, its output, or its deadline
    pub async fn execute(
        &self,
        cmd: &CommandSpec,
        limits: &RunLimits,
        stdin_content: Option<&[u8]>,
    ) -> Result<RunOutcome> {
        if cmd.program.is_empty() {
            anyhow::bail!("No command specified for execution");
        }

        debug!("Running {:?} in {:?}", cmd.display(), cmd.work_dir);

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .env_clear()
            .stdin(if stdin_content.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for key in &self.pass_env {
            if let Some(value) = std::env::var_os(key) {
                command.env(key, value);
            }
        }
        for (key, value) in &cmd.env {
            command.env(key, value);
        }
        if let Some(dir) = &cmd.work_dir {
            command.current_dir(dir);
        }

        let memory_bytes = limits
            .memory_mb
            .map(|mb| u64::from(mb) * 1024 * 1024);
        // SAFETY: the closure only issues async-signal-safe syscalls
        // (setpgid, setrlimit) and touches no shared state.
        unsafe {
            command.pre_exec(move || prepare_child(memory_bytes));
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to spawn {}", cmd.program))?;
        let group = ProcessGroup::new(child.id());

        let stdin_task = match (child.stdin.take(), stdin_content) {
            (Some(mut pipe), Some(input)) => {
                let input = input.to_vec();
                Some(tokio::spawn(async move {
                    if let Err(e) = pipe.write_all(&input).await {
                        // The child may exit without reading its input
                        if e.kind() != std::io::ErrorKind::BrokenPipe {
                            debug!("Failed to write stdin: {}", e);
                        }
                    }
                }))
            }
            _ => None,
        };

        let stdout = child.stdout.take().context("Child stdout was not captured")?;
        let stderr = child.stderr.take().context("Child stderr was not captured")?;
        let cap = limits.max_output_bytes;

        let started = Instant::now();
        let waited = tokio::time::timeout(
            Duration::from_millis(u64::from(limits.time_ms)),
            async {
                tokio::try_join!(
                    read_capped(stdout, cap),
                    read_capped(stderr, cap),
                    child.wait()
                )
            },
        )
        .await;
        let time_ms = u32::try_from(started.elapsed().as_millis()).unwrap_or(u32::MAX);

        if let Some(task) = stdin_task {
            task.abort();
        }

        let (stdout, stderr, exit_status) = match waited {
            Ok(result) => result.context("Failed to wait for process")?,
            Err(_) => {
                warn!(
                    "{} exceeded {} ms, killing its process group",
                    cmd.program, limits.time_ms
                );
                drop(group);
                if let Err(e) = child.kill().await {
                    debug!("Failed to reap timed out process: {}", e);
                }
                return Ok(RunOutcome {
                    exit_code: -1,
                    time_ms,
                    stdout: String::new(),
                    stderr: String::new(),
                    status: RunStatus::TimeLimitExceeded,
                });
            }
        };

        let exit_code = exit_status.code().unwrap_or(-1);
        let status = match (exit_status.code(), exit_status.signal()) {
            (Some(code), _) => RunStatus::Exited(code),
            (None, Some(sig)) => RunStatus::Signaled(sig),
            (None, None) => RunStatus::Exited(-1),
        };

        debug!(
            "{} finished: status={:?}, time_ms={}, stdout_len={}, stderr_len={}",
            cmd.program,
            status,
            time_ms,
            stdout.len(),
            stderr.len()
        );

        Ok(RunOutcome {
            exit_code,
            time_ms,
            stdout,
            stderr,
            status,
        })
    }
}

#[async_trait]
impl Runner for HostRunner {
    async fn run(
        &self,
        cmd: &CommandSpec,
        limits: &RunLimits,
        stdin: Option<&[u8]>,
    ) -> Result<RunOutcome> {
        self.execute(cmd, limits, stdin).await
    }
}

/// Runs in the forked child before exec
fn prepare_child(memory_bytes: Option<u64>) -> std::io::Result<()> {
    setpgid(Pid::from_raw(0), Pid::from_raw(0))?;
    setrlimit(Resource::RLIMIT_FSIZE, MAX_FILE_SIZE_BYTES, MAX_FILE_SIZE_BYTES)?;
    if let Some(bytes) = memory_bytes {
        setrlimit(Resource::RLIMIT_AS, bytes, bytes)?;
    }
    Ok(())
}

/// Kills the child's whole process group when dropped
struct ProcessGroup {
    pgid: Option<Pid>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pgid: pid.and_then(|p| i32::try_from(p).ok()).map(Pid::from_raw),
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            // ESRCH just means every member has already exited
            let _ = killpg(pgid, Signal::SIGKILL);
        }
    }
}

/// Read a stream to EOF, keeping at most `limit` bytes
async fn read_capped<R>(mut reader: R, limit: usize) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    (&mut reader)
        .take(limit as u64)
        .read_to_end(&mut buf)
        .await?;
    let discarded = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;

    let mut text = String::from_utf8_lossy(&buf).into_owned();
    if discarded > 0 {
        text.push_str(TRUNCATED_MARKER);
    }
    Ok(text)
}
