//! Command allow-list gateway
//!
//! A trimmed command string is executed only when it is byte-for-byte equal
//! to one of the configured commands. Anything else is rejected without
//! spawning a process.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::GatewaySettings;
use crate::runner::{CommandSpec, RunLimits, RunStatus, Runner};
use crate::verdict::{first_non_empty, ExecutionResult, COMMAND_NO_OUTPUT};

/// Body of a gateway request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
}

/// Executes allow-listed commands through the configured interpreter
#[derive(Clone)]
pub struct CommandGateway {
    allowed: Arc<HashSet<String>>,
    shell: Vec<String>,
    work_dir: Option<PathBuf>,
    limits: RunLimits,
    runner: Arc<dyn Runner>,
}

impl CommandGateway {
    pub fn new(settings: &GatewaySettings, max_output_bytes: usize, runner: Arc<dyn Runner>) -> Self {
        Self {
            allowed: Arc::new(settings.allowed_commands.iter().cloned().collect()),
            shell: settings.shell.clone(),
            work_dir: settings.work_dir.clone(),
            limits: RunLimits::new(settings.time_ms).with_max_output_bytes(max_output_bytes),
            runner,
        }
    }

    /// Whether `command` (after trimming) is on the allow-list
    pub fn is_allowed(&self, command: &str) -> bool {
        self.allowed.contains(command.trim())
    }

    /// Execute `command` if allowed; never fails, every outcome is a result
    pub async fn execute(&self, command: &str) -> ExecutionResult {
        let command = command.trim();
        if !self.is_allowed(command) {
            info!("Rejected command {:?}", command);
            return ExecutionResult::rejected();
        }

        let mut argv = self.shell.clone();
        argv.push(command.to_string());
        let mut cmd = CommandSpec::from_vec(&argv);
        if let Some(dir) = &self.work_dir {
            cmd = cmd.with_work_dir(dir);
        }

        let result = match self.runner.run(&cmd, &self.limits, None).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Failed to launch command {:?}: {:#}", command, e);
                return ExecutionResult::run_failed(format!("{:#}", e));
            }
        };

        info!(
            "Command {:?} finished: status={:?}, time_ms={}",
            command, result.status, result.time_ms
        );

        match result.status {
            RunStatus::Exited(0) => ExecutionResult::succeeded(
                first_non_empty([result.stdout.as_str(), result.stderr.as_str()])
                    .unwrap_or(COMMAND_NO_OUTPUT),
            ),
            RunStatus::TimeLimitExceeded => ExecutionResult::timed_out(self.limits.time_ms),
            _ => {
                let summary = format!("Command failed: {}\n{}", command, result.failure_summary());
                ExecutionResult::run_failed(
                    first_non_empty([result.stderr.as_str(), summary.as_str()])
                        .unwrap_or_default(),
                )
            }
        }
    }
}
