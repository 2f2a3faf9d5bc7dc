//! Uniform result contract for both request paths
//!
//! Every request, whatever happened, ends as one `ExecutionResult`: a single
//! `output` text plus a machine-readable `status`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed text returned for commands outside the allow-list
pub const COMMAND_NOT_ALLOWED: &str = "Error: Command not allowed.";
/// Fixed text returned when an allowed command printed nothing
pub const COMMAND_NO_OUTPUT: &str = "Command executed.";

/// Which path a request took
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Succeeded,
    CompileFailed,
    RunFailed,
    TimedOut,
    Rejected,
    InvalidRequest,
    SystemError,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Succeeded => "succeeded",
            ExecutionStatus::CompileFailed => "compile_failed",
            ExecutionStatus::RunFailed => "run_failed",
            ExecutionStatus::TimedOut => "timed_out",
            ExecutionStatus::Rejected => "rejected",
            ExecutionStatus::InvalidRequest => "invalid_request",
            ExecutionStatus::SystemError => "system_error",
        };
        write!(f, "{}", s)
    }
}

/// Response body shared by `/api/run` and `/api/terminal`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub output: String,
    pub status: ExecutionStatus,
}

impl ExecutionResult {
    pub fn new(status: ExecutionStatus, output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            status,
        }
    }

    pub fn succeeded(stdout: impl Into<String>) -> Self {
        Self::new(ExecutionStatus::Succeeded, stdout)
    }

    pub fn compile_failed(diagnostics: impl Into<String>) -> Self {
        Self::new(ExecutionStatus::CompileFailed, diagnostics)
    }

    pub fn run_failed(stderr: impl Into<String>) -> Self {
        Self::new(ExecutionStatus::RunFailed, stderr)
    }

    pub fn timed_out(limit_ms: u32) -> Self {
        Self::new(
            ExecutionStatus::TimedOut,
            format!("Execution timed out after {} ms", limit_ms),
        )
    }

    pub fn rejected() -> Self {
        Self::new(ExecutionStatus::Rejected, COMMAND_NOT_ALLOWED)
    }

    pub fn invalid_request(message: impl fmt::Display) -> Self {
        Self::new(ExecutionStatus::InvalidRequest, format!("Error: {}", message))
    }

    pub fn system_error(message: impl fmt::Display) -> Self {
        Self::new(ExecutionStatus::SystemError, format!("Error: {}", message))
    }
}

/// Pick the first non-empty text, in order
pub fn first_non_empty<'a>(candidates: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    candidates.into_iter().find(|s| !s.is_empty())
}
