//! Program runner - executes a compiled entry point inside its workspace

use tracing::info;

use crate::languages::LanguageConfig;
use crate::runner::{CommandSpec, RunLimits, RunStatus, Runner};
use crate::verdict::{first_non_empty, ExecutionResult};
use crate::workspace::Workspace;

/// Check an entry point is a plain class/file name
pub fn is_valid_entry_point(entry_point: &str) -> bool {
    !entry_point.is_empty()
        && entry_point.len() <= 255
        && !entry_point.starts_with(['.', '-'])
        && entry_point
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$' | '-'))
}

/// Run the program with `stdin` piped in as raw bytes
///
/// Success carries stdout; failure carries stderr (or a description of the
/// exit when stderr is empty); a launch failure carries its error text.
pub async fn run_program(
    runner: &dyn Runner,
    workspace: &Workspace,
    lang_config: &LanguageConfig,
    entry_point: &str,
    stdin: &str,
    limits: &RunLimits,
) -> ExecutionResult {
    let run_cmd = lang_config.run_command_for(entry_point);
    let cmd = CommandSpec::from_vec(&run_cmd)
        .with_work_dir(workspace.path())
        .with_env("HOME", workspace.path().to_string_lossy());

    let result = match runner.run(&cmd, limits, Some(stdin.as_bytes())).await {
        Ok(result) => result,
        Err(e) => return ExecutionResult::run_failed(format!("{:#}", e)),
    };

    info!(
        "Program finished: status={:?}, exit_code={}, time_ms={}",
        result.status, result.exit_code, result.time_ms
    );

    match result.status {
        RunStatus::Exited(0) => ExecutionResult::succeeded(result.stdout),
        RunStatus::TimeLimitExceeded => ExecutionResult::timed_out(limits.time_ms),
        _ => {
            let summary = result.failure_summary();
            let text = first_non_empty([result.stderr.as_str(), summary.as_str()])
                .unwrap_or_default();
            ExecutionResult::run_failed(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkspaceSettings;
    use crate::languages::LanguageTable;
    use crate::runner::testing::ScriptedRunner;
    use crate::runner::HostRunner;
    use crate::verdict::ExecutionStatus;
    use crate::workspace::SourceFile;

    fn shell() -> LanguageConfig {
        LanguageTable::parse(
            r#"
[shell]
source_extension = "sh"
run_command = "sh {entry}"
entry_point = "main.sh"
"#,
        )
        .unwrap()
        .get("shell")
        .unwrap()
        .clone()
    }

    async fn stage(root: &std::path::Path, script: &str) -> Workspace {
        let settings = WorkspaceSettings {
            scratch_root: root.to_path_buf(),
            ..WorkspaceSettings::default()
        };
        let files = [SourceFile {
            name: "main.sh".to_string(),
            content: script.to_string(),
        }];
        Workspace::stage("run-test", &files, &settings).await.unwrap()
    }

    #[test]
    fn test_entry_point_validation() {
        assert!(is_valid_entry_point("Main"));
        assert!(is_valid_entry_point("com.example.App"));
        assert!(is_valid_entry_point("Outer$Inner"));
        assert!(is_valid_entry_point("main.py"));
        assert!(!is_valid_entry_point(""));
        assert!(!is_valid_entry_point("-jar"));
        assert!(!is_valid_entry_point("../Main"));
        assert!(!is_valid_entry_point("Main; rm -rf /"));
        assert!(!is_valid_entry_point("a/b"));
    }

    #[tokio::test]
    async fn test_success_returns_stdout() {
        let root = tempfile::tempdir().unwrap();
        let workspace = stage(root.path(), "read x; echo \"got $x\"; echo noise >&2").await;
        let runner = HostRunner::new(vec!["PATH".to_string()]);

        let result = run_program(&runner, &workspace, &shell(), "main.sh", "42\n", &RunLimits::new(5000)).await;

        assert_eq!(result.status, ExecutionStatus::Succeeded);
        assert_eq!(result.output, "got 42\n");
    }

    #[tokio::test]
    async fn test_failure_returns_stderr() {
        let root = tempfile::tempdir().unwrap();
        let workspace = stage(root.path(), "echo partial; echo boom >&2; exit 1").await;
        let runner = HostRunner::new(vec!["PATH".to_string()]);

        let result = run_program(&runner, &workspace, &shell(), "main.sh", "", &RunLimits::new(5000)).await;

        assert_eq!(result.status, ExecutionStatus::RunFailed);
        assert_eq!(result.output, "boom\n");
    }

    #[tokio::test]
    async fn test_silent_failure_describes_exit() {
        let root = tempfile::tempdir().unwrap();
        let workspace = stage(root.path(), "exit 7").await;
        let runner = HostRunner::new(vec!["PATH".to_string()]);

        let result = run_program(&runner, &workspace, &shell(), "main.sh", "", &RunLimits::new(5000)).await;

        assert_eq!(result.status, ExecutionStatus::RunFailed);
        assert_eq!(result.output, "Process exited with code 7");
    }

    #[tokio::test]
    async fn test_infinite_loop_times_out() {
        let root = tempfile::tempdir().unwrap();
        let workspace = stage(root.path(), "while true; do :; done").await;
        let runner = HostRunner::new(vec!["PATH".to_string()]);

        let result = run_program(&runner, &workspace, &shell(), "main.sh", "", &RunLimits::new(300)).await;

        assert_eq!(result.status, ExecutionStatus::TimedOut);
        assert_eq!(result.output, "Execution timed out after 300 ms");
    }

    #[tokio::test]
    async fn test_launch_failure_returns_error_text() {
        let root = tempfile::tempdir().unwrap();
        let workspace = stage(root.path(), "").await;
        let runner = ScriptedRunner::new();
        runner.push(Err(anyhow::anyhow!("Failed to spawn java")));

        let result = run_program(&runner, &workspace, &shell(), "main.sh", "", &RunLimits::new(1000)).await;

        assert_eq!(result.status, ExecutionStatus::RunFailed);
        assert_eq!(result.output, "Failed to spawn java");
    }
}
