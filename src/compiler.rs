//! Compiler module - Source code compilation
//!
//! Runs the language's compiler once over every matching source file present
//! in a workspace and classifies the result. Warnings printed by a successful
//! compile are discarded.

use tracing::{debug, info};

use crate::languages::LanguageConfig;
use crate::runner::{CommandSpec, RunLimits, RunStatus, Runner};
use crate::workspace::Workspace;

/// Result of a compilation attempt
#[derive(Debug)]
pub struct CompileResult {
    pub success: bool,
    /// Diagnostics for a failed compile
    pub message: Option<String>,
}

impl CompileResult {
    fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Compile user-submitted code in `workspace`
pub async fn compile_user_code(
    runner: &dyn Runner,
    workspace: &Workspace,
    lang_config: &LanguageConfig,
    limits: &RunLimits,
) -> CompileResult {
    if lang_config.compile_command.is_none() {
        // Interpreted language, no compilation needed
        return CompileResult::ok();
    }

    let sources: Vec<String> = match workspace.file_names().await {
        Ok(names) => names
            .into_iter()
            .filter(|name| lang_config.is_source_file(name))
            .collect(),
        Err(e) => return CompileResult::failed(format!("Failed to list source files: {}", e)),
    };
    if sources.is_empty() {
        return CompileResult::failed(format!(
            "No .{} source files to compile",
            lang_config.source_extension
        ));
    }

    let Some(compile_cmd) = lang_config.compile_command_for(&sources) else {
        return CompileResult::ok();
    };

    debug!("Compiling {} source file(s) with {:?}", sources.len(), compile_cmd);

    let cmd = CommandSpec::from_vec(&compile_cmd)
        .with_work_dir(workspace.path())
        .with_env("HOME", workspace.path().to_string_lossy());

    let result = match runner.run(&cmd, limits, None).await {
        Ok(result) => result,
        // Compiler missing or not executable
        Err(e) => return CompileResult::failed(format!("{:#}", e)),
    };

    if result.is_success() {
        info!("Compilation succeeded in {} ms", result.time_ms);
        return CompileResult::ok();
    }

    let error_msg = if !result.stderr.is_empty() {
        result.stderr
    } else if !result.stdout.is_empty() {
        result.stdout
    } else {
        match result.status {
            RunStatus::TimeLimitExceeded => "Compilation timed out".to_string(),
            RunStatus::Signaled(_) => "Compiler crashed".to_string(),
            RunStatus::Exited(code) => format!("Compilation failed with exit code {}", code),
        }
    };

    info!("Compilation failed: {:?}", result.status);
    CompileResult::failed(error_msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkspaceSettings;
    use crate::languages::LanguageTable;
    use crate::runner::testing::ScriptedRunner;
    use crate::runner::{HostRunner, RunOutcome};
    use crate::workspace::SourceFile;

    const SHELL_LANGUAGE: &str = r#"
[shell]
source_extension = "sh"
compile_command = "sh -n {sources}"
run_command = "sh {entry}"
entry_point = "main.sh"
"#;

    fn shell() -> LanguageConfig {
        LanguageTable::parse(SHELL_LANGUAGE)
            .unwrap()
            .get("shell")
            .unwrap()
            .clone()
    }

    async fn stage(root: &std::path::Path, files: &[(&str, &str)]) -> Workspace {
        let settings = WorkspaceSettings {
            scratch_root: root.to_path_buf(),
            ..WorkspaceSettings::default()
        };
        let files: Vec<SourceFile> = files
            .iter()
            .map(|(name, content)| SourceFile {
                name: name.to_string(),
                content: content.to_string(),
            })
            .collect();
        Workspace::stage("compile-test", &files, &settings).await.unwrap()
    }

    #[tokio::test]
    async fn test_compiles_every_matching_source() {
        let root = tempfile::tempdir().unwrap();
        let workspace = stage(
            root.path(),
            &[("b.sh", "true"), ("a.sh", "true"), ("notes.txt", "(")],
        )
        .await;
        let runner = ScriptedRunner::new();
        runner.push_exit(0, "", "warning: ignored");

        let result = compile_user_code(&runner, &workspace, &shell(), &RunLimits::new(1000)).await;

        assert!(result.success);
        assert!(result.message.is_none());
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.program, "sh");
        assert_eq!(calls[0].0.args, vec!["-n", "a.sh", "b.sh"]);
        assert_eq!(calls[0].0.work_dir.as_deref(), Some(workspace.path()));
    }

    #[tokio::test]
    async fn test_syntax_error_reports_diagnostics() {
        let root = tempfile::tempdir().unwrap();
        let workspace = stage(root.path(), &[("main.sh", "if then fi (")]).await;
        let runner = HostRunner::new(vec!["PATH".to_string()]);

        let result = compile_user_code(&runner, &workspace, &shell(), &RunLimits::new(5000)).await;

        assert!(!result.success);
        assert!(!result.message.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_diagnostics_fall_back_to_generic_message() {
        let root = tempfile::tempdir().unwrap();
        let workspace = stage(root.path(), &[("main.sh", "")]).await;
        let runner = ScriptedRunner::new();
        runner.push_exit(2, "", "");

        let result = compile_user_code(&runner, &workspace, &shell(), &RunLimits::new(1000)).await;

        assert_eq!(
            result.message.as_deref(),
            Some("Compilation failed with exit code 2")
        );
    }

    #[tokio::test]
    async fn test_compile_timeout() {
        let root = tempfile::tempdir().unwrap();
        let workspace = stage(root.path(), &[("main.sh", "")]).await;
        let runner = ScriptedRunner::new();
        runner.push(Ok(RunOutcome {
            exit_code: -1,
            time_ms: 1000,
            stdout: String::new(),
            stderr: String::new(),
            status: RunStatus::TimeLimitExceeded,
        }));

        let result = compile_user_code(&runner, &workspace, &shell(), &RunLimits::new(1000)).await;

        assert_eq!(result.message.as_deref(), Some("Compilation timed out"));
    }

    #[tokio::test]
    async fn test_launch_failure_is_compile_failure() {
        let root = tempfile::tempdir().unwrap();
        let workspace = stage(root.path(), &[("main.sh", "")]).await;
        let runner = ScriptedRunner::new();
        runner.push(Err(anyhow::anyhow!("Failed to spawn sh")));

        let result = compile_user_code(&runner, &workspace, &shell(), &RunLimits::new(1000)).await;

        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some("Failed to spawn sh"));
    }

    #[tokio::test]
    async fn test_no_sources_never_invokes_compiler() {
        let root = tempfile::tempdir().unwrap();
        let workspace = stage(root.path(), &[("README", "hi")]).await;
        let runner = ScriptedRunner::new();

        let result = compile_user_code(&runner, &workspace, &shell(), &RunLimits::new(1000)).await;

        assert!(!result.success);
        assert_eq!(runner.call_count(), 0);
    }
}
