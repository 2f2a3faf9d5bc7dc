//! Compile-and-run pipeline
//!
//! stage -> compile -> run -> cleanup, strictly in that order, one request at
//! a time per pipeline call. The workspace is removed on every exit path and
//! every failure is folded into an `ExecutionResult`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::compiler::compile_user_code;
use crate::config::Settings;
use crate::error::RequestError;
use crate::languages::{LanguageConfig, LanguageTable};
use crate::program::{is_valid_entry_point, run_program};
use crate::runner::{RunLimits, Runner};
use crate::verdict::ExecutionResult;
use crate::workspace::{SourceFile, Workspace};

/// Body of a compile-and-run request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub files: Vec<SourceFile>,
    /// Bytes fed to the program's stdin
    #[serde(default)]
    pub input: String,
    /// Language name or alias; the configured default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Class or file to launch; the language's default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
}

/// Shared compile-and-run service
#[derive(Clone)]
pub struct Pipeline {
    settings: Arc<Settings>,
    languages: Arc<LanguageTable>,
    runner: Arc<dyn Runner>,
    /// Bounds how many requests compile or run at the same time
    permits: Arc<Semaphore>,
}

impl Pipeline {
    pub fn new(settings: Arc<Settings>, languages: Arc<LanguageTable>, runner: Arc<dyn Runner>) -> Self {
        let permits = Arc::new(Semaphore::new(settings.server.max_concurrent_jobs));
        Self {
            settings,
            languages,
            runner,
            permits,
        }
    }

    /// Run one request end to end; never fails, every outcome is a result
    pub async fn execute(&self, request: &RunRequest) -> ExecutionResult {
        let request_id = Uuid::new_v4().simple().to_string();
        info!(
            "[{}] Compile-and-run request: files={}, language={:?}",
            request_id,
            request.files.len(),
            request.language
        );

        let result = match self.process(&request_id, request).await {
            Ok(result) => result,
            Err(e) if e.is_client_error() => {
                info!("[{}] Rejected request: {}", request_id, e);
                ExecutionResult::invalid_request(e)
            }
            Err(e) => {
                warn!("[{}] Request failed: {}", request_id, e);
                ExecutionResult::system_error(e)
            }
        };

        info!("[{}] Finished with status {}", request_id, result.status);
        result
    }

    async fn process(&self, request_id: &str, request: &RunRequest) -> Result<ExecutionResult, RequestError> {
        let lang_config = self.resolve_language(request.language.as_deref())?;
        info!("[{}] Language: {}", request_id, lang_config.name);
        let entry_point = request
            .entry_point
            .as_deref()
            .map(str::trim)
            .unwrap_or(lang_config.entry_point.as_str());
        if !is_valid_entry_point(entry_point) {
            return Err(RequestError::InvalidEntryPoint {
                entry_point: entry_point.to_string(),
            });
        }

        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => return Ok(ExecutionResult::system_error("service is shutting down")),
        };

        let workspace = Workspace::stage(request_id, &request.files, &self.settings.workspace).await?;

        let limits = &self.settings.limits;
        let compile_limits =
            RunLimits::new(limits.compile_time_ms).with_max_output_bytes(limits.max_output_bytes);
        let compile_result =
            compile_user_code(self.runner.as_ref(), &workspace, lang_config, &compile_limits).await;

        if !compile_result.success {
            workspace.cleanup().await;
            return Ok(ExecutionResult::compile_failed(
                compile_result.message.unwrap_or_default(),
            ));
        }

        let run_limits = RunLimits::new(lang_config.calculate_time_limit(limits.run_time_ms))
            .with_memory_mb(
                limits
                    .run_memory_mb
                    .map(|mb| lang_config.calculate_memory_limit(mb)),
            )
            .with_max_output_bytes(limits.max_output_bytes);
        let result = run_program(
            self.runner.as_ref(),
            &workspace,
            lang_config,
            entry_point,
            &request.input,
            &run_limits,
        )
        .await;

        workspace.cleanup().await;
        Ok(result)
    }

    fn resolve_language(&self, requested: Option<&str>) -> Result<&LanguageConfig, RequestError> {
        let language = requested
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(self.settings.default_language.as_str());
        self.languages
            .get(language)
            .ok_or_else(|| RequestError::UnknownLanguage {
                language: language.to_string(),
            })
    }
}
