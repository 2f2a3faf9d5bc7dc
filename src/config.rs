//! Service configuration
//!
//! Settings are compiled in from `files/codebox.toml`, optionally replaced by
//! the file named in `CODEBOX_CONFIG`, then patched from environment variables.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Full service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Language used when a request does not name one
    pub default_language: String,
    pub server: ServerSettings,
    pub workspace: WorkspaceSettings,
    pub limits: LimitSettings,
    pub sandbox: SandboxSettings,
    pub gateway: GatewaySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_language: "java".to_string(),
            server: ServerSettings::default(),
            workspace: WorkspaceSettings::default(),
            limits: LimitSettings::default(),
            sandbox: SandboxSettings::default(),
            gateway: GatewaySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Listen address
    pub bind: SocketAddr,
    /// Largest accepted request body in bytes
    pub max_body_bytes: usize,
    /// Compile-and-run pipelines allowed to execute at the same time
    pub max_concurrent_jobs: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            max_body_bytes: 1024 * 1024,
            max_concurrent_jobs: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkspaceSettings {
    /// Directory under which per-request workspaces are created
    pub scratch_root: PathBuf,
    /// Most files accepted in one request
    pub max_files: usize,
    /// Largest accepted file content in bytes
    pub max_file_bytes: usize,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir().join("codebox"),
            max_files: 64,
            max_file_bytes: 256 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitSettings {
    /// Compile wall-clock limit in milliseconds (default: 30000ms = 30s)
    pub compile_time_ms: u32,
    /// Base run wall-clock limit in milliseconds, before language bonuses
    pub run_time_ms: u32,
    /// Base address-space limit in MB for the program (None = unlimited)
    pub run_memory_mb: Option<u32>,
    /// Cap on captured bytes per output stream
    pub max_output_bytes: usize,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            compile_time_ms: 30_000,
            run_time_ms: 5_000,
            run_memory_mb: None,
            max_output_bytes: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    /// Host environment variables forwarded to child processes
    pub pass_env: Vec<String>,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            pass_env: vec!["PATH".into(), "JAVA_HOME".into(), "LANG".into()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Interpreter argv; the allowed command is appended as the last argument
    pub shell: Vec<String>,
    /// Wall-clock limit in milliseconds for one command
    pub time_ms: u32,
    /// Working directory for commands (None = process working directory)
    pub work_dir: Option<PathBuf>,
    /// Exact command strings that may be executed
    pub allowed_commands: Vec<String>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            shell: vec!["sh".into(), "-c".into()],
            time_ms: 10_000,
            work_dir: None,
            allowed_commands: vec![
                "ls".into(),
                "pwd".into(),
                "javac Main.java".into(),
                "java Main".into(),
            ],
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from the built-in file when `path` is None
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read settings {}", path.display()))?;
                Self::parse(&content)
                    .with_context(|| format!("Invalid settings {}", path.display()))?
            }
            None => Self::parse(include_str!(concat!(
                env!("CARGO_MANIFEST_DIR"),
                "/files/codebox.toml"
            )))?,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from TOML
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from `CODEBOX_CONFIG` (or the built-in file) and apply env overrides
    pub fn from_env() -> Result<Self> {
        let path = std::env::var_os("CODEBOX_CONFIG").map(PathBuf::from);
        let mut settings = Self::load(path.as_deref())?;

        if let Ok(bind) = std::env::var("CODEBOX_BIND") {
            settings.server.bind = bind
                .parse()
                .with_context(|| format!("Invalid CODEBOX_BIND: {}", bind))?;
        }
        if let Some(root) = std::env::var_os("CODEBOX_SCRATCH_ROOT") {
            settings.workspace.scratch_root = PathBuf::from(root);
        }
        if let Some(dir) = std::env::var_os("CODEBOX_GATEWAY_DIR") {
            settings.gateway.work_dir = Some(PathBuf::from(dir));
        }

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.gateway.shell.is_empty() {
            anyhow::bail!("gateway.shell must name an interpreter");
        }
        if self.server.max_concurrent_jobs == 0 {
            anyhow::bail!("server.max_concurrent_jobs must be at least 1");
        }
        if self.limits.compile_time_ms == 0 || self.limits.run_time_ms == 0 {
            anyhow::bail!("time limits must be positive");
        }
        if self.gateway.time_ms == 0 {
            anyhow::bail!("gateway.time_ms must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_settings() {
        let settings = Settings::load(None).unwrap();

        assert_eq!(settings.default_language, "java");
        assert_eq!(settings.server.bind.port(), 3000);
        assert_eq!(settings.limits.run_time_ms, 5_000);
        assert!(settings.limits.run_memory_mb.is_none());
        assert!(settings
            .gateway
            .allowed_commands
            .contains(&"pwd".to_string()));
    }

    #[test]
    fn test_partial_settings_keep_defaults() {
        let settings = Settings::parse(
            r#"
[limits]
run_time_ms = 250

[gateway]
allowed_commands = ["date"]
"#,
        )
        .unwrap();

        assert_eq!(settings.limits.run_time_ms, 250);
        assert_eq!(settings.limits.compile_time_ms, 30_000);
        assert_eq!(settings.gateway.allowed_commands, vec!["date"]);
        assert_eq!(settings.gateway.shell, vec!["sh", "-c"]);
    }

    #[test]
    fn test_empty_shell_rejected() {
        let settings = Settings::parse("[gateway]\nshell = []\n").unwrap();
        assert!(settings.validate().is_err());
    }
}
