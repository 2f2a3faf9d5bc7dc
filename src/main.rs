mod compiler;
mod config;
mod error;
mod gateway;
mod languages;
mod pipeline;
mod program;
mod runner;
mod server;
mod verdict;
mod workspace;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::Settings;
use crate::languages::LanguageTable;
use crate::runner::{HostRunner, Runner};
use crate::server::{build_router, serve, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("codebox=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;

    // Load language configurations
    let languages_path = std::env::var_os("CODEBOX_LANGUAGES").map(PathBuf::from);
    let languages = LanguageTable::load(languages_path.as_deref())?;
    match &languages_path {
        Some(path) => info!("Loaded language configurations from {}", path.display()),
        None => info!("Loaded built-in language configurations"),
    }
    info!("Available languages: {}", languages.names().join(", "));

    if languages.get(&settings.default_language).is_none() {
        anyhow::bail!(
            "Default language '{}' is not configured",
            settings.default_language
        );
    }

    tokio::fs::create_dir_all(&settings.workspace.scratch_root).await?;
    info!(
        "Scratch root: {}, max concurrent jobs: {}",
        settings.workspace.scratch_root.display(),
        settings.server.max_concurrent_jobs
    );
    if settings.limits.run_memory_mb.is_none() {
        warn!("No run memory limit configured");
    }

    let runner: Arc<dyn Runner> = Arc::new(HostRunner::new(settings.sandbox.pass_env.clone()));
    let max_body_bytes = settings.server.max_body_bytes;
    let settings = Arc::new(settings);

    let state = AppState::new(settings.clone(), Arc::new(languages), runner);
    let router = build_router(state, max_body_bytes);

    info!("Starting Codebox...");

    serve(&settings, router, shutdown_signal()).await?;

    info!("Codebox stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
