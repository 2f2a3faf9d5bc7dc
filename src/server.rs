//! HTTP surface for the two request contracts
//!
//! - `POST /api/run`      compile-and-run (`RunRequest` -> `ExecutionResult`)
//! - `POST /api/terminal` allow-listed command (`CommandRequest` -> `ExecutionResult`)
//! - `GET  /health`

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header::HeaderName, HeaderValue};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Settings;
use crate::gateway::{CommandGateway, CommandRequest};
use crate::languages::LanguageTable;
use crate::pipeline::{Pipeline, RunRequest};
use crate::runner::Runner;
use crate::verdict::ExecutionResult;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub gateway: CommandGateway,
}

impl AppState {
    pub fn new(settings: Arc<Settings>, languages: Arc<LanguageTable>, runner: Arc<dyn Runner>) -> Self {
        let gateway = CommandGateway::new(
            &settings.gateway,
            settings.limits.max_output_bytes,
            runner.clone(),
        );
        let pipeline = Pipeline::new(settings, languages, runner);
        Self { pipeline, gateway }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn run_handler(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Json<ExecutionResult> {
    Json(state.pipeline.execute(&request).await)
}

async fn terminal_handler(
    State(state): State<AppState>,
    Json(request): Json<CommandRequest>,
) -> Json<ExecutionResult> {
    Json(state.gateway.execute(&request.command).await)
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build the router with all routes and middleware
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/api/run", post(run_handler))
        .route("/api/terminal", post(terminal_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        // Cross-origin isolation for the browser VM embeds served alongside
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("cross-origin-opener-policy"),
            HeaderValue::from_static("same-origin"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("cross-origin-embedder-policy"),
            HeaderValue::from_static("require-corp"),
        ))
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until `shutdown` resolves
pub async fn serve<F>(settings: &Settings, router: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(settings.server.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", settings.server.bind))?;

    info!("Listening on {}", settings.server.bind);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    Ok(())
}
