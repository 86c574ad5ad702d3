//! HTTP invocation endpoint.
//!
//! `POST /api/sessions` runs one pipeline per request and answers with the
//! [`PipelineResult`] JSON once the session finishes. Requests share only the
//! read-only [`Pipeline`].

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::pipeline::{Pipeline, PipelineResult, SessionRequest};

pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub repo_url: String,
    pub prompt: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

pub enum ApiError {
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

pub fn router(pipeline: Pipeline) -> Router {
    Router::new()
        .route("/api/sessions", post(create_session))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

async fn health_check() -> &'static str {
    "ok"
}

async fn create_session(
    State(pipeline): State<Pipeline>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.repo_url.trim().is_empty() {
        return Err(ApiError::BadRequest("repoUrl must not be empty".into()));
    }
    if req.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("prompt must not be empty".into()));
    }

    let request = SessionRequest::new(req.repo_url, req.prompt, req.session_id);
    tracing::info!(session_id = %request.session_id, "session requested");
    let result = pipeline.run_with_timeout(&request).await;

    let status = if result.is_success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok((status, Json::<PipelineResult>(result)))
}

/// Bind `host:port` and serve until Ctrl+C.
pub async fn serve(pipeline: Pipeline, host: &str, port: u16) -> Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let local_addr: SocketAddr = listener.local_addr()?;
    tracing::info!("backspace listening on http://{}", local_addr);

    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
