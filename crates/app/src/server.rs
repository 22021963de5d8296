use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use manual_qa_core::{AskPipeline, AskRequest, AskResponse, PipelineError, StatsSnapshot};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info};

/// Shared handler state. The pipeline is published once, after startup checks pass.
#[derive(Clone, Default)]
pub struct AppState {
    pipeline: Arc<OnceCell<Arc<AskPipeline>>>,
}

impl AppState {
    /// Returns false if a pipeline was already published.
    pub fn publish(&self, pipeline: AskPipeline) -> bool {
        self.pipeline.set(Arc::new(pipeline)).is_ok()
    }

    pub fn is_ready(&self) -> bool {
        self.pipeline.initialized()
    }

    fn pipeline(&self) -> Result<Arc<AskPipeline>, ApiError> {
        self.pipeline
            .get()
            .cloned()
            .ok_or_else(|| ApiError::ServiceUnavailable("RAG system not initialized".to_string()))
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    ServiceUnavailable(String),
    Internal { kind: &'static str, message: String },
}

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        ApiError::Internal {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, "bad_request", message),
            ApiError::ServiceUnavailable(message) => {
                (StatusCode::SERVICE_UNAVAILABLE, "not_ready", message)
            }
            ApiError::Internal { kind, message } => {
                (StatusCode::INTERNAL_SERVER_ERROR, kind, message)
            }
        };
        (status, Json(json!({ "error": message, "kind": kind }))).into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ask", post(ask))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .with_state(state)
}

async fn ask(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let pipeline = state.pipeline()?;
    let Json(request) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    match pipeline.ask(&request.question).await {
        Ok(output) => {
            let response = AskResponse::from(output);
            info!(pages = ?response.referenced_pages, "question answered");
            Ok(Json(response))
        }
        Err(failure) => {
            error!(kind = failure.kind(), error = %failure, "question failed");
            Err(failure.into())
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: if state.is_ready() { "ready" } else { "starting" },
    })
}

async fn stats(State(state): State<AppState>) -> Result<Json<StatsSnapshot>, ApiError> {
    Ok(Json(state.pipeline()?.stats()))
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}
