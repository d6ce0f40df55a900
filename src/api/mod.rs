//! API Layer - REST surface over the patient store and prediction service
//!
//! Thin request/response mapping: handlers validate input, call the store or
//! the prediction service, and translate typed errors to status codes.

pub mod patients;
pub mod predict;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::ml::{ClassifierEngine, PredictionService};
use crate::store::{PatientStore, StoreError};

/// Shared handler state, constructed once at startup and injected into every
/// request. No module-level singletons.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PatientStore>,
    pub service: Arc<PredictionService>,
    pub classifier: Arc<ClassifierEngine>,
    pub max_page_size: usize,
    pub request_timeout: Duration,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            error: error.into(),
            details: Some(details),
        }
    }
}

pub(crate) fn store_error(e: StoreError) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(format!("Storage failure: {}", e))),
    )
}

/// Create the main API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(patients::routes())
        .merge(predict::routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            timeout_middleware,
        ))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Per-request timeout - prevents a stuck store or artifact read from
/// pinning a connection indefinitely.
async fn timeout_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    match tokio::time::timeout(state.request_timeout, next.run(request)).await {
        Ok(response) => Ok(response),
        Err(_) => Err(StatusCode::REQUEST_TIMEOUT),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    model_loaded: bool,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        model_loaded: state.classifier.loaded().await,
    })
}
