//! Prediction endpoints

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use tracing::warn;

use super::{AppState, ErrorResponse};
use crate::ml::{BatchPrediction, PredictError, Prediction};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/predict/:patient_id", post(predict_patient))
        .route("/predict-batch/", post(predict_batch))
}

/// Map a prediction failure onto the error taxonomy: unknown patient or
/// empty store -> 404, unavailable artifact -> 503 (not a generic 500),
/// malformed clinical data -> 400, storage faults -> 500.
fn predict_error(e: PredictError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        PredictError::PatientNotFound(_) | PredictError::EmptyStore => StatusCode::NOT_FOUND,
        PredictError::Classifier(_) => StatusCode::SERVICE_UNAVAILABLE,
        PredictError::InvalidFeatures { .. } => StatusCode::BAD_REQUEST,
        PredictError::PartialFailure { .. } | PredictError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        warn!("Prediction failed: {}", e);
    }
    (status, Json(ErrorResponse::new(e.to_string())))
}

async fn predict_patient(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
) -> Result<Json<Prediction>, (StatusCode, Json<ErrorResponse>)> {
    state
        .service
        .predict_one(patient_id)
        .await
        .map(Json)
        .map_err(predict_error)
}

async fn predict_batch(
    State(state): State<AppState>,
) -> Result<Json<BatchPrediction>, (StatusCode, Json<ErrorResponse>)> {
    state
        .service
        .predict_all()
        .await
        .map(Json)
        .map_err(predict_error)
}
