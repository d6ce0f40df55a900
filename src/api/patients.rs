//! Patient CRUD endpoints

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use super::{store_error, AppState, ErrorResponse};
use crate::patient::{Patient, PatientDraft};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/patients/", post(create_patient).get(list_patients))
        .route(
            "/patients/:patient_id",
            get(get_patient).put(update_patient).delete(delete_patient),
        )
}

fn validation_failure(errors: Vec<crate::patient::ValidationError>) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::with_details(
            "Invalid patient data",
            json!(errors),
        )),
    )
}

fn not_found() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new("Patient not found")),
    )
}

async fn create_patient(
    State(state): State<AppState>,
    Json(draft): Json<PatientDraft>,
) -> Result<(StatusCode, Json<Patient>), (StatusCode, Json<ErrorResponse>)> {
    draft.validate().map_err(validation_failure)?;
    let patient = state.store.create(&draft).await.map_err(store_error)?;
    Ok((StatusCode::CREATED, Json(patient)))
}

#[derive(Deserialize)]
struct ListParams {
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn list_patients(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Patient>>, (StatusCode, Json<ErrorResponse>)> {
    // Read-all is capped; callers page past the cap with limit/offset.
    let limit = params
        .limit
        .unwrap_or(state.max_page_size)
        .min(state.max_page_size);
    let offset = params.offset.unwrap_or(0);
    let patients = state
        .store
        .list(limit, offset)
        .await
        .map_err(store_error)?;
    Ok(Json(patients))
}

async fn get_patient(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
) -> Result<Json<Patient>, (StatusCode, Json<ErrorResponse>)> {
    match state.store.get(patient_id).await.map_err(store_error)? {
        Some(patient) => Ok(Json(patient)),
        None => Err(not_found()),
    }
}

async fn update_patient(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
    Json(draft): Json<PatientDraft>,
) -> Result<Json<Patient>, (StatusCode, Json<ErrorResponse>)> {
    draft.validate().map_err(validation_failure)?;
    match state
        .store
        .update(patient_id, &draft)
        .await
        .map_err(store_error)?
    {
        Some(patient) => Ok(Json(patient)),
        None => Err(not_found()),
    }
}

async fn delete_patient(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    if state.store.delete(patient_id).await.map_err(store_error)? {
        Ok(Json(json!({ "message": "Deleted" })))
    } else {
        Err(not_found())
    }
}
