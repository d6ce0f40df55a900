use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt; // for `oneshot`

use cardia::api::{self, AppState};
use cardia::ml::{ClassifierEngine, LogisticModel, PredictionService, FEATURE_COLUMNS};
use cardia::store::{MemoryPatientStore, PatientStore};

/// Write a valid artifact whose zero coefficients make the intercept decide
/// every label: positive intercept -> 1 for all patients, negative -> 0.
fn write_artifact(dir: &tempfile::TempDir, intercept: f64) -> PathBuf {
    let model = LogisticModel {
        intercept,
        coefficients: vec![0.0; FEATURE_COLUMNS.len()],
    };
    let path = dir.path().join("heart_model.bin");
    let mut bytes = Vec::new();
    model.serialize(&mut bytes).unwrap();
    std::fs::write(&path, bytes).unwrap();
    path
}

fn test_app(artifact_path: impl Into<PathBuf>) -> Router {
    let store: Arc<dyn PatientStore> = Arc::new(MemoryPatientStore::new());
    let classifier = Arc::new(ClassifierEngine::new(
        artifact_path,
        Duration::from_secs(1),
    ));
    let service = Arc::new(PredictionService::new(store.clone(), classifier.clone()));
    api::router(AppState {
        store,
        service,
        classifier,
        max_page_size: 1000,
        request_timeout: Duration::from_secs(5),
    })
}

fn draft_json(name: &str) -> Value {
    json!({
        "name": name,
        "age": 58,
        "sex": "M",
        "resting_bp": 140.0,
        "cholesterol": 289.0,
        "fasting_bs": 0.0,
        "max_hr": 150.0,
        "exercise_angina": 0.0,
        "oldpeak": 1.5,
        "st_slope_encoded": 1.0,
        "resting_ecg_encoded": 0.0,
        "chest_pain_asy": 1.0,
        "chest_pain_ata": 0.0,
        "chest_pain_nap": 0.0,
        "chest_pain_ta": 0.0
    })
}

fn post(uri: &str, body: Option<&Value>) -> Request<Body> {
    let builder = Request::builder().method("POST").uri(uri);
    match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_string(body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn create_patient(app: &Router, name: &str) -> i64 {
    let response = app
        .clone()
        .oneshot(post("/patients/", Some(&draft_json(name))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["patient_id"].as_i64().unwrap()
}

#[tokio::test]
async fn prediction_persists_label_and_echoes_features() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(write_artifact(&dir, 2.0));
    let id = create_patient(&app, "John Doe").await;

    let response = app
        .clone()
        .oneshot(post(&format!("/predict/{id}"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let prediction = body_json(response).await;

    assert_eq!(prediction["patient_id"], id);
    assert_eq!(prediction["name"], "John Doe");
    assert_eq!(prediction["prediction"], 1);
    assert_eq!(prediction["label"], "Heart Disease");

    // Probability pair: components in [0,1], summing to 1.
    let no_disease = prediction["confidence"]["no_disease"].as_f64().unwrap();
    let disease = prediction["confidence"]["disease"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&no_disease));
    assert!((0.0..=1.0).contains(&disease));
    assert!((no_disease + disease - 1.0).abs() < 1e-6);

    // Every input feature is echoed back for audit.
    let features = prediction["features"].as_object().unwrap();
    assert_eq!(features.len(), FEATURE_COLUMNS.len());
    assert_eq!(features["age"], 58.0);
    assert_eq!(features["sex"], 1.0);
    assert_eq!(features["chest_pain_asy"], 1.0);

    // The label was written back to the store.
    let response = app.clone().oneshot(get("/patients/")).await.unwrap();
    let patients = body_json(response).await;
    assert_eq!(patients[0]["heart_disease"], prediction["prediction"].as_i64().unwrap() as f64);
}

#[tokio::test]
async fn repeated_prediction_overwrites_label() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_artifact(&dir, 2.0);
    let app = test_app(&path);
    let id = create_patient(&app, "Jane Doe").await;

    let response = app
        .clone()
        .oneshot(post(&format!("/predict/{id}"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Still the cached positive model; the persisted label stays 1.0 after
    // a second call rather than accumulating.
    let response = app
        .clone()
        .oneshot(post(&format!("/predict/{id}"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.clone().oneshot(get(&format!("/patients/{id}"))).await.unwrap();
    let patient = body_json(response).await;
    assert_eq!(patient["heart_disease"], 1.0);
}

#[tokio::test]
async fn unknown_patient_prediction_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(write_artifact(&dir, 0.5));
    let response = app.oneshot(post("/predict/42", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleted_patient_prediction_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(write_artifact(&dir, 0.5));
    let id = create_patient(&app, "John Doe").await;

    let response = app
        .clone()
        .oneshot(delete(&format!("/patients/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(post(&format!("/predict/{id}"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_artifact_is_service_unavailable_never_a_guess() {
    let app = test_app("/nonexistent/heart_model.bin");
    let id = create_patient(&app, "John Doe").await;

    let response = app
        .clone()
        .oneshot(post(&format!("/predict/{id}"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // No label was invented for the patient.
    let response = app.clone().oneshot(get(&format!("/patients/{id}"))).await.unwrap();
    let patient = body_json(response).await;
    assert_eq!(patient["heart_disease"], Value::Null);

    let response = app.clone().oneshot(post("/predict-batch/", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn batch_prediction_covers_every_patient() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(write_artifact(&dir, -2.0));
    for name in ["A", "B", "C"] {
        create_patient(&app, name).await;
    }

    let response = app.clone().oneshot(post("/predict-batch/", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let batch = body_json(response).await;
    assert_eq!(batch["total_patients"], 3);
    assert_eq!(batch["predictions"].as_array().unwrap().len(), 3);

    // total_patients matches the store's view, and every record now carries
    // the persisted label.
    let response = app.clone().oneshot(get("/patients/")).await.unwrap();
    let patients = body_json(response).await;
    let patients = patients.as_array().unwrap();
    assert_eq!(patients.len(), 3);
    for patient in patients {
        assert_eq!(patient["heart_disease"], 0.0);
    }
}

#[tokio::test]
async fn batch_prediction_on_empty_store_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(write_artifact(&dir, 0.5));
    let response = app.oneshot(post("/predict-batch/", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
