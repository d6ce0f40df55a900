//! Prediction Service - orchestrates store, encoder, and classifier.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use super::classifier::{ClassifierEngine, ClassifierError, LogisticModel};
use super::features::{encode, FeatureError};
use crate::patient::Patient;
use crate::store::{PatientStore, StoreError};

pub const LABEL_DISEASE: &str = "Heart Disease";
pub const LABEL_NO_DISEASE: &str = "No Heart Disease";

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("Patient {0} not found")]
    PatientNotFound(i64),
    #[error("No patients in store")]
    EmptyStore,
    #[error("Invalid feature data for patient {patient_id}: {source}")]
    InvalidFeatures {
        patient_id: i64,
        #[source]
        source: FeatureError,
    },
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error("Batch write-back failed for patient {patient_id}: {reason}")]
    PartialFailure { patient_id: i64, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Probability pair for the two labels; sums to 1.0 within tolerance.
#[derive(Clone, Debug, Serialize)]
pub struct Confidence {
    pub no_disease: f64,
    pub disease: f64,
}

/// One prediction result, echoing every input feature for auditability.
#[derive(Clone, Debug, Serialize)]
pub struct Prediction {
    pub patient_id: i64,
    pub name: String,
    pub prediction: i64,
    pub label: String,
    pub confidence: Confidence,
    pub features: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize)]
pub struct BatchPrediction {
    pub total_patients: usize,
    pub predictions: Vec<Prediction>,
}

pub struct PredictionService {
    store: Arc<dyn PatientStore>,
    classifier: Arc<ClassifierEngine>,
}

impl PredictionService {
    pub fn new(store: Arc<dyn PatientStore>, classifier: Arc<ClassifierEngine>) -> Self {
        Self { store, classifier }
    }

    fn classify(model: &LogisticModel, patient: &Patient) -> Result<(Prediction, f64), PredictError> {
        let features = encode(patient).map_err(|source| PredictError::InvalidFeatures {
            patient_id: patient.patient_id,
            source,
        })?;

        let (no_disease, disease) = model.predict_proba(features.as_slice());
        let label_num = model.predict(features.as_slice());
        let label = if label_num == 1 {
            LABEL_DISEASE
        } else {
            LABEL_NO_DISEASE
        };

        let prediction = Prediction {
            patient_id: patient.patient_id,
            name: patient.name.clone(),
            prediction: label_num,
            label: label.to_string(),
            confidence: Confidence {
                no_disease,
                disease,
            },
            features: features.to_echo(),
        };
        Ok((prediction, label_num as f64))
    }

    /// Predict for one patient and persist the label, overwriting any prior
    /// value.
    pub async fn predict_one(&self, patient_id: i64) -> Result<Prediction, PredictError> {
        let patient = self
            .store
            .get(patient_id)
            .await?
            .ok_or(PredictError::PatientNotFound(patient_id))?;

        let model = self.classifier.get().await?;
        let (prediction, label) = Self::classify(&model, &patient)?;

        if !self.store.record_prediction(patient_id, label).await? {
            // Deleted between lookup and write-back.
            return Err(PredictError::PatientNotFound(patient_id));
        }

        info!(
            "Predicted {} for patient {} (p={:.3})",
            prediction.label, patient_id, prediction.confidence.disease
        );
        Ok(prediction)
    }

    /// Predict for every stored patient. Labels are persisted atomically:
    /// either every patient's record is updated and all results returned,
    /// or none are.
    pub async fn predict_all(&self) -> Result<BatchPrediction, PredictError> {
        let patients = self.store.list_all().await?;
        if patients.is_empty() {
            return Err(PredictError::EmptyStore);
        }

        let model = self.classifier.get().await?;

        let mut predictions = Vec::with_capacity(patients.len());
        let mut updates = Vec::with_capacity(patients.len());
        for patient in &patients {
            let (prediction, label) = Self::classify(&model, patient)?;
            updates.push((patient.patient_id, label));
            predictions.push(prediction);
        }

        match self.store.record_predictions(&updates).await {
            Ok(()) => {}
            Err(StoreError::BatchAborted { patient_id, reason }) => {
                return Err(PredictError::PartialFailure { patient_id, reason })
            }
            Err(e) => return Err(e.into()),
        }

        info!("Batch prediction completed for {} patients", predictions.len());
        Ok(BatchPrediction {
            total_patients: predictions.len(),
            predictions,
        })
    }
}
