//! Feature encoding - patient record to classifier input vector.
//!
//! The classifier was trained against a fixed column order; the encoder must
//! reproduce that order exactly or predictions are silently wrong. The order
//! lives in one place, `FEATURE_COLUMNS`, consumed by the runtime encoder
//! and checked against the artifact's recorded feature count at load time.

use serde_json::{Map, Number, Value};

use crate::patient::Patient;

/// Training-time column order. Position in this list is the position in the
/// encoded vector; reordering entries is a breaking change to the artifact
/// contract and requires retraining.
pub const FEATURE_COLUMNS: [&str; 14] = [
    "age",
    "sex",
    "resting_bp",
    "cholesterol",
    "fasting_bs",
    "max_hr",
    "exercise_angina",
    "oldpeak",
    "st_slope_encoded",
    "resting_ecg_encoded",
    "chest_pain_asy",
    "chest_pain_ata",
    "chest_pain_nap",
    "chest_pain_ta",
];

/// Errors from encoding a stored patient record.
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("Unknown value {value:?} for categorical field '{field}'")]
    UnknownCategory { field: &'static str, value: String },
    #[error("Field '{field}' must be 0 or 1, got {value}")]
    NotBinary { field: &'static str, value: f64 },
    #[error("Field '{field}' is not a finite number")]
    NotFinite { field: &'static str },
}

/// The literal numeric vector fed to the classifier, in `FEATURE_COLUMNS`
/// order.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureVector {
    values: [f64; FEATURE_COLUMNS.len()],
}

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Name -> value pairs for the audit echo in prediction responses.
    pub fn to_echo(&self) -> Map<String, Value> {
        FEATURE_COLUMNS
            .iter()
            .zip(self.values.iter())
            .map(|(name, value)| {
                let number = Number::from_f64(*value)
                    .map(Value::Number)
                    .unwrap_or(Value::Null);
                (name.to_string(), number)
            })
            .collect()
    }
}

fn require_finite(field: &'static str, value: f64) -> Result<f64, FeatureError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FeatureError::NotFinite { field })
    }
}

fn require_binary(field: &'static str, value: f64) -> Result<f64, FeatureError> {
    if value == 0.0 || value == 1.0 {
        Ok(value)
    } else {
        Err(FeatureError::NotBinary { field, value })
    }
}

/// Encode a patient into the fixed-order feature vector.
///
/// Pure and deterministic: the same record always produces the same vector,
/// and batch encoding is per-patient with no cross-record state. Unknown
/// categorical values fail with an error rather than mapping to a default.
/// `exercise_angina` is stored pre-encoded as 0.0/1.0 (the canonical schema);
/// it passes through after the binary check.
pub fn encode(patient: &Patient) -> Result<FeatureVector, FeatureError> {
    let sex = match patient.sex.as_str() {
        "M" => 1.0,
        "F" => 0.0,
        other => {
            return Err(FeatureError::UnknownCategory {
                field: "sex",
                value: other.to_string(),
            })
        }
    };

    let values = [
        patient.age as f64,
        sex,
        require_finite("resting_bp", patient.resting_bp)?,
        require_finite("cholesterol", patient.cholesterol)?,
        require_binary("fasting_bs", patient.fasting_bs)?,
        require_finite("max_hr", patient.max_hr)?,
        require_binary("exercise_angina", patient.exercise_angina)?,
        require_finite("oldpeak", patient.oldpeak)?,
        require_finite("st_slope_encoded", patient.st_slope_encoded)?,
        require_finite("resting_ecg_encoded", patient.resting_ecg_encoded)?,
        require_binary("chest_pain_asy", patient.chest_pain_asy)?,
        require_binary("chest_pain_ata", patient.chest_pain_ata)?,
        require_binary("chest_pain_nap", patient.chest_pain_nap)?,
        require_binary("chest_pain_ta", patient.chest_pain_ta)?,
    ];

    Ok(FeatureVector { values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patient::{sample_draft, Patient};
    use chrono::Utc;

    fn sample_patient() -> Patient {
        Patient::from_draft(1, &sample_draft(), Utc::now())
    }

    #[test]
    fn vector_matches_training_column_order() {
        let vector = encode(&sample_patient()).unwrap();
        assert_eq!(vector.as_slice().len(), FEATURE_COLUMNS.len());
        assert_eq!(
            vector.as_slice(),
            &[58.0, 1.0, 140.0, 289.0, 0.0, 150.0, 0.0, 1.5, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn encoding_is_deterministic() {
        let patient = sample_patient();
        assert_eq!(encode(&patient).unwrap(), encode(&patient).unwrap());
    }

    #[test]
    fn sex_maps_male_to_one_female_to_zero() {
        let mut patient = sample_patient();
        assert_eq!(encode(&patient).unwrap().as_slice()[1], 1.0);
        patient.sex = "F".to_string();
        assert_eq!(encode(&patient).unwrap().as_slice()[1], 0.0);
    }

    #[test]
    fn unknown_sex_fails_instead_of_defaulting() {
        let mut patient = sample_patient();
        patient.sex = "unknown".to_string();
        match encode(&patient) {
            Err(FeatureError::UnknownCategory { field, value }) => {
                assert_eq!(field, "sex");
                assert_eq!(value, "unknown");
            }
            other => panic!("expected UnknownCategory, got {other:?}"),
        }
    }

    #[test]
    fn non_binary_angina_fails() {
        let mut patient = sample_patient();
        patient.exercise_angina = 2.0;
        assert!(matches!(
            encode(&patient),
            Err(FeatureError::NotBinary { field: "exercise_angina", .. })
        ));
    }

    #[test]
    fn non_finite_measurement_fails() {
        let mut patient = sample_patient();
        patient.cholesterol = f64::INFINITY;
        assert!(matches!(
            encode(&patient),
            Err(FeatureError::NotFinite { field: "cholesterol" })
        ));
    }

    #[test]
    fn echo_carries_every_feature() {
        let vector = encode(&sample_patient()).unwrap();
        let echo = vector.to_echo();
        assert_eq!(echo.len(), FEATURE_COLUMNS.len());
        assert_eq!(echo["age"], 58.0);
        assert_eq!(echo["sex"], 1.0);
        assert_eq!(echo["oldpeak"], 1.5);
    }
}
