//! Patient Module - Clinical patient records and input validation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One patient row: demographics, clinical measurements, and the optional
/// persisted prediction. `heart_disease` stays `None` until a prediction
/// call writes a label back.
#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Patient {
    pub patient_id: i64,
    pub name: String,
    pub age: i64,
    pub sex: String,
    pub resting_bp: f64,
    pub cholesterol: f64,
    pub fasting_bs: f64,
    pub max_hr: f64,
    pub exercise_angina: f64,
    pub oldpeak: f64,
    pub st_slope_encoded: f64,
    pub resting_ecg_encoded: f64,
    pub chest_pain_asy: f64,
    pub chest_pain_ata: f64,
    pub chest_pain_nap: f64,
    pub chest_pain_ta: f64,
    pub heart_disease: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create/update request body: every clinical field, no identifier and no
/// prediction. Missing fields are rejected at deserialization.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PatientDraft {
    pub name: String,
    pub age: i64,
    pub sex: String,
    pub resting_bp: f64,
    pub cholesterol: f64,
    pub fasting_bs: f64,
    pub max_hr: f64,
    pub exercise_angina: f64,
    pub oldpeak: f64,
    pub st_slope_encoded: f64,
    pub resting_ecg_encoded: f64,
    pub chest_pain_asy: f64,
    pub chest_pain_ata: f64,
    pub chest_pain_nap: f64,
    pub chest_pain_ta: f64,
}

/// Field-level validation error
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, code: &str, message: String) -> Self {
        Self {
            field: field.to_string(),
            code: code.to_string(),
            message,
        }
    }
}

impl PatientDraft {
    /// Validate the draft before it reaches the store.
    ///
    /// Unknown categorical values are rejected, never coerced to a default:
    /// `sex` must be exactly "M" or "F", and the pre-encoded binary fields
    /// must be 0.0 or 1.0.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push(ValidationError::new(
                "name",
                "required",
                "name must not be empty".to_string(),
            ));
        }

        if !(0..=130).contains(&self.age) {
            errors.push(ValidationError::new(
                "age",
                "out_of_range",
                format!("age must be in 0..=130, got {}", self.age),
            ));
        }

        if self.sex != "M" && self.sex != "F" {
            errors.push(ValidationError::new(
                "sex",
                "unknown_category",
                format!("sex must be \"M\" or \"F\", got {:?}", self.sex),
            ));
        }

        for (field, value) in [
            ("fasting_bs", self.fasting_bs),
            ("exercise_angina", self.exercise_angina),
            ("chest_pain_asy", self.chest_pain_asy),
            ("chest_pain_ata", self.chest_pain_ata),
            ("chest_pain_nap", self.chest_pain_nap),
            ("chest_pain_ta", self.chest_pain_ta),
        ] {
            if value != 0.0 && value != 1.0 {
                errors.push(ValidationError::new(
                    field,
                    "not_binary",
                    format!("{} must be 0 or 1, got {}", field, value),
                ));
            }
        }

        for (field, value) in [
            ("resting_bp", self.resting_bp),
            ("cholesterol", self.cholesterol),
            ("max_hr", self.max_hr),
            ("oldpeak", self.oldpeak),
            ("st_slope_encoded", self.st_slope_encoded),
            ("resting_ecg_encoded", self.resting_ecg_encoded),
        ] {
            if !value.is_finite() {
                errors.push(ValidationError::new(
                    field,
                    "not_finite",
                    format!("{} must be a finite number", field),
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Patient {
    /// Materialize a new record from a validated draft. Used by stores that
    /// assemble rows themselves; the SQL store lets the database do this.
    pub fn from_draft(patient_id: i64, draft: &PatientDraft, now: DateTime<Utc>) -> Self {
        Self {
            patient_id,
            name: draft.name.clone(),
            age: draft.age,
            sex: draft.sex.clone(),
            resting_bp: draft.resting_bp,
            cholesterol: draft.cholesterol,
            fasting_bs: draft.fasting_bs,
            max_hr: draft.max_hr,
            exercise_angina: draft.exercise_angina,
            oldpeak: draft.oldpeak,
            st_slope_encoded: draft.st_slope_encoded,
            resting_ecg_encoded: draft.resting_ecg_encoded,
            chest_pain_asy: draft.chest_pain_asy,
            chest_pain_ata: draft.chest_pain_ata,
            chest_pain_nap: draft.chest_pain_nap,
            chest_pain_ta: draft.chest_pain_ta,
            heart_disease: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the clinical fields from a draft. The identifier, any
    /// persisted prediction, and `created_at` are untouched.
    pub fn apply_draft(&mut self, draft: &PatientDraft, now: DateTime<Utc>) {
        self.name = draft.name.clone();
        self.age = draft.age;
        self.sex = draft.sex.clone();
        self.resting_bp = draft.resting_bp;
        self.cholesterol = draft.cholesterol;
        self.fasting_bs = draft.fasting_bs;
        self.max_hr = draft.max_hr;
        self.exercise_angina = draft.exercise_angina;
        self.oldpeak = draft.oldpeak;
        self.st_slope_encoded = draft.st_slope_encoded;
        self.resting_ecg_encoded = draft.resting_ecg_encoded;
        self.chest_pain_asy = draft.chest_pain_asy;
        self.chest_pain_ata = draft.chest_pain_ata;
        self.chest_pain_nap = draft.chest_pain_nap;
        self.chest_pain_ta = draft.chest_pain_ta;
        self.updated_at = now;
    }
}

#[cfg(test)]
pub(crate) fn sample_draft() -> PatientDraft {
    PatientDraft {
        name: "John Doe".to_string(),
        age: 58,
        sex: "M".to_string(),
        resting_bp: 140.0,
        cholesterol: 289.0,
        fasting_bs: 0.0,
        max_hr: 150.0,
        exercise_angina: 0.0,
        oldpeak: 1.5,
        st_slope_encoded: 1.0,
        resting_ecg_encoded: 0.0,
        chest_pain_asy: 1.0,
        chest_pain_ata: 0.0,
        chest_pain_nap: 0.0,
        chest_pain_ta: 0.0,
    }
}
