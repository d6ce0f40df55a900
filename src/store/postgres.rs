//! PostgreSQL-backed patient store.
//!
//! Reaches any PostgreSQL instance via a libpq-style connection string.
//! Concurrent writes to the same row are serialized by the engine's native
//! row locking; the batch write-back runs inside a single transaction.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::info;

use super::{PatientStore, StoreError};
use crate::config::DatabaseConfig;
use crate::patient::{Patient, PatientDraft};

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS patients (
    patient_id          BIGSERIAL PRIMARY KEY,
    name                TEXT NOT NULL,
    age                 BIGINT NOT NULL,
    sex                 TEXT NOT NULL,
    resting_bp          DOUBLE PRECISION NOT NULL,
    cholesterol         DOUBLE PRECISION NOT NULL,
    fasting_bs          DOUBLE PRECISION NOT NULL,
    max_hr              DOUBLE PRECISION NOT NULL,
    exercise_angina     DOUBLE PRECISION NOT NULL,
    oldpeak             DOUBLE PRECISION NOT NULL,
    st_slope_encoded    DOUBLE PRECISION NOT NULL,
    resting_ecg_encoded DOUBLE PRECISION NOT NULL,
    chest_pain_asy      DOUBLE PRECISION NOT NULL,
    chest_pain_ata      DOUBLE PRECISION NOT NULL,
    chest_pain_nap      DOUBLE PRECISION NOT NULL,
    chest_pain_ta       DOUBLE PRECISION NOT NULL,
    heart_disease       DOUBLE PRECISION,
    created_at          TIMESTAMPTZ NOT NULL,
    updated_at          TIMESTAMPTZ NOT NULL
)
"#;

const INSERT_SQL: &str = r#"
INSERT INTO patients (
    name, age, sex, resting_bp, cholesterol, fasting_bs, max_hr,
    exercise_angina, oldpeak, st_slope_encoded, resting_ecg_encoded,
    chest_pain_asy, chest_pain_ata, chest_pain_nap, chest_pain_ta,
    created_at, updated_at
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $16)
RETURNING *
"#;

const UPDATE_SQL: &str = r#"
UPDATE patients SET
    name = $2, age = $3, sex = $4, resting_bp = $5, cholesterol = $6,
    fasting_bs = $7, max_hr = $8, exercise_angina = $9, oldpeak = $10,
    st_slope_encoded = $11, resting_ecg_encoded = $12, chest_pain_asy = $13,
    chest_pain_ata = $14, chest_pain_nap = $15, chest_pain_ta = $16,
    updated_at = $17
WHERE patient_id = $1
RETURNING *
"#;

pub struct PgPatientStore {
    pool: PgPool,
}

impl PgPatientStore {
    /// Connect a pool against the configured database and create the
    /// patients table if it does not exist yet.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let statement_timeout = config.statement_timeout_ms;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_millis(config.connect_timeout_ms))
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    sqlx::query(&format!("SET statement_timeout = {statement_timeout}"))
                        .execute(conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(&config.url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        sqlx::query(CREATE_TABLE_SQL).execute(&pool).await?;
        info!("Patient store ready (PostgreSQL)");

        Ok(Self { pool })
    }
}

fn bind_draft<'q>(
    query: sqlx::query::QueryAs<'q, sqlx::Postgres, Patient, sqlx::postgres::PgArguments>,
    draft: &'q PatientDraft,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, Patient, sqlx::postgres::PgArguments> {
    query
        .bind(&draft.name)
        .bind(draft.age)
        .bind(&draft.sex)
        .bind(draft.resting_bp)
        .bind(draft.cholesterol)
        .bind(draft.fasting_bs)
        .bind(draft.max_hr)
        .bind(draft.exercise_angina)
        .bind(draft.oldpeak)
        .bind(draft.st_slope_encoded)
        .bind(draft.resting_ecg_encoded)
        .bind(draft.chest_pain_asy)
        .bind(draft.chest_pain_ata)
        .bind(draft.chest_pain_nap)
        .bind(draft.chest_pain_ta)
}

#[async_trait]
impl PatientStore for PgPatientStore {
    async fn create(&self, draft: &PatientDraft) -> Result<Patient, StoreError> {
        let patient = bind_draft(sqlx::query_as::<_, Patient>(INSERT_SQL), draft)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;
        Ok(patient)
    }

    async fn get(&self, patient_id: i64) -> Result<Option<Patient>, StoreError> {
        let patient = sqlx::query_as::<_, Patient>(
            "SELECT * FROM patients WHERE patient_id = $1",
        )
        .bind(patient_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(patient)
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Patient>, StoreError> {
        let patients = sqlx::query_as::<_, Patient>(
            "SELECT * FROM patients ORDER BY patient_id LIMIT $1 OFFSET $2",
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(patients)
    }

    async fn list_all(&self) -> Result<Vec<Patient>, StoreError> {
        let patients =
            sqlx::query_as::<_, Patient>("SELECT * FROM patients ORDER BY patient_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(patients)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM patients")
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n as u64)
    }

    async fn update(
        &self,
        patient_id: i64,
        draft: &PatientDraft,
    ) -> Result<Option<Patient>, StoreError> {
        let patient = bind_draft(
            sqlx::query_as::<_, Patient>(UPDATE_SQL).bind(patient_id),
            draft,
        )
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;
        Ok(patient)
    }

    async fn delete(&self, patient_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM patients WHERE patient_id = $1")
            .bind(patient_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_prediction(&self, patient_id: i64, label: f64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE patients SET heart_disease = $2, updated_at = $3 WHERE patient_id = $1",
        )
        .bind(patient_id)
        .bind(label)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_predictions(&self, updates: &[(i64, f64)]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        for (patient_id, label) in updates {
            let result = sqlx::query(
                "UPDATE patients SET heart_disease = $2, updated_at = $3 WHERE patient_id = $1",
            )
            .bind(patient_id)
            .bind(label)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::BatchAborted {
                patient_id: *patient_id,
                reason: e.to_string(),
            })?;

            if result.rows_affected() == 0 {
                // Row vanished between listing and write-back; roll everything
                // back rather than committing a partial batch.
                tx.rollback().await?;
                return Err(StoreError::BatchAborted {
                    patient_id: *patient_id,
                    reason: "patient no longer exists".to_string(),
                });
            }
        }
        tx.commit().await?;
        Ok(())
    }
}
