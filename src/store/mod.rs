//! Store Module - Durable patient persistence
//!
//! `PatientStore` is the seam between the HTTP surface / prediction service
//! and whatever backend holds the rows. The PostgreSQL implementation lives
//! in `postgres`; `MemoryPatientStore` backs the integration tests.

pub mod postgres;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::patient::{Patient, PatientDraft};

pub use postgres::PgPatientStore;

/// Errors from store operations. Unknown identifiers are not errors here;
/// reads return `Option` and writes report whether a row was touched.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database connection failed: {0}")]
    Connection(String),
    #[error("Query failed: {0}")]
    Query(String),
    #[error("Batch write-back aborted at patient {patient_id}: {reason}")]
    BatchAborted { patient_id: i64, reason: String },
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Query(e.to_string())
    }
}

/// Persistence operations over patient records.
#[async_trait]
pub trait PatientStore: Send + Sync {
    /// Insert a new record; the store assigns the identifier.
    async fn create(&self, draft: &PatientDraft) -> Result<Patient, StoreError>;

    async fn get(&self, patient_id: i64) -> Result<Option<Patient>, StoreError>;

    /// Page of records ordered by identifier.
    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Patient>, StoreError>;

    /// Every record, ordered by identifier. Used by batch prediction.
    async fn list_all(&self) -> Result<Vec<Patient>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    /// Replace the clinical fields of an existing record. Returns `None`
    /// when the identifier is unknown.
    async fn update(&self, patient_id: i64, draft: &PatientDraft)
        -> Result<Option<Patient>, StoreError>;

    /// Hard delete. Returns whether a row existed.
    async fn delete(&self, patient_id: i64) -> Result<bool, StoreError>;

    /// Persist a prediction label, overwriting any prior value. Returns
    /// whether the row still exists.
    async fn record_prediction(&self, patient_id: i64, label: f64) -> Result<bool, StoreError>;

    /// Persist a batch of prediction labels atomically: either every label
    /// lands or none does. A failure names the patient it stopped at.
    async fn record_predictions(&self, updates: &[(i64, f64)]) -> Result<(), StoreError>;
}

struct MemoryInner {
    patients: BTreeMap<i64, Patient>,
    next_id: i64,
}

/// In-memory store for tests.
pub struct MemoryPatientStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryPatientStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryInner {
                patients: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }
}

impl Default for MemoryPatientStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PatientStore for MemoryPatientStore {
    async fn create(&self, draft: &PatientDraft) -> Result<Patient, StoreError> {
        let mut inner = self.inner.write().await;
        let id = inner.next_id;
        inner.next_id += 1;
        let patient = Patient::from_draft(id, draft, Utc::now());
        inner.patients.insert(id, patient.clone());
        Ok(patient)
    }

    async fn get(&self, patient_id: i64) -> Result<Option<Patient>, StoreError> {
        Ok(self.inner.read().await.patients.get(&patient_id).cloned())
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Patient>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .patients
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Patient>, StoreError> {
        Ok(self.inner.read().await.patients.values().cloned().collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.inner.read().await.patients.len() as u64)
    }

    async fn update(
        &self,
        patient_id: i64,
        draft: &PatientDraft,
    ) -> Result<Option<Patient>, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.patients.get_mut(&patient_id) {
            Some(patient) => {
                patient.apply_draft(draft, Utc::now());
                Ok(Some(patient.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, patient_id: i64) -> Result<bool, StoreError> {
        Ok(self.inner.write().await.patients.remove(&patient_id).is_some())
    }

    async fn record_prediction(&self, patient_id: i64, label: f64) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.patients.get_mut(&patient_id) {
            Some(patient) => {
                patient.heart_disease = Some(label);
                patient.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_predictions(&self, updates: &[(i64, f64)]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        // All-or-nothing: refuse the whole batch before mutating anything.
        for (patient_id, _) in updates {
            if !inner.patients.contains_key(patient_id) {
                return Err(StoreError::BatchAborted {
                    patient_id: *patient_id,
                    reason: "patient no longer exists".to_string(),
                });
            }
        }
        let now = Utc::now();
        for (patient_id, label) in updates {
            if let Some(patient) = inner.patients.get_mut(patient_id) {
                patient.heart_disease = Some(*label);
                patient.updated_at = now;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patient::sample_draft;

    #[tokio::test]
    async fn create_assigns_sequential_ids() {
        let store = MemoryPatientStore::new();
        let a = store.create(&sample_draft()).await.unwrap();
        let b = store.create(&sample_draft()).await.unwrap();
        assert_eq!(a.patient_id, 1);
        assert_eq!(b.patient_id, 2);
        assert!(a.heart_disease.is_none());
    }

    #[tokio::test]
    async fn delete_then_get_returns_none() {
        let store = MemoryPatientStore::new();
        let patient = store.create(&sample_draft()).await.unwrap();
        assert!(store.delete(patient.patient_id).await.unwrap());
        assert!(store.get(patient.patient_id).await.unwrap().is_none());
        assert!(!store.delete(patient.patient_id).await.unwrap());
    }

    #[tokio::test]
    async fn list_respects_limit_and_offset() {
        let store = MemoryPatientStore::new();
        for _ in 0..5 {
            store.create(&sample_draft()).await.unwrap();
        }
        let page = store.list(2, 1).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].patient_id, 2);
        assert_eq!(store.count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn batch_write_back_is_all_or_nothing() {
        let store = MemoryPatientStore::new();
        let a = store.create(&sample_draft()).await.unwrap();
        let b = store.create(&sample_draft()).await.unwrap();

        let err = store
            .record_predictions(&[(a.patient_id, 1.0), (b.patient_id + 100, 0.0)])
            .await
            .unwrap_err();
        match err {
            StoreError::BatchAborted { patient_id, .. } => {
                assert_eq!(patient_id, b.patient_id + 100)
            }
            other => panic!("unexpected error: {other}"),
        }
        // Nothing was persisted for the valid half of the batch.
        let a_after = store.get(a.patient_id).await.unwrap().unwrap();
        assert!(a_after.heart_disease.is_none());

        store
            .record_predictions(&[(a.patient_id, 1.0), (b.patient_id, 0.0)])
            .await
            .unwrap();
        assert_eq!(
            store.get(a.patient_id).await.unwrap().unwrap().heart_disease,
            Some(1.0)
        );
    }
}
