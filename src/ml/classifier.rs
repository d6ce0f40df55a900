//! Classifier adapter - pre-trained model artifact loading and inference.
//!
//! The artifact is a binary logistic-regression parameter file produced by
//! the offline training process: 4-byte magic `CRDM`, u16 format version,
//! u16 feature count, f64 intercept, then one f64 coefficient per feature,
//! all big-endian. The codec lives here so the trainer and the service
//! share one definition.

use std::io::{self, Cursor, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use tokio::sync::RwLock;
use tracing::info;

use super::features::FEATURE_COLUMNS;

pub const ARTIFACT_MAGIC: [u8; 4] = *b"CRDM";
pub const ARTIFACT_VERSION: u16 = 1;

/// The artifact could not be loaded: missing, unreadable, corrupt, or
/// trained against a different feature set. Callers surface this as a
/// service-unavailable condition, never as a wrong prediction.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Model artifact unavailable: {0}")]
    ModelUnavailable(String),
}

/// Logistic-regression parameters loaded from an artifact.
#[derive(Clone, Debug)]
pub struct LogisticModel {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

impl LogisticModel {
    /// Probability pair `(p_no_disease, p_disease)`; components in [0, 1]
    /// and summing to 1 up to floating-point tolerance.
    pub fn predict_proba(&self, x: &[f64]) -> (f64, f64) {
        let z: f64 = self.intercept
            + self
                .coefficients
                .iter()
                .zip(x.iter())
                .map(|(c, v)| c * v)
                .sum::<f64>();
        let p = 1.0 / (1.0 + (-z).exp());
        (1.0 - p, p)
    }

    /// Discrete label: 1 when p(disease) >= 0.5, else 0.
    pub fn predict(&self, x: &[f64]) -> i64 {
        let (_, p) = self.predict_proba(x);
        i64::from(p >= 0.5)
    }

    pub fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&ARTIFACT_MAGIC)?;
        writer.write_u16::<BigEndian>(ARTIFACT_VERSION)?;
        writer.write_u16::<BigEndian>(self.coefficients.len() as u16)?;
        writer.write_f64::<BigEndian>(self.intercept)?;
        for c in &self.coefficients {
            writer.write_f64::<BigEndian>(*c)?;
        }
        Ok(())
    }

    pub fn deserialize<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != ARTIFACT_MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "bad artifact magic",
            ));
        }
        let version = reader.read_u16::<BigEndian>()?;
        if version != ARTIFACT_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported artifact version {version}"),
            ));
        }
        let n = reader.read_u16::<BigEndian>()? as usize;
        let intercept = reader.read_f64::<BigEndian>()?;
        let coefficients = (0..n)
            .map(|_| reader.read_f64::<BigEndian>())
            .collect::<io::Result<Vec<f64>>>()?;
        Ok(Self {
            intercept,
            coefficients,
        })
    }
}

/// Loads the artifact lazily on first use and caches it for the lifetime of
/// the process. Every load failure is reported per request; a later request
/// retries, so dropping a valid artifact into place needs no restart.
pub struct ClassifierEngine {
    artifact_path: PathBuf,
    load_timeout: Duration,
    model: RwLock<Option<Arc<LogisticModel>>>,
}

impl ClassifierEngine {
    pub fn new(artifact_path: impl Into<PathBuf>, load_timeout: Duration) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            load_timeout,
            model: RwLock::new(None),
        }
    }

    /// Whether a model is currently cached.
    pub async fn loaded(&self) -> bool {
        self.model.read().await.is_some()
    }

    /// The cached model, loading it from disk on first use.
    pub async fn get(&self) -> Result<Arc<LogisticModel>, ClassifierError> {
        if let Some(model) = self.model.read().await.as_ref() {
            return Ok(model.clone());
        }

        let mut slot = self.model.write().await;
        // A concurrent request may have loaded it while we waited.
        if let Some(model) = slot.as_ref() {
            return Ok(model.clone());
        }

        let model = Arc::new(self.load().await?);
        info!(
            "Classifier artifact loaded from {} ({} features)",
            self.artifact_path.display(),
            model.coefficients.len()
        );
        *slot = Some(model.clone());
        Ok(model)
    }

    async fn load(&self) -> Result<LogisticModel, ClassifierError> {
        let path = self.artifact_path.display();

        let bytes = tokio::time::timeout(self.load_timeout, tokio::fs::read(&self.artifact_path))
            .await
            .map_err(|_| {
                ClassifierError::ModelUnavailable(format!("timed out reading {path}"))
            })?
            .map_err(|e| ClassifierError::ModelUnavailable(format!("cannot read {path}: {e}")))?;

        let model = LogisticModel::deserialize(&mut Cursor::new(bytes))
            .map_err(|e| ClassifierError::ModelUnavailable(format!("corrupt artifact {path}: {e}")))?;

        if model.coefficients.len() != FEATURE_COLUMNS.len() {
            return Err(ClassifierError::ModelUnavailable(format!(
                "artifact {path} was trained on {} features, encoder produces {}",
                model.coefficients.len(),
                FEATURE_COLUMNS.len()
            )));
        }

        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_with(intercept: f64) -> LogisticModel {
        LogisticModel {
            intercept,
            coefficients: vec![0.0; FEATURE_COLUMNS.len()],
        }
    }

    fn write_artifact(dir: &tempfile::TempDir, name: &str, model: &LogisticModel) -> PathBuf {
        let path = dir.path().join(name);
        let mut bytes = Vec::new();
        model.serialize(&mut bytes).unwrap();
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn proba_components_bounded_and_sum_to_one() {
        let model = LogisticModel {
            intercept: -0.7,
            coefficients: (0..FEATURE_COLUMNS.len()).map(|i| 0.01 * i as f64).collect(),
        };
        let x: Vec<f64> = (0..FEATURE_COLUMNS.len()).map(|i| i as f64).collect();
        let (p0, p1) = model.predict_proba(&x);
        assert!((0.0..=1.0).contains(&p0));
        assert!((0.0..=1.0).contains(&p1));
        assert!((p0 + p1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn label_agrees_with_probability() {
        let x = vec![0.0; FEATURE_COLUMNS.len()];
        assert_eq!(model_with(2.0).predict(&x), 1);
        assert_eq!(model_with(-2.0).predict(&x), 0);
    }

    #[tokio::test]
    async fn engine_loads_and_caches_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(&dir, "heart_model.bin", &model_with(1.25));

        let engine = ClassifierEngine::new(&path, Duration::from_secs(1));
        assert!(!engine.loaded().await);
        let model = engine.get().await.unwrap();
        assert_eq!(model.intercept, 1.25);
        assert!(engine.loaded().await);

        // Cached: deleting the file no longer matters.
        std::fs::remove_file(&path).unwrap();
        assert!(engine.get().await.is_ok());
    }

    #[tokio::test]
    async fn missing_artifact_is_model_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ClassifierEngine::new(dir.path().join("nope.bin"), Duration::from_secs(1));
        let err = engine.get().await.unwrap_err();
        assert!(matches!(err, ClassifierError::ModelUnavailable(_)));
    }

    #[tokio::test]
    async fn corrupt_artifact_is_model_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.bin");
        std::fs::write(&path, b"not a model").unwrap();
        let engine = ClassifierEngine::new(&path, Duration::from_secs(1));
        assert!(matches!(
            engine.get().await,
            Err(ClassifierError::ModelUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn feature_count_mismatch_is_model_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let short = LogisticModel {
            intercept: 0.0,
            coefficients: vec![0.1, 0.2, 0.3],
        };
        let path = write_artifact(&dir, "short.bin", &short);
        let engine = ClassifierEngine::new(&path, Duration::from_secs(1));
        assert!(matches!(
            engine.get().await,
            Err(ClassifierError::ModelUnavailable(_))
        ));
    }
}
