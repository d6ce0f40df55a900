//! Machine Learning Module
//!
//! Feature-vector assembly, the pre-trained classifier adapter, and the
//! prediction service that orchestrates store -> encoder -> classifier ->
//! write-back.

pub mod classifier;
pub mod features;
pub mod predict;

pub use classifier::{ClassifierEngine, ClassifierError, LogisticModel};
pub use features::{encode, FeatureError, FeatureVector, FEATURE_COLUMNS};
pub use predict::{BatchPrediction, PredictError, Prediction, PredictionService};
