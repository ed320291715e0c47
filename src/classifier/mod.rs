pub mod model;

use thiserror::Error;

use crate::audio::features::FeatureVector;

pub use model::load_model;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("failed to read model {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse model {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid model: {0}")]
    Invalid(String),

    #[error("empty batch")]
    EmptyBatch,
}

/// A pre-trained model mapping feature vectors to emotion labels.
///
/// Loaded once at startup and shared read-only across requests.
pub trait Classifier: Send + Sync {
    /// Predict one label per row of `batch`.
    fn predict(&self, batch: &[FeatureVector]) -> Result<Vec<String>, ClassifierError>;

    /// Every label the model can emit.
    fn classes(&self) -> &[String];

    /// Convenience for the single-row batch the service sends.
    fn predict_one(&self, features: &FeatureVector) -> Result<String, ClassifierError> {
        self.predict(std::slice::from_ref(features))?
            .into_iter()
            .next()
            .ok_or(ClassifierError::EmptyBatch)
    }
}
