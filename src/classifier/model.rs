use serde::Deserialize;
use std::path::Path;

use super::{Classifier, ClassifierError};
use crate::audio::features::{FeatureVector, N_MFCC};

/// Serialized classifier: an optional standardisation step followed by an
/// estimator, mirroring a fitted scaler + classifier pipeline.
#[derive(Debug, Deserialize)]
pub struct ModelArtifact {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub scaler: Option<StandardScaler>,
    pub estimator: Estimator,
}

#[derive(Debug, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f32>,
    pub scale: Vec<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Estimator {
    /// One-vs-rest linear decision functions; the highest score wins.
    Linear {
        classes: Vec<String>,
        coef: Vec<Vec<f32>>,
        intercept: Vec<f32>,
    },
    /// The class whose centroid is nearest in Euclidean distance wins.
    NearestCentroid {
        classes: Vec<String>,
        centroids: Vec<Vec<f32>>,
    },
}

impl StandardScaler {
    fn transform(&self, values: &[f32]) -> Vec<f32> {
        values
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(&x, (&mean, &scale))| {
                // Zero-variance features are passed through centred only
                let scale = if scale == 0.0 { 1.0 } else { scale };
                (x - mean) / scale
            })
            .collect()
    }
}

impl Estimator {
    fn classes(&self) -> &[String] {
        match self {
            Estimator::Linear { classes, .. } | Estimator::NearestCentroid { classes, .. } => {
                classes
            }
        }
    }

    fn predict_index(&self, x: &[f32]) -> usize {
        match self {
            Estimator::Linear {
                coef, intercept, ..
            } => argmax(coef.iter().zip(intercept).map(|(row, &b)| dot(row, x) + b)),
            Estimator::NearestCentroid { centroids, .. } => argmax(centroids.iter().map(|c| {
                -c.iter().zip(x).map(|(a, b)| (a - b) * (a - b)).sum::<f32>()
            })),
        }
    }
}

impl ModelArtifact {
    /// Check that every dimension lines up with the feature vector length and
    /// the class list.
    pub fn validate(&self) -> Result<(), ClassifierError> {
        if let Some(ref scaler) = self.scaler {
            if scaler.mean.len() != N_MFCC || scaler.scale.len() != N_MFCC {
                return Err(ClassifierError::Invalid(format!(
                    "scaler expects {} features, got mean={} scale={}",
                    N_MFCC,
                    scaler.mean.len(),
                    scaler.scale.len()
                )));
            }
        }

        let classes = self.estimator.classes();
        if classes.is_empty() {
            return Err(ClassifierError::Invalid("model has no classes".into()));
        }

        let rows = match &self.estimator {
            Estimator::Linear {
                coef, intercept, ..
            } => {
                if intercept.len() != classes.len() {
                    return Err(ClassifierError::Invalid(format!(
                        "{} classes but {} intercepts",
                        classes.len(),
                        intercept.len()
                    )));
                }
                coef
            }
            Estimator::NearestCentroid { centroids, .. } => centroids,
        };

        if rows.len() != classes.len() {
            return Err(ClassifierError::Invalid(format!(
                "{} classes but {} weight rows",
                classes.len(),
                rows.len()
            )));
        }
        if let Some(row) = rows.iter().find(|r| r.len() != N_MFCC) {
            return Err(ClassifierError::Invalid(format!(
                "weight row has {} features, expected {}",
                row.len(),
                N_MFCC
            )));
        }

        Ok(())
    }
}

impl Classifier for ModelArtifact {
    fn predict(&self, batch: &[FeatureVector]) -> Result<Vec<String>, ClassifierError> {
        if batch.is_empty() {
            return Err(ClassifierError::EmptyBatch);
        }

        let classes = self.estimator.classes();
        Ok(batch
            .iter()
            .map(|features| {
                let x = match self.scaler {
                    Some(ref scaler) => scaler.transform(features.as_slice()),
                    None => features.as_slice().to_vec(),
                };
                classes[self.estimator.predict_index(&x)].clone()
            })
            .collect())
    }

    fn classes(&self) -> &[String] {
        self.estimator.classes()
    }
}

/// Load and validate a model artifact from a JSON file.
pub fn load_model(path: &Path) -> Result<ModelArtifact, ClassifierError> {
    let content = std::fs::read_to_string(path).map_err(|source| ClassifierError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let model: ModelArtifact =
        serde_json::from_str(&content).map_err(|source| ClassifierError::Parse {
            path: path.display().to_string(),
            source,
        })?;
    model.validate()?;

    log::info!(
        "Loaded model '{}' from {} ({} classes: {})",
        model.name,
        path.display(),
        model.classes().len(),
        model.classes().join(", ")
    );
    Ok(model)
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn argmax(scores: impl Iterator<Item = f32>) -> usize {
    scores
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, s)| if s > best.1 { (i, s) } else { best })
        .0
}
