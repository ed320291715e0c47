use serde::{Serialize, Serializer};
use thiserror::Error;

/// Number of cepstral coefficients kept per frame, and the length of every
/// [`FeatureVector`].
pub const N_MFCC: usize = 40;

/// Sample rate every input is resampled to before analysis.
pub const TARGET_SAMPLE_RATE: u32 = 22050;

/// Decoded mono audio at a fixed sample rate.
#[derive(Clone, Debug)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Time-averaged MFCCs for one clip. Always exactly [`N_MFCC`] values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeatureVector([f32; N_MFCC]);

impl FeatureVector {
    pub fn new(values: [f32; N_MFCC]) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_slice().serialize(serializer)
    }
}

/// Why a clip produced no feature vector.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExtractError {
    #[error("failed to decode audio: {0}")]
    Decode(String),

    #[error("audio is shorter than one second ({samples} samples at {sample_rate}Hz)")]
    TooShort { samples: usize, sample_rate: u32 },

    #[error("audio is silent")]
    Silent,

    #[error("invalid audio features detected")]
    InvalidFeatures,

    #[error("no feature set selected")]
    FeaturesDisabled,
}

impl ExtractError {
    /// Stable machine-readable name for the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractError::Decode(_) => "decode_error",
            ExtractError::TooShort { .. } => "too_short",
            ExtractError::Silent => "silent",
            ExtractError::InvalidFeatures => "invalid_features",
            ExtractError::FeaturesDisabled => "features_disabled",
        }
    }
}

pub type ExtractionResult = Result<FeatureVector, ExtractError>;
