use axum::http::StatusCode;
use std::time::Duration;
use thiserror::Error;

use crate::audio::features::ExtractError;
use crate::classifier::ClassifierError;

/// Every way a request can fail between upload and prediction.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("no audio file provided")]
    FileMissing,

    #[error("malformed upload: {0}")]
    BadUpload(String),

    #[error("upload exceeds the size limit")]
    TooLarge,

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("feature extraction exceeded {0:?}")]
    Timeout(Duration),

    #[error("upload storage failed: {0}")]
    Storage(#[from] std::io::Error),

    #[error("prediction failed: {0}")]
    Prediction(#[from] ClassifierError),

    #[error("extraction task failed: {0}")]
    Task(String),
}

impl AnalyzeError {
    pub fn kind(&self) -> &'static str {
        match self {
            AnalyzeError::FileMissing => "file_missing",
            AnalyzeError::BadUpload(_) => "bad_upload",
            AnalyzeError::TooLarge => "too_large",
            AnalyzeError::Extract(err) => err.kind(),
            AnalyzeError::Timeout(_) => "timeout",
            AnalyzeError::Storage(_) => "storage_error",
            AnalyzeError::Prediction(_) => "prediction_error",
            AnalyzeError::Task(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AnalyzeError::FileMissing | AnalyzeError::BadUpload(_) => StatusCode::BAD_REQUEST,
            AnalyzeError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AnalyzeError::Extract(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AnalyzeError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AnalyzeError::Storage(_) | AnalyzeError::Prediction(_) | AnalyzeError::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message shown to the client. Internal causes stay in the server log,
    /// except decode causes, which describe the user's own file.
    pub fn user_message(&self) -> String {
        match self {
            AnalyzeError::FileMissing => {
                "No file provided. Please select an audio file to upload.".into()
            }
            AnalyzeError::BadUpload(_) => "The upload could not be read. Please try again.".into(),
            AnalyzeError::TooLarge => {
                "The file is too large. Please upload a smaller recording.".into()
            }
            AnalyzeError::Extract(ExtractError::Decode(cause)) => {
                format!("Could not decode the audio file: {}", cause)
            }
            AnalyzeError::Extract(ExtractError::TooShort { .. }) => {
                "Could not extract features: the recording is shorter than one second.".into()
            }
            AnalyzeError::Extract(ExtractError::Silent) => {
                "Could not extract features: the recording is silent.".into()
            }
            AnalyzeError::Extract(ExtractError::FeaturesDisabled) => {
                "Could not extract features from this recording.".into()
            }
            AnalyzeError::Extract(ExtractError::InvalidFeatures) => {
                "Invalid audio features detected. Please upload a valid audio file.".into()
            }
            AnalyzeError::Timeout(_) => {
                "Processing took too long. Please upload a shorter recording.".into()
            }
            AnalyzeError::Storage(_) => "The upload could not be saved. Please try again.".into(),
            AnalyzeError::Prediction(_) | AnalyzeError::Task(_) => {
                "The recording could not be classified. Please try again.".into()
            }
        }
    }
}
