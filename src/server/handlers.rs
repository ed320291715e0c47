use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;

use super::error::AnalyzeError;
use super::page::{render_index, PageResult};
use super::AppState;
use crate::audio::extract::extract;

/// Multipart field carrying the uploaded clip.
pub const AUDIO_FIELD: &str = "audio";

pub struct Upload {
    pub file_name: String,
    pub bytes: Bytes,
}

pub async fn index() -> Html<String> {
    Html(render_index(None))
}

pub async fn upload_form(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    match analyze_request(&state, multipart).await {
        Ok(label) => Html(render_index(Some(PageResult::Prediction(&label)))).into_response(),
        Err(err) => {
            let message = err.user_message();
            (err.status(), Html(render_index(Some(PageResult::Error(&message))))).into_response()
        }
    }
}

pub async fn predict_api(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    match analyze_request(&state, multipart).await {
        Ok(label) => Json(json!({ "label": label })).into_response(),
        Err(err) => (
            err.status(),
            Json(json!({ "error": err.kind(), "message": err.user_message() })),
        )
            .into_response(),
    }
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "classes": state.classifier.classes(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}

async fn analyze_request(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<String, AnalyzeError> {
    let result = match multipart {
        Ok(multipart) => match read_audio_field(multipart).await {
            Ok(upload) => analyze(state, upload).await,
            Err(err) => Err(err),
        },
        Err(rejection) => {
            log::debug!("Request is not a multipart upload: {}", rejection);
            Err(AnalyzeError::FileMissing)
        }
    };

    match result {
        Ok(ref label) => log::info!("Predicted '{}'", label),
        Err(ref err) => log::warn!("Request failed ({}): {}", err.kind(), err),
    }
    result
}

/// Pull the `audio` file out of the form. Other fields are ignored.
pub async fn read_audio_field(mut multipart: Multipart) -> Result<Upload, AnalyzeError> {
    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        if field.name() != Some(AUDIO_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        if file_name.is_empty() {
            return Err(AnalyzeError::FileMissing);
        }
        let bytes = field.bytes().await.map_err(upload_error)?;
        return Ok(Upload { file_name, bytes });
    }
    Err(AnalyzeError::FileMissing)
}

fn upload_error(err: MultipartError) -> AnalyzeError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AnalyzeError::TooLarge
    } else {
        AnalyzeError::BadUpload(err.body_text())
    }
}

/// Store the upload, extract features under the configured timeout, then classify.
pub async fn analyze(state: &AppState, upload: Upload) -> Result<String, AnalyzeError> {
    let path = state.uploads.save(&upload.file_name, &upload.bytes).await?;
    log::info!(
        "Received '{}' ({} bytes) as {}",
        upload.file_name,
        upload.bytes.len(),
        path.display()
    );

    let task_path = path.clone();
    let outcome = run_with_timeout(state.timeout, move || extract(&task_path, true)).await;

    state.uploads.discard(&path).await;

    let features = outcome??;
    Ok(state.classifier.predict_one(&features)?)
}

/// Run `work` on the blocking pool and give up waiting after `limit`.
///
/// A task that overruns keeps going in the background; its result is dropped.
pub async fn run_with_timeout<T, F>(limit: Duration, work: F) -> Result<T, AnalyzeError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let task = tokio::task::spawn_blocking(work);
    match tokio::time::timeout(limit, task).await {
        Err(_) => Err(AnalyzeError::Timeout(limit)),
        Ok(Err(join_err)) => Err(AnalyzeError::Task(join_err.to_string())),
        Ok(Ok(value)) => Ok(value),
    }
}
