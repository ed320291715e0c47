//! Web front end: upload form, JSON prediction endpoint and health check.

pub mod error;
pub mod handlers;
pub mod page;
pub mod uploads;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::classifier::Classifier;
use uploads::UploadStore;

/// Shared state handed to every handler. The classifier is read-only.
#[derive(Clone)]
pub struct AppState {
    pub classifier: Arc<dyn Classifier>,
    pub uploads: Arc<UploadStore>,
    pub timeout: Duration,
}

pub struct ServerSettings {
    pub addr: SocketAddr,
    pub max_upload_bytes: usize,
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(handlers::index).post(handlers::upload_form))
        .route("/api/predict", post(handlers::predict_api))
        .route("/health", get(handlers::health))
        .with_state(state)
        // Enforced while the multipart body is read, so oversize uploads
        // surface as a handler error and never reach the uploads dir
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

/// Serve until Ctrl-C.
pub async fn run(state: AppState, settings: ServerSettings) -> Result<()> {
    let app = router(state, settings.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(settings.addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.addr))?;
    log::info!("Listening on http://{}", settings.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::warn!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::features::FeatureVector;
    use crate::classifier::ClassifierError;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const BOUNDARY: &str = "emotion-test-boundary";

    struct FixedLabel {
        classes: Vec<String>,
    }

    impl Classifier for FixedLabel {
        fn predict(&self, batch: &[FeatureVector]) -> Result<Vec<String>, ClassifierError> {
            Ok(batch.iter().map(|_| self.classes[0].clone()).collect())
        }

        fn classes(&self) -> &[String] {
            &self.classes
        }
    }

    fn test_app(dir: &std::path::Path) -> Router {
        configured_app(dir, Duration::from_secs(30), 10 * 1024 * 1024)
    }

    fn configured_app(dir: &std::path::Path, timeout: Duration, max_upload_bytes: usize) -> Router {
        let state = AppState {
            classifier: Arc::new(FixedLabel {
                classes: vec!["happy".into()],
            }),
            uploads: Arc::new(UploadStore::open(dir, false).unwrap()),
            timeout,
        };
        router(state, max_upload_bytes)
    }

    fn sine_wav(secs: f32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            let n = (secs * 22050.0) as usize;
            for i in 0..n {
                let s = (2.0 * std::f32::consts::PI * 330.0 * i as f32 / 22050.0).sin() * 0.5;
                writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn multipart_body(field: &str, file_name: &str, content: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn post(uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn upload_count(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn get_renders_empty_form() {
        let dir = tempfile::tempdir().unwrap();
        let response = test_app(dir.path())
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_string(response).await;
        assert!(html.contains("enctype=\"multipart/form-data\""));
        assert!(!html.contains("Predicted emotion"));
    }

    #[tokio::test]
    async fn missing_audio_field_is_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let body = multipart_body("attachment", "clip.wav", &sine_wav(2.0));
        let response = test_app(dir.path()).oneshot(post("/", body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(response).await.contains("No file provided"));
        // Nothing was stored, so extraction never ran
        assert_eq!(upload_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn empty_filename_is_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let body = multipart_body("audio", "", b"");
        let response = test_app(dir.path())
            .oneshot(post("/api/predict", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["error"], "file_missing");
    }

    #[tokio::test]
    async fn valid_clip_renders_prediction() {
        let dir = tempfile::tempdir().unwrap();
        let body = multipart_body("audio", "clip.wav", &sine_wav(2.0));
        let response = test_app(dir.path()).oneshot(post("/", body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("<strong>happy</strong>"));
        assert_eq!(upload_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn short_clip_reports_too_short_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let body = multipart_body("audio", "clip.wav", &sine_wav(0.5));
        let response = test_app(dir.path())
            .oneshot(post("/api/predict", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["error"], "too_short");
    }

    #[tokio::test]
    async fn corrupt_upload_reports_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let body = multipart_body("audio", "clip.ogg", b"this is not an audio stream");
        let response = test_app(dir.path()).oneshot(post("/", body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_string(response).await.contains("Could not decode the audio file"));
    }

    #[tokio::test]
    async fn health_lists_classes() {
        let dir = tempfile::tempdir().unwrap();
        let response = test_app(dir.path())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["classes"][0], "happy");
    }

    #[tokio::test]
    async fn slow_extraction_times_out() {
        let dir = tempfile::tempdir().unwrap();
        // A minute of audio cannot be decoded and transformed within a microsecond
        let body = multipart_body("audio", "long.wav", &sine_wav(60.0));
        let response = configured_app(dir.path(), Duration::from_micros(1), 10 * 1024 * 1024)
            .oneshot(post("/api/predict", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["error"], "timeout");
        assert_eq!(upload_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn oversize_upload_is_rejected_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let body = multipart_body("audio", "clip.wav", &sine_wav(2.0));
        let response = configured_app(dir.path(), Duration::from_secs(30), 1024)
            .oneshot(post("/api/predict", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["error"], "too_large");
        assert_eq!(upload_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn oversize_upload_renders_error_page() {
        let dir = tempfile::tempdir().unwrap();
        let body = multipart_body("audio", "clip.wav", &sine_wav(2.0));
        let response = configured_app(dir.path(), Duration::from_secs(30), 1024)
            .oneshot(post("/", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let html = body_string(response).await;
        assert!(html.contains("enctype=\"multipart/form-data\""));
        assert!(html.contains("The file is too large"));
    }
}
