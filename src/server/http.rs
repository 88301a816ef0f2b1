//! The upload endpoint.

use crate::core::{PipelineError, PoolError, ServerConfig, UploadedFile, ValidationOutcome};
use crate::execution::ValidationService;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use thiserror::Error;

/// Multipart field carrying the model.
pub const FILE_FIELD: &str = "file";

/// Why an upload got no report.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("missing 'file' field")]
    MissingFile,

    #[error("{0}")]
    Multipart(#[from] MultipartError),

    #[error("{0}")]
    Pipeline(#[from] PipelineError),
}

impl UploadError {
    /// Response status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            UploadError::MissingFile => StatusCode::BAD_REQUEST,
            UploadError::Multipart(e) => e.status(),
            UploadError::Pipeline(e) if e.is_rejection() => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            UploadError::Pipeline(PipelineError::Pool(
                PoolError::Saturated { .. } | PoolError::ShutDown,
            )) => StatusCode::SERVICE_UNAVAILABLE,
            UploadError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Upload failed: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

/// Build the router: `POST {prefix}/upload`.
pub fn router(service: ValidationService, config: &ServerConfig) -> Router {
    let path = format!("{}/upload", config.normalized_prefix());
    log::debug!("Routing POST {path}");
    Router::new()
        .route(&path, post(upload))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .with_state(service)
}

async fn read_upload(multipart: &mut Multipart) -> Result<UploadedFile, UploadError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let body = field.bytes().await?;
        return Ok(UploadedFile::new(filename, body));
    }
    Err(UploadError::MissingFile)
}

async fn upload(
    State(service): State<ValidationService>,
    mut multipart: Multipart,
) -> Result<Json<ValidationOutcome>, UploadError> {
    let file = read_upload(&mut multipart).await?;
    log::info!("Received '{}' ({} bytes)", file.filename, file.body.len());
    let outcome = service.validate(file).await?;
    Ok(Json(outcome))
}
