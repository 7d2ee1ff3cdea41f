//! Download job HTTP API.
//!
//! Provides endpoints for:
//! - Analyzing a media URL before committing to a download
//! - Submitting download jobs and polling their status
//! - Fetching the finished output file

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{fs::File, io::BufReader};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::download::{DownloadFormat, DownloadJob, FetchOutputError, SubmitError};
use crate::server::state::{GuardedAnalyzer, GuardedDownloadService, ServerState};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct AnalyzeBody {
    pub url: String,
}

/// Submission body. Clients may spread the whole analyze summary into it,
/// unknown fields are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequestBody {
    pub source_url: String,
    pub format: DownloadFormat,
    /// Display title for the job (optional, shown by clients before the
    /// download finishes)
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /analyze - Probe a URL and describe what a download would produce
async fn analyze(
    State(analyzer): State<GuardedAnalyzer>,
    Json(body): Json<AnalyzeBody>,
) -> Response {
    debug!("Analyzing {}", body.url);

    match analyzer.analyze(&body.url).await {
        Ok(summary) => Json(summary).into_response(),
        Err(err) => {
            warn!("Analysis of {} failed: {}", body.url, err);
            error_response(StatusCode::BAD_REQUEST, err.to_string())
        }
    }
}

/// POST /download - Submit a new download job
async fn submit_download(
    State(service): State<GuardedDownloadService>,
    Json(body): Json<DownloadRequestBody>,
) -> Response {
    match service.submit(&body.source_url, body.format, body.title) {
        Ok(job) => (StatusCode::ACCEPTED, Json(job)).into_response(),
        Err(err @ SubmitError::InvalidUrl(_)) | Err(err @ SubmitError::UnsupportedSource) => {
            debug!("Rejected download of {}: {}", body.source_url, err);
            error_response(StatusCode::BAD_REQUEST, err.to_string())
        }
        Err(SubmitError::Storage(err)) => {
            warn!(
                "Failed to store download job for {}: {}",
                body.source_url, err
            );
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store job")
        }
    }
}

/// GET /download/{id} - Current state of one job
async fn get_download_job(
    State(service): State<GuardedDownloadService>,
    Path(id): Path<String>,
) -> Response {
    match service.job(&id) {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            format!("No download job with id {}", id),
        ),
        Err(err) => {
            warn!("Failed to load job {}: {}", id, err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load job")
        }
    }
}

/// GET /downloads - Every known job, most recent first
async fn list_download_jobs(State(service): State<GuardedDownloadService>) -> Response {
    match service.list() {
        Ok(jobs) => Json(jobs).into_response(),
        Err(err) => {
            warn!("Failed to list jobs: {}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list jobs")
        }
    }
}

/// GET /download/{id}/file - Stream the finished output as an attachment
async fn get_download_file(
    State(service): State<GuardedDownloadService>,
    Path(id): Path<String>,
) -> Response {
    let (job, path) = match service.output_file(&id).await {
        Ok(found) => found,
        Err(FetchOutputError::NotFound) => {
            return error_response(
                StatusCode::NOT_FOUND,
                format!("No output available for job {}", id),
            )
        }
        Err(FetchOutputError::Storage(err)) => {
            warn!("Failed to resolve output for job {}: {}", id, err);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to resolve output");
        }
    };

    let file = match File::open(&path).await {
        Ok(file) => file,
        Err(err) => {
            warn!(
                "Output file for job {} could not be opened at {}: {}",
                id,
                path.display(),
                err
            );
            return error_response(
                StatusCode::NOT_FOUND,
                format!("No output available for job {}", id),
            );
        }
    };

    let file_length = match file.metadata().await {
        Ok(metadata) => metadata.len(),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    let filename = attachment_filename(&job);

    let file_reader = BufReader::with_capacity(4096 * 16, file);
    let stream = ReaderStream::with_capacity(file_reader, 4096 * 16);
    let body = Body::from_stream(stream);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for_extension(&filename))
        .header(header::CONTENT_LENGTH, file_length)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(body)
        .unwrap()
}

fn content_type_for_extension(filename: &str) -> &'static str {
    match filename.rsplit('.').next() {
        Some("mp4") => "video/mp4",
        Some("m4a") => "audio/mp4",
        Some("webm") => "video/webm",
        Some("mp3") => "audio/mpeg",
        _ => "application/octet-stream",
    }
}

/// Name the browser should save the file under: the job title when one was
/// submitted, otherwise the job id. The on-disk name is always id-based.
fn attachment_filename(job: &DownloadJob) -> String {
    let extension = job.requested_format.extension();
    match job.title.as_deref().map(sanitize_for_header) {
        Some(stem) if !stem.is_empty() => format!("{}.{}", stem, extension),
        _ => format!("{}.{}", job.id, extension),
    }
}

/// Reduce a title to characters that are safe inside a quoted
/// Content-Disposition filename.
fn sanitize_for_header(title: &str) -> String {
    title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || " .-_()".contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim()
        .to_string()
}

// =============================================================================
// Router Construction
// =============================================================================

/// Build the public API routes.
///
/// - POST /analyze
/// - POST /download
/// - GET /download/{id}
/// - GET /download/{id}/file
/// - GET /downloads
pub fn api_routes() -> Router<ServerState> {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/download", post(submit_download))
        .route("/download/{id}", get(get_download_job))
        .route("/download/{id}/file", get(get_download_file))
        .route("/downloads", get(list_download_jobs))
}
