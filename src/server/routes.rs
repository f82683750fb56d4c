//! HTTP route handlers for the image retrieval API.

use crate::error::ErrorCategory;
use crate::orchestrator::{RankedResult, SearchStats};
use crate::orchestrator::Retriever;
use crate::server::uploads::{allowed_extension, content_type_for, resolve_upload, secure_filename};
use crate::server::{AppState, LoadState};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path as UrlPath, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

const TRACING_TARGET: &str = "imgseek::server::routes";

/// Query text used when the client sends none.
pub const DEFAULT_QUERY: &str = "similar images";

// --- Request/Response types ---

#[derive(Deserialize)]
pub struct SearchRequest {
    /// Name of a previously uploaded image inside the uploads directory
    pub filename: String,
    pub query: Option<String>,
}

/// Tagged search outcome: `{"status": "success", ...}` or `{"status": "failure", ...}`
#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SearchResponse {
    Success {
        results: Vec<RankedResult>,
        indexed_count: usize,
        message: String,
        stats: SearchStats,
    },
    Failure {
        reason: String,
        category: ErrorCategory,
    },
}

#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, `loading` or `failed`
    pub status: String,
    pub ready: bool,
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct UploadResponse {
    /// Sanitized name to pass to `/search`
    pub filename: String,
    pub filepath: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct MetricsResponse {
    pub total_searches: u64,
    pub succeeded_searches: u64,
    pub failed_searches: u64,
    pub failures_by_category: BTreeMap<String, u64>,
    pub download_failures: BTreeMap<String, u64>,
    pub extraction_failures: u64,
    pub candidates_indexed: u64,
    pub avg_search_latency_us: f64,
    pub p50_search_latency_us: f64,
    pub p95_search_latency_us: f64,
    pub p99_search_latency_us: f64,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

// --- Router ---

pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        .route("/upload", post(upload_image))
        .route("/uploads/{filename}", get(get_upload))
        .route("/search", post(search_images))
        .route("/health", get(health))
        .route("/metrics", get(get_metrics))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

// --- Handlers ---

async fn search_images(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchRequest>,
) -> Result<(StatusCode, Json<SearchResponse>), ApiError> {
    let retriever = ready_retriever(&state)?;

    let path = resolve_upload(&state.uploads_dir, &req.filename)
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Invalid filename"))?;
    let is_file = tokio::fs::metadata(&path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(api_error(StatusCode::NOT_FOUND, "Image file not found"));
    }

    let query = req
        .query
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .unwrap_or_else(|| DEFAULT_QUERY.to_string());

    let start = Instant::now();
    match retriever.search(&path, &query).await {
        Ok(output) => {
            if let Ok(mut metrics) = state.metrics.write() {
                metrics.record_success(&output.stats);
            }
            let message = format!("Found {} similar images", output.results.len());
            Ok((
                StatusCode::OK,
                Json(SearchResponse::Success {
                    indexed_count: output.stats.indexed,
                    results: output.results,
                    message,
                    stats: output.stats,
                }),
            ))
        }
        Err(e) => {
            let category = e.category();
            if let Ok(mut metrics) = state.metrics.write() {
                metrics.record_failure(category, start.elapsed());
            }
            Ok((
                status_for(category),
                Json(SearchResponse::Failure {
                    reason: e.to_string(),
                    category,
                }),
            ))
        }
    }
}

async fn upload_image(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let limit = state.max_upload_bytes;
    let too_large = || {
        api_error(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("File is too large. Maximum size is {}MB", limit / (1024 * 1024)),
        )
    };
    let multipart_error = |e: axum::extract::multipart::MultipartError| {
        tracing::debug!(target: TRACING_TARGET, error = %e, "Failed to read multipart upload");
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            too_large()
        } else {
            api_error(e.status(), e.body_text())
        }
    };

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let original = field.file_name().unwrap_or_default().to_string();
        if original.is_empty() {
            return Err(api_error(StatusCode::BAD_REQUEST, "No file selected"));
        }
        if allowed_extension(&original).is_none() {
            return Err(api_error(StatusCode::BAD_REQUEST, "File type not allowed"));
        }
        let filename = secure_filename(&original);
        let path = allowed_extension(&filename)
            .and_then(|_| resolve_upload(&state.uploads_dir, &filename))
            .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Invalid filename"))?;

        let mut data = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            if data.len() + chunk.len() > limit {
                return Err(too_large());
            }
            data.extend_from_slice(&chunk);
        }
        if image::guess_format(&data).is_err() {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "File is not a recognized image",
            ));
        }

        tokio::fs::write(&path, &data).await.map_err(|e| {
            tracing::error!(target: TRACING_TARGET, path = %path.display(), error = %e, "Failed to store upload");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store upload")
        })?;
        tracing::info!(target: TRACING_TARGET, filename = %filename, bytes = data.len(), "Stored upload");

        return Ok(Json(UploadResponse {
            filepath: format!("/uploads/{}", filename),
            filename,
            message: "Image uploaded successfully".to_string(),
        }));
    }

    Err(api_error(StatusCode::BAD_REQUEST, "No file provided"))
}

async fn get_upload(
    State(state): State<Arc<AppState>>,
    UrlPath(filename): UrlPath<String>,
) -> Result<Response, ApiError> {
    let ext = allowed_extension(&filename)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Not found"))?;
    let path = resolve_upload(&state.uploads_dir, &filename)
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Invalid filename"))?;
    let data = tokio::fs::read(&path)
        .await
        .map_err(|_| api_error(StatusCode::NOT_FOUND, "Not found"))?;

    Ok(([(header::CONTENT_TYPE, content_type_for(&ext))], data).into_response())
}

async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    match state.load_state() {
        LoadState::Ready(retriever) if retriever.is_ready() => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".to_string(),
                ready: true,
                model: Some(retriever.backbone_name().to_string()),
                error: None,
            }),
        ),
        LoadState::Failed(reason) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "failed".to_string(),
                ready: false,
                model: None,
                error: Some(reason.to_string()),
            }),
        ),
        _ => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "loading".to_string(),
                ready: false,
                model: None,
                error: None,
            }),
        ),
    }
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> Result<Json<MetricsResponse>, ApiError> {
    let metrics = state
        .metrics
        .read()
        .map_err(|_| api_error(StatusCode::INTERNAL_SERVER_ERROR, "Lock poisoned"))?;

    Ok(Json(MetricsResponse {
        total_searches: metrics.total_searches(),
        succeeded_searches: metrics.succeeded_searches(),
        failed_searches: metrics.failed_searches(),
        failures_by_category: metrics.failures_by_category(),
        download_failures: metrics.download_failures().clone(),
        extraction_failures: metrics.extraction_failures(),
        candidates_indexed: metrics.candidates_indexed(),
        avg_search_latency_us: metrics.avg_search_latency_us(),
        p50_search_latency_us: metrics.percentile_search_latency_us(50.0),
        p95_search_latency_us: metrics.percentile_search_latency_us(95.0),
        p99_search_latency_us: metrics.percentile_search_latency_us(99.0),
    }))
}

fn ready_retriever(state: &AppState) -> Result<&Retriever, ApiError> {
    match state.load_state() {
        LoadState::Ready(retriever) => Ok(retriever),
        LoadState::Loading => Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Model is still loading",
        )),
        LoadState::Failed(reason) => Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Model failed to load: {}", reason),
        )),
    }
}

/// An empty result set is an answer, not a server fault.
fn status_for(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::NoResults => StatusCode::OK,
        ErrorCategory::ExtractionFailed => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCategory::ProviderUnreachable => StatusCode::BAD_GATEWAY,
    }
}
